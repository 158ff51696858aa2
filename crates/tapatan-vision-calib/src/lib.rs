//! Board calibration for the Tapatan robot.
//!
//! Two ArUco reference markers a known distance apart define a planar board
//! frame (origin at the lower id, +X toward the other). From that frame the
//! crate derives the 3x3 playing grid, a safety-expanded workspace and move
//! legality. [`CalibrationOrchestrator`] runs the stages per frame and keeps
//! the last good calibration when a frame fails.
//!
//! ```no_run
//! use tapatan_vision_calib::{CalibrationConfig, CalibrationOrchestrator};
//! use tapatan_vision_aruco::Dictionary;
//! use tapatan_vision_core::Frame;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dict = Dictionary::load_json("testdata/dict_6x6_sample.json")?;
//! let mut calib = CalibrationOrchestrator::new(CalibrationConfig::default(), dict)?;
//! # let pixels = vec![255u8; 640 * 480];
//! let result = calib.calibrate(&Frame::gray(640, 480, &pixels));
//! if result.is_calibrated {
//!     println!("center cell at {:?}", calib.grid_position(4));
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod grid;
mod io;
mod orchestrator;
mod reference;
mod transform;
mod workspace;

pub use config::{CalibrationConfig, MAX_SMOOTHING_FRAMES, MIN_SMOOTHING_FRAMES};
pub use error::{CalibrationError, ConfigError, ErrorKind};
pub use grid::{GridBounds, GridCell, GridGenerator, GridStats, CELL_COUNT, GRID_SIZE};
pub use io::{CalibrationSetup, IoError};
pub use orchestrator::{
    CalibrationInfo, CalibrationOrchestrator, CalibrationResult, CalibrationState,
    CalibrationStatus,
};
pub use reference::{CalibrationData, CalibrationMarkerDetector, MarkerPose, SmoothingWindow};
pub use transform::{BoardTransform, TransformInfo};
pub use workspace::{SafetyMargins, WorkspaceConstraints, WorkspaceStats, WorkspaceValidator};
