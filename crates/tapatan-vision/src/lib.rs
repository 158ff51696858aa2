//! High-level facade for the `tapatan-vision-*` workspace.
//!
//! This crate provides:
//! - re-exports of the core, marker and calibration crates,
//! - [`BoardCoordinateSystem`], the surface the game and robot layers use
//!   (board millimeters, move legality, pixel to cell lookup),
//! - (feature `image`) adapters between the `image` crate and calibration
//!   frames, plus printable marker sheets.
//!
//! ## Quickstart
//!
//! ```no_run
//! use std::collections::BTreeSet;
//! use tapatan_vision::calib::CalibrationConfig;
//! use tapatan_vision::aruco::Dictionary;
//! use tapatan_vision::BoardCoordinateSystem;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dict = Dictionary::load_json("testdata/dict_6x6_sample.json")?;
//! let mut board = BoardCoordinateSystem::new(CalibrationConfig::default(), dict)?;
//!
//! let img = image::open("frame.png")?.to_luma8();
//! board.calibrate(&tapatan_vision::detect::gray_frame(&img));
//!
//! if board.is_calibrated() {
//!     println!("center cell at {:?} mm", board.get_board_position_mm(4));
//!     println!("moves from 0: {:?}", board.get_valid_moves(0, &BTreeSet::new()));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `tapatan_vision::core`: frames, grayscale images, homography, logger setup.
//! - `tapatan_vision::aruco`: dictionaries, the marker detector, marker rendering.
//! - `tapatan_vision::calib`: reference markers, board transform, grid,
//!   workspace and the calibration orchestrator.
//! - `tapatan_vision::detect` (feature `image`): helpers from `image::GrayImage`.

pub use tapatan_vision_aruco as aruco;
pub use tapatan_vision_calib as calib;
pub use tapatan_vision_core as core;

pub use tapatan_vision_aruco::{Detection, Dictionary, MarkerDetector, MarkerSource};
pub use tapatan_vision_calib::{
    CalibrationConfig, CalibrationError, CalibrationOrchestrator, CalibrationResult,
    CalibrationSetup, CalibrationState,
};
pub use tapatan_vision_core::{Frame, PixelFormat};

mod coords;
mod report;

pub use coords::{BoardCoordinateSystem, BoardPosition};
pub use report::{CalibrationReport, FrameOutcome};

#[cfg(feature = "image")]
pub mod detect;
