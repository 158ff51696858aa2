//! ArUco marker detection for board calibration.
//!
//! The pipeline is deliberately plain:
//! - tile-adaptive threshold (Otsu and fixed global splits are selectable),
//! - 4-connected dark blobs reduced to quads,
//! - per-quad bit sampling through a homography,
//! - rotation-aware Hamming lookup in a [`Dictionary`] loaded from JSON.
//!
//! [`MarkerDetector`] implements [`MarkerSource`], the seam the calibration
//! stage consumes.

mod decode;
mod detector;
mod dictionary;
mod matcher;
mod quad;
mod render;
mod threshold;

pub use detector::{
    validate_detections, Detection, DetectorStats, MarkerDetector, MarkerDetectorParams,
    MarkerSource, ParamsError,
};
pub use dictionary::{Dictionary, DictionaryError};
pub use matcher::{rotate_code_u64, Match, Matcher};
pub use render::draw_marker;
pub use threshold::ThresholdMode;
