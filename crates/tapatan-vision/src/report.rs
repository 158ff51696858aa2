//! JSON report for a batch of frames run through the calibration.

use crate::calib::{
    CalibrationError, CalibrationInfo, CalibrationResult, CalibrationStatus, ErrorKind, IoError,
};
use crate::BoardCoordinateSystem;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fs, path::Path};
use tapatan_vision_aruco::MarkerSource;

/// What happened to one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameOutcome {
    pub frame: String,
    pub calibrated: bool,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl FrameOutcome {
    pub fn new(frame: impl Into<String>, outcome: &Result<CalibrationResult, CalibrationError>) -> Self {
        let frame = frame.into();
        match outcome {
            Ok(result) => Self {
                frame,
                calibrated: true,
                confidence: result.confidence,
                error: None,
                error_kind: None,
            },
            Err(err) => Self {
                frame,
                calibrated: false,
                confidence: 0.0,
                error: Some(err.to_string()),
                error_kind: Some(err.kind()),
            },
        }
    }

    /// Outcome for a frame that never reached the pipeline (unreadable file).
    pub fn unreadable(frame: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            frame: frame.into(),
            calibrated: false,
            confidence: 0.0,
            error: Some(reason.into()),
            error_kind: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub frames: Vec<FrameOutcome>,
    pub status: CalibrationStatus,
    /// Cell centers in board millimeters, keyed by grid position.
    pub board_positions_mm: BTreeMap<usize, [f64; 2]>,
    pub info: CalibrationInfo,
}

impl CalibrationReport {
    /// Snapshot the board after `frames` have been processed.
    pub fn new<S: MarkerSource>(frames: Vec<FrameOutcome>, board: &BoardCoordinateSystem<S>) -> Self {
        Self {
            frames,
            status: board.orchestrator().status(),
            board_positions_mm: board
                .get_all_board_positions_mm()
                .into_iter()
                .map(|(pos, (x, y))| (pos, [x, y]))
                .collect(),
            info: board.get_calibration_info(),
        }
    }

    pub fn calibrated_frames(&self) -> usize {
        self.frames.iter().filter(|f| f.calibrated).count()
    }

    /// Load a report from JSON on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_frames_carry_the_error_kind() {
        let outcome = FrameOutcome::new(
            "f0.png",
            &Err(CalibrationError::MarkersNotDetected { found: 0 }),
        );
        assert!(!outcome.calibrated);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Detection));

        let json = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(json["error_kind"], "detection");
        assert_eq!(
            json["error"],
            "markers not detected: 0 of 2 reference markers visible"
        );
    }

    #[test]
    fn unreadable_frames_have_no_kind() {
        let outcome = FrameOutcome::unreadable("missing.png", "no such file");
        let json = serde_json::to_value(&outcome).expect("serialize");
        assert!(json.get("error_kind").is_none());
        assert_eq!(json["calibrated"], false);
    }
}
