//! Calibration configuration.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use tapatan_vision_aruco::{Dictionary, MarkerDetectorParams};

pub const MIN_SMOOTHING_FRAMES: usize = 3;
pub const MAX_SMOOTHING_FRAMES: usize = 5;

/// Installation constants and tuning for one board.
///
/// Every field has a default, so a JSON file only needs to name what differs
/// from the standard rig.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Physical distance between the two reference marker centers.
    pub distance_mm: f64,
    /// Frames averaged by the marker smoothing window (3..=5).
    pub smoothing_frames: usize,
    /// Expansion of the usable workspace beyond the grid on every side.
    pub safety_margin_mm: f64,
    /// The two reference marker ids; the lower one is the board origin.
    pub reference_ids: [u32; 2],
    pub min_distance_px: f64,
    pub max_distance_px: f64,
    /// Largest accepted pixel -> board -> pixel deviation.
    pub round_trip_tolerance_px: f64,
    /// Expected inner bits per marker side.
    pub marker_size: usize,
    /// When set, the loaded dictionary must carry this name
    /// (the printed rig uses `DICT_6X6_250`).
    pub dictionary_name: Option<String>,
    pub marker: MarkerDetectorParams,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            distance_mm: 270.0,
            smoothing_frames: 3,
            safety_margin_mm: 10.0,
            reference_ids: [0, 1],
            min_distance_px: 50.0,
            max_distance_px: 2000.0,
            round_trip_tolerance_px: 1.0,
            marker_size: 6,
            dictionary_name: None,
            marker: MarkerDetectorParams::default(),
        }
    }
}

impl CalibrationConfig {
    /// Check every field that does not depend on the dictionary.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.distance_mm.is_finite() || self.distance_mm <= 0.0 {
            return Err(ConfigError::DistanceMm(self.distance_mm));
        }
        if !(MIN_SMOOTHING_FRAMES..=MAX_SMOOTHING_FRAMES).contains(&self.smoothing_frames) {
            return Err(ConfigError::SmoothingFrames(self.smoothing_frames));
        }
        if !self.safety_margin_mm.is_finite() || self.safety_margin_mm < 0.0 {
            return Err(ConfigError::SafetyMargin(self.safety_margin_mm));
        }
        let [a, b] = self.reference_ids;
        if a == b {
            return Err(ConfigError::SameReferenceIds(a));
        }
        let (min_px, max_px) = (self.min_distance_px, self.max_distance_px);
        if !(min_px.is_finite() && max_px.is_finite() && min_px > 0.0 && min_px < max_px) {
            return Err(ConfigError::PlausibilityRange { min_px, max_px });
        }
        if !self.round_trip_tolerance_px.is_finite() || self.round_trip_tolerance_px <= 0.0 {
            return Err(ConfigError::RoundTripTolerance(self.round_trip_tolerance_px));
        }
        self.marker.validate()?;
        Ok(())
    }

    /// [`validate`](Self::validate) plus the checks against the marker dictionary.
    pub fn validate_for(&self, dictionary: &Dictionary) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(expected) = &self.dictionary_name {
            if dictionary.name() != expected {
                return Err(ConfigError::DictionaryName {
                    expected: expected.clone(),
                    found: dictionary.name().to_string(),
                });
            }
        }
        if dictionary.marker_size() != self.marker_size {
            return Err(ConfigError::MarkerSizeMismatch {
                expected: self.marker_size,
                found: dictionary.marker_size(),
            });
        }
        for id in self.reference_ids {
            if !dictionary.contains_id(id) {
                return Err(ConfigError::ReferenceIdOutsideDictionary {
                    id,
                    len: dictionary.len(),
                });
            }
        }
        let limit = dictionary.max_correction_bits();
        let correction_bits = self.marker.max_hamming.map_or(limit, |h| h.min(limit));
        let min_distance = dictionary.min_distance();
        if min_distance <= 2 * u32::from(correction_bits) {
            return Err(ConfigError::AmbiguousCodes {
                min_distance,
                correction_bits,
            });
        }
        Ok(())
    }

    /// Reference ids in ascending order: `[origin, +X]`.
    pub fn ordered_reference_ids(&self) -> [u32; 2] {
        let [a, b] = self.reference_ids;
        [a.min(b), a.max(b)]
    }
}
