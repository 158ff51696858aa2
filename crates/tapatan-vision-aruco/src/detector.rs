//! Frame-level ArUco detection.

use crate::decode::{dedup_by_id_keep_best, CellDecoder};
use crate::quad::{find_quads, QuadLimits};
use crate::threshold::{binarize, ThresholdMode};
use crate::{Dictionary, Matcher};
use log::{debug, warn};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tapatan_vision_core::{Frame, GrayImageView};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Tuning knobs for [`MarkerDetector`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerDetectorParams {
    pub threshold: ThresholdMode,
    /// Smallest accepted blob bounding-box side, in pixels.
    pub min_side_px: f32,
    /// Largest accepted blob bounding box as a fraction of the frame area.
    pub max_area_frac: f32,
    /// Fraction of border cells that must read black.
    pub min_border_score: f32,
    /// Bit errors to correct. `None` uses the dictionary's own limit; larger
    /// values are clamped to it.
    pub max_hamming: Option<u8>,
    /// Width of the black frame around the code, in cells.
    pub border_bits: usize,
}

impl Default for MarkerDetectorParams {
    fn default() -> Self {
        Self {
            threshold: ThresholdMode::default(),
            min_side_px: 16.0,
            max_area_frac: 0.5,
            min_border_score: 0.85,
            max_hamming: None,
            border_bits: 1,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParamsError {
    #[error("min_side_px must be finite and >= 4, got {0}")]
    MinSide(f32),
    #[error("max_area_frac must be in (0, 1], got {0}")]
    MaxAreaFrac(f32),
    #[error("min_border_score must be in [0, 1], got {0}")]
    MinBorderScore(f32),
    #[error("border_bits must be at least 1")]
    NoBorder,
    #[error("adaptive threshold tile_size must be at least 2, got {0}")]
    TileSize(usize),
}

impl MarkerDetectorParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !self.min_side_px.is_finite() || self.min_side_px < 4.0 {
            return Err(ParamsError::MinSide(self.min_side_px));
        }
        if !(self.max_area_frac > 0.0 && self.max_area_frac <= 1.0) {
            return Err(ParamsError::MaxAreaFrac(self.max_area_frac));
        }
        if !(0.0..=1.0).contains(&self.min_border_score) {
            return Err(ParamsError::MinBorderScore(self.min_border_score));
        }
        if self.border_bits == 0 {
            return Err(ParamsError::NoBorder);
        }
        if let ThresholdMode::Adaptive { tile_size, .. } = self.threshold {
            if tile_size < 2 {
                return Err(ParamsError::TileSize(tile_size));
            }
        }
        Ok(())
    }
}

/// One decoded marker in image pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: u32,
    /// Mean of the four corners.
    pub center: Point2<f64>,
    /// Marker corners in the marker's own order: top-left, top-right,
    /// bottom-right, bottom-left of the printed marker.
    pub corners: [Point2<f64>; 4],
    /// Decode score in `[0, 1]`.
    pub confidence: f64,
    /// Quarter turns (clockwise) of the marker as seen in the image.
    pub rotation: u8,
    pub hamming: u8,
}

impl Detection {
    /// Build a detection from corners, deriving the center.
    pub fn from_corners(id: u32, corners: [Point2<f64>; 4], confidence: f64) -> Self {
        let sum = corners.iter().fold(nalgebra::Vector2::zeros(), |acc, c| acc + c.coords);
        Self {
            id,
            center: Point2::from(sum / 4.0),
            corners,
            confidence,
            rotation: 0,
            hamming: 0,
        }
    }

    /// Angle of the top edge (corner 0 to corner 1) in degrees, `(-180, 180]`.
    pub fn orientation_deg(&self) -> f64 {
        let d = self.corners[1] - self.corners[0];
        d.y.atan2(d.x).to_degrees()
    }
}

/// Anything that can turn a frame into id-keyed marker detections.
///
/// Implementations never fail: an unusable frame yields an empty map.
pub trait MarkerSource {
    fn detect(&mut self, frame: &Frame<'_>) -> BTreeMap<u32, Detection>;
}

/// Counters accumulated over the detector's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorStats {
    pub frames_processed: u64,
    pub frames_with_markers: u64,
    pub markers_detected: u64,
}

/// ArUco detector: threshold, blob quads, bit decoding, dictionary lookup.
#[derive(Clone, Debug)]
pub struct MarkerDetector {
    matcher: Matcher,
    params: MarkerDetectorParams,
    stats: DetectorStats,
}

impl MarkerDetector {
    pub fn new(dictionary: Dictionary, params: MarkerDetectorParams) -> Result<Self, ParamsError> {
        params.validate()?;
        let limit = dictionary.max_correction_bits();
        let max_hamming = params.max_hamming.map_or(limit, |h| h.min(limit));
        debug!(
            "marker detector: dictionary {} ({}x{}, {} ids), max_hamming {}",
            dictionary.name(),
            dictionary.marker_size(),
            dictionary.marker_size(),
            dictionary.len(),
            max_hamming
        );
        Ok(Self {
            matcher: Matcher::new(dictionary, max_hamming),
            params,
            stats: DetectorStats::default(),
        })
    }

    #[inline]
    pub fn dictionary(&self) -> &Dictionary {
        self.matcher.dictionary()
    }

    #[inline]
    pub fn params(&self) -> &MarkerDetectorParams {
        &self.params
    }

    #[inline]
    pub fn stats(&self) -> DetectorStats {
        self.stats
    }

    /// Detect markers in a frame, keyed by id.
    ///
    /// Invalid frames are logged and yield an empty map. When an id is seen
    /// more than once, the best-scoring instance wins.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(width = frame.width, height = frame.height))
    )]
    pub fn detect(&mut self, frame: &Frame<'_>) -> BTreeMap<u32, Detection> {
        self.stats.frames_processed += 1;
        let found = match frame.with_gray(|img| self.detect_gray(img)) {
            Ok(found) => found,
            Err(err) => {
                warn!("skipping frame: {err}");
                return BTreeMap::new();
            }
        };
        if !found.is_empty() {
            self.stats.frames_with_markers += 1;
            self.stats.markers_detected += found.len() as u64;
        }
        found.into_iter().map(|d| (d.id, d)).collect()
    }

    /// Detect markers in a grayscale view, one entry per id, sorted by id.
    pub fn detect_gray(&self, img: &GrayImageView<'_>) -> Vec<Detection> {
        let bin = binarize(img, self.params.threshold);
        let limits = QuadLimits {
            min_side_px: self.params.min_side_px,
            max_area_px: self.params.max_area_frac * (img.width * img.height) as f32,
        };
        let quads = find_quads(&bin.dark, img.width, img.height, limits);

        let mut decoder = CellDecoder::new(
            self.dictionary().marker_size(),
            self.params.border_bits,
            self.params.min_border_score,
        );
        let decoded: Vec<Detection> = quads
            .iter()
            .filter_map(|quad| {
                let d = decoder.decode(img, quad, &self.matcher)?;
                let r = d.rotation as usize;
                let corners = std::array::from_fn(|i| {
                    let c = quad[(r + i) % 4];
                    Point2::new(c.x as f64, c.y as f64)
                });
                let mut det = Detection::from_corners(d.id, corners, d.score as f64);
                det.rotation = d.rotation;
                det.hamming = d.hamming;
                Some(det)
            })
            .collect();

        match bin.threshold {
            Some(t) => debug!(
                "threshold {t}: {} candidate quads, {} decoded",
                quads.len(),
                decoded.len()
            ),
            None => debug!(
                "adaptive threshold: {} candidate quads, {} decoded",
                quads.len(),
                decoded.len()
            ),
        }

        let mut out = dedup_by_id_keep_best(decoded, |d| d.id, |d| d.confidence);
        out.sort_by_key(|d| d.id);
        out
    }
}

impl MarkerSource for MarkerDetector {
    fn detect(&mut self, frame: &Frame<'_>) -> BTreeMap<u32, Detection> {
        MarkerDetector::detect(self, frame)
    }
}

/// Syntactic sanity pass over a detection map: keys match ids, every
/// detection has finite, non-negative coordinates and a confidence in
/// `[0, 1]`.
pub fn validate_detections(detections: &BTreeMap<u32, Detection>) -> bool {
    let coord_ok = |p: &Point2<f64>| p.x.is_finite() && p.y.is_finite() && p.x >= 0.0 && p.y >= 0.0;
    detections.iter().all(|(&id, d)| {
        id == d.id
            && coord_ok(&d.center)
            && d.corners.iter().all(coord_ok)
            && (0.0..=1.0).contains(&d.confidence)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn det(id: u32, x: f64, y: f64) -> Detection {
        Detection::from_corners(
            id,
            [
                Point2::new(x - 5.0, y - 5.0),
                Point2::new(x + 5.0, y - 5.0),
                Point2::new(x + 5.0, y + 5.0),
                Point2::new(x - 5.0, y + 5.0),
            ],
            1.0,
        )
    }

    #[test]
    fn center_is_corner_mean_and_orientation_follows_top_edge() {
        let d = det(4, 50.0, 60.0);
        assert_relative_eq!(d.center.x, 50.0);
        assert_relative_eq!(d.center.y, 60.0);
        assert_relative_eq!(d.orientation_deg(), 0.0);

        let mut turned = d.clone();
        turned.corners.rotate_left(1);
        assert_relative_eq!(turned.orientation_deg(), 90.0);
    }

    #[test]
    fn validation_rejects_mismatched_keys_and_bad_coordinates() {
        let mut map = BTreeMap::new();
        map.insert(0, det(0, 50.0, 50.0));
        map.insert(3, det(3, 150.0, 50.0));
        assert!(validate_detections(&map));
        assert!(validate_detections(&BTreeMap::new()));

        let mut wrong_key = map.clone();
        wrong_key.insert(9, det(2, 10.0, 10.0));
        assert!(!validate_detections(&wrong_key));

        let mut negative = map.clone();
        negative.insert(5, det(5, 2.0, 40.0));
        assert!(!validate_detections(&negative));

        let mut nan = map;
        let mut bad = det(6, 80.0, 80.0);
        bad.corners[2].x = f64::NAN;
        nan.insert(6, bad);
        assert!(!validate_detections(&nan));
    }

    #[test]
    fn params_validation() {
        assert!(MarkerDetectorParams::default().validate().is_ok());
        let p = MarkerDetectorParams {
            max_area_frac: 0.0,
            ..Default::default()
        };
        assert_eq!(p.validate(), Err(ParamsError::MaxAreaFrac(0.0)));
        let p = MarkerDetectorParams {
            border_bits: 0,
            ..Default::default()
        };
        assert_eq!(p.validate(), Err(ParamsError::NoBorder));
        let p = MarkerDetectorParams {
            threshold: ThresholdMode::Adaptive {
                tile_size: 1,
                min_range: 24,
            },
            ..Default::default()
        };
        assert_eq!(p.validate(), Err(ParamsError::TileSize(1)));
    }
}
