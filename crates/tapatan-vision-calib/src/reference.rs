//! Reference-marker stage: two markers in, smoothed metric scale out.

use crate::config::MAX_SMOOTHING_FRAMES;
use crate::{CalibrationConfig, CalibrationError, ConfigError};
use log::{debug, warn};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use tapatan_vision_aruco::{Detection, Dictionary, MarkerDetector, MarkerSource};
use tapatan_vision_core::Frame;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// One reference marker as observed in a frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerPose {
    pub id: u32,
    pub center_px: Point2<f64>,
    pub corners_px: [Point2<f64>; 4],
    pub orientation_deg: f64,
}

impl MarkerPose {
    pub fn from_detection(det: &Detection) -> Self {
        Self {
            id: det.id,
            center_px: det.center,
            corners_px: det.corners,
            orientation_deg: det.orientation_deg(),
        }
    }
}

/// Smoothed measurement of the two reference markers.
///
/// `marker0` always carries the lower id and anchors the board origin;
/// `marker1` defines the +X direction. Pose centers are the window averages,
/// corners are from the latest frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    pub marker0: MarkerPose,
    pub marker1: MarkerPose,
    pub distance_mm: f64,
    pub distance_px: f64,
    /// Millimeters per pixel.
    pub scale: f64,
    pub confidence: f64,
    pub is_valid: bool,
}

/// Fixed-capacity ring buffer of marker-center pairs.
#[derive(Clone, Debug)]
pub struct SmoothingWindow {
    slots: [[Point2<f64>; 2]; MAX_SMOOTHING_FRAMES],
    capacity: usize,
    len: usize,
    next: usize,
}

impl SmoothingWindow {
    /// Window holding the last `capacity` pairs, clamped to `1..=5`.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: [[Point2::origin(); 2]; MAX_SMOOTHING_FRAMES],
            capacity: capacity.clamp(1, MAX_SMOOTHING_FRAMES),
            len: 0,
            next: 0,
        }
    }

    pub fn push(&mut self, c0: Point2<f64>, c1: Point2<f64>) {
        self.slots[self.next] = [c0, c1];
        self.next = (self.next + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
    }

    /// Per-marker mean of the stored centers.
    pub fn mean(&self) -> Option<[Point2<f64>; 2]> {
        if self.len == 0 {
            return None;
        }
        let n = self.len as f64;
        let mut sum = [nalgebra::Vector2::zeros(); 2];
        for pair in &self.slots[..self.len] {
            sum[0] += pair[0].coords;
            sum[1] += pair[1].coords;
        }
        Some(sum.map(|s| Point2::from(s / n)))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fraction of the window filled, in `(0, 1]` once anything was pushed.
    pub fn fill_ratio(&self) -> f64 {
        (self.len as f64 / self.capacity as f64).min(1.0)
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.next = 0;
    }
}

/// Outcome of looking for the reference pair in one frame.
enum Measurement {
    Missing { found: usize },
    Measured(CalibrationData),
}

/// Finds the two reference markers and turns them into a smoothed scale.
///
/// Generic over the [`MarkerSource`] so recorded or simulated detections can
/// drive the pipeline; the default is the ArUco [`MarkerDetector`].
#[derive(Debug)]
pub struct CalibrationMarkerDetector<S = MarkerDetector> {
    source: S,
    reference_ids: [u32; 2],
    distance_mm: f64,
    min_distance_px: f64,
    max_distance_px: f64,
    window: SmoothingWindow,
    last_valid: Option<CalibrationData>,
}

impl CalibrationMarkerDetector<MarkerDetector> {
    /// ArUco-backed detector for `dictionary`.
    pub fn new(config: &CalibrationConfig, dictionary: Dictionary) -> Result<Self, ConfigError> {
        config.validate_for(&dictionary)?;
        let source = MarkerDetector::new(dictionary, config.marker.clone())?;
        Self::with_source(config, source)
    }
}

impl<S: MarkerSource> CalibrationMarkerDetector<S> {
    pub fn with_source(config: &CalibrationConfig, source: S) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            source,
            reference_ids: config.ordered_reference_ids(),
            distance_mm: config.distance_mm,
            min_distance_px: config.min_distance_px,
            max_distance_px: config.max_distance_px,
            window: SmoothingWindow::new(config.smoothing_frames),
            last_valid: None,
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn window(&self) -> &SmoothingWindow {
        &self.window
    }

    pub fn last_valid(&self) -> Option<&CalibrationData> {
        self.last_valid.as_ref()
    }

    /// Reference pair for this frame.
    ///
    /// When the pair is not fully visible this returns the last valid
    /// measurement (or `None` before the first one) instead of failing. A
    /// visible but implausible pair is returned with `is_valid == false`.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, frame)))]
    pub fn detect(&mut self, frame: &Frame<'_>) -> Option<CalibrationData> {
        match self.measure(frame) {
            Measurement::Missing { found } => {
                debug!(
                    "{found} of 2 reference markers visible, serving cached measurement: {}",
                    self.last_valid.is_some()
                );
                self.last_valid.clone()
            }
            Measurement::Measured(data) => Some(data),
        }
    }

    /// Tagged per-frame outcome without the cached fallback.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, frame)))]
    pub fn observe(&mut self, frame: &Frame<'_>) -> Result<CalibrationData, CalibrationError> {
        match self.measure(frame) {
            Measurement::Missing { found } => Err(CalibrationError::MarkersNotDetected { found }),
            Measurement::Measured(data) if data.is_valid => Ok(data),
            Measurement::Measured(data) => Err(CalibrationError::ImplausibleDistance {
                distance_px: data.distance_px,
                min_px: self.min_distance_px,
                max_px: self.max_distance_px,
            }),
        }
    }

    /// Drop the smoothing history and the cached measurement.
    pub fn reset(&mut self) {
        self.window.clear();
        self.last_valid = None;
    }

    fn measure(&mut self, frame: &Frame<'_>) -> Measurement {
        let detections = self.source.detect(frame);
        let [id0, id1] = self.reference_ids;
        let (Some(d0), Some(d1)) = (detections.get(&id0), detections.get(&id1)) else {
            let found = self
                .reference_ids
                .iter()
                .filter(|id| detections.contains_key(*id))
                .count();
            return Measurement::Missing { found };
        };

        let mut marker0 = MarkerPose::from_detection(d0);
        let mut marker1 = MarkerPose::from_detection(d1);
        self.window.push(marker0.center_px, marker1.center_px);
        if let Some([c0, c1]) = self.window.mean() {
            marker0.center_px = c0;
            marker1.center_px = c1;
        }

        let distance_px = (marker1.center_px - marker0.center_px).norm();
        let scale = self.distance_mm / distance_px;
        let is_valid = distance_px >= self.min_distance_px
            && distance_px <= self.max_distance_px
            && scale.is_finite()
            && scale > 0.0;
        let data = CalibrationData {
            marker0,
            marker1,
            distance_mm: self.distance_mm,
            distance_px,
            scale,
            confidence: self.window.fill_ratio(),
            is_valid,
        };

        if is_valid {
            debug!(
                "reference markers {id0}/{id1}: {distance_px:.2} px, {scale:.4} mm/px, confidence {:.2}",
                data.confidence
            );
            self.last_valid = Some(data.clone());
        } else {
            warn!(
                "reference marker distance {distance_px:.2} px outside [{}, {}]",
                self.min_distance_px, self.max_distance_px
            );
        }
        Measurement::Measured(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::{BTreeMap, VecDeque};

    /// Replays one detection map per call.
    struct Replay(VecDeque<BTreeMap<u32, Detection>>);

    impl MarkerSource for Replay {
        fn detect(&mut self, _frame: &Frame<'_>) -> BTreeMap<u32, Detection> {
            self.0.pop_front().unwrap_or_default()
        }
    }

    fn square(id: u32, x: f64, y: f64) -> Detection {
        Detection::from_corners(
            id,
            [
                Point2::new(x - 10.0, y - 10.0),
                Point2::new(x + 10.0, y - 10.0),
                Point2::new(x + 10.0, y + 10.0),
                Point2::new(x - 10.0, y + 10.0),
            ],
            1.0,
        )
    }

    fn frames(list: Vec<Vec<Detection>>) -> Replay {
        Replay(
            list.into_iter()
                .map(|dets| dets.into_iter().map(|d| (d.id, d)).collect())
                .collect(),
        )
    }

    const BLANK: [u8; 4] = [255; 4];

    fn frame() -> Frame<'static> {
        Frame::gray(2, 2, &BLANK)
    }

    #[test]
    fn ring_buffer_keeps_only_the_newest_pairs() {
        let mut w = SmoothingWindow::new(3);
        for x in [0.0, 10.0, 20.0, 30.0] {
            w.push(Point2::new(x, 0.0), Point2::new(x + 100.0, 0.0));
        }
        assert_eq!(w.len(), 3);
        let [c0, c1] = w.mean().expect("mean");
        assert_relative_eq!(c0.x, 20.0);
        assert_relative_eq!(c1.x, 120.0);
        w.clear();
        assert!(w.mean().is_none());
    }

    #[test]
    fn scale_and_confidence_grow_with_the_window() {
        let src = frames(vec![
            vec![square(0, 100.0, 100.0), square(1, 370.0, 100.0)],
            vec![square(0, 100.0, 100.0), square(1, 370.0, 100.0)],
            vec![square(0, 100.0, 100.0), square(1, 370.0, 100.0)],
        ]);
        let mut det = CalibrationMarkerDetector::with_source(&CalibrationConfig::default(), src)
            .expect("detector");

        let first = det.detect(&frame()).expect("data");
        assert!(first.is_valid);
        assert_relative_eq!(first.distance_px, 270.0);
        assert_relative_eq!(first.scale, 1.0);
        assert_relative_eq!(first.confidence, 1.0 / 3.0);

        det.detect(&frame());
        let third = det.detect(&frame()).expect("data");
        assert_relative_eq!(third.confidence, 1.0);
    }

    #[test]
    fn averages_jittering_centers() {
        let src = frames(vec![
            vec![square(0, 98.0, 100.0), square(1, 370.0, 100.0)],
            vec![square(0, 102.0, 100.0), square(1, 370.0, 100.0)],
        ]);
        let mut det = CalibrationMarkerDetector::with_source(&CalibrationConfig::default(), src)
            .expect("detector");
        det.detect(&frame());
        let data = det.detect(&frame()).expect("data");
        assert_relative_eq!(data.marker0.center_px.x, 100.0);
        assert_relative_eq!(data.distance_px, 270.0);
    }

    #[test]
    fn missing_marker_serves_cached_measurement() {
        let src = frames(vec![
            vec![square(0, 100.0, 100.0), square(1, 370.0, 100.0)],
            vec![square(0, 100.0, 100.0)],
        ]);
        let mut det = CalibrationMarkerDetector::with_source(&CalibrationConfig::default(), src)
            .expect("detector");
        let good = det.detect(&frame()).expect("data");
        let cached = det.detect(&frame()).expect("cached");
        assert_eq!(good, cached);
        assert_eq!(det.window().len(), 1);
    }

    #[test]
    fn observe_tags_missing_and_implausible_pairs() {
        let src = frames(vec![
            vec![square(1, 100.0, 100.0), square(5, 200.0, 100.0)],
            vec![square(0, 100.0, 100.0), square(1, 130.0, 100.0)],
        ]);
        let mut det = CalibrationMarkerDetector::with_source(&CalibrationConfig::default(), src)
            .expect("detector");

        assert_eq!(
            det.observe(&frame()),
            Err(CalibrationError::MarkersNotDetected { found: 1 })
        );
        match det.observe(&frame()) {
            Err(CalibrationError::ImplausibleDistance { distance_px, .. }) => {
                assert_relative_eq!(distance_px, 30.0)
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(det.last_valid().is_none());
    }

    #[test]
    fn extra_markers_and_id_order_do_not_matter() {
        let src = frames(vec![vec![
            square(9, 10.0, 10.0),
            square(3, 370.0, 100.0),
            square(2, 100.0, 100.0),
        ]]);
        let cfg = CalibrationConfig {
            reference_ids: [3, 2],
            ..Default::default()
        };
        let mut det = CalibrationMarkerDetector::with_source(&cfg, src).expect("detector");
        let data = det.detect(&frame()).expect("data");
        assert_eq!(data.marker0.id, 2);
        assert_eq!(data.marker1.id, 3);
        assert_relative_eq!(data.marker0.center_px.x, 100.0);
    }
}
