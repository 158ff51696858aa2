//! Per-frame calibration pipeline, state machine and fallback.

use crate::grid::CELL_COUNT;
use crate::{
    BoardTransform, CalibrationConfig, CalibrationData, CalibrationError,
    CalibrationMarkerDetector, ConfigError, GridGenerator, GridStats, SafetyMargins,
    TransformInfo, WorkspaceStats, WorkspaceValidator,
};
use log::{debug, info, warn};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tapatan_vision_aruco::{Dictionary, MarkerDetector, MarkerSource};
use tapatan_vision_core::Frame;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationState {
    #[default]
    NotCalibrated,
    Calibrating,
    Calibrated,
    Failed,
}

/// Everything one successful pipeline run produced.
///
/// This is the unit of fallback: the orchestrator keeps the newest
/// successful result and hands it back unchanged while later frames fail.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub is_calibrated: bool,
    pub state: CalibrationState,
    pub confidence: f64,
    pub grid_positions: BTreeMap<usize, Point3<f64>>,
    pub calibration: Option<CalibrationData>,
    pub validator: Option<WorkspaceValidator>,
    pub error_message: Option<String>,
}

impl CalibrationResult {
    fn calibrated(data: CalibrationData, validator: WorkspaceValidator) -> Self {
        Self {
            is_calibrated: true,
            state: CalibrationState::Calibrated,
            confidence: data.confidence,
            grid_positions: validator.grid().grid_positions(),
            calibration: Some(data),
            validator: Some(validator),
            error_message: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            is_calibrated: false,
            state: CalibrationState::Failed,
            confidence: 0.0,
            grid_positions: BTreeMap::new(),
            calibration: None,
            validator: None,
            error_message: Some(message),
        }
    }

    pub fn validator(&self) -> Option<&WorkspaceValidator> {
        self.validator.as_ref()
    }

    pub fn grid(&self) -> Option<&GridGenerator> {
        self.validator().map(WorkspaceValidator::grid)
    }

    pub fn transform(&self) -> Option<&BoardTransform> {
        self.grid().map(GridGenerator::transform)
    }
}

/// Counters and flags for the calibration as a whole.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationStatus {
    /// Outcome of the latest attempt.
    pub state: CalibrationState,
    /// A successful calibration is available (possibly from an older frame).
    pub is_calibrated: bool,
    /// The latest attempt failed and an older calibration is being served.
    pub is_stale: bool,
    pub has_last_valid: bool,
    pub attempts: u64,
    pub successes: u64,
    pub success_rate: f64,
    pub last_confidence: f64,
    pub last_error: Option<String>,
}

/// Status plus the geometry of the served calibration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationInfo {
    pub status: CalibrationStatus,
    pub config: CalibrationConfig,
    pub transform: Option<TransformInfo>,
    pub grid: Option<GridStats>,
    pub workspace: Option<WorkspaceStats>,
    pub safety_margins: Option<SafetyMargins>,
    pub grid_positions: BTreeMap<usize, Point3<f64>>,
    pub pixel_positions: BTreeMap<usize, Point2<f64>>,
    pub occupied_positions: BTreeSet<usize>,
}

/// Runs detection, transform, grid and workspace checks per frame and owns
/// the calibration state.
///
/// `calibrate` never fails: a frame whose pipeline run fails leaves the
/// previous calibration in place. Calls must be serialized by the caller.
#[derive(Debug)]
pub struct CalibrationOrchestrator<S = MarkerDetector> {
    config: CalibrationConfig,
    detector: CalibrationMarkerDetector<S>,
    state: CalibrationState,
    attempts: u64,
    successes: u64,
    last_valid: Option<CalibrationResult>,
    last_error: Option<CalibrationError>,
    occupied: BTreeSet<usize>,
}

impl CalibrationOrchestrator<MarkerDetector> {
    pub fn new(config: CalibrationConfig, dictionary: Dictionary) -> Result<Self, ConfigError> {
        let detector = CalibrationMarkerDetector::new(&config, dictionary)?;
        Ok(Self::from_detector(config, detector))
    }
}

impl<S: MarkerSource> CalibrationOrchestrator<S> {
    /// Orchestrator fed by an arbitrary marker source.
    pub fn with_source(config: CalibrationConfig, source: S) -> Result<Self, ConfigError> {
        let detector = CalibrationMarkerDetector::with_source(&config, source)?;
        Ok(Self::from_detector(config, detector))
    }

    fn from_detector(config: CalibrationConfig, detector: CalibrationMarkerDetector<S>) -> Self {
        info!(
            "calibration ready: {} mm between markers {:?}, smoothing {} frames, margin {} mm",
            config.distance_mm,
            config.ordered_reference_ids(),
            config.smoothing_frames,
            config.safety_margin_mm
        );
        Self {
            config,
            detector,
            state: CalibrationState::NotCalibrated,
            attempts: 0,
            successes: 0,
            last_valid: None,
            last_error: None,
            occupied: BTreeSet::new(),
        }
    }

    /// Run the pipeline on `frame`, falling back on failure.
    ///
    /// Returns the new result on success. On failure returns the last
    /// successful result unchanged, or an uncalibrated result carrying the
    /// failure reason when there is none.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self, frame), fields(attempt = self.attempts + 1)))]
    pub fn calibrate(&mut self, frame: &Frame<'_>) -> CalibrationResult {
        match self.try_calibrate(frame) {
            Ok(result) => result,
            Err(err) => match &self.last_valid {
                Some(previous) => {
                    debug!("calibration failed ({err}), serving previous calibration");
                    previous.clone()
                }
                None => {
                    warn!("calibration failed: {err}");
                    CalibrationResult::failed(err.to_string())
                }
            },
        }
    }

    /// Run the pipeline on `frame` and report this frame's outcome.
    ///
    /// State and counters are updated exactly as by [`calibrate`](Self::calibrate).
    pub fn try_calibrate(&mut self, frame: &Frame<'_>) -> Result<CalibrationResult, CalibrationError> {
        self.state = CalibrationState::Calibrating;
        self.attempts += 1;
        match self.run_pipeline(frame) {
            Ok(result) => {
                self.state = CalibrationState::Calibrated;
                self.successes += 1;
                self.last_error = None;
                info!(
                    "calibrated: {:.4} mm/px, confidence {:.2} ({}/{} attempts)",
                    result.calibration.as_ref().map_or(0.0, |d| d.scale),
                    result.confidence,
                    self.successes,
                    self.attempts
                );
                self.last_valid = Some(result.clone());
                Ok(result)
            }
            Err(err) => {
                self.state = CalibrationState::Failed;
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    fn run_pipeline(&mut self, frame: &Frame<'_>) -> Result<CalibrationResult, CalibrationError> {
        let data = self.detector.observe(frame)?;
        let transform = BoardTransform::from_calibration(
            &data,
            self.config.min_distance_px,
            self.config.max_distance_px,
        )?;
        transform.validate_transform(self.config.round_trip_tolerance_px)?;

        let grid = GridGenerator::new(transform);
        grid.validate_grid()?;

        let mut validator = WorkspaceValidator::new(grid, self.config.safety_margin_mm);
        validator.validate_all_positions()?;
        validator.update_piece_positions(self.occupied.iter().copied());

        Ok(CalibrationResult::calibrated(data, validator))
    }

    #[inline]
    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    #[inline]
    pub fn detector(&self) -> &CalibrationMarkerDetector<S> {
        &self.detector
    }

    #[inline]
    pub fn state(&self) -> CalibrationState {
        self.state
    }

    #[inline]
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    #[inline]
    pub fn successes(&self) -> u64 {
        self.successes
    }

    /// The calibration currently served, if any.
    pub fn last_result(&self) -> Option<&CalibrationResult> {
        self.last_valid.as_ref()
    }

    /// Why the latest attempt failed; cleared by the next success.
    pub fn last_error(&self) -> Option<&CalibrationError> {
        self.last_error.as_ref()
    }

    /// A successful calibration is available, even if later frames failed.
    pub fn is_calibrated(&self) -> bool {
        self.last_valid.is_some()
    }

    /// The latest frame failed and an older calibration is being served.
    pub fn is_stale(&self) -> bool {
        self.last_valid.is_some() && self.state == CalibrationState::Failed
    }

    fn validator(&self) -> Option<&WorkspaceValidator> {
        self.last_valid.as_ref().and_then(CalibrationResult::validator)
    }

    /// Cell center of `position` in board millimeters.
    pub fn grid_position(&self, position: usize) -> Option<Point3<f64>> {
        self.validator()?.grid().cell_position(position)
    }

    /// Cell center of `position` in image pixels.
    pub fn position_to_pixel(&self, position: usize) -> Option<Point2<f64>> {
        self.validator()?.grid().position_to_pixel(position)
    }

    /// Grid position under an image point.
    pub fn pixel_to_position(&self, px: Point2<f64>) -> Option<usize> {
        self.validator()?.grid().pixel_to_position(px)
    }

    pub fn is_move_valid(&self, from: usize, to: usize, occupied: &BTreeSet<usize>) -> bool {
        self.validator()
            .is_some_and(|v| v.can_move(from, to, occupied))
    }

    /// Legal destinations from `from`; empty while uncalibrated.
    pub fn valid_moves(&self, from: usize, occupied: &BTreeSet<usize>) -> BTreeSet<usize> {
        self.validator()
            .map(|v| v.valid_moves_from(from, occupied))
            .unwrap_or_default()
    }

    /// Legal destinations from `from` given the tracked pieces.
    pub fn tracked_valid_moves(&self, from: usize) -> BTreeSet<usize> {
        self.validator()
            .map(|v| v.valid_moves(from))
            .unwrap_or_default()
    }

    /// Replace the tracked piece set; returns the rejected positions.
    ///
    /// The set is carried into every later calibration.
    pub fn update_piece_positions(
        &mut self,
        positions: impl IntoIterator<Item = usize>,
    ) -> Vec<usize> {
        let positions: Vec<usize> = positions.into_iter().collect();
        let rejected = match self.last_valid.as_mut().and_then(|r| r.validator.as_mut()) {
            Some(v) => v.update_piece_positions(positions.iter().copied()),
            None => positions.iter().copied().filter(|&p| p >= CELL_COUNT).collect(),
        };
        self.occupied = positions
            .into_iter()
            .filter(|p| !rejected.contains(p))
            .collect();
        rejected
    }

    pub fn occupied_positions(&self) -> &BTreeSet<usize> {
        &self.occupied
    }

    pub fn status(&self) -> CalibrationStatus {
        CalibrationStatus {
            state: self.state,
            is_calibrated: self.is_calibrated(),
            is_stale: self.is_stale(),
            has_last_valid: self.last_valid.is_some(),
            attempts: self.attempts,
            successes: self.successes,
            success_rate: if self.attempts == 0 {
                0.0
            } else {
                self.successes as f64 / self.attempts as f64
            },
            last_confidence: self.last_valid.as_ref().map_or(0.0, |r| r.confidence),
            last_error: self.last_error.as_ref().map(ToString::to_string),
        }
    }

    pub fn detailed_info(&self) -> CalibrationInfo {
        let validator = self.validator();
        let grid = validator.map(WorkspaceValidator::grid);
        CalibrationInfo {
            status: self.status(),
            config: self.config.clone(),
            transform: grid.map(|g| g.transform().info()),
            grid: grid.map(GridGenerator::stats),
            workspace: validator.map(WorkspaceValidator::stats),
            safety_margins: validator.map(WorkspaceValidator::safety_margins),
            grid_positions: grid.map(GridGenerator::grid_positions).unwrap_or_default(),
            pixel_positions: grid
                .map(|g| {
                    (0..CELL_COUNT)
                        .filter_map(|p| Some((p, g.position_to_pixel(p)?)))
                        .collect()
                })
                .unwrap_or_default(),
            occupied_positions: self.occupied.clone(),
        }
    }

    /// Return to the freshly constructed state: calibration, counters,
    /// smoothing history and tracked pieces are all dropped.
    pub fn reset(&mut self) {
        self.detector.reset();
        self.occupied.clear();
        self.state = CalibrationState::NotCalibrated;
        self.attempts = 0;
        self.successes = 0;
        self.last_valid = None;
        self.last_error = None;
        info!("calibration reset");
    }
}
