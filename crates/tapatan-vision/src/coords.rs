//! Millimeter board coordinates and move checks for the game and robot layers.

use crate::calib::{
    CalibrationConfig, CalibrationInfo, CalibrationOrchestrator, CalibrationResult,
    CalibrationSetup, ConfigError, IoError, CELL_COUNT,
};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tapatan_vision_aruco::{Dictionary, MarkerDetector, MarkerSource};
use tapatan_vision_core::Frame;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// One playing position in every coordinate system at once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardPosition {
    pub grid_position: usize,
    pub pixel: Point2<f64>,
    pub board_mm: Point3<f64>,
}

/// Calibrated board as seen by the game and the robot.
///
/// Holds no geometry of its own: every query is answered from the
/// calibration currently served by the wrapped [`CalibrationOrchestrator`],
/// and returns `None`/`false`/empty while nothing has been calibrated.
#[derive(Debug)]
pub struct BoardCoordinateSystem<S = MarkerDetector> {
    orchestrator: CalibrationOrchestrator<S>,
}

impl BoardCoordinateSystem<MarkerDetector> {
    pub fn new(config: CalibrationConfig, dictionary: Dictionary) -> Result<Self, ConfigError> {
        Ok(Self::from_orchestrator(CalibrationOrchestrator::new(
            config, dictionary,
        )?))
    }

    /// Build from a JSON setup (dictionary path plus configuration).
    pub fn from_setup(setup: &CalibrationSetup) -> Result<Self, IoError> {
        Ok(Self::from_orchestrator(setup.build_orchestrator()?))
    }
}

impl<S: MarkerSource> BoardCoordinateSystem<S> {
    pub fn with_source(config: CalibrationConfig, source: S) -> Result<Self, ConfigError> {
        Ok(Self::from_orchestrator(CalibrationOrchestrator::with_source(
            config, source,
        )?))
    }

    pub fn from_orchestrator(orchestrator: CalibrationOrchestrator<S>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &CalibrationOrchestrator<S> {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut CalibrationOrchestrator<S> {
        &mut self.orchestrator
    }

    /// Feed one camera frame; see [`CalibrationOrchestrator::calibrate`].
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn calibrate(&mut self, frame: &Frame<'_>) -> CalibrationResult {
        self.orchestrator.calibrate(frame)
    }

    pub fn is_calibrated(&self) -> bool {
        self.orchestrator.is_calibrated()
    }

    /// The newest frame failed and an older calibration is in use.
    pub fn is_stale(&self) -> bool {
        self.orchestrator.is_stale()
    }

    /// `(x, y)` of a cell center in board millimeters.
    pub fn get_board_position_mm(&self, position: usize) -> Option<(f64, f64)> {
        self.orchestrator
            .grid_position(position)
            .map(|p| (p.x, p.y))
    }

    pub fn get_all_board_positions_mm(&self) -> BTreeMap<usize, (f64, f64)> {
        (0..CELL_COUNT)
            .filter_map(|pos| Some((pos, self.get_board_position_mm(pos)?)))
            .collect()
    }

    pub fn validate_move(&self, from: usize, to: usize, occupied: &BTreeSet<usize>) -> bool {
        self.orchestrator.is_move_valid(from, to, occupied)
    }

    pub fn get_valid_moves(&self, from: usize, occupied: &BTreeSet<usize>) -> BTreeSet<usize> {
        self.orchestrator.valid_moves(from, occupied)
    }

    /// Grid position under pixel `(px, py)`, `None` off the board.
    pub fn get_grid_position_from_pixel(&self, px: f64, py: f64) -> Option<usize> {
        self.orchestrator.pixel_to_position(Point2::new(px, py))
    }

    /// Same as [`get_grid_position_from_pixel`](Self::get_grid_position_from_pixel).
    pub fn pixel_to_grid_position(&self, px: f64, py: f64) -> Option<usize> {
        self.get_grid_position_from_pixel(px, py)
    }

    pub fn board_position(&self, position: usize) -> Option<BoardPosition> {
        Some(BoardPosition {
            grid_position: position,
            pixel: self.orchestrator.position_to_pixel(position)?,
            board_mm: self.orchestrator.grid_position(position)?,
        })
    }

    pub fn get_calibration_info(&self) -> CalibrationInfo {
        self.orchestrator.detailed_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::VecDeque;
    use tapatan_vision_aruco::Detection;

    struct Script(VecDeque<BTreeMap<u32, Detection>>);

    impl MarkerSource for Script {
        fn detect(&mut self, _frame: &Frame<'_>) -> BTreeMap<u32, Detection> {
            self.0.pop_front().unwrap_or_default()
        }
    }

    fn at(id: u32, x: f64, y: f64) -> Detection {
        Detection::from_corners(
            id,
            [
                Point2::new(x - 15.0, y - 15.0),
                Point2::new(x + 15.0, y - 15.0),
                Point2::new(x + 15.0, y + 15.0),
                Point2::new(x - 15.0, y + 15.0),
            ],
            1.0,
        )
    }

    /// One good frame with the standard 270 mm rig at 1 px/mm, then misses.
    fn calibrated() -> BoardCoordinateSystem<Script> {
        let frames = VecDeque::from([[at(1, 370.0, 100.0), at(0, 100.0, 100.0)]
            .into_iter()
            .map(|d| (d.id, d))
            .collect()]);
        let mut board =
            BoardCoordinateSystem::with_source(CalibrationConfig::default(), Script(frames))
                .expect("board");
        assert!(board.calibrate(&frame()).is_calibrated);
        board
    }

    const PIXELS: [u8; 4] = [0; 4];

    fn frame() -> Frame<'static> {
        Frame::gray(2, 2, &PIXELS)
    }

    fn set(items: &[usize]) -> BTreeSet<usize> {
        items.iter().copied().collect()
    }

    #[test]
    fn reports_cell_centers_in_millimeters() {
        let board = calibrated();
        assert_eq!(board.get_board_position_mm(0), Some((45.0, 45.0)));
        assert_eq!(board.get_board_position_mm(4), Some((135.0, 135.0)));
        assert_eq!(board.get_board_position_mm(8), Some((225.0, 225.0)));
        assert_eq!(board.get_board_position_mm(9), None);
        assert_eq!(board.get_all_board_positions_mm().len(), 9);
    }

    #[test]
    fn validates_moves() {
        let board = calibrated();
        assert!(board.validate_move(0, 4, &set(&[])));
        assert!(!board.validate_move(4, 4, &set(&[])));
        assert!(!board.validate_move(0, 4, &set(&[4])));
        assert!(!board.validate_move(0, 10, &set(&[])));

        let moves = board.get_valid_moves(4, &set(&[0, 8]));
        assert_eq!(moves, set(&[1, 2, 3, 5, 6, 7]));
    }

    #[test]
    fn pixel_lookup_and_board_positions_agree() {
        let board = calibrated();
        assert_eq!(board.pixel_to_grid_position(235.0, 235.0), Some(4));
        assert_eq!(board.get_grid_position_from_pixel(101.0, 369.0), Some(6));
        assert_eq!(board.pixel_to_grid_position(20.0, 20.0), None);

        let p = board.board_position(2).expect("position 2");
        assert_relative_eq!(p.pixel, Point2::new(325.0, 145.0), epsilon = 1e-9);
        assert_relative_eq!(p.board_mm, Point3::new(225.0, 45.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn fallback_keeps_positions_after_a_failed_frame() {
        let mut board = calibrated();
        let before = board.get_all_board_positions_mm();
        let result = board.calibrate(&frame());
        assert!(result.is_calibrated);
        assert!(board.is_calibrated());
        assert!(board.is_stale());
        assert_eq!(board.get_all_board_positions_mm(), before);
        assert!(board.get_calibration_info().status.is_stale);
    }

    #[test]
    fn uncalibrated_board_answers_nothing() {
        let board = BoardCoordinateSystem::with_source(
            CalibrationConfig::default(),
            Script(VecDeque::new()),
        )
        .expect("board");
        assert!(!board.is_calibrated());
        assert_eq!(board.get_board_position_mm(4), None);
        assert!(!board.validate_move(0, 4, &set(&[])));
        assert!(board.get_valid_moves(0, &set(&[])).is_empty());
        assert!(board.board_position(0).is_none());
    }

    #[test]
    fn invalid_config_fails_construction() {
        let cfg = CalibrationConfig {
            distance_mm: -1.0,
            ..Default::default()
        };
        assert_eq!(
            BoardCoordinateSystem::with_source(cfg, Script(VecDeque::new())).err(),
            Some(ConfigError::DistanceMm(-1.0))
        );
    }
}
