//! The fixed 3x3 playing grid in board millimeters.

use crate::{BoardTransform, CalibrationError};
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const GRID_SIZE: usize = 3;
pub const CELL_COUNT: usize = GRID_SIZE * GRID_SIZE;

/// One playing position. Positions are row-major: 0 is top-left, 8 is
/// bottom-right.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub position: usize,
    pub center_mm: Point3<f64>,
    pub within_bounds: bool,
    pub confidence: f64,
}

/// Extent of the grid in board millimeters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridBounds {
    pub min_x_mm: f64,
    pub max_x_mm: f64,
    pub min_y_mm: f64,
    pub max_y_mm: f64,
    pub width_mm: f64,
    pub height_mm: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridStats {
    pub total_cells: usize,
    pub cells_within_bounds: usize,
    pub cell_size_mm: f64,
    pub board_size_mm: f64,
    pub confidence: f64,
}

/// Cell centers derived from a board transform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridGenerator {
    transform: BoardTransform,
    cell_size_mm: f64,
    cells: Vec<GridCell>,
}

impl GridGenerator {
    /// Lay out the grid so the reference-marker distance spans three cells.
    pub fn new(transform: BoardTransform) -> Self {
        let size = transform.distance_mm();
        let cell_size_mm = size / GRID_SIZE as f64;
        let in_board = |v: f64| (0.0..=size).contains(&v);
        let cells = (0..CELL_COUNT)
            .map(|position| {
                let (row, col) = (position / GRID_SIZE, position % GRID_SIZE);
                let x = (col as f64 + 0.5) * cell_size_mm;
                let y = (row as f64 + 0.5) * cell_size_mm;
                GridCell {
                    position,
                    center_mm: Point3::new(x, y, 0.0),
                    within_bounds: in_board(x) && in_board(y),
                    confidence: transform.confidence(),
                }
            })
            .collect();
        Self {
            transform,
            cell_size_mm,
            cells,
        }
    }

    #[inline]
    pub fn transform(&self) -> &BoardTransform {
        &self.transform
    }

    #[inline]
    pub fn cell_size_mm(&self) -> f64 {
        self.cell_size_mm
    }

    /// Side of the square board (the reference distance).
    #[inline]
    pub fn board_size_mm(&self) -> f64 {
        self.transform.distance_mm()
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn cell(&self, position: usize) -> Option<&GridCell> {
        self.cells.get(position)
    }

    /// Center of `position` in board millimeters, unless it is out of range
    /// or flagged out of bounds.
    pub fn cell_position(&self, position: usize) -> Option<Point3<f64>> {
        self.cell(position)
            .filter(|c| c.within_bounds)
            .map(|c| c.center_mm)
    }

    /// Cell center of `position` in image pixels.
    pub fn position_to_pixel(&self, position: usize) -> Option<Point2<f64>> {
        self.cell_position(position)
            .map(|mm| self.transform.board_to_pixel(mm))
    }

    /// Grid position containing an image point, `None` off the board.
    pub fn pixel_to_position(&self, px: Point2<f64>) -> Option<usize> {
        let mm = self.transform.pixel_to_board(px);
        self.board_to_position(mm.x, mm.y)
    }

    /// Grid position containing a board point, `None` off the board.
    pub fn board_to_position(&self, x_mm: f64, y_mm: f64) -> Option<usize> {
        let size = self.board_size_mm();
        if !(0.0..=size).contains(&x_mm) || !(0.0..=size).contains(&y_mm) {
            return None;
        }
        let index = |v: f64| ((v / self.cell_size_mm).floor() as usize).min(GRID_SIZE - 1);
        Some(index(y_mm) * GRID_SIZE + index(x_mm))
    }

    pub fn validate_grid(&self) -> Result<(), CalibrationError> {
        let cells: Vec<usize> = self
            .cells
            .iter()
            .filter(|c| !c.within_bounds)
            .map(|c| c.position)
            .collect();
        if self.cells.len() == CELL_COUNT && cells.is_empty() {
            Ok(())
        } else {
            Err(CalibrationError::GridOutOfBounds { cells })
        }
    }

    /// In-bounds cell centers keyed by position.
    pub fn grid_positions(&self) -> BTreeMap<usize, Point3<f64>> {
        self.cells
            .iter()
            .filter(|c| c.within_bounds)
            .map(|c| (c.position, c.center_mm))
            .collect()
    }

    pub fn bounds(&self) -> GridBounds {
        let size = self.board_size_mm();
        GridBounds {
            min_x_mm: 0.0,
            max_x_mm: size,
            min_y_mm: 0.0,
            max_y_mm: size,
            width_mm: size,
            height_mm: size,
        }
    }

    pub fn stats(&self) -> GridStats {
        GridStats {
            total_cells: self.cells.len(),
            cells_within_bounds: self.cells.iter().filter(|c| c.within_bounds).count(),
            cell_size_mm: self.cell_size_mm,
            board_size_mm: self.board_size_mm(),
            confidence: self.transform.confidence(),
        }
    }
}
