//! Reachable workspace and move legality.

use crate::grid::{GridBounds, CELL_COUNT};
use crate::{CalibrationError, GridGenerator};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Usable board region: the grid bounds grown by the safety margin on every
/// side.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConstraints {
    pub min_x_mm: f64,
    pub max_x_mm: f64,
    pub min_y_mm: f64,
    pub max_y_mm: f64,
    pub safety_margin_mm: f64,
}

impl WorkspaceConstraints {
    pub fn around(bounds: &GridBounds, safety_margin_mm: f64) -> Self {
        Self {
            min_x_mm: bounds.min_x_mm - safety_margin_mm,
            max_x_mm: bounds.max_x_mm + safety_margin_mm,
            min_y_mm: bounds.min_y_mm - safety_margin_mm,
            max_y_mm: bounds.max_y_mm + safety_margin_mm,
            safety_margin_mm,
        }
    }

    pub fn contains(&self, x_mm: f64, y_mm: f64) -> bool {
        (self.min_x_mm..=self.max_x_mm).contains(&x_mm)
            && (self.min_y_mm..=self.max_y_mm).contains(&y_mm)
    }

    pub fn width_mm(&self) -> f64 {
        self.max_x_mm - self.min_x_mm
    }

    pub fn height_mm(&self) -> f64 {
        self.max_y_mm - self.min_y_mm
    }
}

/// Grid extent next to the expanded workspace.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SafetyMargins {
    pub safety_margin_mm: f64,
    pub board: GridBounds,
    pub workspace: WorkspaceConstraints,
    pub workspace_width_mm: f64,
    pub workspace_height_mm: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceStats {
    pub total_positions: usize,
    pub valid_positions: usize,
    pub occupied_positions: usize,
    pub free_positions: usize,
    pub safety_margin_mm: f64,
}

/// Answers "is this cell usable" and "is this move legal".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceValidator {
    grid: GridGenerator,
    constraints: WorkspaceConstraints,
    occupied: BTreeSet<usize>,
}

impl WorkspaceValidator {
    pub fn new(grid: GridGenerator, safety_margin_mm: f64) -> Self {
        let constraints = WorkspaceConstraints::around(&grid.bounds(), safety_margin_mm);
        Self {
            grid,
            constraints,
            occupied: BTreeSet::new(),
        }
    }

    #[inline]
    pub fn grid(&self) -> &GridGenerator {
        &self.grid
    }

    #[inline]
    pub fn constraints(&self) -> &WorkspaceConstraints {
        &self.constraints
    }

    pub fn is_position_valid(&self, position: usize) -> bool {
        position < CELL_COUNT
            && self
                .grid
                .cell_position(position)
                .is_some_and(|c| self.constraints.contains(c.x, c.y))
    }

    pub fn is_coordinates_valid(&self, x_mm: f64, y_mm: f64) -> bool {
        self.constraints.contains(x_mm, y_mm)
    }

    /// `from -> to` is legal when both cells are usable, distinct, and `to`
    /// is free.
    pub fn can_move(&self, from: usize, to: usize, occupied: &BTreeSet<usize>) -> bool {
        from != to
            && self.is_position_valid(from)
            && self.is_position_valid(to)
            && !occupied.contains(&to)
    }

    /// Replace the tracked piece set, dropping positions that are not usable.
    ///
    /// Returns the rejected positions.
    pub fn update_piece_positions(
        &mut self,
        positions: impl IntoIterator<Item = usize>,
    ) -> Vec<usize> {
        let mut rejected = Vec::new();
        self.occupied = positions
            .into_iter()
            .filter(|&p| {
                let ok = self.is_position_valid(p);
                if !ok {
                    rejected.push(p);
                }
                ok
            })
            .collect();
        if !rejected.is_empty() {
            warn!("ignoring invalid piece positions {rejected:?}");
        }
        rejected
    }

    pub fn occupied_positions(&self) -> &BTreeSet<usize> {
        &self.occupied
    }

    /// Legal destinations from `from` given the tracked pieces.
    pub fn valid_moves(&self, from: usize) -> BTreeSet<usize> {
        self.valid_moves_from(from, &self.occupied)
    }

    /// Legal destinations from `from` given an explicit occupied set.
    pub fn valid_moves_from(&self, from: usize, occupied: &BTreeSet<usize>) -> BTreeSet<usize> {
        (0..CELL_COUNT)
            .filter(|&to| self.can_move(from, to, occupied))
            .collect()
    }

    pub fn validate_all_positions(&self) -> Result<(), CalibrationError> {
        let positions: Vec<usize> = (0..CELL_COUNT)
            .filter(|&p| !self.is_position_valid(p))
            .collect();
        if positions.is_empty() {
            Ok(())
        } else {
            Err(CalibrationError::WorkspaceInvalid { positions })
        }
    }

    pub fn safety_margins(&self) -> SafetyMargins {
        SafetyMargins {
            safety_margin_mm: self.constraints.safety_margin_mm,
            board: self.grid.bounds(),
            workspace: self.constraints,
            workspace_width_mm: self.constraints.width_mm(),
            workspace_height_mm: self.constraints.height_mm(),
        }
    }

    pub fn stats(&self) -> WorkspaceStats {
        let valid_positions = (0..CELL_COUNT)
            .filter(|&p| self.is_position_valid(p))
            .count();
        WorkspaceStats {
            total_positions: CELL_COUNT,
            valid_positions,
            occupied_positions: self.occupied.len(),
            free_positions: valid_positions.saturating_sub(self.occupied.len()),
            safety_margin_mm: self.constraints.safety_margin_mm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoardTransform;
    use approx::assert_relative_eq;
    use nalgebra::Point2;

    fn validator(margin: f64) -> WorkspaceValidator {
        let t = BoardTransform::new(Point2::new(100.0, 100.0), Point2::new(370.0, 100.0), 270.0, 1.0)
            .expect("transform");
        WorkspaceValidator::new(GridGenerator::new(t), margin)
    }

    fn set(items: &[usize]) -> BTreeSet<usize> {
        items.iter().copied().collect()
    }

    #[test]
    fn margin_expands_the_workspace() {
        let v = validator(10.0);
        let c = v.constraints();
        assert_relative_eq!(c.min_x_mm, -10.0);
        assert_relative_eq!(c.max_x_mm, 280.0);
        assert_relative_eq!(c.min_y_mm, -10.0);
        assert_relative_eq!(c.max_y_mm, 280.0);

        // outside the grid but inside the margin
        assert!(v.is_coordinates_valid(-5.0, 275.0));
        assert!(!v.is_coordinates_valid(-10.5, 100.0));

        let m = v.safety_margins();
        assert_relative_eq!(m.workspace_width_mm, m.board.width_mm + 20.0);
    }

    #[test]
    fn move_rules() {
        let v = validator(10.0);
        assert!(v.can_move(0, 4, &set(&[])));
        assert!(!v.can_move(4, 4, &set(&[])));
        assert!(!v.can_move(0, 4, &set(&[4])));
        assert!(!v.can_move(0, 9, &set(&[])));
        assert!(!v.can_move(12, 3, &set(&[])));

        let moves = v.valid_moves_from(4, &set(&[0, 8]));
        assert_eq!(moves, set(&[1, 2, 3, 5, 6, 7]));
    }

    #[test]
    fn tracked_pieces_drive_valid_moves() {
        let mut v = validator(10.0);
        let rejected = v.update_piece_positions([2, 6, 11]);
        assert_eq!(rejected, vec![11]);
        assert_eq!(v.occupied_positions(), &set(&[2, 6]));
        assert_eq!(v.valid_moves(0), set(&[1, 3, 4, 5, 7, 8]));

        let stats = v.stats();
        assert_eq!(stats.valid_positions, 9);
        assert_eq!(stats.occupied_positions, 2);
        assert_eq!(stats.free_positions, 7);
    }

    #[test]
    fn all_positions_pass_with_zero_margin() {
        assert!(validator(0.0).validate_all_positions().is_ok());
    }
}
