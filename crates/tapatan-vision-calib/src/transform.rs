//! Pixel <-> board millimeter frame anchored on the reference markers.

use crate::{CalibrationData, CalibrationError};
use nalgebra::{Point2, Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Planar similarity between image pixels and the board frame.
///
/// The board frame has its origin at marker 0, +X toward marker 1 and +Y a
/// quarter turn from +X (image plane assumed parallel to the board).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardTransform {
    origin_px: Point2<f64>,
    marker1_px: Point2<f64>,
    /// Millimeters per pixel.
    scale: f64,
    axis_x: Vector2<f64>,
    axis_y: Vector2<f64>,
    axis_z: Vector3<f64>,
    confidence: f64,
    distance_mm: f64,
    distance_px: f64,
}

/// Serializable summary of a [`BoardTransform`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformInfo {
    pub origin_px: Point2<f64>,
    pub scale_mm_per_px: f64,
    pub scale_px_per_mm: f64,
    pub axis_x: Vector2<f64>,
    pub axis_y: Vector2<f64>,
    pub axis_z: Vector3<f64>,
    pub confidence: f64,
    pub distance_mm: f64,
    pub distance_px: f64,
}

impl BoardTransform {
    /// Frame from two marker centers and their physical spacing.
    pub fn new(
        marker0_px: Point2<f64>,
        marker1_px: Point2<f64>,
        distance_mm: f64,
        confidence: f64,
    ) -> Result<Self, CalibrationError> {
        let finite = |p: &Point2<f64>| p.x.is_finite() && p.y.is_finite();
        if !finite(&marker0_px) || !finite(&marker1_px) || !distance_mm.is_finite() {
            return Err(CalibrationError::NonFiniteTransform);
        }
        let delta = marker1_px - marker0_px;
        let distance_px = delta.norm();
        if distance_px <= f64::EPSILON {
            return Err(CalibrationError::DegenerateAxis);
        }
        let axis_x = delta / distance_px;
        let axis_y = Vector2::new(-axis_x.y, axis_x.x);
        let scale = distance_mm / distance_px;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(CalibrationError::NonFiniteTransform);
        }
        Ok(Self {
            origin_px: marker0_px,
            marker1_px,
            scale,
            axis_x,
            axis_y,
            axis_z: Vector3::z(),
            confidence,
            distance_mm,
            distance_px,
        })
    }

    /// Frame from a smoothed reference measurement.
    ///
    /// Rejects measurements that failed the distance plausibility check.
    pub fn from_calibration(
        data: &CalibrationData,
        min_px: f64,
        max_px: f64,
    ) -> Result<Self, CalibrationError> {
        if !data.is_valid {
            return Err(CalibrationError::ImplausibleDistance {
                distance_px: data.distance_px,
                min_px,
                max_px,
            });
        }
        Self::new(
            data.marker0.center_px,
            data.marker1.center_px,
            data.distance_mm,
            data.confidence,
        )
    }

    /// Board coordinates (z = 0) of an image point.
    pub fn pixel_to_board(&self, px: Point2<f64>) -> Point3<f64> {
        let d = px - self.origin_px;
        Point3::new(
            d.dot(&self.axis_x) * self.scale,
            d.dot(&self.axis_y) * self.scale,
            0.0,
        )
    }

    /// Image point of a board coordinate; `z` is ignored.
    pub fn board_to_pixel(&self, mm: Point3<f64>) -> Point2<f64> {
        self.origin_px + self.axis_x * (mm.x / self.scale) + self.axis_y * (mm.y / self.scale)
    }

    /// Largest pixel -> board -> pixel deviation over the two marker centers.
    pub fn round_trip_error(&self) -> f64 {
        [self.origin_px, self.marker1_px]
            .into_iter()
            .map(|p| (self.board_to_pixel(self.pixel_to_board(p)) - p).norm())
            .fold(0.0, f64::max)
    }

    pub fn validate_transform(&self, tolerance_px: f64) -> Result<(), CalibrationError> {
        let deviation_px = self.round_trip_error();
        if deviation_px.is_finite() && deviation_px < tolerance_px {
            Ok(())
        } else {
            Err(CalibrationError::RoundTripExceeded {
                deviation_px,
                tolerance_px,
            })
        }
    }

    #[inline]
    pub fn origin_px(&self) -> Point2<f64> {
        self.origin_px
    }

    #[inline]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[inline]
    pub fn axis_x(&self) -> Vector2<f64> {
        self.axis_x
    }

    #[inline]
    pub fn axis_y(&self) -> Vector2<f64> {
        self.axis_y
    }

    #[inline]
    pub fn axis_z(&self) -> Vector3<f64> {
        self.axis_z
    }

    #[inline]
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    #[inline]
    pub fn distance_mm(&self) -> f64 {
        self.distance_mm
    }

    #[inline]
    pub fn distance_px(&self) -> f64 {
        self.distance_px
    }

    pub fn info(&self) -> TransformInfo {
        TransformInfo {
            origin_px: self.origin_px,
            scale_mm_per_px: self.scale,
            scale_px_per_mm: 1.0 / self.scale,
            axis_x: self.axis_x,
            axis_y: self.axis_y,
            axis_z: self.axis_z,
            confidence: self.confidence,
            distance_mm: self.distance_mm,
            distance_px: self.distance_px,
        }
    }
}
