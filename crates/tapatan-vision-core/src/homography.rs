//! Planar homography used to map a unit marker square onto its image quad.

use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};

/// 3x3 projective map `p_dst ~ H * p_src`, normalised so `h[(2,2)] == 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.h * Vector3::new(p.x as f64, p.y as f64, 1.0);
        Point2::new((v[0] / v[2]) as f32, (v[1] / v[2]) as f32)
    }
}

/// Similarity that moves the centroid to the origin and scales the mean
/// distance to sqrt(2).
fn conditioning(pts: &[Point2<f32>; 4]) -> ([Point2<f64>; 4], Matrix3<f64>) {
    let (mut cx, mut cy) = (0.0_f64, 0.0_f64);
    for p in pts {
        cx += p.x as f64;
        cy += p.y as f64;
    }
    cx /= 4.0;
    cy /= 4.0;

    let spread = pts
        .iter()
        .map(|p| (p.x as f64 - cx).hypot(p.y as f64 - cy))
        .sum::<f64>()
        / 4.0;
    let s = if spread > 1e-12 {
        std::f64::consts::SQRT_2 / spread
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let out = pts.map(|p| Point2::new(s * (p.x as f64 - cx), s * (p.y as f64 - cy)));
    (out, t)
}

/// Solve `dst ~ H * src` from four correspondences in matching order.
///
/// Returns `None` for degenerate configurations (three collinear points,
/// repeated corners).
pub fn homography_from_4pt(src: &[Point2<f32>; 4], dst: &[Point2<f32>; 4]) -> Option<Homography> {
    let (s, t_src) = conditioning(src);
    let (d, t_dst) = conditioning(dst);

    // Unknowns h11..h32 with h33 fixed to 1.
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for k in 0..4 {
        let (x, y) = (s[k].x, s[k].y);
        let (u, v) = (d[k].x, d[k].y);

        let r = 2 * k;
        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        b[r + 1] = v;
    }

    let x = a.lu().solve(&b)?;
    let hn = Matrix3::new(x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7], 1.0);

    let h = t_dst.try_inverse()? * hn * t_src;
    let w = h[(2, 2)];
    if w.abs() < 1e-12 || !h.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(Homography::new(h / w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square() -> [Point2<f32>; 4] {
        [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ]
    }

    #[test]
    fn maps_unit_square_onto_skewed_quad() {
        let quad = [
            Point2::new(102.0, 48.0),
            Point2::new(171.0, 55.0),
            Point2::new(160.0, 130.0),
            Point2::new(95.0, 118.0),
        ];
        let h = homography_from_4pt(&unit_square(), &quad).expect("homography");
        for (s, d) in unit_square().iter().zip(quad.iter()) {
            let p = h.apply(*s);
            assert_relative_eq!(p.x, d.x, epsilon = 1e-3);
            assert_relative_eq!(p.y, d.y, epsilon = 1e-3);
        }

        let mid = h.apply(Point2::new(0.5, 0.0));
        assert!(mid.x > 102.0 && mid.x < 171.0);
    }

    #[test]
    fn collapsed_quad_has_no_homography() {
        let p = Point2::new(10.0, 10.0);
        assert!(homography_from_4pt(&unit_square(), &[p, p, p, p]).is_none());
    }
}
