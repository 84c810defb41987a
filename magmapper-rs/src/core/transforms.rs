//! Coordinate transformations between cartesian and cylindrical frames.
//!
//! All angles are radians. The radius is planar (`sqrt(x² + y²)`); depth is
//! carried alongside by callers and never folded into `r`. Batch conversions
//! are parallelized using Rayon.

use std::f64::consts::{PI, TAU};

use rayon::prelude::*;

/// A field sample in cartesian coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartesianPoint {
    pub x: f64,
    pub y: f64,
    pub field: f64,
}

impl CartesianPoint {
    pub fn new(x: f64, y: f64, field: f64) -> Self {
        Self { x, y, field }
    }
}

/// A field sample in cylindrical coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CylindricalPoint {
    pub r: f64,
    pub theta: f64,
    pub field: f64,
}

impl CylindricalPoint {
    pub fn new(r: f64, theta: f64, field: f64) -> Self {
        Self { r, theta, field }
    }
}

/// Wrap an angle into `(-π, π]`.
#[inline]
pub fn wrap_angle(theta: f64) -> f64 {
    let wrapped = (theta + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Convert a planar position to `(r, θ)` with `θ ∈ (-π, π]`.
///
/// θ is meaningless at the origin; `atan2(0, 0)` yields 0 there.
#[inline]
pub fn cartesian_to_cylindrical(x: f64, y: f64) -> (f64, f64) {
    let r = x.hypot(y);
    let theta = y.atan2(x);
    let theta = if theta <= -PI { theta + TAU } else { theta };
    (r, theta)
}

/// Convert `(r, θ)` to a planar position.
#[inline]
pub fn cylindrical_to_cartesian(r: f64, theta: f64) -> (f64, f64) {
    let (sin_t, cos_t) = theta.sin_cos();
    (r * cos_t, r * sin_t)
}

/// Convert a batch of cartesian samples to cylindrical, field unchanged.
pub fn to_cylindrical(points: &[CartesianPoint]) -> Vec<CylindricalPoint> {
    points
        .par_iter()
        .map(|p| {
            let (r, theta) = cartesian_to_cylindrical(p.x, p.y);
            CylindricalPoint::new(r, theta, p.field)
        })
        .collect()
}

/// Convert a batch of cylindrical samples to cartesian, field unchanged.
pub fn to_cartesian(points: &[CylindricalPoint]) -> Vec<CartesianPoint> {
    points
        .par_iter()
        .map(|p| {
            let (x, y) = cylindrical_to_cartesian(p.r, p.theta);
            CartesianPoint::new(x, y, p.field)
        })
        .collect()
}

/// Rotate every sample by `offset` radians about the origin; θ stays in
/// `(-π, π]`.
pub fn rotate(points: &[CylindricalPoint], offset: f64) -> Vec<CylindricalPoint> {
    points
        .iter()
        .map(|p| CylindricalPoint::new(p.r, wrap_angle(p.theta + offset), p.field))
        .collect()
}

/// Keep only samples within `radius` of the origin.
pub fn crop_to_circle(points: &[CylindricalPoint], radius: f64) -> Vec<CylindricalPoint> {
    points.iter().copied().filter(|p| p.r <= radius).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn close(a: f64, b: f64, rel: f64) -> bool {
        (a - b).abs() <= rel * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn test_cartesian_to_cylindrical_axes() {
        let (r, t) = cartesian_to_cylindrical(2.0, 0.0);
        assert!((r - 2.0).abs() < 1e-12);
        assert!(t.abs() < 1e-12);

        let (r, t) = cartesian_to_cylindrical(0.0, 3.0);
        assert!((r - 3.0).abs() < 1e-12);
        assert!((t - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_negative_x_axis_maps_to_pi() {
        let (_, t) = cartesian_to_cylindrical(-1.0, 0.0);
        assert_eq!(t, PI);
        let (_, t) = cartesian_to_cylindrical(-1.0, -0.0);
        assert_eq!(t, PI);
    }

    #[test]
    fn test_round_trip_many_points() {
        for i in -20..=20 {
            for j in -20..=20 {
                if i == 0 && j == 0 {
                    continue;
                }
                let x = i as f64 * 0.37 + 0.001 * j as f64;
                let y = j as f64 * 1.13 - 0.002 * i as f64;
                let (r, t) = cartesian_to_cylindrical(x, y);
                let (x2, y2) = cylindrical_to_cartesian(r, t);
                assert!(close(x, x2, 1e-9), "x {} vs {}", x, x2);
                assert!(close(y, y2, 1e-9), "y {} vs {}", y, y2);
            }
        }
    }

    #[test]
    fn test_batch_round_trip_keeps_field() {
        let points = vec![
            CartesianPoint::new(1.0, 1.0, 0.5),
            CartesianPoint::new(-3.0, 0.5, -0.2),
        ];

        let back = to_cartesian(&to_cylindrical(&points));

        for (a, b) in points.iter().zip(back.iter()) {
            assert!(close(a.x, b.x, 1e-9));
            assert!(close(a.y, b.y, 1e-9));
            assert_eq!(a.field, b.field);
        }
    }

    #[test]
    fn test_wrap_angle() {
        assert!((wrap_angle(3.0 * PI - 0.5) - (PI - 0.5)).abs() < 1e-12);
        assert!((wrap_angle(-3.0 * PI + 0.5) - (-PI + 0.5)).abs() < 1e-12);
        assert!((wrap_angle(0.5) - 0.5).abs() < 1e-12);
        assert!((wrap_angle(TAU + 0.25) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_rotate_and_crop() {
        let points = vec![
            CylindricalPoint::new(1.0, 0.0, 1.0),
            CylindricalPoint::new(5.0, 0.0, 2.0),
        ];

        let rotated = rotate(&points, 0.5);
        assert!((rotated[0].theta - 0.5).abs() < 1e-12);
        assert_eq!(rotated[1].r, 5.0);

        let wrapped = rotate(&[CylindricalPoint::new(1.0, 3.0, 0.0)], 1.0);
        assert!((wrapped[0].theta - (4.0 - TAU)).abs() < 1e-12);

        let cropped = crop_to_circle(&points, 2.0);
        assert_eq!(cropped.len(), 1);
        assert_eq!(cropped[0].field, 1.0);
    }
}
