//! PNG rendering of interpolated grids and line profiles.
//!
//! Plots carry no text: the bitmap backend is built without font support.

use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::core::dataset::Axis;
use crate::processors::interpolation::InterpolatedGrid;
use crate::processors::partition::ProfilePoint;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Grid has no data")]
    EmptyGrid,

    #[error("Profile has no samples")]
    EmptyProfile,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Default plot width in pixels.
const DEFAULT_WIDTH: u32 = 1080;

/// Default plot height in pixels.
const DEFAULT_HEIGHT: u32 = 1080;

/// Most cells drawn along one side of a heatmap.
const MAX_CELLS_PER_SIDE: usize = 400;

/// Low-to-high field color stops.
const FIELD_COLORS: &[(u8, u8, u8)] = &[
    (49, 54, 149),   // Dark blue
    (69, 117, 180),  // Blue
    (171, 217, 233), // Pale blue
    (254, 224, 144), // Pale yellow
    (244, 109, 67),  // Orange
    (165, 0, 38),    // Dark red
];

/// Color for a value normalized to `[0, 1]`.
fn field_color(t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (FIELD_COLORS.len() - 1) as f64;
    let idx = (scaled.floor() as usize).min(FIELD_COLORS.len() - 2);
    let frac = scaled - idx as f64;
    let (a, b) = (FIELD_COLORS[idx], FIELD_COLORS[idx + 1]);
    let mix = |p: u8, q: u8| (p as f64 + (q as f64 - p as f64) * frac).round() as u8;
    RGBColor(mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}

/// Render an interpolated grid as a heatmap and save as PNG.
///
/// Nodes without data are left white. Large grids are subsampled so that
/// at most `MAX_CELLS_PER_SIDE` cells are drawn per side.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `grid` - Grid produced by the interpolator
pub fn plot_grid_heatmap(output_path: &Path, grid: &InterpolatedGrid) -> Result<()> {
    let (lo, hi) = grid.value_range().ok_or(VisualizationError::EmptyGrid)?;
    let span = if hi > lo { hi - lo } else { 1.0 };

    let n = grid.size();
    let step = n.div_ceil(MAX_CELLS_PER_SIDE).max(1);

    let (x_min, x_max) = (grid.xs[0], grid.xs[n - 1]);
    let (y_min, y_max) = (grid.ys[0], grid.ys[grid.ys.len() - 1]);
    let dx = (x_max - x_min) / (n.max(2) - 1) as f64 * step as f64;
    let dy = (y_max - y_min) / (grid.ys.len().max(2) - 1) as f64 * step as f64;

    let mut cells: Vec<(f64, f64, RGBColor)> = Vec::new();
    for iy in (0..grid.ys.len()).step_by(step) {
        for ix in (0..n).step_by(step) {
            if let Some(v) = grid.get(ix, iy) {
                cells.push((grid.xs[ix], grid.ys[iy], field_color((v - lo) / span)));
            }
        }
    }

    let root = BitMapBackend::new(output_path, (DEFAULT_WIDTH, DEFAULT_HEIGHT))
        .into_drawing_area();

    root.fill(&WHITE).map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(
            (x_min - dx / 2.0)..(x_max + dx / 2.0),
            (y_min - dy / 2.0)..(y_max + dy / 2.0),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .draw_series(cells.iter().map(|(x, y, color)| {
            Rectangle::new(
                [
                    (x - dx / 2.0, y - dy / 2.0),
                    (x + dx / 2.0, y + dy / 2.0),
                ],
                color.filled(),
            )
        }))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    root.present().map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    Ok(())
}

/// Plot field against position for a fixed-axis line scan and save as PNG.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `axis` - Axis the probe was stepped along (x profiles are drawn in red,
///   y profiles in blue)
/// * `points` - Profile samples, in any order
pub fn plot_profile(output_path: &Path, axis: Axis, points: &[ProfilePoint]) -> Result<()> {
    if points.is_empty() {
        return Err(VisualizationError::EmptyProfile);
    }

    let mut sorted: Vec<(f64, f64)> = points.iter().map(|p| (p.position, p.field)).collect();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

    let (x_min, x_max, y_min, y_max) = compute_bounds(&sorted);
    let x_padding = (x_max - x_min) * 0.05;
    let y_padding = (y_max - y_min) * 0.05;

    let color = match axis {
        Axis::X => RGBColor(228, 26, 28),
        Axis::Y => RGBColor(55, 126, 184),
    };

    let root = BitMapBackend::new(output_path, (1920, DEFAULT_HEIGHT)).into_drawing_area();

    root.fill(&WHITE).map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(
            (x_min - x_padding)..(x_max + x_padding),
            (y_min - y_padding)..(y_max + y_padding),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .draw_series(LineSeries::new(sorted.iter().copied(), color.stroke_width(2)))
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .draw_series(
            sorted
                .iter()
                .map(|&(x, y)| Circle::new((x, y), 4, color.filled())),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    root.present().map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    Ok(())
}

/// Compute the bounds (min/max) of x and y.
fn compute_bounds(points: &[(f64, f64)]) -> (f64, f64, f64, f64) {
    let mut x_min = f64::MAX;
    let mut x_max = f64::MIN;
    let mut y_min = f64::MAX;
    let mut y_max = f64::MIN;

    for &(x, y) in points {
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }

    if (x_max - x_min).abs() < f64::EPSILON {
        x_min -= 1.0;
        x_max += 1.0;
    }
    if (y_max - y_min).abs() < f64::EPSILON {
        y_min -= 1.0;
        y_max += 1.0;
    }

    (x_min, x_max, y_min, y_max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_field_color_endpoints() {
        assert_eq!(field_color(0.0), RGBColor(49, 54, 149));
        assert_eq!(field_color(1.0), RGBColor(165, 0, 38));
        assert_eq!(field_color(f64::NAN), field_color(0.0));
    }

    #[test]
    fn test_compute_bounds_pads_flat_data() {
        let (x_min, x_max, y_min, y_max) = compute_bounds(&[(1.0, 2.0), (3.0, 2.0)]);
        assert_eq!((x_min, x_max), (1.0, 3.0));
        assert_eq!((y_min, y_max), (1.0, 3.0));
    }

    #[test]
    fn test_empty_grid_is_rejected() {
        let dir = tempdir().unwrap();
        let grid = InterpolatedGrid {
            xs: vec![0.0, 1.0],
            ys: vec![0.0, 1.0],
            values: vec![None; 4],
        };

        let result = plot_grid_heatmap(&dir.path().join("grid.png"), &grid);
        assert!(matches!(result, Err(VisualizationError::EmptyGrid)));
    }

    fn disc_grid(n: usize) -> InterpolatedGrid {
        let axis: Vec<f64> = (0..n).map(|i| -1.0 + 2.0 * i as f64 / (n - 1) as f64).collect();
        let mut values = Vec::with_capacity(n * n);
        for &y in &axis {
            for &x in &axis {
                let r2 = x * x + y * y;
                values.push((r2 <= 1.0).then(|| 0.5 - 0.1 * r2));
            }
        }
        InterpolatedGrid {
            xs: axis.clone(),
            ys: axis,
            values,
        }
    }

    #[test]
    fn test_plot_grid_heatmap_writes_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grid.png");
        let grid = disc_grid(41);
        assert!(grid.filled() > 0 && grid.filled() < 41 * 41);

        plot_grid_heatmap(&path, &grid).unwrap();

        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_plot_large_grid_is_subsampled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("large.png");
        let grid = disc_grid(MAX_CELLS_PER_SIDE + 50);

        plot_grid_heatmap(&path, &grid).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_empty_profile_is_rejected() {
        let dir = tempdir().unwrap();
        let result = plot_profile(&dir.path().join("profile.png"), Axis::X, &[]);
        assert!(matches!(result, Err(VisualizationError::EmptyProfile)));
    }

    #[test]
    fn test_plot_profile_writes_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profile.png");
        let points: Vec<ProfilePoint> = (0..10)
            .map(|i| ProfilePoint {
                position: i as f64,
                field: 0.4 - 0.001 * (i as f64 - 5.0).powi(2),
                sem: 0.0,
            })
            .collect();

        plot_profile(&path, Axis::Y, &points).unwrap();

        assert!(path.exists());
    }
}
