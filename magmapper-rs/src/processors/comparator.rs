//! Magnet-to-magnet comparison.
//!
//! Both maps are centred and cropped to the largest circle they share. In
//! pointwise mode the second map is rotated through a full turn in fixed
//! steps; every step is scored by the sum of squared field differences
//! between each sample of the first map and the nearest rotated sample of
//! the second. The search is exhaustive, so the best step is global at the
//! chosen resolution.
//!
//! Samples sharing a position (every turntable angle at `r = 0`) are merged
//! into one point carrying their mean field before matching.

use std::f64::consts::TAU;

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::{ComparisonMode, MapperConfig};
use crate::core::dataset::{DatasetError, Result, ScanDataset};
use crate::core::transforms::{
    crop_to_circle, rotate, to_cartesian, to_cylindrical, CartesianPoint, CylindricalPoint,
};

use super::homogeneity::characterize_dataset;
use super::partition::{partition, SlicePoints};
use super::triangulation::merge_coincident;

/// Most rotation candidates a single search may score.
pub const MAX_ROTATION_CANDIDATES: usize = 100_000;

/// Outcome of comparing two maps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub mode: ComparisonMode,
    /// Rotation applied to the second map, radians
    pub best_rotation: f64,
    /// Score at the best rotation; tesla² (pointwise) or mT (spectral)
    pub dissimilarity: f64,
    /// Common crop radius (pointwise only)
    pub crop_radius: Option<f64>,
    /// `(rotation, score)` for every candidate, in rotation order
    pub scores: Vec<(f64, f64)>,
}

/// A centred map in cylindrical form plus the radius it reliably covers.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonMap {
    pub points: Vec<CylindricalPoint>,
    pub extent: f64,
}

/// Centred cylindrical map of one slice of a dataset.
///
/// Rotational slices are already centred. Rectangular slices are centred on
/// their peak-field sample; their extent is the distance to the nearest
/// edge of the scanned square.
///
/// # Errors
///
/// `DatasetError::Structure` if the slice does not exist or is a line
/// profile.
pub fn comparison_map(dataset: &ScanDataset, slice_index: usize) -> Result<ComparisonMap> {
    let partition = partition(dataset);
    let slice = partition.slices.get(slice_index).ok_or_else(|| {
        DatasetError::Structure(format!(
            "{}: no slice {} ({} slices)",
            dataset.label(),
            slice_index,
            partition.slices.len()
        ))
    })?;

    match &slice.points {
        SlicePoints::Radial(points) => {
            let points: Vec<CylindricalPoint> = points.iter().map(|p| p.to_cylindrical()).collect();
            let extent = points.iter().map(|p| p.r).fold(0.0, f64::max);
            Ok(ComparisonMap { points, extent })
        }
        SlicePoints::Planar(points) => {
            let peak = points
                .iter()
                .copied()
                .reduce(|best, p| if p.field > best.field { p } else { best })
                .ok_or_else(|| DatasetError::Empty(dataset.label().to_string()))?;
            let centred: Vec<CartesianPoint> = points
                .iter()
                .map(|p| CartesianPoint::new(p.x - peak.x, p.y - peak.y, p.field))
                .collect();
            let extent = centred
                .iter()
                .flat_map(|p| [p.x, p.y])
                .fold((0.0f64, 0.0f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
            let extent = extent.0.abs().min(extent.1);
            Ok(ComparisonMap {
                points: to_cylindrical(&centred),
                extent,
            })
        }
        SlicePoints::Profile { axis, .. } => Err(DatasetError::Structure(format!(
            "{}: a line profile along {} cannot be compared as a map",
            dataset.label(),
            axis
        ))),
    }
}

/// `reference` must already be merged; `other` is merged here.
fn squared_difference(reference: &[CartesianPoint], other: &[CartesianPoint]) -> f64 {
    let other = merge_coincident(other);
    if other.is_empty() {
        return f64::INFINITY;
    }
    let coords: Vec<[f64; 2]> = other.iter().map(|p| [p.x, p.y]).collect();
    let tree: ImmutableKdTree<f64, 2> = ImmutableKdTree::new_from_slice(&coords);

    reference
        .iter()
        .map(|p| {
            let nearest = tree.nearest_one::<SquaredEuclidean>(&[p.x, p.y]);
            let diff = p.field - other[nearest.item as usize].field;
            diff * diff
        })
        .sum()
}

/// Number of rotation candidates for a step of `resolution` radians.
///
/// # Errors
///
/// `DatasetError::Structure` for a non-positive or non-finite step, or one
/// so fine that more than `MAX_ROTATION_CANDIDATES` would be scored.
pub fn candidate_count(resolution: f64) -> Result<usize> {
    if !(resolution > 0.0 && resolution.is_finite()) {
        return Err(DatasetError::Structure(format!(
            "rotation resolution must be positive, got {}",
            resolution
        )));
    }
    let count = (TAU / resolution).ceil();
    if count > MAX_ROTATION_CANDIDATES as f64 {
        return Err(DatasetError::Structure(format!(
            "rotation resolution {} needs {} candidates, at most {} allowed",
            resolution, count, MAX_ROTATION_CANDIDATES
        )));
    }
    Ok(count as usize)
}

/// Score every rotation of `b` against `a`; both already cropped.
///
/// Candidates are `k · resolution` for `k = 0 .. ceil(2π / resolution)`.
///
/// # Errors
///
/// See [`candidate_count`].
pub fn rotation_scores(
    a: &[CylindricalPoint],
    b: &[CylindricalPoint],
    resolution: f64,
) -> Result<Vec<(f64, f64)>> {
    let count = candidate_count(resolution)?;
    let reference = merge_coincident(&to_cartesian(a));

    Ok((0..count)
        .into_par_iter()
        .map(|k| {
            let angle = k as f64 * resolution;
            let rotated = to_cartesian(&rotate(b, angle));
            (angle, squared_difference(&reference, &rotated))
        })
        .collect())
}

/// Compare two normalized datasets with the configured mode.
///
/// # Errors
///
/// `DatasetError::Structure` for profiles, a missing slice, a crop that
/// leaves either map empty, an unusable rotation resolution, or (in
/// spectral mode) a non-rotational dataset.
pub fn compare(a: &ScanDataset, b: &ScanDataset, config: &MapperConfig) -> Result<ComparisonResult> {
    match config.comparator.mode {
        ComparisonMode::Pointwise => compare_pointwise(a, b, config),
        ComparisonMode::Spectral => compare_spectral(a, b, config),
    }
}

fn compare_pointwise(a: &ScanDataset, b: &ScanDataset, config: &MapperConfig) -> Result<ComparisonResult> {
    let resolution = config.comparator.rotation_resolution;
    candidate_count(resolution)?;

    let slice_index = config.comparator.slice_index;
    let map_a = comparison_map(a, slice_index)?;
    let map_b = comparison_map(b, slice_index)?;

    let radius = map_a.extent.min(map_b.extent);
    let crop_a = crop_to_circle(&map_a.points, radius);
    let crop_b = crop_to_circle(&map_b.points, radius);
    if crop_a.is_empty() || crop_b.is_empty() {
        return Err(DatasetError::Structure(format!(
            "no samples of {} and {} inside the common radius {}",
            a.label(),
            b.label(),
            radius
        )));
    }
    debug!(
        "Cropped to r <= {}: {} and {} samples",
        radius,
        crop_a.len(),
        crop_b.len()
    );

    let scores = rotation_scores(&crop_a, &crop_b, resolution)?;
    let (best_rotation, dissimilarity) = scores
        .iter()
        .copied()
        .fold((0.0, f64::INFINITY), |best, (angle, score)| {
            if score < best.1 {
                (angle, score)
            } else {
                best
            }
        });

    info!(
        "{} vs {}: best rotation {:.3} rad, score {:.6e}",
        a.label(),
        b.label(),
        best_rotation,
        dissimilarity
    );

    Ok(ComparisonResult {
        mode: ComparisonMode::Pointwise,
        best_rotation,
        dissimilarity,
        crop_radius: Some(radius),
        scores,
    })
}

fn compare_spectral(a: &ScanDataset, b: &ScanDataset, config: &MapperConfig) -> Result<ComparisonResult> {
    let spectrum_a = characterize_dataset(a, &config.homogeneity)?;
    let spectrum_b = characterize_dataset(b, &config.homogeneity)?;
    let dissimilarity = (spectrum_a.inhomogeneity - spectrum_b.inhomogeneity).abs();

    info!(
        "{} vs {}: inhomogeneity {:.4} vs {:.4} mT",
        a.label(),
        b.label(),
        spectrum_a.inhomogeneity,
        spectrum_b.inhomogeneity
    );

    Ok(ComparisonResult {
        mode: ComparisonMode::Spectral,
        best_rotation: 0.0,
        dissimilarity,
        crop_radius: None,
        scores: Vec::new(),
    })
}
