//! Depth slicing and duplicate isolation.
//!
//! Samples sharing an exact coordinate key are pulled out as a whole group
//! before slicing; no copy of a colliding measurement reaches analysis.
//! Everything else is grouped by exact depth, in the order depths first
//! appear in the source table.

use std::collections::HashMap;

use log::{debug, info};
use serde::Serialize;

use crate::core::dataset::{
    coordinate_key, Axis, DatasetError, Result, Sample, ScanDataset, ScanVariant,
};
use crate::core::transforms::{cylindrical_to_cartesian, CartesianPoint, CylindricalPoint};

/// Sample of a rotational slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RadialPoint {
    pub r: f64,
    pub theta: f64,
    pub field: f64,
    pub sem: f64,
}

impl RadialPoint {
    pub fn to_cylindrical(&self) -> CylindricalPoint {
        CylindricalPoint::new(self.r, self.theta, self.field)
    }
}

/// Sample of a fixed-axis line scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfilePoint {
    /// Coordinate along the stepped axis
    pub position: f64,
    pub field: f64,
    pub sem: f64,
}

/// Variant-specific columns carried by a slice.
#[derive(Debug, Clone, PartialEq)]
pub enum SlicePoints {
    Radial(Vec<RadialPoint>),
    Planar(Vec<CartesianPoint>),
    Profile { axis: Axis, points: Vec<ProfilePoint> },
}

/// Samples measured at one depth.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub z: f64,
    pub points: SlicePoints,
}

impl Slice {
    pub fn len(&self) -> usize {
        match &self.points {
            SlicePoints::Radial(p) => p.len(),
            SlicePoints::Planar(p) => p.len(),
            SlicePoints::Profile { points, .. } => points.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Radial samples, if this slice came from a rotational scan.
    pub fn radial(&self) -> Option<&[RadialPoint]> {
        match &self.points {
            SlicePoints::Radial(p) => Some(p),
            _ => None,
        }
    }

    /// Scattered `(x, y, field)` triples for gridding and comparison.
    ///
    /// # Errors
    ///
    /// `DatasetError::Structure` for line-scan profiles, which have no
    /// planar extent.
    pub fn to_cartesian(&self) -> Result<Vec<CartesianPoint>> {
        match &self.points {
            SlicePoints::Radial(points) => Ok(points
                .iter()
                .map(|p| {
                    let (x, y) = cylindrical_to_cartesian(p.r, p.theta);
                    CartesianPoint::new(x, y, p.field)
                })
                .collect()),
            SlicePoints::Planar(points) => Ok(points.clone()),
            SlicePoints::Profile { axis, .. } => Err(DatasetError::Structure(format!(
                "slice at z = {} is a line profile along {}, not a planar map",
                self.z, axis
            ))),
        }
    }
}

/// Samples that collided on one coordinate key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    /// `(r, θ, z)` for rotational scans, `(x, y, z)` otherwise
    pub key: (f64, f64, f64),
    pub samples: Vec<Sample>,
}

impl DuplicateGroup {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Largest minus smallest field among the copies.
    pub fn field_spread(&self) -> f64 {
        let (lo, hi) = self
            .samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
                (lo.min(s.field), hi.max(s.field))
            });
        if self.samples.is_empty() {
            0.0
        } else {
            hi - lo
        }
    }
}

/// Slices plus the duplicates withheld from them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Partition {
    pub slices: Vec<Slice>,
    pub duplicates: Vec<DuplicateGroup>,
}

impl Partition {
    /// Samples that made it into slices.
    pub fn analysed_len(&self) -> usize {
        self.slices.iter().map(Slice::len).sum()
    }

    /// Samples withheld as duplicates.
    pub fn duplicate_len(&self) -> usize {
        self.duplicates.iter().map(DuplicateGroup::len).sum()
    }
}

fn key_of(variant: ScanVariant, s: &Sample) -> (f64, f64, f64) {
    if variant.is_radial() {
        (
            s.r.unwrap_or_else(|| s.x.hypot(s.y)),
            s.theta.unwrap_or(0.0),
            s.z,
        )
    } else {
        (s.x, s.y, s.z)
    }
}

fn key_bits(key: (f64, f64, f64)) -> (u64, u64, u64) {
    (
        coordinate_key(key.0),
        coordinate_key(key.1),
        coordinate_key(key.2),
    )
}

/// Split a normalized dataset into depth slices and duplicate groups.
///
/// `analysed_len() + duplicate_len()` always equals the dataset length.
pub fn partition(dataset: &ScanDataset) -> Partition {
    let variant = dataset.variant();
    let samples = dataset.samples();

    let mut groups: HashMap<(u64, u64, u64), Vec<usize>> = HashMap::with_capacity(samples.len());
    let mut key_order = Vec::new();
    for (idx, s) in samples.iter().enumerate() {
        let bits = key_bits(key_of(variant, s));
        groups
            .entry(bits)
            .or_insert_with(|| {
                key_order.push(idx);
                Vec::new()
            })
            .push(idx);
    }

    let duplicates: Vec<DuplicateGroup> = key_order
        .iter()
        .filter_map(|&first| {
            let members = groups.get(&key_bits(key_of(variant, &samples[first])))?;
            (members.len() >= 2).then(|| DuplicateGroup {
                key: key_of(variant, &samples[first]),
                samples: members.iter().map(|&i| samples[i]).collect(),
            })
        })
        .collect();

    if !duplicates.is_empty() {
        info!(
            "{}: withheld {} duplicate groups ({} samples)",
            dataset.label(),
            duplicates.len(),
            duplicates.iter().map(DuplicateGroup::len).sum::<usize>()
        );
    }

    let mut depth_order: Vec<u64> = Vec::new();
    let mut by_depth: HashMap<u64, (f64, Vec<Sample>)> = HashMap::new();
    for s in samples.iter() {
        let unique = groups
            .get(&key_bits(key_of(variant, s)))
            .map_or(true, |members| members.len() < 2);
        if !unique {
            continue;
        }
        let depth = coordinate_key(s.z);
        by_depth
            .entry(depth)
            .or_insert_with(|| {
                depth_order.push(depth);
                (s.z, Vec::new())
            })
            .1
            .push(*s);
    }

    let slices: Vec<Slice> = depth_order
        .iter()
        .filter_map(|depth| by_depth.remove(depth))
        .map(|(z, members)| Slice {
            z,
            points: slice_points(variant, &members),
        })
        .collect();

    debug!(
        "{}: {} slices from {} samples",
        dataset.label(),
        slices.len(),
        samples.len()
    );

    Partition { slices, duplicates }
}

fn slice_points(variant: ScanVariant, members: &[Sample]) -> SlicePoints {
    match variant {
        ScanVariant::Rotational => SlicePoints::Radial(
            members
                .iter()
                .map(|s| RadialPoint {
                    r: s.r.unwrap_or_else(|| s.x.hypot(s.y)),
                    theta: s.theta.unwrap_or(0.0),
                    field: s.field,
                    sem: s.sem,
                })
                .collect(),
        ),
        ScanVariant::Rectangular => SlicePoints::Planar(
            members
                .iter()
                .map(|s| CartesianPoint::new(s.x, s.y, s.field))
                .collect(),
        ),
        ScanVariant::FixedX | ScanVariant::FixedY => {
            let axis = if variant == ScanVariant::FixedX {
                Axis::X
            } else {
                Axis::Y
            };
            SlicePoints::Profile {
                axis,
                points: members
                    .iter()
                    .map(|s| ProfilePoint {
                        position: s.coordinate(axis),
                        field: s.field,
                        sem: s.sem,
                    })
                    .collect(),
            }
        }
    }
}
