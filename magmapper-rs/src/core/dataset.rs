//! Measurement samples, scan datasets and the failure taxonomy shared by
//! every processing stage.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::config::CalibrationConfig;

/// Errors raised while classifying, normalizing or analysing a dataset.
///
/// Each of these aborts processing of the one dataset it concerns; batch
/// callers keep going with the remaining files.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatasetError {
    /// Unexpected column count or an ambiguous fixed-axis slice.
    #[error("format error: {0}")]
    Format(String),

    /// No swept-axis position passed the centering bias filter.
    #[error("centering error: {0}")]
    Centering(String),

    /// A component was invoked on a dataset shape it does not support.
    #[error("structure error: {0}")]
    Structure(String),

    #[error("dataset {0:?} has no rows")]
    Empty(String),
}

/// Result type for dataset operations.
pub type Result<T> = std::result::Result<T, DatasetError>;

/// Scan pattern a table was recorded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScanVariant {
    /// Raster over x, then y, then z (6 columns).
    Rectangular,
    /// Turntable sweep over θ at each swept-axis position and depth (9 columns).
    Rotational,
    /// Single angle and single y: field varies along x.
    FixedX,
    /// Single angle and single x: field varies along y.
    FixedY,
}

impl ScanVariant {
    /// Number of columns in tables of this variant.
    pub fn column_count(self) -> usize {
        match self {
            ScanVariant::Rectangular => 6,
            ScanVariant::Rotational | ScanVariant::FixedX | ScanVariant::FixedY => 9,
        }
    }

    /// Whether samples of this variant carry a radius once normalized.
    pub fn is_radial(self) -> bool {
        matches!(self, ScanVariant::Rotational)
    }
}

impl fmt::Display for ScanVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanVariant::Rectangular => "rectangular scan",
            ScanVariant::Rotational => "rotational scan",
            ScanVariant::FixedX => "fixed-x slice",
            ScanVariant::FixedY => "fixed-y slice",
        };
        f.write_str(name)
    }
}

/// Planar axis of the probe stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Axis {
    X,
    Y,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => f.write_str("x"),
            Axis::Y => f.write_str("y"),
        }
    }
}

/// One probe measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Turntable angle in radians (rotational and fixed-axis tables only).
    pub theta: Option<f64>,
    /// Planar radius from the rotation axis, set after centering.
    pub r: Option<f64>,
    pub voltage: f64,
    pub std_voltage: f64,
    /// Readings averaged into this sample.
    pub n: f64,
    /// Field in tesla.
    pub field: f64,
    pub std_field: f64,
    /// Standard error of the mean field.
    pub sem: f64,
    /// Field and its deviation as written by the probe software, if present.
    pub recorded: Option<(f64, f64)>,
}

impl Sample {
    /// Coordinate along a planar axis.
    #[inline]
    pub fn coordinate(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }

    #[inline]
    pub fn set_coordinate(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
        }
    }
}

/// Origin found for a rotational scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Centering {
    /// Planar axis the probe was stepped along.
    pub swept_axis: Axis,
    /// Swept-axis value subtracted from every sample.
    pub offset: f64,
}

/// Ordered samples from one probe file plus the context needed to interpret
/// them.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanDataset {
    label: String,
    variant: ScanVariant,
    samples: Vec<Sample>,
    calibration: CalibrationConfig,
    centering: Option<Centering>,
}

impl ScanDataset {
    /// Wrap already-built samples. Used by the classifier and the staged
    /// normalizer; callers normally go through `build_dataset`.
    pub fn new(
        label: impl Into<String>,
        variant: ScanVariant,
        samples: Vec<Sample>,
        calibration: CalibrationConfig,
    ) -> Self {
        Self {
            label: label.into(),
            variant,
            samples,
            calibration,
            centering: None,
        }
    }

    /// Replace the samples, keeping label, variant and calibration.
    pub fn with_samples(self, samples: Vec<Sample>) -> Self {
        Self { samples, ..self }
    }

    pub fn with_centering(self, centering: Centering) -> Self {
        Self {
            centering: Some(centering),
            ..self
        }
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn variant(&self) -> ScanVariant {
        self.variant
    }

    #[inline]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    #[inline]
    pub fn calibration(&self) -> &CalibrationConfig {
        &self.calibration
    }

    #[inline]
    pub fn centering(&self) -> Option<Centering> {
        self.centering
    }

    /// Swept-axis value subtracted during centering.
    pub fn centre_offset(&self) -> Option<f64> {
        self.centering.map(|c| c.offset)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean field over every sample, 0 for an empty dataset.
    pub fn mean_field(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|s| s.field).sum::<f64>() / self.samples.len() as f64
    }

    /// Largest standard error of the mean across the dataset.
    pub fn max_standard_error(&self) -> Option<f64> {
        self.samples
            .iter()
            .map(|s| s.sem)
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
    }

    /// Sample with the largest field magnitude; first one wins ties.
    pub fn peak_sample(&self) -> Option<&Sample> {
        self.samples.iter().fold(None, |best: Option<&Sample>, s| match best {
            Some(b) if b.field.abs() >= s.field.abs() => Some(b),
            _ => Some(s),
        })
    }
}

/// Exact-match hash key for a coordinate; `-0.0` and `0.0` collide.
#[inline]
pub fn coordinate_key(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

/// Number of distinct values, compared exactly.
pub fn distinct_count<I: IntoIterator<Item = f64>>(values: I) -> usize {
    values
        .into_iter()
        .map(coordinate_key)
        .collect::<HashSet<u64>>()
        .len()
}

/// Distinct values in first-encountered order.
pub fn distinct_in_order<I: IntoIterator<Item = f64>>(values: I) -> Vec<f64> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(coordinate_key(*v)))
        .collect()
}
