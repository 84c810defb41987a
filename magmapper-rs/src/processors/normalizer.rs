//! Staged normalization of freshly ingested scans.
//!
//! Each stage consumes a dataset and returns a new one, so stages can be run
//! and tested on their own:
//!
//! 1. [`derive_field`]: voltage to tesla through the Hall calibration
//! 2. [`rectify_sign`]: make the strongest sample positive, dataset-wide
//! 3. [`propagate_error`]: standard error of the mean per sample
//! 4. [`center`]: move the rotation axis to the origin (rotational only)
//! 5. [`compute_radius`]: planar radius from the centred coordinates
//!
//! [`normalize`] runs them in order; [`build_dataset`] adds classification
//! and ingestion in front.

use std::collections::HashMap;

use log::{debug, info};

use crate::config::{CalibrationConfig, CenteringConfig, MapperConfig};
use crate::core::dataset::{
    coordinate_key, distinct_count, distinct_in_order, Axis, Centering, DatasetError, Result,
    ScanDataset, ScanVariant,
};
use crate::core::loaders::RawTable;
use crate::core::transforms::cartesian_to_cylindrical;

use super::classifier::{classify, ingest};

/// Classify, ingest and normalize a table into a read-only dataset.
///
/// Nothing is returned unless every stage succeeds.
pub fn build_dataset(
    label: impl Into<String>,
    table: &RawTable,
    hint: Option<ScanVariant>,
    config: &MapperConfig,
) -> Result<ScanDataset> {
    let variant = classify(table, hint)?;
    let raw = ingest(label, table, variant, config.calibration)?;
    normalize(raw, config)
}

/// Run every normalization stage on an ingested dataset.
pub fn normalize(dataset: ScanDataset, config: &MapperConfig) -> Result<ScanDataset> {
    let dataset = derive_field(dataset, &config.calibration);
    let dataset = rectify_sign(dataset);
    let dataset = propagate_error(dataset);
    let dataset = center(dataset, &config.centering)?;
    Ok(compute_radius(dataset))
}

/// Derive field and its deviation from the probe voltage.
///
/// Nine-column tables keep their recorded field when
/// `use_recorded_field` is set.
pub fn derive_field(dataset: ScanDataset, calibration: &CalibrationConfig) -> ScanDataset {
    let samples = dataset
        .samples()
        .iter()
        .map(|s| {
            let mut s = *s;
            match s.recorded {
                Some((field, std_field)) if calibration.use_recorded_field => {
                    s.field = field;
                    s.std_field = std_field;
                }
                _ => {
                    s.field = s.voltage * calibration.slope + calibration.intercept;
                    s.std_field = s.std_voltage * calibration.slope.abs();
                }
            }
            s
        })
        .collect();

    dataset.with_samples(samples)
}

/// Flip every field value if the largest-magnitude sample is negative.
///
/// Applying this twice is the same as applying it once.
pub fn rectify_sign(dataset: ScanDataset) -> ScanDataset {
    let negative_peak = dataset.peak_sample().map_or(false, |s| s.field < 0.0);
    if !negative_peak {
        return dataset;
    }

    info!("{}: peak field is negative, flipping sign", dataset.label());
    let samples = dataset
        .samples()
        .iter()
        .map(|s| {
            let mut s = *s;
            s.field = -s.field;
            s
        })
        .collect();

    dataset.with_samples(samples)
}

/// Standard error of the mean, `std_field / sqrt(n)`.
///
/// Samples reporting fewer than one reading keep their raw deviation.
pub fn propagate_error(dataset: ScanDataset) -> ScanDataset {
    let samples = dataset
        .samples()
        .iter()
        .map(|s| {
            let mut s = *s;
            s.sem = if s.n >= 1.0 {
                s.std_field / s.n.sqrt()
            } else {
                s.std_field
            };
            s
        })
        .collect();

    dataset.with_samples(samples)
}

/// Axis the probe stage actually moved along: x if it varies, else y if it
/// varies, else x.
pub fn swept_axis(dataset: &ScanDataset) -> Axis {
    let xs = distinct_count(dataset.samples().iter().map(|s| s.x));
    let ys = distinct_count(dataset.samples().iter().map(|s| s.y));
    if xs <= 1 && ys > 1 {
        Axis::Y
    } else {
        Axis::X
    }
}

/// Peak-to-peak spread at one swept-axis position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CentreCandidate {
    pub position: f64,
    pub peak_to_peak: f64,
    pub min_field: f64,
}

/// Peak-to-peak values closer than this (tesla) count as a tie.
const PEAK_TO_PEAK_TIE: f64 = 1e-9;

impl CentreCandidate {
    /// Smaller swing wins; on a tie the stronger minimum field wins, since
    /// the axis of a magnet sees the field maximum.
    fn beats(&self, other: &CentreCandidate) -> bool {
        if (self.peak_to_peak - other.peak_to_peak).abs() <= PEAK_TO_PEAK_TIE {
            self.min_field > other.min_field
        } else {
            self.peak_to_peak < other.peak_to_peak
        }
    }
}

/// Score every swept-axis position at the shallowest depth.
///
/// Candidates come back in first-encountered order.
pub fn centre_candidates(dataset: &ScanDataset, axis: Axis) -> Vec<CentreCandidate> {
    let samples = dataset.samples();
    let Some(shallowest) = samples.iter().map(|s| s.z).reduce(f64::min) else {
        return Vec::new();
    };
    let shallow_key = coordinate_key(shallowest);

    let mut extremes: HashMap<u64, (f64, f64)> = HashMap::new();
    for s in samples.iter().filter(|s| coordinate_key(s.z) == shallow_key) {
        let entry = extremes
            .entry(coordinate_key(s.coordinate(axis)))
            .or_insert((f64::INFINITY, f64::NEG_INFINITY));
        entry.0 = entry.0.min(s.field);
        entry.1 = entry.1.max(s.field);
    }

    let positions = distinct_in_order(
        samples
            .iter()
            .filter(|s| coordinate_key(s.z) == shallow_key)
            .map(|s| s.coordinate(axis)),
    );

    positions
        .into_iter()
        .filter_map(|position| {
            extremes
                .get(&coordinate_key(position))
                .map(|&(lo, hi)| CentreCandidate {
                    position,
                    peak_to_peak: hi - lo,
                    min_field: lo,
                })
        })
        .collect()
}

/// Move the rotation axis of a rotational scan to the origin.
///
/// The swept-axis position with the smallest field swing over a full turn
/// is taken as the axis; equal swings go to the position with the highest
/// minimum field, then to the first one scanned. The transverse coordinate
/// is set to zero; its true offset is not solved for. Other variants pass
/// through untouched.
///
/// # Errors
///
/// `DatasetError::Centering` when no position passes the bias filter.
pub fn center(dataset: ScanDataset, config: &CenteringConfig) -> Result<ScanDataset> {
    if dataset.variant() != ScanVariant::Rotational {
        return Ok(dataset);
    }

    let axis = swept_axis(&dataset);
    let mean = dataset.mean_field();

    let best = centre_candidates(&dataset, axis)
        .into_iter()
        .filter(|c| !config.bias_filter || c.min_field > mean)
        .fold(None, |best: Option<CentreCandidate>, c| match best {
            Some(b) if !c.beats(&b) => Some(b),
            _ => Some(c),
        })
        .ok_or_else(|| {
            DatasetError::Centering(format!(
                "{}: no {} position has a minimum field above the mean {:.6}",
                dataset.label(),
                axis,
                mean
            ))
        })?;

    debug!(
        "{}: centre at {} = {} (peak-to-peak {:.6})",
        dataset.label(),
        axis,
        best.position,
        best.peak_to_peak
    );

    let samples = dataset
        .samples()
        .iter()
        .map(|s| {
            let mut s = *s;
            s.set_coordinate(axis, s.coordinate(axis) - best.position);
            let transverse = match axis {
                Axis::X => Axis::Y,
                Axis::Y => Axis::X,
            };
            s.set_coordinate(transverse, 0.0);
            s
        })
        .collect();

    Ok(dataset.with_samples(samples).with_centering(Centering {
        swept_axis: axis,
        offset: best.position,
    }))
}

/// Planar radius of every sample of a rotational scan.
pub fn compute_radius(dataset: ScanDataset) -> ScanDataset {
    if dataset.variant() != ScanVariant::Rotational {
        return dataset;
    }

    let samples = dataset
        .samples()
        .iter()
        .map(|s| {
            let mut s = *s;
            let (r, _) = cartesian_to_cylindrical(s.x, s.y);
            s.r = Some(r);
            s
        })
        .collect();

    dataset.with_samples(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::Sample;
    use std::f64::consts::TAU;

    fn rectangular_table(volts: impl Fn(f64, f64, f64) -> f64) -> RawTable {
        let mut rows = Vec::new();
        for z in [0.0, 5.0] {
            for y in [0.0, 1.0, 2.0] {
                for x in [0.0, 1.0, 2.0] {
                    rows.push(vec![x, y, z, volts(x, y, z), 0.002, 4.0]);
                }
            }
        }
        RawTable::from_rows(rows).unwrap()
    }

    /// Turntable scan whose rotation axis sits at `x = centre`. The field in
    /// the magnet frame falls off radially; a nonzero `tilt` adds a
    /// first-harmonic term so only the probe position on the axis sees no
    /// swing.
    fn tilted_table(centre: f64, positions: &[f64], angles: usize, tilt: f64) -> RawTable {
        let mut rows = Vec::new();
        for z in [-2.0, 0.0] {
            for &x in positions {
                for k in 0..angles {
                    let theta = TAU * k as f64 / angles as f64;
                    let d = x - centre;
                    // probe position expressed in the rotating magnet frame
                    let px = d * theta.cos();
                    let field = 0.5 - 0.0005 * d * d + tilt * px - 0.01 * z;
                    rows.push(vec![
                        x,
                        -97.5,
                        z,
                        theta.to_degrees(),
                        0.0,
                        0.0,
                        field,
                        0.001,
                        9.0,
                    ]);
                }
            }
        }
        RawTable::from_rows(rows).unwrap()
    }

    fn rotational_table(centre: f64, positions: &[f64], angles: usize) -> RawTable {
        tilted_table(centre, positions, angles, 0.002)
    }

    fn recorded_config() -> MapperConfig {
        let mut config = MapperConfig::default();
        config.calibration.use_recorded_field = true;
        config
    }

    #[test]
    fn test_derive_field_uses_calibration() {
        let table = rectangular_table(|_, _, _| 1.0);
        let calibration = CalibrationConfig {
            slope: 2.0,
            intercept: -0.5,
            use_recorded_field: false,
        };
        let raw = ingest("cal", &table, ScanVariant::Rectangular, calibration).unwrap();

        let derived = derive_field(raw, &calibration);
        let s = derived.samples()[0];
        assert!((s.field - 1.5).abs() < 1e-12);
        assert!((s.std_field - 0.004).abs() < 1e-12);
    }

    #[test]
    fn test_rectify_sign_flips_negative_peak() {
        let config = MapperConfig::default();
        let table = rectangular_table(|x, y, _| if x == 1.0 && y == 1.0 { -1.0 } else { 0.1 });
        let dataset = build_dataset("neg", &table, None, &config).unwrap();

        let peak = dataset.peak_sample().unwrap();
        assert!(peak.field > 0.0);
        assert_eq!((peak.x, peak.y), (1.0, 1.0));
    }

    #[test]
    fn test_rectify_sign_is_idempotent() {
        let config = MapperConfig::default();
        let table = rectangular_table(|x, _, _| -0.2 * x - 0.1);
        let raw = ingest("idem", &table, ScanVariant::Rectangular, config.calibration).unwrap();
        let derived = derive_field(raw, &config.calibration);

        let once = rectify_sign(derived);
        let twice = rectify_sign(once.clone());

        assert_eq!(once, twice);
        assert!(once.peak_sample().unwrap().field > 0.0);
    }

    #[test]
    fn test_propagate_error() {
        let config = MapperConfig::default();
        let table = rectangular_table(|_, _, _| 1.0);
        let dataset = build_dataset("sem", &table, None, &config).unwrap();

        let s = dataset.samples()[0];
        // n = 4
        assert!((s.sem - s.std_field / 2.0).abs() < 1e-15);
    }

    #[test]
    fn test_rectangular_is_not_centred() {
        let config = MapperConfig::default();
        let table = rectangular_table(|x, y, _| 1.0 + x + y);
        let dataset = build_dataset("rect", &table, None, &config).unwrap();

        assert!(dataset.centering().is_none());
        assert!(dataset.samples().iter().all(|s| s.r.is_none()));
        assert_eq!(dataset.samples()[4].x, 1.0);
    }

    #[test]
    fn test_centering_recovers_axis() {
        let centre = 33.0;
        let positions: Vec<f64> = (0..21).map(|i| 23.0 + i as f64).collect();
        let table = rotational_table(centre, &positions, 36);

        let dataset = build_dataset("rot", &table, None, &recorded_config()).unwrap();
        let centering = dataset.centering().unwrap();

        assert_eq!(centering.swept_axis, Axis::X);
        assert!((centering.offset - centre).abs() <= 1.0);
        assert!(dataset.samples().iter().all(|s| s.y == 0.0));
        assert!(dataset.samples().iter().all(|s| s.r.is_some()));
    }

    #[test]
    fn test_centering_axisymmetric_field() {
        // no swing anywhere: the axis is where the field peaks
        let positions: Vec<f64> = (23..=43).map(f64::from).collect();
        let table = tilted_table(33.0, &positions, 36, 0.0);

        let dataset = build_dataset("sym", &table, None, &recorded_config()).unwrap();

        assert_eq!(dataset.centre_offset(), Some(33.0));
    }

    #[test]
    fn test_centre_ties_prefer_stronger_field() {
        let weak = CentreCandidate {
            position: 1.0,
            peak_to_peak: 0.0,
            min_field: 0.4,
        };
        let strong = CentreCandidate {
            position: 2.0,
            min_field: 0.5,
            ..weak
        };
        let steadier = CentreCandidate {
            position: 3.0,
            peak_to_peak: -0.1,
            min_field: 0.1,
        };

        assert!(strong.beats(&weak));
        assert!(!weak.beats(&strong));
        assert!(!weak.beats(&weak));
        assert!(steadier.beats(&strong));
    }

    #[test]
    fn test_centering_off_grid_axis_within_one_step() {
        let centre = 33.4;
        let positions: Vec<f64> = (0..21).map(|i| 23.0 + i as f64).collect();
        let table = rotational_table(centre, &positions, 36);

        let dataset = build_dataset("rot", &table, None, &recorded_config()).unwrap();
        let offset = dataset.centering().unwrap().offset;

        assert!((offset - centre).abs() <= 1.0, "offset {}", offset);
    }

    #[test]
    fn test_radius_after_centering() {
        let positions: Vec<f64> = (0..11).map(|i| 10.0 + i as f64).collect();
        let table = rotational_table(15.0, &positions, 12);

        let dataset = build_dataset("rot", &table, None, &recorded_config()).unwrap();

        for s in dataset.samples() {
            assert!((s.r.unwrap() - (s.x).abs()).abs() < 1e-12);
        }
    }

    #[test]
    fn test_centering_error_when_bias_filter_rejects_all() {
        let mut samples = Vec::new();
        for (i, x) in [0.0, 1.0].iter().enumerate() {
            for k in 0..4 {
                // every position dips below the mean at some angle
                let field = if k == i { 0.0 } else { 1.0 };
                samples.push(Sample {
                    x: *x,
                    y: 0.0,
                    z: 0.0,
                    theta: Some(k as f64),
                    r: None,
                    voltage: 0.0,
                    std_voltage: 0.0,
                    n: 1.0,
                    field,
                    std_field: 0.0,
                    sem: 0.0,
                    recorded: None,
                });
            }
        }
        let dataset = ScanDataset::new(
            "dip",
            ScanVariant::Rotational,
            samples,
            CalibrationConfig::default(),
        );

        let strict = center(dataset.clone(), &CenteringConfig { bias_filter: true });
        assert!(matches!(strict, Err(DatasetError::Centering(_))));

        let relaxed = center(dataset, &CenteringConfig { bias_filter: false }).unwrap();
        assert_eq!(relaxed.centering().map(|c| c.offset), Some(0.0));
    }

    #[test]
    fn test_candidates_use_shallowest_depth() {
        let positions = [0.0, 1.0, 2.0];
        let table = rotational_table(1.0, &positions, 8);
        let raw = ingest("c", &table, ScanVariant::Rotational, CalibrationConfig::default())
            .unwrap();
        let dataset = derive_field(
            raw,
            &CalibrationConfig {
                use_recorded_field: true,
                ..CalibrationConfig::default()
            },
        );

        let candidates = centre_candidates(&dataset, Axis::X);

        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].position, 0.0);
        assert!(candidates[1].peak_to_peak < 1e-12);
        assert!(candidates[0].peak_to_peak > candidates[1].peak_to_peak);
    }
}
