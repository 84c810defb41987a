//! Radial Fourier characterisation of field homogeneity.
//!
//! At every target radius the samples of each slice lying in a thin annulus
//! are ordered by angle and treated as one period of a periodic signal. The
//! one-sided amplitude spectrum and the peak-to-peak swing are recorded per
//! (slice, radius) pair; the swings averaged over all pairs give the
//! inhomogeneity score.

use std::f64::consts::{PI, TAU};

use log::{debug, warn};
use rayon::prelude::*;
use rustfft::{num_complex::Complex64, FftPlanner};
use serde::Serialize;

use crate::config::HomogeneityConfig;
use crate::core::dataset::{DatasetError, Result, ScanDataset, ScanVariant};

use super::partition::{partition, RadialPoint, Slice};

/// Vacuum permeability in H/m.
pub const MU_0: f64 = 4.0e-7 * PI;

/// Tesla to millitesla.
const MILLI: f64 = 1000.0;

/// Spectrum of one annulus of one slice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadialSpectrum {
    pub slice: usize,
    pub z: f64,
    pub radius: f64,
    pub samples: usize,
    /// One-sided amplitudes, scaled by `2/N`
    pub amplitudes: Vec<f64>,
    /// Bin frequencies in cycles per radian
    pub frequencies: Vec<f64>,
    /// Field swing over the annulus, tesla
    pub peak_to_peak: f64,
    /// Quadrature sum of the standard errors at the extremal samples, tesla
    pub uncertainty: f64,
}

/// Spectra for every (slice, radius) pair plus the aggregate score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HomogeneitySpectrum {
    pub spectra: Vec<RadialSpectrum>,
    /// Mean peak-to-peak swing in mT
    pub inhomogeneity: f64,
    /// Mean swing uncertainty in mT
    pub uncertainty: f64,
    /// Mean field of the source dataset, tesla
    pub mean_field: f64,
}

impl HomogeneitySpectrum {
    /// Field-weighted characteristic radius `Σ r·Q / Σ Q`.
    ///
    /// `Q = Σ_k f_k A_k³ (2 − B̄ A_k / (μ0² r)) / (B̄ r)` per spectrum, with
    /// `B̄` the dataset mean field. Spectra at `r = 0` are skipped. Returns
    /// `None` when the weights sum to zero or the mean field is zero.
    pub fn drag_force_radius(&self) -> Option<f64> {
        let b_mean = self.mean_field;
        if b_mean == 0.0 {
            return None;
        }

        let (rq, q_total) = self
            .spectra
            .iter()
            .filter(|s| s.radius > 0.0)
            .map(|s| {
                let r = s.radius;
                let q: f64 = s
                    .frequencies
                    .iter()
                    .zip(&s.amplitudes)
                    .map(|(&f, &a)| {
                        f * a.powi(3) * (2.0 - b_mean * a / (MU_0 * MU_0 * r)) / (b_mean * r)
                    })
                    .sum();
                (r * q, q)
            })
            .fold((0.0, 0.0), |(rq, qt), (a, b)| (rq + a, qt + b));

        if q_total == 0.0 || !q_total.is_finite() {
            None
        } else {
            Some(rq / q_total)
        }
    }
}

/// Spectrum of the samples within `tolerance` (exclusive) of `radius`.
///
/// The result is tagged as slice 0 at depth 0; callers analysing several
/// slices overwrite both. Returns `None` when the annulus is empty.
pub fn radial_spectrum(points: &[RadialPoint], radius: f64, tolerance: f64) -> Option<RadialSpectrum> {
    let mut ring: Vec<RadialPoint> = points
        .iter()
        .copied()
        .filter(|p| (p.r - radius).abs() < tolerance)
        .collect();
    if ring.is_empty() {
        return None;
    }
    ring.sort_by(|a, b| a.theta.total_cmp(&b.theta));

    let n = ring.len();
    let mut buffer: Vec<Complex64> = ring.iter().map(|p| Complex64::new(p.field, 0.0)).collect();
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(n).process(&mut buffer);

    let half = n / 2;
    let scale = 2.0 / n as f64;
    let amplitudes: Vec<f64> = buffer[..half].iter().map(|c| c.norm() * scale).collect();

    let spacing = if n > 1 {
        (ring[n - 1].theta - ring[0].theta) / (n - 1) as f64
    } else {
        0.0
    };
    let spacing = if spacing > 0.0 { spacing } else { TAU / n as f64 };
    let frequencies: Vec<f64> = (0..half).map(|k| k as f64 / (n as f64 * spacing)).collect();

    let (hi, lo) = ring.iter().skip(1).fold((ring[0], ring[0]), |(hi, lo), p| {
        (
            if p.field > hi.field { *p } else { hi },
            if p.field < lo.field { *p } else { lo },
        )
    });
    let peak_to_peak = hi.field - lo.field;
    let uncertainty = hi.sem.hypot(lo.sem);

    Some(RadialSpectrum {
        slice: 0,
        z: 0.0,
        radius,
        samples: n,
        amplitudes,
        frequencies,
        peak_to_peak,
        uncertainty,
    })
}

/// Characterise radial slices at the configured radii.
///
/// # Errors
///
/// `DatasetError::Structure` if any slice lacks a radius column.
pub fn characterize(
    slices: &[Slice],
    mean_field: f64,
    config: &HomogeneityConfig,
) -> Result<HomogeneitySpectrum> {
    let radial: Vec<&[RadialPoint]> = slices
        .iter()
        .map(|s| {
            s.radial().ok_or_else(|| {
                DatasetError::Structure(format!(
                    "slice at z = {} has no radius column; homogeneity needs a rotational scan",
                    s.z
                ))
            })
        })
        .collect::<Result<_>>()?;

    let radii = config.radii();
    let tolerance = config.radius_tolerance;

    let per_radius: Vec<Vec<RadialSpectrum>> = radii
        .par_iter()
        .map(|&radius| {
            radial
                .iter()
                .enumerate()
                .filter_map(|(idx, points)| {
                    radial_spectrum(points, radius, tolerance).map(|spectrum| RadialSpectrum {
                        slice: idx,
                        z: slices[idx].z,
                        ..spectrum
                    })
                })
                .collect()
        })
        .collect();

    let mut spectra: Vec<RadialSpectrum> = per_radius.into_iter().flatten().collect();
    spectra.sort_by(|a, b| a.slice.cmp(&b.slice).then(a.radius.total_cmp(&b.radius)));

    let (inhomogeneity, uncertainty) = if spectra.is_empty() {
        warn!("No samples fell within any target radius");
        (0.0, 0.0)
    } else {
        let count = spectra.len() as f64;
        (
            spectra.iter().map(|s| s.peak_to_peak).sum::<f64>() / count * MILLI,
            spectra.iter().map(|s| s.uncertainty).sum::<f64>() / count * MILLI,
        )
    };

    debug!(
        "{} spectra over {} radii, inhomogeneity {:.4} ± {:.4} mT",
        spectra.len(),
        radii.len(),
        inhomogeneity,
        uncertainty
    );

    Ok(HomogeneitySpectrum {
        spectra,
        inhomogeneity,
        uncertainty,
        mean_field,
    })
}

/// Partition a rotational dataset and characterise its slices.
///
/// # Errors
///
/// `DatasetError::Structure` for any variant other than a rotational scan.
pub fn characterize_dataset(
    dataset: &ScanDataset,
    config: &HomogeneityConfig,
) -> Result<HomogeneitySpectrum> {
    if dataset.variant() != ScanVariant::Rotational {
        return Err(DatasetError::Structure(format!(
            "{}: homogeneity analysis needs a rotational scan, got a {}",
            dataset.label(),
            dataset.variant()
        )));
    }
    let partition = partition(dataset);
    characterize(&partition.slices, dataset.mean_field(), config)
}
