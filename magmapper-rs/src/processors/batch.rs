//! Loading and normalizing many probe files at once.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::MapperConfig;
use crate::core::dataset::{ScanDataset, ScanVariant};
use crate::core::loaders::load_table;

use super::normalizer::build_dataset;
use super::partition::partition;

/// Per-file overview of a normalized dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub label: String,
    pub variant: ScanVariant,
    pub rows: usize,
    pub slices: usize,
    pub duplicate_groups: usize,
    pub duplicate_samples: usize,
    pub mean_field: f64,
    pub max_standard_error: Option<f64>,
    pub centre_offset: Option<f64>,
}

impl DatasetSummary {
    pub fn from_dataset(dataset: &ScanDataset) -> Self {
        let partition = partition(dataset);
        Self {
            label: dataset.label().to_string(),
            variant: dataset.variant(),
            rows: dataset.len(),
            slices: partition.slices.len(),
            duplicate_groups: partition.duplicates.len(),
            duplicate_samples: partition.duplicate_len(),
            mean_field: dataset.mean_field(),
            max_standard_error: dataset.max_standard_error(),
            centre_offset: dataset.centre_offset(),
        }
    }
}

/// Label used for datasets loaded from `path`: the file stem.
pub fn dataset_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Load one file and build a normalized dataset from it.
///
/// # Arguments
///
/// * `path` - Header-less 6- or 9-column CSV
/// * `hint` - Scan variant to assume instead of classifying by shape
/// * `config` - Pipeline configuration
pub fn load_dataset(
    path: &Path,
    hint: Option<ScanVariant>,
    config: &MapperConfig,
) -> Result<ScanDataset> {
    let table = load_table(path)
        .with_context(|| format!("Failed to load table: {}", path.display()))?;
    let dataset = build_dataset(dataset_label(path), &table, hint, config)
        .with_context(|| format!("Failed to normalize {}", path.display()))?;
    Ok(dataset)
}

/// Expand inputs into scan files: directories contribute their `.csv`
/// files (sorted), plain paths are kept as given.
pub fn find_scan_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut results = Vec::with_capacity(inputs.len());

    for input in inputs {
        if !input.is_dir() {
            results.push(input.clone());
            continue;
        }

        let mut csv_files: Vec<PathBuf> = fs::read_dir(input)
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
            })
            .collect();

        csv_files.sort();
        results.extend(csv_files);
    }

    results
}

/// Load, normalize and summarise files in parallel.
///
/// Every file gets its own result; one failure never affects the others.
/// Results come back in input order.
pub fn process_batch(
    paths: &[PathBuf],
    config: &MapperConfig,
) -> Vec<(PathBuf, Result<DatasetSummary>)> {
    let results: Vec<(PathBuf, Result<DatasetSummary>)> = paths
        .par_iter()
        .map(|path| {
            let summary =
                load_dataset(path, None, config).map(|dataset| DatasetSummary::from_dataset(&dataset));
            (path.clone(), summary)
        })
        .collect();

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    if failed > 0 {
        warn!("{} of {} files failed", failed, results.len());
    } else {
        info!("Processed {} files", results.len());
    }

    results
}
