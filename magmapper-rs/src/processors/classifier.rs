//! Scan-variant classification from table shape.
//!
//! Six columns are always a rectangular raster. Nine columns are a rotational
//! sweep unless only one turntable angle was recorded, in which case the
//! table is a fixed-axis line scan and the constant planar coordinate tells
//! which axis was stepped.

use log::debug;

use crate::core::dataset::{distinct_count, DatasetError, Result, Sample, ScanDataset, ScanVariant};
use crate::core::loaders::RawTable;
use crate::config::CalibrationConfig;

/// Column positions in the 9-column rotational export.
mod rotational_columns {
    pub const X: usize = 0;
    pub const Y: usize = 1;
    pub const Z: usize = 2;
    pub const THETA_DEG: usize = 3;
    pub const VOLTS: usize = 4;
    pub const STD_VOLTS: usize = 5;
    pub const FIELD: usize = 6;
    pub const STD_FIELD: usize = 7;
    pub const N: usize = 8;
}

/// Column positions in the 6-column rectangular export.
mod rectangular_columns {
    pub const X: usize = 0;
    pub const Y: usize = 1;
    pub const Z: usize = 2;
    pub const VOLTS: usize = 3;
    pub const STD_VOLTS: usize = 4;
    pub const N: usize = 5;
}

/// Decide the scan variant of a table.
///
/// `hint` lets the caller assert a variant; it is checked against the column
/// count but otherwise trusted.
///
/// # Errors
///
/// `DatasetError::Empty` for a table without rows, `DatasetError::Format`
/// for an unsupported column count, a hint that contradicts the column
/// count, or a single-angle table where neither x nor y is constant.
pub fn classify(table: &RawTable, hint: Option<ScanVariant>) -> Result<ScanVariant> {
    if table.is_empty() {
        return Err(DatasetError::Empty(source_label(table)));
    }

    let columns = table.num_columns();

    if let Some(variant) = hint {
        if variant.column_count() != columns {
            return Err(DatasetError::Format(format!(
                "{} expects {} columns, table has {}",
                variant,
                variant.column_count(),
                columns
            )));
        }
        return Ok(variant);
    }

    let variant = match columns {
        6 => ScanVariant::Rectangular,
        9 => classify_nine_columns(table)?,
        n => {
            return Err(DatasetError::Format(format!(
                "expected 6 or 9 columns, found {}",
                n
            )))
        }
    };

    debug!("{}: classified as {}", source_label(table), variant);
    Ok(variant)
}

fn classify_nine_columns(table: &RawTable) -> Result<ScanVariant> {
    use rotational_columns::*;

    let thetas = distinct_count(table.rows().iter().map(|row| row[THETA_DEG]));
    if thetas > 1 {
        return Ok(ScanVariant::Rotational);
    }

    let xs = distinct_count(table.rows().iter().map(|row| row[X]));
    let ys = distinct_count(table.rows().iter().map(|row| row[Y]));

    if xs == 1 {
        Ok(ScanVariant::FixedY)
    } else if ys == 1 {
        Ok(ScanVariant::FixedX)
    } else {
        Err(DatasetError::Format(format!(
            "single-angle table varies in both x ({} values) and y ({} values)",
            xs, ys
        )))
    }
}

/// Turn table rows into samples for the given variant.
///
/// Angles are converted from degrees once, here. Field columns start at zero
/// (rectangular) or at the recorded values (9-column tables); the normalizer
/// derives the working field afterwards.
pub fn ingest(
    label: impl Into<String>,
    table: &RawTable,
    variant: ScanVariant,
    calibration: CalibrationConfig,
) -> Result<ScanDataset> {
    let label = label.into();
    if table.is_empty() {
        return Err(DatasetError::Empty(label));
    }
    if table.num_columns() != variant.column_count() {
        return Err(DatasetError::Format(format!(
            "{} expects {} columns, table has {}",
            variant,
            variant.column_count(),
            table.num_columns()
        )));
    }

    let samples: Vec<Sample> = match variant {
        ScanVariant::Rectangular => table.rows().iter().map(|row| rectangular_sample(row)).collect(),
        _ => table.rows().iter().map(|row| rotational_sample(row)).collect(),
    };

    Ok(ScanDataset::new(label, variant, samples, calibration))
}

fn rectangular_sample(row: &[f64]) -> Sample {
    use rectangular_columns::*;

    Sample {
        x: row[X],
        y: row[Y],
        z: row[Z],
        theta: None,
        r: None,
        voltage: row[VOLTS],
        std_voltage: row[STD_VOLTS],
        n: row[N],
        field: 0.0,
        std_field: 0.0,
        sem: 0.0,
        recorded: None,
    }
}

fn rotational_sample(row: &[f64]) -> Sample {
    use rotational_columns::*;

    Sample {
        x: row[X],
        y: row[Y],
        z: row[Z],
        theta: Some(row[THETA_DEG].to_radians()),
        r: None,
        voltage: row[VOLTS],
        std_voltage: row[STD_VOLTS],
        n: row[N],
        field: row[FIELD],
        std_field: row[STD_FIELD],
        sem: 0.0,
        recorded: Some((row[FIELD], row[STD_FIELD])),
    }
}

fn source_label(table: &RawTable) -> String {
    table
        .source_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<memory>".to_string())
}
