//! Loader for header-less numeric probe tables.
//!
//! Probe exports are plain comma-separated rows of floating-point values with
//! no header. Column meaning is fixed by position and decided later by the
//! classifier, so this module only guarantees a rectangular numeric table.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use thiserror::Error;

/// Errors that can occur during file loading.
///
/// `row` is the 0-based index among data rows; blank lines are not counted.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Row {row} has {found} columns, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Parse error at row {row}, column {column}: {value:?}")]
    ParseError {
        row: usize,
        column: usize,
        value: String,
    },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Rectangular table of floating-point cells, one row per measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    rows: Vec<Vec<f64>>,
    columns: usize,
    /// Source file path.
    pub source_path: Option<PathBuf>,
}

impl RawTable {
    /// Build a table from in-memory rows, rejecting ragged input.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let columns = rows.first().map_or(0, |row| row.len());
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != columns {
                return Err(LoaderError::RaggedRow {
                    row: idx,
                    expected: columns,
                    found: row.len(),
                });
            }
        }

        Ok(Self {
            rows,
            columns,
            source_path: None,
        })
    }

    /// Number of columns shared by every row.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns
    }

    /// Number of rows.
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Borrow the rows.
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }
}

/// Load a header-less numeric table from a comma-separated file.
///
/// Blank lines are skipped. Every remaining row must have the same number of
/// cells and every cell must parse as a float.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is empty, has ragged rows,
/// or contains a non-numeric cell.
pub fn load_table<P: AsRef<Path>>(path: P) -> Result<RawTable> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(4096);

    for result in reader.records() {
        let record = result?;

        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }

        let row_idx = rows.len();
        if let Some(first) = rows.first() {
            if record.len() != first.len() {
                return Err(LoaderError::RaggedRow {
                    row: row_idx,
                    expected: first.len(),
                    found: record.len(),
                });
            }
        }

        let mut row = Vec::with_capacity(record.len());
        for (col_idx, cell) in record.iter().enumerate() {
            let value: f64 = cell.parse().map_err(|_| LoaderError::ParseError {
                row: row_idx,
                column: col_idx,
                value: cell.to_string(),
            })?;
            row.push(value);
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    let mut table = RawTable::from_rows(rows)?;
    table.source_path = Some(path.to_path_buf());
    Ok(table)
}
