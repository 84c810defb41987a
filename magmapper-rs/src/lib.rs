//! Geometry normalization and analysis of Hall-probe magnetic field maps.
//!
//! This crate provides tools for:
//! - Loading header-less probe tables and classifying their scan pattern
//! - Deriving field from probe voltage, rectifying sign and centring rotational scans
//! - Splitting scans into depth slices and setting duplicate measurements aside
//! - Clough–Tocher interpolation of scattered slices onto regular grids
//! - Angular harmonic (homogeneity) analysis of rotational scans
//! - Rotation-searching comparison of two magnets
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use magmapper::{processors::batch::load_dataset, processors::partition::partition, MapperConfig};
//!
//! let config = MapperConfig::default();
//! let dataset = load_dataset(Path::new("scan.csv"), None, &config).unwrap();
//! let slices = partition(&dataset).slices;
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{
    CalibrationConfig, CenteringConfig, ComparatorConfig, ComparisonMode, HomogeneityConfig,
    InterpolationConfig, MapperConfig,
};
pub use core::dataset::{DatasetError, ScanDataset, ScanVariant};
pub use core::loaders::RawTable;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
