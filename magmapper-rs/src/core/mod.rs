//! Core data types and I/O operations.

pub mod dataset;
pub mod loaders;
pub mod transforms;
pub mod writers;

pub use dataset::{Axis, Centering, DatasetError, Sample, ScanDataset, ScanVariant};
pub use loaders::{load_table, LoaderError, RawTable};
pub use writers::{
    write_duplicates_csv, write_grid_csv, write_slices_csv, write_spectrum_csv, WriteError,
};
