//! Data processing modules.

pub mod batch;
pub mod classifier;
pub mod comparator;
pub mod homogeneity;
pub mod interpolation;
pub mod normalizer;
pub mod partition;
pub mod triangulation;

// Re-export key types for convenience
pub use batch::{find_scan_files, load_dataset, process_batch, DatasetSummary};
pub use classifier::{classify, ingest};
pub use comparator::{compare, ComparisonResult};
pub use homogeneity::{characterize, characterize_dataset, HomogeneitySpectrum, RadialSpectrum};
pub use interpolation::{interpolate, interpolate_slice, CloughTocher, InterpolatedGrid};
pub use normalizer::{
    build_dataset, center, compute_radius, derive_field, normalize, propagate_error, rectify_sign,
};
pub use partition::{partition, DuplicateGroup, Partition, Slice, SlicePoints};
pub use triangulation::Triangulation;
