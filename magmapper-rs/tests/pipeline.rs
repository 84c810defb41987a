//! End-to-end run of a small rectangular scan through the public API.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use magmapper::core::load_table;
use magmapper::processors::{
    build_dataset, classify, derive_field, ingest, interpolate_slice, partition, SlicePoints,
};
use magmapper::{InterpolationConfig, MapperConfig, ScanVariant};
use tempfile::TempDir;

fn write_scan(dir: &Path) -> PathBuf {
    let path = dir.join("rect.csv");
    let mut file = File::create(&path).unwrap();
    for z in [0.0, 5.0] {
        for y in 0..3 {
            for x in 0..3 {
                let volts = if x == 1 && y == 1 && z == 0.0 { 0.9 } else { 0.35 };
                writeln!(file, "{},{},{},{},0.004,25", x, y, z, volts).unwrap();
            }
        }
    }
    path
}

#[test]
fn rectangular_scan_end_to_end() {
    let dir = TempDir::new().unwrap();
    let path = write_scan(dir.path());
    let config = MapperConfig::default();

    let table = load_table(&path).unwrap();
    assert_eq!(table.num_rows(), 18);
    assert_eq!(classify(&table, None).unwrap(), ScanVariant::Rectangular);

    let dataset = build_dataset("rect", &table, None, &config).unwrap();
    assert_eq!(dataset.variant(), ScanVariant::Rectangular);
    assert_eq!(dataset.len(), 18);
    assert!(dataset.centering().is_none());

    let partition = partition(&dataset);
    assert_eq!(partition.slices.len(), 2);
    assert!(partition.slices.iter().all(|s| s.len() == 9));
    assert!(partition.duplicates.is_empty());
    assert_eq!(partition.analysed_len(), 18);
    assert_eq!(partition.slices[0].z, 0.0);
    assert_eq!(partition.slices[1].z, 5.0);

    // Peak is already positive, so rectification must not change any field.
    let raw = ingest("rect", &table, ScanVariant::Rectangular, config.calibration).unwrap();
    let derived = derive_field(raw, &config.calibration);
    for (expected, actual) in derived.samples().iter().zip(dataset.samples()) {
        assert_eq!(expected.field, actual.field);
    }

    let peak = dataset.peak_sample().unwrap();
    assert_eq!((peak.x, peak.y, peak.z), (1.0, 1.0, 0.0));
    assert!(peak.field > 0.0);
}

#[test]
fn rectangular_slice_interpolates_inside_hull() {
    let dir = TempDir::new().unwrap();
    let path = write_scan(dir.path());
    let config = MapperConfig::default();

    let table = load_table(&path).unwrap();
    let dataset = build_dataset("rect", &table, None, &config).unwrap();
    let partition = partition(&dataset);

    let slice = &partition.slices[1];
    assert!(matches!(slice.points, SlicePoints::Planar(_)));

    let grid = interpolate_slice(slice, &InterpolationConfig { grid_size: 11 }).unwrap();
    let expected = config.calibration.slope * 0.35 + config.calibration.intercept;

    // The square is its own convex hull, so every node has data.
    assert_eq!(grid.filled(), 121);
    let (lo, hi) = grid.value_range().unwrap();
    assert!((lo - expected).abs() < 1e-9);
    assert!((hi - expected).abs() < 1e-9);
}
