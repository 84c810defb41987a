//! CSV writers for slices, grids, spectra and duplicate reports.
//!
//! Every writer creates missing parent directories and writes a header row.
//! Coordinates get six decimals; angles and fields get nine.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

use crate::processors::homogeneity::HomogeneitySpectrum;
use crate::processors::interpolation::InterpolatedGrid;
use crate::processors::partition::{DuplicateGroup, Slice, SlicePoints};

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Grid values do not match its axes.
    #[error("grid has {found} values, expected {expected}")]
    LengthMismatch { expected: usize, found: usize },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

type CsvWriter = csv::Writer<BufWriter<File>>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Open a CSV writer and emit the header row.
fn create_csv_writer(path: &Path, header: &[&str]) -> Result<CsvWriter> {
    ensure_parent_dirs(path)?;

    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    write_row(&mut writer, path, header)?;
    Ok(writer)
}

fn write_row<I, T>(writer: &mut CsvWriter, path: &Path, record: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    writer
        .write_record(record)
        .map_err(|e| WriteError::CsvError {
            path: path.display().to_string(),
            source: e,
        })
}

fn finish(mut writer: CsvWriter, path: &Path) -> Result<()> {
    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })
}

/// Write every slice sample, one row each, tagged with slice index and depth.
///
/// Columns follow the slice payload:
/// - radial: `slice,z,r,theta,field,sem`
/// - planar: `slice,z,x,y,field`
/// - profile: `slice,z,axis,position,field,sem`
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to.
pub fn write_slices_csv(path: &Path, slices: &[Slice]) -> Result<()> {
    let header: &[&str] = match slices.first().map(|s| &s.points) {
        Some(SlicePoints::Radial(_)) => &["slice", "z", "r", "theta", "field", "sem"],
        Some(SlicePoints::Profile { .. }) => &["slice", "z", "axis", "position", "field", "sem"],
        Some(SlicePoints::Planar(_)) | None => &["slice", "z", "x", "y", "field"],
    };
    let mut writer = create_csv_writer(path, header)?;

    for (idx, slice) in slices.iter().enumerate() {
        let (index, z) = (idx.to_string(), format!("{:.6}", slice.z));
        match &slice.points {
            SlicePoints::Radial(points) => {
                for p in points {
                    write_row(
                        &mut writer,
                        path,
                        [
                            index.clone(),
                            z.clone(),
                            format!("{:.6}", p.r),
                            format!("{:.9}", p.theta),
                            format!("{:.9}", p.field),
                            format!("{:.9}", p.sem),
                        ],
                    )?;
                }
            }
            SlicePoints::Planar(points) => {
                for p in points {
                    write_row(
                        &mut writer,
                        path,
                        [
                            index.clone(),
                            z.clone(),
                            format!("{:.6}", p.x),
                            format!("{:.6}", p.y),
                            format!("{:.9}", p.field),
                        ],
                    )?;
                }
            }
            SlicePoints::Profile { axis, points } => {
                for p in points {
                    write_row(
                        &mut writer,
                        path,
                        [
                            index.clone(),
                            z.clone(),
                            axis.to_string(),
                            format!("{:.6}", p.position),
                            format!("{:.9}", p.field),
                            format!("{:.9}", p.sem),
                        ],
                    )?;
                }
            }
        }
    }

    finish(writer, path)
}

/// Write an interpolated grid as `x,y,field`; nodes without data get an
/// empty field cell.
///
/// # Errors
///
/// Returns an error if the value count does not match the axes, or if the
/// file cannot be created or written to.
pub fn write_grid_csv(path: &Path, grid: &InterpolatedGrid) -> Result<()> {
    let expected = grid.xs.len() * grid.ys.len();
    if grid.values.len() != expected {
        return Err(WriteError::LengthMismatch {
            expected,
            found: grid.values.len(),
        });
    }

    let mut writer = create_csv_writer(path, &["x", "y", "field"])?;
    for (x, y, value) in grid.iter() {
        write_row(
            &mut writer,
            path,
            [
                format!("{:.6}", x),
                format!("{:.6}", y),
                value.map(|v| format!("{:.9}", v)).unwrap_or_default(),
            ],
        )?;
    }

    finish(writer, path)
}

/// Write one row per (slice, radius) spectrum with swing and uncertainty in
/// millitesla.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to.
pub fn write_spectrum_csv(path: &Path, spectrum: &HomogeneitySpectrum) -> Result<()> {
    let mut writer = create_csv_writer(
        path,
        &["slice", "z", "radius", "samples", "peak_to_peak_mT", "uncertainty_mT"],
    )?;

    for s in &spectrum.spectra {
        write_row(
            &mut writer,
            path,
            [
                s.slice.to_string(),
                format!("{:.6}", s.z),
                format!("{:.6}", s.radius),
                s.samples.to_string(),
                format!("{:.6}", s.peak_to_peak * 1000.0),
                format!("{:.6}", s.uncertainty * 1000.0),
            ],
        )?;
    }

    finish(writer, path)
}

/// Write every duplicated sample with the index of its group.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to.
pub fn write_duplicates_csv(path: &Path, groups: &[DuplicateGroup]) -> Result<()> {
    let mut writer = create_csv_writer(path, &["group", "x", "y", "z", "field", "sem", "spread"])?;

    for (idx, group) in groups.iter().enumerate() {
        let spread = format!("{:.9}", group.field_spread());
        for s in &group.samples {
            write_row(
                &mut writer,
                path,
                [
                    idx.to_string(),
                    format!("{:.6}", s.x),
                    format!("{:.6}", s.y),
                    format!("{:.6}", s.z),
                    format!("{:.9}", s.field),
                    format!("{:.9}", s.sem),
                    spread.clone(),
                ],
            )?;
        }
    }

    finish(writer, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::{Axis, Sample};
    use crate::core::transforms::CartesianPoint;
    use crate::processors::homogeneity::RadialSpectrum;
    use crate::processors::partition::{ProfilePoint, RadialPoint};
    use std::fs;
    use tempfile::tempdir;

    fn planar_slices() -> Vec<Slice> {
        vec![
            Slice {
                z: 0.0,
                points: SlicePoints::Planar(vec![
                    CartesianPoint::new(0.0, 0.0, 0.5),
                    CartesianPoint::new(1.0, 0.0, 0.25),
                ]),
            },
            Slice {
                z: 5.0,
                points: SlicePoints::Planar(vec![CartesianPoint::new(0.0, 0.0, 0.4)]),
            },
        ]
    }

    #[test]
    fn test_write_planar_slices() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("slices.csv");

        write_slices_csv(&path, &planar_slices()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "slice,z,x,y,field");
        assert_eq!(lines.len(), 4);
        assert!(lines[3].starts_with("1,5.000000,"));
    }

    #[test]
    fn test_write_radial_and_profile_headers() {
        let dir = tempdir().unwrap();
        let radial = dir.path().join("radial.csv");
        let profile = dir.path().join("profile.csv");

        write_slices_csv(
            &radial,
            &[Slice {
                z: 0.0,
                points: SlicePoints::Radial(vec![RadialPoint {
                    r: 1.0,
                    theta: 0.5,
                    field: 0.3,
                    sem: 0.001,
                }]),
            }],
        )
        .unwrap();
        write_slices_csv(
            &profile,
            &[Slice {
                z: 0.0,
                points: SlicePoints::Profile {
                    axis: Axis::Y,
                    points: vec![ProfilePoint {
                        position: 2.0,
                        field: 0.3,
                        sem: 0.001,
                    }],
                },
            }],
        )
        .unwrap();

        let radial = fs::read_to_string(&radial).unwrap();
        assert!(radial.starts_with("slice,z,r,theta,field,sem"));
        let profile = fs::read_to_string(&profile).unwrap();
        assert!(profile.contains("0,0.000000,y,2.000000,"));
    }

    #[test]
    fn test_write_grid_marks_missing_cells() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("grid.csv");
        let grid = InterpolatedGrid {
            xs: vec![0.0, 1.0],
            ys: vec![0.0, 1.0],
            values: vec![Some(1.0), None, Some(0.5), Some(0.0)],
        };

        write_grid_csv(&path, &grid).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "x,y,field");
        assert_eq!(lines[2], "1.000000,0.000000,");
        assert_eq!(lines[4], "1.000000,1.000000,0.000000000");
    }

    #[test]
    fn test_write_grid_length_mismatch() {
        let dir = tempdir().unwrap();
        let grid = InterpolatedGrid {
            xs: vec![0.0, 1.0],
            ys: vec![0.0, 1.0],
            values: vec![Some(1.0)],
        };

        match write_grid_csv(&dir.path().join("g.csv"), &grid) {
            Err(WriteError::LengthMismatch { expected, found }) => {
                assert_eq!(expected, 4);
                assert_eq!(found, 1);
            }
            other => panic!("Expected LengthMismatch error, got {:?}", other),
        }
    }

    #[test]
    fn test_write_spectrum() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spectrum.csv");
        let spectrum = HomogeneitySpectrum {
            spectra: vec![RadialSpectrum {
                slice: 0,
                z: -2.0,
                radius: 10.0,
                samples: 36,
                amplitudes: vec![1.0],
                frequencies: vec![0.0],
                peak_to_peak: 0.002,
                uncertainty: 0.0001,
            }],
            inhomogeneity: 2.0,
            uncertainty: 0.1,
            mean_field: 0.5,
        };

        write_spectrum_csv(&path, &spectrum).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "0,-2.000000,10.000000,36,2.000000,0.100000");
    }

    #[test]
    fn test_write_duplicates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dups.csv");
        let sample = Sample {
            x: 1.0,
            y: 2.0,
            z: 0.0,
            theta: None,
            r: None,
            voltage: 0.0,
            std_voltage: 0.0,
            n: 1.0,
            field: 0.5,
            std_field: 0.0,
            sem: 0.0,
            recorded: None,
        };
        let groups = vec![DuplicateGroup {
            key: (1.0, 2.0, 0.0),
            samples: vec![sample, Sample { field: 0.75, ..sample }],
        }];

        write_duplicates_csv(&path, &groups).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "group,x,y,z,field,sem,spread");
        assert!(lines[1].starts_with("0,1.000000,2.000000"));
        assert!(lines[1].ends_with(",0.250000000"));
        assert!(lines[2].ends_with(",0.250000000"));
    }
}
