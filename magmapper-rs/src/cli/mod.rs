//! Command-line interface for the field-map pipeline.

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::ComparisonMode;
use crate::core::dataset::{ScanDataset, ScanVariant};
use crate::MapperConfig;

#[derive(Parser)]
#[command(name = "magmapper")]
#[command(about = "Hall-probe magnetic field map analysis", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Scan variant to assume instead of classifying by table shape.
#[derive(Clone, Copy, ValueEnum)]
enum VariantArg {
    Rectangular,
    Rotational,
    FixedX,
    FixedY,
}

impl From<VariantArg> for ScanVariant {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Rectangular => ScanVariant::Rectangular,
            VariantArg::Rotational => ScanVariant::Rotational,
            VariantArg::FixedX => ScanVariant::FixedX,
            VariantArg::FixedY => ScanVariant::FixedY,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Pointwise,
    Spectral,
}

impl From<ModeArg> for ComparisonMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Pointwise => ComparisonMode::Pointwise,
            ModeArg::Spectral => ComparisonMode::Spectral,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize probe files and print one summary per file
    Summary {
        /// CSV files or directories containing them
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Write the depth slices of a scan to CSV
    Slices {
        /// Probe CSV file
        input: PathBuf,
        /// Output CSV file (duplicates go to <stem>_duplicates.csv alongside)
        output: PathBuf,
        /// Scan variant hint
        #[arg(long, value_enum)]
        variant: Option<VariantArg>,
    },

    /// Interpolate one slice onto a regular grid
    Grid {
        /// Probe CSV file
        input: PathBuf,
        /// Output CSV file
        output: PathBuf,
        /// Also render the grid as a PNG heatmap
        #[arg(long)]
        png: Option<PathBuf>,
        /// Slice index (0 = shallowest)
        #[arg(long, default_value_t = 0)]
        slice: usize,
        /// Nodes per grid side
        #[arg(long)]
        grid_size: Option<usize>,
        /// Scan variant hint
        #[arg(long, value_enum)]
        variant: Option<VariantArg>,
    },

    /// Angular homogeneity of a rotational scan
    Homogeneity {
        /// Probe CSV file
        input: PathBuf,
        /// Write per-radius spectra to CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Compare two magnets
    Compare {
        /// First probe CSV file
        first: PathBuf,
        /// Second probe CSV file
        second: PathBuf,
        /// Comparison mode
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Rotation step in radians
        #[arg(long)]
        resolution: Option<f64>,
        /// Slice index to compare
        #[arg(long)]
        slice: Option<usize>,
    },

    /// Plot a fixed-axis line scan
    Profile {
        /// Probe CSV file
        input: PathBuf,
        /// Output PNG file
        output: PathBuf,
        /// Scan variant hint
        #[arg(long, value_enum)]
        variant: Option<VariantArg>,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

fn format_optional(value: Option<f64>, unit: &str) -> String {
    value
        .map(|v| format!("{:.6} {}", v, unit))
        .unwrap_or_else(|| "-".to_string())
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let config = match &cli.config {
        Some(path) => match MapperConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                MapperConfig::default()
            }
        },
        None => MapperConfig::default(),
    };

    match cli.command {
        Commands::Summary { inputs } => {
            cmd_summary(&inputs, &config);
        }
        Commands::Slices { input, output, variant } => {
            cmd_slices(&input, &output, variant.map(Into::into), &config);
        }
        Commands::Grid { input, output, png, slice, grid_size, variant } => {
            let mut config = config;
            if let Some(size) = grid_size {
                config.interpolation.grid_size = size;
            }
            cmd_grid(&input, &output, png.as_deref(), slice, variant.map(Into::into), &config);
        }
        Commands::Homogeneity { input, csv } => {
            cmd_homogeneity(&input, csv.as_deref(), &config);
        }
        Commands::Compare { first, second, mode, resolution, slice } => {
            let mut config = config;
            if let Some(mode) = mode {
                config.comparator.mode = mode.into();
            }
            if let Some(resolution) = resolution {
                config.comparator.rotation_resolution = resolution;
            }
            if let Some(slice) = slice {
                config.comparator.slice_index = slice;
            }
            cmd_compare(&first, &second, &config);
        }
        Commands::Profile { input, output, variant } => {
            cmd_profile(&input, &output, variant.map(Into::into), &config);
        }
    }
}

/// Load one dataset or exit with the full error chain.
fn load_or_exit(path: &Path, hint: Option<ScanVariant>, config: &MapperConfig) -> ScanDataset {
    use crate::processors::batch;

    match batch::load_dataset(path, hint, config) {
        Ok(dataset) => dataset,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_summary(inputs: &[PathBuf], config: &MapperConfig) {
    use crate::processors::batch;

    let start = Instant::now();

    let files = batch::find_scan_files(inputs);
    if files.is_empty() {
        error!("No CSV files found");
        std::process::exit(1);
    }

    let spinner = create_spinner(&format!("Normalizing {} files...", files.len()));
    let results = batch::process_batch(&files, config);
    spinner.finish_and_clear();

    let mut failed = 0;
    for (path, result) in &results {
        match result {
            Ok(summary) => {
                print_summary(
                    &summary.label,
                    &[
                        ("File", path.display().to_string()),
                        ("Variant", summary.variant.to_string()),
                        ("Rows", summary.rows.to_string()),
                        ("Slices", summary.slices.to_string()),
                        (
                            "Duplicates",
                            format!(
                                "{} groups, {} rows",
                                summary.duplicate_groups, summary.duplicate_samples
                            ),
                        ),
                        ("Mean field", format!("{:.6} T", summary.mean_field)),
                        ("Max std. error", format_optional(summary.max_standard_error, "T")),
                        ("Centre offset", format_optional(summary.centre_offset, "mm")),
                    ],
                );
            }
            Err(e) => {
                failed += 1;
                error!("{:#}", e);
            }
        }
    }

    print_summary(
        "Summary Complete",
        &[
            ("Files", results.len().to_string()),
            ("Succeeded", (results.len() - failed).to_string()),
            ("Failed", failed.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

fn cmd_slices(input: &Path, output: &Path, hint: Option<ScanVariant>, config: &MapperConfig) {
    use crate::core::writers;
    use crate::processors::partition::partition;

    let start = Instant::now();

    let dataset = load_or_exit(input, hint, config);
    let partition = partition(&dataset);

    if let Err(e) = writers::write_slices_csv(output, &partition.slices) {
        error!("Failed to write slices: {}", e);
        std::process::exit(1);
    }

    let mut items = vec![
        ("Input file", input.display().to_string()),
        ("Variant", dataset.variant().to_string()),
        ("Slices", partition.slices.len().to_string()),
        ("Rows analysed", partition.analysed_len().to_string()),
        ("Output CSV", output.display().to_string()),
    ];

    if !partition.duplicates.is_empty() {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "slices".to_string());
        let duplicates_path = output.with_file_name(format!("{}_duplicates.csv", stem));
        if let Err(e) = writers::write_duplicates_csv(&duplicates_path, &partition.duplicates) {
            error!("Failed to write duplicates: {}", e);
            std::process::exit(1);
        }
        items.push(("Duplicate rows", partition.duplicate_len().to_string()));
        items.push(("Duplicates CSV", duplicates_path.display().to_string()));
    }

    items.push(("Duration", format!("{:.2?}", start.elapsed())));
    print_summary("Slices Written", &items);
}

fn cmd_grid(
    input: &Path,
    output: &Path,
    png: Option<&Path>,
    slice_index: usize,
    hint: Option<ScanVariant>,
    config: &MapperConfig,
) {
    use crate::core::writers;
    use crate::processors::interpolation::interpolate_slice;
    use crate::processors::partition::partition;
    use crate::visualization;

    let start = Instant::now();

    let dataset = load_or_exit(input, hint, config);
    let partition = partition(&dataset);

    let Some(slice) = partition.slices.get(slice_index) else {
        error!(
            "{} has {} slices, no slice {}",
            input.display(),
            partition.slices.len(),
            slice_index
        );
        std::process::exit(1);
    };

    let spinner = create_spinner(&format!(
        "Interpolating {} samples onto a {}x{} grid...",
        slice.len(),
        config.interpolation.grid_size,
        config.interpolation.grid_size
    ));

    let grid = match interpolate_slice(slice, &config.interpolation) {
        Ok(grid) => grid,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Interpolation failed: {}", e);
            std::process::exit(1);
        }
    };

    spinner.set_message("Writing grid...");

    if let Err(e) = writers::write_grid_csv(output, &grid) {
        spinner.finish_and_clear();
        error!("Failed to write grid: {}", e);
        std::process::exit(1);
    }

    if let Some(png_path) = png {
        spinner.set_message("Rendering heatmap...");
        if let Err(e) = visualization::plot_grid_heatmap(png_path, &grid) {
            spinner.finish_and_clear();
            error!("Visualization failed: {}", e);
            std::process::exit(1);
        }
    }

    spinner.finish_and_clear();

    let total = grid.size() * grid.ys.len();
    let range = grid
        .value_range()
        .map(|(lo, hi)| format!("{:.6} .. {:.6} T", lo, hi))
        .unwrap_or_else(|| "-".to_string());

    let mut items = vec![
        ("Input file", input.display().to_string()),
        ("Slice", format!("{} (z = {})", slice_index, slice.z)),
        ("Grid nodes", total.to_string()),
        ("Nodes with data", grid.filled().to_string()),
        ("Field range", range),
        ("Output CSV", output.display().to_string()),
    ];
    if let Some(png_path) = png {
        items.push(("Output PNG", png_path.display().to_string()));
    }
    items.push(("Duration", format!("{:.2?}", start.elapsed())));

    print_summary("Grid Complete", &items);
}

fn cmd_homogeneity(input: &Path, csv: Option<&Path>, config: &MapperConfig) {
    use crate::core::writers;
    use crate::processors::homogeneity::characterize_dataset;

    let start = Instant::now();

    let dataset = load_or_exit(input, None, config);

    let spinner = create_spinner("Resolving angular harmonics...");
    let spectrum = match characterize_dataset(&dataset, &config.homogeneity) {
        Ok(spectrum) => spectrum,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Homogeneity analysis failed: {}", e);
            std::process::exit(1);
        }
    };
    spinner.finish_and_clear();

    if let Some(csv_path) = csv {
        if let Err(e) = writers::write_spectrum_csv(csv_path, &spectrum) {
            error!("Failed to write spectra: {}", e);
            std::process::exit(1);
        }
    }

    let mut items = vec![
        ("Input file", input.display().to_string()),
        ("Radii resolved", spectrum.spectra.len().to_string()),
        (
            "Inhomogeneity",
            format!("{:.4} ± {:.4} mT", spectrum.inhomogeneity, spectrum.uncertainty),
        ),
        ("Mean field", format!("{:.6} T", spectrum.mean_field)),
        ("Drag radius", format_optional(spectrum.drag_force_radius(), "mm")),
    ];
    if let Some(csv_path) = csv {
        items.push(("Output CSV", csv_path.display().to_string()));
    }
    items.push(("Duration", format!("{:.2?}", start.elapsed())));

    print_summary("Homogeneity Complete", &items);
}

fn cmd_compare(first: &Path, second: &Path, config: &MapperConfig) {
    use crate::processors::comparator::compare;

    let start = Instant::now();

    let a = load_or_exit(first, None, config);
    let b = load_or_exit(second, None, config);

    let spinner = create_spinner("Searching rotations...");
    let result = match compare(&a, &b, config) {
        Ok(result) => result,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Comparison failed: {}", e);
            std::process::exit(1);
        }
    };
    spinner.finish_and_clear();

    let (mode, unit) = match result.mode {
        ComparisonMode::Pointwise => ("pointwise", "T²"),
        ComparisonMode::Spectral => ("spectral", "mT"),
    };

    print_summary(
        "Comparison Complete",
        &[
            ("First", a.label().to_string()),
            ("Second", b.label().to_string()),
            ("Mode", mode.to_string()),
            ("Best rotation", format!("{:.4} rad", result.best_rotation)),
            ("Dissimilarity", format!("{:.6e} {}", result.dissimilarity, unit)),
            ("Crop radius", format_optional(result.crop_radius, "mm")),
            ("Candidates", result.scores.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_profile(input: &Path, output: &Path, hint: Option<ScanVariant>, config: &MapperConfig) {
    use crate::processors::partition::{partition, SlicePoints};
    use crate::visualization;

    let start = Instant::now();

    let dataset = load_or_exit(input, hint, config);
    let partition = partition(&dataset);

    let profile = partition.slices.iter().find_map(|slice| match &slice.points {
        SlicePoints::Profile { axis, points } => Some((slice.z, *axis, points)),
        _ => None,
    });

    let Some((z, axis, points)) = profile else {
        error!("{} is a {}, not a fixed-axis slice", input.display(), dataset.variant());
        std::process::exit(1);
    };

    if let Err(e) = visualization::plot_profile(output, axis, points) {
        error!("Visualization failed: {}", e);
        std::process::exit(1);
    }

    print_summary(
        "Profile Complete",
        &[
            ("Input file", input.display().to_string()),
            ("Axis", axis.to_string()),
            ("Depth", z.to_string()),
            ("Samples", points.len().to_string()),
            ("Output PNG", output.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}
