//! Configuration types for the field-map pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hall-sensor calibration used to derive field from probe voltage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Tesla per volt
    #[serde(default = "default_hall_slope")]
    pub slope: f64,

    /// Field offset in tesla
    #[serde(default = "default_hall_intercept")]
    pub intercept: f64,

    /// Keep the field columns recorded by the probe software (9-column
    /// tables only) instead of re-deriving them from voltage.
    #[serde(default)]
    pub use_recorded_field: bool,
}

fn default_hall_slope() -> f64 {
    1.14189
}

fn default_hall_intercept() -> f64 {
    -0.010254
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            slope: default_hall_slope(),
            intercept: default_hall_intercept(),
            use_recorded_field: false,
        }
    }
}

/// Origin-finding parameters for rotational scans.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CenteringConfig {
    /// Only accept swept-axis positions whose minimum field exceeds the
    /// dataset mean field.
    #[serde(default = "default_bias_filter")]
    pub bias_filter: bool,
}

fn default_bias_filter() -> bool {
    true
}

impl Default for CenteringConfig {
    fn default() -> Self {
        Self {
            bias_filter: default_bias_filter(),
        }
    }
}

/// Scattered-data interpolation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterpolationConfig {
    /// Nodes per side of the square output grid
    #[serde(default = "default_grid_size")]
    pub grid_size: usize,
}

fn default_grid_size() -> usize {
    1000
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            grid_size: default_grid_size(),
        }
    }
}

/// Radial sampling used by the homogeneity analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HomogeneityConfig {
    /// First target radius in mm
    #[serde(default)]
    pub radius_min: f64,

    /// Last target radius in mm (inclusive)
    #[serde(default = "default_radius_max")]
    pub radius_max: f64,

    /// Number of evenly spaced target radii
    #[serde(default = "default_radius_count")]
    pub radius_count: usize,

    /// Half-width of the annulus selected around each target radius, in mm
    #[serde(default = "default_radius_tolerance")]
    pub radius_tolerance: f64,
}

fn default_radius_max() -> f64 {
    100.0
}

fn default_radius_count() -> usize {
    100
}

fn default_radius_tolerance() -> f64 {
    1.0
}

impl HomogeneityConfig {
    /// Target radii, evenly spaced over `[radius_min, radius_max]` inclusive.
    pub fn radii(&self) -> Vec<f64> {
        match self.radius_count {
            0 => Vec::new(),
            1 => vec![self.radius_min],
            n => {
                let step = (self.radius_max - self.radius_min) / (n - 1) as f64;
                (0..n).map(|i| self.radius_min + step * i as f64).collect()
            }
        }
    }
}

impl Default for HomogeneityConfig {
    fn default() -> Self {
        Self {
            radius_min: 0.0,
            radius_max: default_radius_max(),
            radius_count: default_radius_count(),
            radius_tolerance: default_radius_tolerance(),
        }
    }
}

/// How two maps are scored against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMode {
    /// Sum of squared field differences over a rotational search
    #[default]
    Pointwise,
    /// Difference of aggregate inhomogeneity scores
    Spectral,
}

/// Magnet-to-magnet comparison settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparatorConfig {
    /// Step between candidate rotations in radians
    #[serde(default = "default_rotation_resolution")]
    pub rotation_resolution: f64,

    #[serde(default)]
    pub mode: ComparisonMode,

    /// Which depth slice of each dataset to compare
    #[serde(default)]
    pub slice_index: usize,
}

fn default_rotation_resolution() -> f64 {
    0.1
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            rotation_resolution: default_rotation_resolution(),
            mode: ComparisonMode::default(),
            slice_index: 0,
        }
    }
}

/// Main configuration combining all sub-configs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MapperConfig {
    #[serde(default)]
    pub calibration: CalibrationConfig,

    #[serde(default)]
    pub centering: CenteringConfig,

    #[serde(default)]
    pub interpolation: InterpolationConfig,

    #[serde(default)]
    pub homogeneity: HomogeneityConfig,

    #[serde(default)]
    pub comparator: ComparatorConfig,
}

impl MapperConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: MapperConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
