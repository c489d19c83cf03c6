//! Conversion and logging configuration.
//!
//! Values come from defaults, an optional JSON file, then command-line
//! overrides, in that order. [`ConvertConfig::validate`] runs before any
//! stage touches the input.

use assetgen_recon::normals::MIN_NEIGHBORS;
use assetgen_recon::{MAX_DEPTH, NormalParams, PoissonConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Parameters of a point cloud or mesh conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertConfig {
    /// Stage `metersPerUnit`; coordinates are written unscaled.
    pub meters_per_unit: f64,
    /// Target face count for decimation; 0 disables it.
    pub mesh_simplify_target: i64,
    /// Poisson octree depth.
    pub depth: u32,
    /// Sample density the finest Poisson level must keep; 0 always solves at `depth`.
    pub samples_per_cell: f64,
    pub normal_radius: f32,
    pub max_neighbors: usize,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        let normals = NormalParams::default();
        Self {
            meters_per_unit: 1.0,
            mesh_simplify_target: 0,
            depth: assetgen_recon::DEFAULT_DEPTH,
            samples_per_cell: PoissonConfig::default().samples_per_cell,
            normal_radius: normals.radius,
            max_neighbors: normals.max_neighbors,
        }
    }
}

impl ConvertConfig {
    /// Load a configuration from a JSON file. Missing keys take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.meters_per_unit.is_finite() && self.meters_per_unit > 0.0) {
            return Err(invalid(
                "meters_per_unit",
                format!("must be positive, got {}", self.meters_per_unit),
            ));
        }
        if self.mesh_simplify_target < 0 {
            return Err(invalid(
                "mesh_simplify_target",
                format!("must not be negative, got {}", self.mesh_simplify_target),
            ));
        }
        if !(1..=MAX_DEPTH).contains(&self.depth) {
            return Err(invalid(
                "depth",
                format!("must be in 1..={MAX_DEPTH}, got {}", self.depth),
            ));
        }
        if !(self.samples_per_cell.is_finite() && self.samples_per_cell >= 0.0) {
            return Err(invalid(
                "samples_per_cell",
                format!("must not be negative, got {}", self.samples_per_cell),
            ));
        }
        if !(self.normal_radius.is_finite() && self.normal_radius > 0.0) {
            return Err(invalid(
                "normal_radius",
                format!("must be positive, got {}", self.normal_radius),
            ));
        }
        if self.max_neighbors < MIN_NEIGHBORS {
            return Err(invalid(
                "max_neighbors",
                format!("must be at least {MIN_NEIGHBORS}, got {}", self.max_neighbors),
            ));
        }
        Ok(())
    }

    pub fn normal_params(&self) -> NormalParams {
        NormalParams {
            radius: self.normal_radius,
            max_neighbors: self.max_neighbors,
        }
    }

    pub fn poisson(&self) -> PoissonConfig {
        PoissonConfig {
            samples_per_cell: self.samples_per_cell,
            ..PoissonConfig::with_depth(self.depth)
        }
    }

    /// Decimation target, or `None` when simplification is disabled.
    pub fn simplify_target(&self) -> Option<usize> {
        usize::try_from(self.mesh_simplify_target)
            .ok()
            .filter(|target| *target > 0)
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Install the global subscriber. `RUST_LOG` wins over the configured level.
    pub fn init(&self) {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&self.level)),
            )
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}
