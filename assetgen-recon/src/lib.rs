//! Surface reconstruction stages of the asset pipeline.
//!
//! Each stage consumes an owned value and returns a new one:
//!
//! - [`normals`]: per-point normal estimation and orientation
//! - [`reconstruction`]: Poisson surface reconstruction
//! - [`clean`]: ordered mesh repair passes
//! - [`decimate`]: quadric edge-collapse simplification
//! - [`attributes`]: vertex normals, color transfer and bounds

pub mod attributes;
pub mod clean;
pub mod decimate;
mod eigen;
pub mod error;
pub mod normals;
pub mod reconstruction;

pub use attributes::{compute_bounds, compute_vertex_normals, transfer_colors};
pub use clean::{CleanPass, CleanReport, clean, clean_with_report};
pub use decimate::decimate;
pub use error::{AttributeError, CleanError, ReconstructionError};
pub use normals::{FALLBACK_NORMAL, NormalParams, ensure_normals, estimate_normals};
pub use reconstruction::{DEFAULT_DEPTH, MAX_DEPTH, PoissonConfig, reconstruct, reconstruct_with};
