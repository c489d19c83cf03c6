//! Assetgen application layer
//!
//! Wires the data, reconstruction, document and capture crates into the
//! conversions exposed by the `assetgen` binary.

pub mod config;
pub mod convert;
pub mod error;

pub use config::{ConfigError, ConvertConfig, LoggingConfig};
pub use convert::{ConvertSummary, convert_mesh, convert_point_cloud, point_cloud_to_mesh};
pub use error::{ConvertError, ErrorKind};
