//! Error types for geometry construction and file loading.

use std::path::PathBuf;
use thiserror::Error;

/// Structural problems with a point cloud or mesh value.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("geometry has no {0}")]
    Empty(&'static str),

    #[error("{attribute} has {actual} entries, expected {expected}")]
    LengthMismatch {
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("face {face} references vertex {index} but only {vertex_count} vertices exist")]
    FaceIndexOutOfRange {
        face: usize,
        index: u32,
        vertex_count: usize,
    },
}

/// Errors raised while reading point clouds or meshes from disk.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("{} contains no {what}", path.display())]
    Empty { path: PathBuf, what: &'static str },

    #[error("invalid geometry in {}: {source}", path.display())]
    Geometry {
        path: PathBuf,
        #[source]
        source: GeometryError,
    },
}

impl LoadError {
    /// True when the file was readable but held zero points or vertices.
    pub fn is_empty_input(&self) -> bool {
        matches!(self, LoadError::Empty { .. })
    }
}
