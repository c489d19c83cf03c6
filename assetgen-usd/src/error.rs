use std::path::PathBuf;
use thiserror::Error;

/// Structural invariants an asset document must satisfy.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DocumentError {
    #[error("prim name `{0}` is not a valid identifier")]
    InvalidPrimName(String),

    #[error("mesh has no points")]
    NoPoints,

    #[error("{attribute} contains a non-finite value at element {index}")]
    NonFinite { attribute: &'static str, index: usize },

    #[error("face {face} has {count} vertices; only triangles are supported")]
    NonTriangleFace { face: usize, count: i32 },

    #[error("faceVertexIndices has {actual} entries but faceVertexCounts sums to {expected}")]
    IndexCountMismatch { expected: usize, actual: usize },

    #[error("faceVertexIndices[{position}] = {index} is outside 0..{point_count}")]
    IndexOutOfRange {
        position: usize,
        index: i32,
        point_count: usize,
    },

    #[error("vertex count {0} does not fit the 32-bit index range")]
    TooManyVertices(usize),

    #[error("{attribute} has {actual} entries, expected one per point ({expected})")]
    AttributeLength {
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("displayColor[{0}] is outside [0, 1]")]
    ColorOutOfRange(usize),

    #[error("point {0} lies outside the extent")]
    PointOutsideExtent(usize),

    #[error("metersPerUnit must be positive and finite, got {0}")]
    InvalidMetersPerUnit(f64),
}

/// Failures of [`crate::write`].
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing to write invalid document: {0}")]
    Invariant(#[from] DocumentError),
}

/// Failures of [`crate::read`].
#[derive(Debug, Error)]
pub enum DocumentReadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("unexpected document structure: {0}")]
    Structure(String),

    #[error("document violates invariants: {0}")]
    Invariant(#[from] DocumentError),
}
