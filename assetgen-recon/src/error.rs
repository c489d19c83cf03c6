//! Error types for the reconstruction stages.

use assetgen_data::GeometryError;
use thiserror::Error;

/// Failures of normal estimation and surface reconstruction.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconstructionError {
    #[error("point cloud has no normals; run normal estimation before reconstruction")]
    MissingNormals,

    #[error("every point normal is zero or non-finite")]
    DegenerateNormals,

    #[error("points are collinear or coincident; no surface can be fitted")]
    CollinearPoints,

    #[error("octree depth {depth} is outside the supported range 1..={max}")]
    InvalidDepth { depth: u32, max: u32 },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("solver produced non-finite values at octree level {level}")]
    SolverDiverged { level: u32 },

    #[error("isosurface extraction produced no triangles")]
    EmptySurface,

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Failures of the mesh cleaning pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CleanError {
    #[error("precondition of pass `{pass}` violated: {reason}")]
    PreconditionViolated { pass: &'static str, reason: String },
}

/// Failures of per-vertex attribute computation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AttributeError {
    #[error("mesh has no vertices")]
    EmptyMesh,
}
