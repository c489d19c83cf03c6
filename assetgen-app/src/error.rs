//! Conversion error aggregating every stage's failure type.

use crate::config::ConfigError;
use assetgen_capture::CaptureError;
use assetgen_data::LoadError;
use assetgen_recon::{AttributeError, CleanError, ReconstructionError};
use assetgen_usd::{DocumentError, WriteError};
use thiserror::Error;

/// Coarse failure classes reported by the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Read,
    EmptyInput,
    Reconstruction,
    Write,
    Capture,
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Reconstruction(#[from] ReconstructionError),

    #[error(transparent)]
    Clean(#[from] CleanError),

    #[error("mesh is empty after {stage}")]
    EmptyMesh { stage: &'static str },

    #[error(transparent)]
    Attribute(#[from] AttributeError),

    #[error("asset document is invalid: {0}")]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::Config(_) => ErrorKind::Config,
            ConvertError::Load(e) if e.is_empty_input() => ErrorKind::EmptyInput,
            ConvertError::Load(_) => ErrorKind::Read,
            ConvertError::EmptyMesh { .. } | ConvertError::Attribute(_) => ErrorKind::EmptyInput,
            ConvertError::Reconstruction(_) | ConvertError::Clean(_) => ErrorKind::Reconstruction,
            ConvertError::Document(_) | ConvertError::Write(_) => ErrorKind::Write,
            ConvertError::Capture(_) => ErrorKind::Capture,
        }
    }
}
