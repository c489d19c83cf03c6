//! Scene document model and USDA serialization.
//!
//! An [`AssetDocument`] holds one root `Xform` prim owning one `Mesh` prim,
//! plus explicit stage metadata (up axis, meters per unit). [`write`] commits
//! a validated document atomically; [`read`] parses it back.

pub mod document;
pub mod error;
pub mod reader;
pub mod writer;

pub use document::{
    AssetDocument, MESH_PRIM_NAME, MeshPrim, ROOT_PRIM_NAME, StageMetadata, UpAxis, XformPrim,
};
pub use error::{DocumentError, DocumentReadError, WriteError};
pub use reader::{from_usda, read};
pub use writer::{to_usda, write};
