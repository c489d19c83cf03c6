//! Assetgen Data Crate
//!
//! Geometry value types and loaders shared by the conversion pipeline:
//! point clouds, triangle meshes, bounding boxes, PLY and OBJ readers, and a
//! spatial index for neighborhood queries.

pub mod error;
pub mod obj;
pub mod ply;
pub mod spatial;
pub mod types;

pub use error::{GeometryError, LoadError};
pub use obj::load_obj_mesh;
pub use ply::{PlyPoint, load_point_cloud};
pub use spatial::PointIndex;
pub use types::{BoundingBox, Mesh, PointCloud};
