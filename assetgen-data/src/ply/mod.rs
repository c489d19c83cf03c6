//! PLY point cloud loading

mod loader;
mod vertex;

pub use loader::load_point_cloud;
pub use vertex::PlyPoint;
