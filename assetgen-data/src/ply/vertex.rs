//! PLY vertex data structures

use glam::Vec3;

/// Per-vertex record extracted from a PLY `vertex` element before the
/// attributes are gathered into parallel arrays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlyPoint {
    pub position: Vec3,
    pub normal: Option<Vec3>,
    pub color: Option<Vec3>,
}
