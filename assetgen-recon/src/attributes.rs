//! Per-vertex attributes and bounds of a finished mesh.

use crate::error::AttributeError;
use assetgen_data::{BoundingBox, Mesh, PointCloud, PointIndex};
use glam::{DVec3, Vec3};
use tracing::debug;

/// Area-weighted vertex normals.
///
/// Each vertex sums the unnormalized cross products of its faces, so larger
/// faces pull harder. Vertices touched only by zero-area faces get a zero
/// normal.
pub fn compute_vertex_normals(mut mesh: Mesh) -> Mesh {
    let mut sums = vec![DVec3::ZERO; mesh.vertex_count()];
    for face in &mesh.faces {
        let cross = mesh.face_cross(*face);
        for &v in face {
            sums[v as usize] += cross;
        }
    }
    mesh.normals = Some(
        sums.into_iter()
            .map(|n| n.normalize_or_zero().as_vec3())
            .collect(),
    );
    mesh
}

/// Copy each vertex's color from the nearest cloud point, clamped to `[0, 1]`.
///
/// Returns the mesh unchanged when the cloud has no colors.
#[tracing::instrument(skip_all, fields(vertices = mesh.vertex_count(), points = cloud.len()))]
pub fn transfer_colors(mut mesh: Mesh, cloud: &PointCloud) -> Mesh {
    let Some(colors) = cloud.colors() else {
        debug!("Point cloud has no colors; nothing to transfer");
        return mesh;
    };
    let index = PointIndex::with_auto_cell_size(cloud.positions());
    mesh.colors = Some(
        mesh.positions
            .iter()
            .map(|p| {
                index
                    .nearest(*p)
                    .map_or(Vec3::ZERO, |i| colors[i].clamp(Vec3::ZERO, Vec3::ONE))
            })
            .collect(),
    );
    mesh
}

/// Axis-aligned bounds of the mesh vertices.
pub fn compute_bounds(mesh: &Mesh) -> Result<BoundingBox, AttributeError> {
    mesh.bounds().ok_or(AttributeError::EmptyMesh)
}
