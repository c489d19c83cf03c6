//! Core geometry values for point clouds, triangle meshes and bounds.
//!
//! Every pipeline stage consumes one of these by value and returns a new one,
//! so none of them hand out mutable views into shared buffers.

use crate::error::GeometryError;
use glam::{DVec3, Vec3};

/// An unstructured set of 3D samples with optional normals and colors.
///
/// Attributes are stored as parallel arrays. A cloud is never empty and every
/// present attribute array has exactly one entry per point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    positions: Vec<Vec3>,
    normals: Option<Vec<Vec3>>,
    colors: Option<Vec<Vec3>>,
}

impl PointCloud {
    /// Create a cloud, checking non-emptiness and attribute lengths.
    pub fn new(
        positions: Vec<Vec3>,
        normals: Option<Vec<Vec3>>,
        colors: Option<Vec<Vec3>>,
    ) -> Result<Self, GeometryError> {
        if positions.is_empty() {
            return Err(GeometryError::Empty("points"));
        }
        check_len("normals", positions.len(), normals.as_deref())?;
        check_len("colors", positions.len(), colors.as_deref())?;
        Ok(Self {
            positions,
            normals,
            colors,
        })
    }

    /// Create a cloud carrying positions only.
    pub fn from_positions(positions: Vec<Vec3>) -> Result<Self, GeometryError> {
        Self::new(positions, None, None)
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn normals(&self) -> Option<&[Vec3]> {
        self.normals.as_deref()
    }

    pub fn colors(&self) -> Option<&[Vec3]> {
        self.colors.as_deref()
    }

    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    pub fn has_colors(&self) -> bool {
        self.colors.is_some()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Always false: construction rejects empty clouds.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Replace the normal array, returning a new cloud.
    pub fn with_normals(self, normals: Vec<Vec3>) -> Result<Self, GeometryError> {
        Self::new(self.positions, Some(normals), self.colors)
    }
}

fn check_len(
    attribute: &'static str,
    expected: usize,
    values: Option<&[Vec3]>,
) -> Result<(), GeometryError> {
    match values {
        Some(values) if values.len() != expected => Err(GeometryError::LengthMismatch {
            attribute,
            expected,
            actual: values.len(),
        }),
        _ => Ok(()),
    }
}

/// An indexed triangle mesh.
///
/// Faces hold 0-based indices into `positions` with a consistent winding.
/// `normals` and `colors`, when present, run parallel to `positions`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub faces: Vec<[u32; 3]>,
    pub normals: Option<Vec<Vec3>>,
    pub colors: Option<Vec<Vec3>>,
}

impl Mesh {
    /// Create a mesh with geometry only.
    pub fn new(positions: Vec<Vec3>, faces: Vec<[u32; 3]>) -> Self {
        Self {
            positions,
            faces,
            normals: None,
            colors: None,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Check index ranges and attribute lengths.
    pub fn validate(&self) -> Result<(), GeometryError> {
        let vertex_count = self.positions.len();
        check_len("normals", vertex_count, self.normals.as_deref())?;
        check_len("colors", vertex_count, self.colors.as_deref())?;
        for (face, indices) in self.faces.iter().enumerate() {
            for &index in indices {
                if index as usize >= vertex_count {
                    return Err(GeometryError::FaceIndexOutOfRange {
                        face,
                        index,
                        vertex_count,
                    });
                }
            }
        }
        Ok(())
    }

    /// Corner positions of a face.
    pub fn triangle(&self, face: [u32; 3]) -> [Vec3; 3] {
        face.map(|i| self.positions[i as usize])
    }

    /// Unnormalized face normal (twice the area vector), in double precision.
    pub fn face_cross(&self, face: [u32; 3]) -> DVec3 {
        let [a, b, c] = self.triangle(face).map(|p| p.as_dvec3());
        (b - a).cross(c - a)
    }

    /// Area of a face.
    pub fn face_area(&self, face: [u32; 3]) -> f64 {
        self.face_cross(face).length() * 0.5
    }

    /// Face-vertex counts as materialized in scene files: one `3` per face.
    pub fn face_vertex_counts(&self) -> Vec<i32> {
        vec![3; self.faces.len()]
    }

    /// Flattened triangle indices.
    pub fn face_vertex_indices(&self) -> Vec<u32> {
        self.faces.iter().flatten().copied().collect()
    }

    /// Keep only the vertices flagged in `keep`, reindexing faces.
    ///
    /// Faces touching a dropped vertex are dropped with it. Attribute arrays
    /// are compacted in step with positions.
    pub fn retain_vertices(self, keep: &[bool]) -> Mesh {
        let mut remap = vec![u32::MAX; self.positions.len()];
        let mut next = 0u32;
        for (slot, &kept) in remap.iter_mut().zip(keep) {
            if kept {
                *slot = next;
                next += 1;
            }
        }

        let compact = |values: Vec<Vec3>| -> Vec<Vec3> {
            values
                .into_iter()
                .zip(keep)
                .filter_map(|(v, &kept)| kept.then_some(v))
                .collect()
        };

        let faces = self
            .faces
            .into_iter()
            .filter_map(|face| {
                let mapped = face.map(|i| remap[i as usize]);
                (!mapped.contains(&u32::MAX)).then_some(mapped)
            })
            .collect();

        Mesh {
            positions: compact(self.positions),
            faces,
            normals: self.normals.map(compact),
            colors: self.colors.map(compact),
        }
    }

    /// Rewrite every face index through `remap`.
    pub fn remap_faces(mut self, remap: &[u32]) -> Mesh {
        for face in &mut self.faces {
            *face = face.map(|i| remap[i as usize]);
        }
        self
    }

    /// Axis-aligned bounds of the vertex positions, if there are any.
    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(&self.positions)
    }
}

/// Axis-aligned bounding box with `min <= max` on every axis.
///
/// Bounds are always derived from geometry and cannot be edited directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    min: Vec3,
    max: Vec3,
}

impl BoundingBox {
    /// Component-wise min/max over `points`, or `None` when empty.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let first = *points.first()?;
        let (min, max) = points
            .iter()
            .fold((first, first), |(min, max), p| (min.min(*p), max.max(*p)));
        Some(Self { min, max })
    }

    /// Rebuild bounds from stored corners, rejecting inverted boxes.
    pub fn from_corners(min: Vec3, max: Vec3) -> Option<Self> {
        min.cmple(max).all().then_some(Self { min, max })
    }

    pub fn min(&self) -> Vec3 {
        self.min
    }

    pub fn max(&self) -> Vec3 {
        self.max
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Length of the box diagonal.
    pub fn diagonal(&self) -> f32 {
        self.extent().length()
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Mesh {
        Mesh::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn test_point_cloud_rejects_empty() {
        assert_eq!(
            PointCloud::from_positions(Vec::new()),
            Err(GeometryError::Empty("points"))
        );
    }

    #[test]
    fn test_point_cloud_rejects_mismatched_normals() {
        let result = PointCloud::new(vec![Vec3::ZERO, Vec3::ONE], Some(vec![Vec3::Z]), None);
        assert!(matches!(
            result,
            Err(GeometryError::LengthMismatch {
                attribute: "normals",
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_mesh_validate_catches_bad_index() {
        let mut mesh = quad();
        mesh.faces.push([0, 1, 7]);
        assert!(matches!(
            mesh.validate(),
            Err(GeometryError::FaceIndexOutOfRange { face: 2, index: 7, .. })
        ));
    }

    #[test]
    fn test_face_area() {
        let mesh = quad();
        assert!((mesh.face_area([0, 1, 2]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_retain_vertices_drops_faces_and_attributes() {
        let mut mesh = quad();
        mesh.colors = Some(vec![Vec3::X, Vec3::Y, Vec3::Z, Vec3::ONE]);
        let mesh = mesh.retain_vertices(&[true, false, true, true]);
        assert_eq!(mesh.positions.len(), 3);
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
        assert_eq!(mesh.colors, Some(vec![Vec3::X, Vec3::Z, Vec3::ONE]));
    }

    #[test]
    fn test_face_vertex_arrays() {
        let mesh = quad();
        assert_eq!(mesh.face_vertex_counts(), vec![3, 3]);
        assert_eq!(mesh.face_vertex_indices(), vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_bounding_box_from_points() {
        let bounds = BoundingBox::from_points(&[
            Vec3::new(1.0, -2.0, 3.0),
            Vec3::new(-1.0, 4.0, 0.5),
        ])
        .unwrap();
        assert_eq!(bounds.min(), Vec3::new(-1.0, -2.0, 0.5));
        assert_eq!(bounds.max(), Vec3::new(1.0, 4.0, 3.0));
        assert_eq!(bounds.center(), Vec3::new(0.0, 1.0, 1.75));
        assert!(bounds.contains(Vec3::ZERO + Vec3::new(0.0, 0.0, 1.0)));
        assert!(!bounds.contains(Vec3::new(2.0, 0.0, 1.0)));
    }

    #[test]
    fn test_bounding_box_empty_and_inverted() {
        assert!(BoundingBox::from_points(&[]).is_none());
        assert!(BoundingBox::from_corners(Vec3::ONE, Vec3::ZERO).is_none());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_point() -> impl Strategy<Value = Vec3> {
            (-1e3f32..1e3, -1e3f32..1e3, -1e3f32..1e3).prop_map(|(x, y, z)| Vec3::new(x, y, z))
        }

        proptest! {
            #[test]
            fn test_bounds_contain_every_point(points in prop::collection::vec(arb_point(), 1..64)) {
                let bounds = BoundingBox::from_points(&points).unwrap();
                prop_assert!(bounds.min().cmple(bounds.max()).all());
                for p in &points {
                    prop_assert!(bounds.contains(*p));
                }
            }
        }
    }
}
