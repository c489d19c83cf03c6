//! In-memory model of the asset scene document.
//!
//! The document is a root transform prim owning exactly one mesh prim, plus
//! stage-level metadata. It mirrors the attribute layout of the text format
//! (signed 32-bit indices, explicit face-vertex counts) so that validation
//! sees the same values a consumer will read.

use crate::error::DocumentError;
use assetgen_data::{BoundingBox, Mesh};
use glam::Vec3;

/// Name of the root transform prim, also the stage's default prim.
pub const ROOT_PRIM_NAME: &str = "Asset";

/// Name of the mesh prim beneath the root.
pub const MESH_PRIM_NAME: &str = "Mesh";

/// Stage up axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpAxis {
    Y,
    #[default]
    Z,
}

impl UpAxis {
    pub fn token(self) -> &'static str {
        match self {
            UpAxis::Y => "Y",
            UpAxis::Z => "Z",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "Y" => Some(UpAxis::Y),
            "Z" => Some(UpAxis::Z),
            _ => None,
        }
    }
}

/// Stage-level unit conventions, passed explicitly to every document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageMetadata {
    pub up_axis: UpAxis,
    /// Scale of one scene unit in meters. Metadata only; point coordinates
    /// are never rescaled.
    pub meters_per_unit: f64,
}

impl Default for StageMetadata {
    fn default() -> Self {
        Self {
            up_axis: UpAxis::Z,
            meters_per_unit: 1.0,
        }
    }
}

impl StageMetadata {
    pub fn with_meters_per_unit(meters_per_unit: f64) -> Self {
        Self {
            meters_per_unit,
            ..Self::default()
        }
    }
}

/// Mesh prim attributes. Normals and colors use per-vertex interpolation.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshPrim {
    pub name: String,
    pub points: Vec<Vec3>,
    pub face_vertex_counts: Vec<i32>,
    pub face_vertex_indices: Vec<i32>,
    pub normals: Option<Vec<Vec3>>,
    pub display_color: Option<Vec<Vec3>>,
    pub extent: BoundingBox,
}

/// Root transform prim.
#[derive(Debug, Clone, PartialEq)]
pub struct XformPrim {
    pub name: String,
    pub mesh: MeshPrim,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetDocument {
    pub metadata: StageMetadata,
    pub root: XformPrim,
}

impl AssetDocument {
    /// Build a document around a finished mesh and its bounds.
    pub fn from_mesh(
        mesh: Mesh,
        extent: BoundingBox,
        metadata: StageMetadata,
    ) -> Result<Self, DocumentError> {
        if i32::try_from(mesh.vertex_count()).is_err() {
            return Err(DocumentError::TooManyVertices(mesh.vertex_count()));
        }
        let face_vertex_counts = mesh.face_vertex_counts();
        let face_vertex_indices = mesh
            .face_vertex_indices()
            .into_iter()
            .map(|i| i as i32)
            .collect();
        let doc = Self {
            metadata,
            root: XformPrim {
                name: ROOT_PRIM_NAME.to_string(),
                mesh: MeshPrim {
                    name: MESH_PRIM_NAME.to_string(),
                    points: mesh.positions,
                    face_vertex_counts,
                    face_vertex_indices,
                    normals: mesh.normals,
                    display_color: mesh.colors,
                    extent,
                },
            },
        };
        doc.validate()?;
        Ok(doc)
    }

    pub fn mesh(&self) -> &MeshPrim {
        &self.root.mesh
    }

    pub fn root_path(&self) -> String {
        format!("/{}", self.root.name)
    }

    pub fn mesh_path(&self) -> String {
        format!("/{}/{}", self.root.name, self.root.mesh.name)
    }

    /// Check every structural invariant of the document.
    pub fn validate(&self) -> Result<(), DocumentError> {
        let meters = self.metadata.meters_per_unit;
        if !(meters.is_finite() && meters > 0.0) {
            return Err(DocumentError::InvalidMetersPerUnit(meters));
        }
        for name in [&self.root.name, &self.root.mesh.name] {
            if !is_identifier(name) {
                return Err(DocumentError::InvalidPrimName(name.clone()));
            }
        }

        let mesh = &self.root.mesh;
        let point_count = mesh.points.len();
        if point_count == 0 {
            return Err(DocumentError::NoPoints);
        }
        check_finite("points", &mesh.points)?;

        let mut expected = 0usize;
        for (face, &count) in mesh.face_vertex_counts.iter().enumerate() {
            if count != 3 {
                return Err(DocumentError::NonTriangleFace { face, count });
            }
            expected += 3;
        }
        if mesh.face_vertex_indices.len() != expected {
            return Err(DocumentError::IndexCountMismatch {
                expected,
                actual: mesh.face_vertex_indices.len(),
            });
        }
        for (position, &index) in mesh.face_vertex_indices.iter().enumerate() {
            if index < 0 || index as usize >= point_count {
                return Err(DocumentError::IndexOutOfRange {
                    position,
                    index,
                    point_count,
                });
            }
        }

        if let Some(normals) = &mesh.normals {
            check_length("normals", point_count, normals.len())?;
            check_finite("normals", normals)?;
        }
        if let Some(colors) = &mesh.display_color {
            check_length("primvars:displayColor", point_count, colors.len())?;
            if let Some(index) = colors
                .iter()
                .position(|c| !(c.cmpge(Vec3::ZERO).all() && c.cmple(Vec3::ONE).all()))
            {
                return Err(DocumentError::ColorOutOfRange(index));
            }
        }

        if let Some(index) = mesh.points.iter().position(|p| !mesh.extent.contains(*p)) {
            return Err(DocumentError::PointOutsideExtent(index));
        }
        Ok(())
    }

    /// The mesh geometry and attributes as a pipeline mesh.
    pub fn to_mesh(&self) -> Mesh {
        let mesh = &self.root.mesh;
        Mesh {
            positions: mesh.points.clone(),
            faces: mesh
                .face_vertex_indices
                .chunks_exact(3)
                .map(|c| [c[0] as u32, c[1] as u32, c[2] as u32])
                .collect(),
            normals: mesh.normals.clone(),
            colors: mesh.display_color.clone(),
        }
    }
}

/// Prim names follow identifier rules: a letter or underscore, then
/// letters, digits or underscores.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_length(attribute: &'static str, expected: usize, actual: usize) -> Result<(), DocumentError> {
    if expected != actual {
        return Err(DocumentError::AttributeLength {
            attribute,
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_finite(attribute: &'static str, values: &[Vec3]) -> Result<(), DocumentError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(DocumentError::NonFinite { attribute, index }),
        None => Ok(()),
    }
}
