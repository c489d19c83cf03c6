//! USDA text serialization.

use crate::document::{AssetDocument, MeshPrim};
use crate::error::WriteError;
use glam::Vec3;
use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Validate `doc` and write it to `path` as a USDA layer.
///
/// Parent directories are created as needed. The layer is written to a
/// sibling temporary file and renamed over `path`, so a failed write never
/// leaves a partial file behind.
#[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn write(doc: AssetDocument, path: impl AsRef<Path>) -> Result<(), WriteError> {
    let path = path.as_ref();
    doc.validate()?;
    let text = to_usda(&doc);

    let io_error = |source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let temp = temp_path(path);
    let result = write_file(&temp, text.as_bytes()).and_then(|()| fs::rename(&temp, path));
    if let Err(source) = result {
        // The temp file may not exist if creating it failed.
        let _ = fs::remove_file(&temp);
        return Err(io_error(source));
    }

    info!(
        "Wrote {} points, {} faces",
        doc.mesh().points.len(),
        doc.mesh().face_vertex_counts.len()
    );
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "asset.usda".to_string());
    let temp = path.with_file_name(format!(".{}.tmp-{}", name, std::process::id()));
    debug!("Staging layer at {}", temp.display());
    temp
}

/// Render a document as USDA text.
pub fn to_usda(doc: &AssetDocument) -> String {
    let mut out = String::new();
    out.push_str("#usda 1.0\n(\n");
    let _ = writeln!(out, "    defaultPrim = \"{}\"", doc.root.name);
    let _ = writeln!(out, "    metersPerUnit = {}", doc.metadata.meters_per_unit);
    let _ = writeln!(out, "    upAxis = \"{}\"", doc.metadata.up_axis.token());
    out.push_str(")\n\n");

    let _ = writeln!(out, "def Xform \"{}\"\n{{", doc.root.name);
    write_mesh(&mut out, &doc.root.mesh);
    out.push_str("}\n");
    out
}

fn write_mesh(out: &mut String, mesh: &MeshPrim) {
    let indent = "        ";
    let _ = writeln!(out, "    def Mesh \"{}\"\n    {{", mesh.name);

    let extent = [mesh.extent.min(), mesh.extent.max()];
    let _ = writeln!(out, "{indent}float3[] extent = {}", vec3_array(&extent));
    let _ = writeln!(
        out,
        "{indent}int[] faceVertexCounts = {}",
        int_array(&mesh.face_vertex_counts)
    );
    let _ = writeln!(
        out,
        "{indent}int[] faceVertexIndices = {}",
        int_array(&mesh.face_vertex_indices)
    );
    if let Some(normals) = &mesh.normals {
        let _ = writeln!(
            out,
            "{indent}normal3f[] normals = {} (\n{indent}    interpolation = \"vertex\"\n{indent})",
            vec3_array(normals)
        );
    }
    let _ = writeln!(out, "{indent}point3f[] points = {}", vec3_array(&mesh.points));
    if let Some(colors) = &mesh.display_color {
        let _ = writeln!(
            out,
            "{indent}color3f[] primvars:displayColor = {} (\n{indent}    interpolation = \"vertex\"\n{indent})",
            vec3_array(colors)
        );
    }
    out.push_str("    }\n");
}

// Display for floats is the shortest text that parses back to the same value.
fn vec3_array(values: &[Vec3]) -> String {
    let mut s = String::with_capacity(values.len() * 24 + 2);
    s.push('[');
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            s.push_str(", ");
        }
        let _ = write!(s, "({}, {}, {})", v.x, v.y, v.z);
    }
    s.push(']');
    s
}

fn int_array(values: &[i32]) -> String {
    let mut s = String::with_capacity(values.len() * 6 + 2);
    s.push('[');
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            s.push_str(", ");
        }
        let _ = write!(s, "{v}");
    }
    s.push(']');
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::StageMetadata;
    use assetgen_data::Mesh;

    fn doc(meters_per_unit: f64) -> AssetDocument {
        let mut mesh = Mesh::new(
            vec![Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.5, 0.25)],
            vec![[0, 1, 2]],
        );
        mesh.normals = Some(vec![Vec3::Z; 3]);
        let bounds = mesh.bounds().unwrap();
        AssetDocument::from_mesh(
            mesh,
            bounds,
            StageMetadata::with_meters_per_unit(meters_per_unit),
        )
        .unwrap()
    }

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("assetgen-usd-{}-{}", std::process::id(), tag))
    }

    #[test]
    fn test_usda_layout() {
        let text = to_usda(&doc(0.001));
        assert!(text.starts_with("#usda 1.0\n"));
        assert!(text.contains("defaultPrim = \"Asset\""));
        assert!(text.contains("metersPerUnit = 0.001"));
        assert!(text.contains("upAxis = \"Z\""));
        assert!(text.contains("def Xform \"Asset\""));
        assert!(text.contains("def Mesh \"Mesh\""));
        assert!(text.contains("int[] faceVertexCounts = [3]"));
        assert!(text.contains("int[] faceVertexIndices = [0, 1, 2]"));
        assert!(text.contains("point3f[] points = [(0, 0, 0), (1, 0, 0), (0, 0.5, 0.25)]"));
        assert!(text.contains("float3[] extent = [(0, 0, 0), (1, 0.5, 0.25)]"));
        assert!(text.contains("interpolation = \"vertex\""));
        assert!(!text.contains("displayColor"));
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let dir = temp_dir("nested");
        let path = dir.join("a").join("b").join("asset.usda");
        write(doc(1.0), &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("#usda 1.0"));
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_document_writes_nothing() {
        let dir = temp_dir("invalid");
        let path = dir.join("asset.usda");
        let mut bad = doc(1.0);
        bad.root.mesh.face_vertex_indices[2] = 7;
        let err = write(bad, &path).unwrap_err();
        assert!(matches!(err, WriteError::Invariant(_)));
        assert!(!path.exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_io_failure_leaves_no_file() {
        let dir = temp_dir("io");
        fs::create_dir_all(&dir).unwrap();
        // A directory in the way of the target makes the final rename fail.
        let path = dir.join("blocked.usda");
        fs::create_dir_all(path.join("inner")).unwrap();
        let err = write(doc(1.0), &path).unwrap_err();
        assert!(matches!(err, WriteError::Io { .. }));
        let leftovers = fs::read_dir(&dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .count();
        assert_eq!(leftovers, 0);
        fs::remove_dir_all(&dir).ok();
    }
}
