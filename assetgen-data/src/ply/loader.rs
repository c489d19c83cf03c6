//! PLY file loading functions

use crate::error::LoadError;
use crate::ply::PlyPoint;
use crate::types::PointCloud;
use glam::Vec3;
use serde::Deserialize;
use serde::de::{Deserializer, IgnoredAny};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info, warn};

/// A row read through and discarded. PLY rows only deserialize as maps.
#[derive(Debug)]
struct SkippedRow;

impl<'de> Deserialize<'de> for SkippedRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(IgnoredAny).map(|_| SkippedRow)
    }
}

// PLY file structure
#[derive(Deserialize, Debug)]
struct PlyFile {
    #[serde(default, rename = "vertex")]
    vertex: Vec<HashMap<String, JsonValue>>,
    #[serde(default, rename = "face")]
    face: Vec<SkippedRow>,
}

fn get_f32(prop: Option<&JsonValue>) -> Option<f32> {
    prop.and_then(|v| match v {
        JsonValue::Number(n) => n.as_f64().map(|f| f as f32),
        _ => None,
    })
}

/// Read a color channel. Integer channels are 0-255, float channels 0-1.
fn get_channel(prop: Option<&JsonValue>) -> Option<f32> {
    prop.and_then(|v| match v {
        JsonValue::Number(n) if n.is_u64() || n.is_i64() => {
            n.as_f64().map(|f| (f / 255.0) as f32)
        }
        JsonValue::Number(n) => n.as_f64().map(|f| f as f32),
        _ => None,
    })
    .map(|c| c.clamp(0.0, 1.0))
}

fn get_triplet<F>(vertex: &HashMap<String, JsonValue>, keys: [&str; 3], read: F) -> Option<Vec3>
where
    F: Fn(Option<&JsonValue>) -> Option<f32>,
{
    let [x, y, z] = keys.map(|k| read(vertex.get(k)));
    Some(Vec3::new(x?, y?, z?))
}

fn parse_point(index: usize, vertex: &HashMap<String, JsonValue>) -> Result<PlyPoint, String> {
    let position = get_triplet(vertex, ["x", "y", "z"], get_f32)
        .ok_or_else(|| format!("Missing position at vertex {}", index))?;
    if !position.is_finite() {
        return Err(format!("Non-finite position at vertex {}", index));
    }

    let normal = get_triplet(vertex, ["nx", "ny", "nz"], get_f32);
    let color = get_triplet(vertex, ["red", "green", "blue"], get_channel)
        .or_else(|| get_triplet(vertex, ["r", "g", "b"], get_channel));

    Ok(PlyPoint {
        position,
        normal,
        color,
    })
}

/// Gather an optional per-point attribute, keeping it only when every point
/// carries it.
fn gather<F>(points: &[PlyPoint], name: &str, pick: F) -> Option<Vec<Vec3>>
where
    F: Fn(&PlyPoint) -> Option<Vec3>,
{
    let present = points.iter().filter_map(|p| pick(p)).count();
    if present == 0 {
        return None;
    }
    if present < points.len() {
        warn!(
            "Dropping {}: only {} of {} vertices carry it",
            name,
            present,
            points.len()
        );
        return None;
    }
    points.iter().map(pick).collect()
}

/// Load a point cloud from a PLY file.
///
/// Positions are required; normals (`nx ny nz`) and colors (`red green blue`
/// or `r g b`) are kept when every vertex has them.
#[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_point_cloud(path: impl AsRef<Path>) -> Result<PointCloud, LoadError> {
    let path = path.as_ref();
    debug!("Loading PLY point cloud from: {}", path.display());
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let ply_data: PlyFile = serde_ply::from_reader(reader).map_err(|e| {
        warn!("Failed to parse PLY file: {}", e);
        LoadError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    })?;

    info!(
        "PLY file parsed: {} vertices, {} faces skipped",
        ply_data.vertex.len(),
        ply_data.face.len()
    );

    if ply_data.vertex.is_empty() {
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
            what: "points",
        });
    }

    let points = ply_data
        .vertex
        .iter()
        .enumerate()
        .map(|(i, vertex)| parse_point(i, vertex))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|message| LoadError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

    let normals = gather(&points, "normals", |p| p.normal);
    let colors = gather(&points, "colors", |p| p.color);
    let positions = points.iter().map(|p| p.position).collect();

    let cloud = PointCloud::new(positions, normals, colors).map_err(|source| {
        LoadError::Geometry {
            path: path.to_path_buf(),
            source,
        }
    })?;

    debug!(
        "Loaded {} points (normals: {}, colors: {})",
        cloud.len(),
        cloud.has_normals(),
        cloud.has_colors()
    );
    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "assetgen-data-{}-{}",
            std::process::id(),
            name
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_points_with_normals_and_colors() {
        let path = write_temp(
            "full.ply",
            "ply\nformat ascii 1.0\nelement vertex 2\n\
             property float x\nproperty float y\nproperty float z\n\
             property float nx\nproperty float ny\nproperty float nz\n\
             property uchar red\nproperty uchar green\nproperty uchar blue\n\
             end_header\n\
             0 0 0 0 0 1 255 0 0\n\
             1 2 3 1 0 0 0 255 51\n",
        );
        let cloud = load_point_cloud(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.positions()[1], Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(cloud.normals().unwrap()[0], Vec3::Z);
        let color = cloud.colors().unwrap()[1];
        assert!((color - Vec3::new(0.0, 1.0, 0.2)).length() < 1e-6);
    }

    #[test]
    fn test_faces_are_skipped() {
        let path = write_temp(
            "mesh.ply",
            "ply\nformat ascii 1.0\nelement vertex 3\n\
             property float x\nproperty float y\nproperty float z\n\
             element face 1\nproperty list uchar int vertex_indices\n\
             end_header\n0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n",
        );
        let cloud = load_point_cloud(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(cloud.len(), 3);
        assert_eq!(cloud.positions()[1], Vec3::X);
    }

    #[test]
    fn test_load_positions_only() {
        let path = write_temp(
            "bare.ply",
            "ply\nformat ascii 1.0\nelement vertex 3\n\
             property float x\nproperty float y\nproperty float z\n\
             end_header\n0 0 0\n1 0 0\n0 1 0\n",
        );
        let cloud = load_point_cloud(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(cloud.len(), 3);
        assert!(!cloud.has_normals());
        assert!(!cloud.has_colors());
    }

    #[test]
    fn test_load_empty_cloud_is_empty_input() {
        let path = write_temp(
            "empty.ply",
            "ply\nformat ascii 1.0\nelement vertex 0\n\
             property float x\nproperty float y\nproperty float z\n\
             end_header\n",
        );
        let err = load_point_cloud(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(err.is_empty_input(), "unexpected error: {err}");
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load_point_cloud("/definitely/not/here.ply").unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_load_garbage_is_parse_error() {
        let path = write_temp("garbage.ply", "this is not a ply file\n");
        let err = load_point_cloud(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[test]
    fn test_partial_attribute_is_dropped() {
        let points = vec![
            PlyPoint {
                position: Vec3::ZERO,
                normal: Some(Vec3::Z),
                color: None,
            },
            PlyPoint {
                position: Vec3::ONE,
                normal: None,
                color: None,
            },
        ];
        assert!(gather(&points, "normals", |p| p.normal).is_none());
        assert!(gather(&points, "colors", |p| p.color).is_none());
    }
}
