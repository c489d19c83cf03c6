//! Wavefront OBJ triangle mesh loading.
//!
//! Only geometry is read: `v` records (with the optional trailing RGB
//! extension) and `f` records. Polygons are fan-triangulated; texture and
//! normal references inside face corners are ignored.

use crate::error::LoadError;
use crate::types::Mesh;
use glam::Vec3;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

/// Load a triangle mesh from an OBJ file.
#[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_obj_mesh(path: impl AsRef<Path>) -> Result<Mesh, LoadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mesh = parse_obj(BufReader::new(file)).map_err(|message| LoadError::Parse {
        path: path.to_path_buf(),
        message,
    })?;

    if mesh.positions.is_empty() {
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
            what: "vertices",
        });
    }
    mesh.validate().map_err(|source| LoadError::Geometry {
        path: path.to_path_buf(),
        source,
    })?;

    info!(
        "OBJ file parsed: {} vertices, {} faces",
        mesh.vertex_count(),
        mesh.face_count()
    );
    Ok(mesh)
}

fn parse_obj(reader: impl BufRead) -> Result<Mesh, String> {
    let mut positions = Vec::new();
    let mut colors = Vec::new();
    let mut faces = Vec::new();
    let mut polygons = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("line {}: {}", line_no + 1, e))?;
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => {
                let values = tokens
                    .map(|t| t.parse::<f32>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| format!("line {}: {}", line_no + 1, e))?;
                match values.as_slice() {
                    [x, y, z] => positions.push(Vec3::new(*x, *y, *z)),
                    [x, y, z, r, g, b] => {
                        positions.push(Vec3::new(*x, *y, *z));
                        colors.push(Vec3::new(*r, *g, *b));
                    }
                    // Homogeneous w is accepted and ignored.
                    [x, y, z, _w] => positions.push(Vec3::new(*x, *y, *z)),
                    _ => {
                        return Err(format!(
                            "line {}: vertex needs 3, 4 or 6 values, got {}",
                            line_no + 1,
                            values.len()
                        ));
                    }
                }
            }
            Some("f") => {
                let corners = tokens
                    .map(|t| resolve_index(t, positions.len()))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| format!("line {}: invalid face index", line_no + 1))?;
                if corners.len() < 3 {
                    return Err(format!("line {}: face needs at least 3 corners", line_no + 1));
                }
                if corners.len() > 3 {
                    polygons += 1;
                }
                for i in 1..corners.len() - 1 {
                    faces.push([corners[0], corners[i], corners[i + 1]]);
                }
            }
            _ => {}
        }
    }

    if polygons > 0 {
        debug!("Fan-triangulated {} polygons", polygons);
    }

    let colors = if colors.is_empty() {
        None
    } else if colors.len() == positions.len() {
        Some(colors.into_iter().map(|c| c.clamp(Vec3::ZERO, Vec3::ONE)).collect())
    } else {
        warn!(
            "Dropping vertex colors: only {} of {} vertices carry them",
            colors.len(),
            positions.len()
        );
        None
    };

    Ok(Mesh {
        positions,
        faces,
        normals: None,
        colors,
    })
}

/// Resolve a face corner (`i`, `i/t`, `i//n`, `i/t/n`) to a 0-based index.
/// Negative indices count back from the most recent vertex.
fn resolve_index(token: &str, vertex_count: usize) -> Option<u32> {
    let raw: i64 = token.split('/').next()?.parse().ok()?;
    let index = match raw {
        0 => return None,
        r if r > 0 => r - 1,
        r => vertex_count as i64 + r,
    };
    if index < 0 || index as usize >= vertex_count {
        return None;
    }
    u32::try_from(index).ok()
}
