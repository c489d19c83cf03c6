//! End-to-end conversion scenarios.

use assetgen_app::{ConvertConfig, ErrorKind, convert_mesh, convert_point_cloud};
use assetgen_data::Mesh;
use assetgen_usd::UpAxis;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "assetgen-app-{}-{}",
        std::process::id(),
        tag
    ));
    std::fs::remove_dir_all(&dir).ok();
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Samples on the six faces of the unit cube with outward normals and a
/// uniform red color.
fn cube_cloud_ply(steps: usize) -> String {
    let mut rows = Vec::new();
    for axis in 0..3 {
        for side in [0.0f32, 1.0] {
            let sign = if side == 0.0 { -1.0 } else { 1.0 };
            for i in 0..=steps {
                for j in 0..=steps {
                    let u = i as f32 / steps as f32;
                    let v = j as f32 / steps as f32;
                    let mut p = [0.0f32; 3];
                    let mut n = [0.0f32; 3];
                    p[axis] = side;
                    p[(axis + 1) % 3] = u;
                    p[(axis + 2) % 3] = v;
                    n[axis] = sign;
                    rows.push((p, n));
                }
            }
        }
    }

    let mut ply = String::new();
    ply.push_str("ply\nformat ascii 1.0\n");
    let _ = writeln!(ply, "element vertex {}", rows.len());
    for name in ["x", "y", "z", "nx", "ny", "nz"] {
        let _ = writeln!(ply, "property float {name}");
    }
    for name in ["red", "green", "blue"] {
        let _ = writeln!(ply, "property uchar {name}");
    }
    ply.push_str("end_header\n");
    for (p, n) in rows {
        let _ = writeln!(
            ply,
            "{} {} {} {} {} {} 255 0 0",
            p[0], p[1], p[2], n[0], n[1], n[2]
        );
    }
    ply
}

const UNIT_CUBE_OBJ: &str = "\
v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nv 0 0 1\nv 1 0 1\nv 1 1 1\nv 0 1 1\n\
f 1 3 2\nf 1 4 3\nf 5 6 7\nf 5 7 8\nf 1 2 6\nf 1 6 5\n\
f 2 3 7\nf 2 7 6\nf 3 4 8\nf 3 8 7\nf 4 1 5\nf 4 5 8\n";

fn edge_use(mesh: &Mesh) -> HashMap<(u32, u32), usize> {
    let mut edges = HashMap::new();
    for face in &mesh.faces {
        for k in 0..3 {
            let (a, b) = (face[k], face[(k + 1) % 3]);
            *edges.entry((a.min(b), a.max(b))).or_insert(0) += 1;
        }
    }
    edges
}

fn component_count(mesh: &Mesh) -> usize {
    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }
    let mut parent: Vec<usize> = (0..mesh.vertex_count()).collect();
    for face in &mesh.faces {
        for k in 1..3 {
            let a = find(&mut parent, face[0] as usize);
            let b = find(&mut parent, face[k] as usize);
            parent[a] = b;
        }
    }
    let mut roots: Vec<usize> = (0..parent.len()).map(|v| find(&mut parent, v)).collect();
    roots.sort_unstable();
    roots.dedup();
    roots.len()
}

fn low_depth_config() -> ConvertConfig {
    ConvertConfig {
        depth: 5,
        ..ConvertConfig::default()
    }
}

#[test]
fn test_cube_cloud_becomes_single_closed_mesh() {
    let dir = scratch_dir("cube");
    let input = dir.join("cube.ply");
    let output = dir.join("out").join("cube.usda");
    std::fs::write(&input, cube_cloud_ply(20)).unwrap();

    let summary = convert_point_cloud(&input, &output, &low_depth_config()).unwrap();
    assert_eq!(summary.output, output);
    assert!(summary.faces > 0);

    let doc = assetgen_usd::read(&output).unwrap();
    assert_eq!(doc.metadata.up_axis, UpAxis::Z);
    assert_eq!(doc.metadata.meters_per_unit, 1.0);
    let mesh = doc.to_mesh();
    assert_eq!(mesh.face_count(), summary.faces);
    assert!(mesh.validate().is_ok());
    assert!(edge_use(&mesh).values().all(|&uses| uses == 2));
    assert_eq!(component_count(&mesh), 1);

    let colors = mesh.colors.as_ref().unwrap();
    assert!(colors.iter().all(|c| (c.x - 1.0).abs() < 1e-6 && c.y == 0.0));
    let normals = mesh.normals.as_ref().unwrap();
    assert_eq!(normals.len(), mesh.vertex_count());

    let extent = doc.mesh().extent;
    assert!(mesh.positions.iter().all(|p| extent.contains(*p)));
    // The surface hugs the unit cube.
    assert!(extent.min().cmpgt(glam::Vec3::splat(-0.2)).all());
    assert!(extent.max().cmplt(glam::Vec3::splat(1.2)).all());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_sparse_cube_at_default_depth_is_single_closed_mesh() {
    let dir = scratch_dir("sparse");
    let input = dir.join("cube.ply");
    let output = dir.join("cube.usda");
    std::fs::write(&input, cube_cloud_ply(10)).unwrap();

    let config = ConvertConfig::default();
    assert_eq!(config.depth, assetgen_recon::DEFAULT_DEPTH);
    let summary = convert_point_cloud(&input, &output, &config).unwrap();
    // Sample density keeps the grid far below 512 cells per axis.
    assert!(summary.faces < 100_000, "{} faces", summary.faces);

    let mesh = assetgen_usd::read(&output).unwrap().to_mesh();
    assert!(edge_use(&mesh).values().all(|&uses| uses == 2));
    assert_eq!(component_count(&mesh), 1);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_simplify_target_bounds_face_count() {
    let dir = scratch_dir("simplify");
    let input = dir.join("cube.ply");
    let output = dir.join("cube.usda");
    std::fs::write(&input, cube_cloud_ply(20)).unwrap();

    let config = ConvertConfig {
        mesh_simplify_target: 200,
        ..low_depth_config()
    };
    let summary = convert_point_cloud(&input, &output, &config).unwrap();
    assert!(summary.faces > 0);
    assert!(summary.faces <= 200);
    let doc = assetgen_usd::read(&output).unwrap();
    assert_eq!(doc.mesh().face_vertex_counts.len(), summary.faces);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_empty_point_cloud_writes_nothing() {
    let dir = scratch_dir("empty");
    let input = dir.join("empty.ply");
    let output = dir.join("empty.usda");
    std::fs::write(
        &input,
        "ply\nformat ascii 1.0\nelement vertex 0\n\
         property float x\nproperty float y\nproperty float z\nend_header\n",
    )
    .unwrap();

    let err = convert_point_cloud(&input, &output, &low_depth_config()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyInput);
    assert!(!output.exists());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_missing_input_is_read_error() {
    let dir = scratch_dir("missing");
    let output = dir.join("never.usda");
    let err =
        convert_point_cloud(&dir.join("nope.ply"), &output, &ConvertConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Read);
    assert!(!output.exists());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_invalid_config_is_rejected_before_loading() {
    let dir = scratch_dir("config");
    let output = dir.join("never.usda");
    let config = ConvertConfig {
        meters_per_unit: -1.0,
        ..ConvertConfig::default()
    };
    let err = convert_point_cloud(&dir.join("nope.ply"), &output, &config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(!output.exists());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_meters_per_unit_is_metadata_only() {
    let dir = scratch_dir("units");
    let input = dir.join("cube.obj");
    let output = dir.join("cube.usda");
    std::fs::write(&input, UNIT_CUBE_OBJ).unwrap();

    let config = ConvertConfig {
        meters_per_unit: 0.001,
        ..ConvertConfig::default()
    };
    let summary = convert_mesh(&input, &output, &config).unwrap();
    assert_eq!(summary.vertices, 8);
    assert_eq!(summary.faces, 12);

    let doc = assetgen_usd::read(&output).unwrap();
    assert_eq!(doc.metadata.meters_per_unit, 0.001);
    let source = assetgen_data::load_obj_mesh(&input).unwrap();
    let mesh = doc.to_mesh();
    assert_eq!(mesh.positions, source.positions);
    assert_eq!(mesh.faces, source.faces);
    assert_eq!(doc.mesh().extent, source.bounds().unwrap());
    std::fs::remove_dir_all(&dir).ok();
}
