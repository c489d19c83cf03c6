//! End-to-end conversions from captured geometry to an asset file.

use crate::config::ConvertConfig;
use crate::error::ConvertError;
use assetgen_data::{Mesh, PointCloud, load_obj_mesh, load_point_cloud};
use assetgen_recon::{
    clean, compute_bounds, compute_vertex_normals, decimate, ensure_normals, reconstruct_with,
    transfer_colors,
};
use assetgen_usd::{AssetDocument, StageMetadata, write};
use glam::Vec3;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What a conversion produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertSummary {
    pub output: PathBuf,
    pub vertices: usize,
    pub faces: usize,
}

/// PLY point cloud to asset: normals, Poisson reconstruction, cleaning,
/// optional decimation, attributes, then an atomic write.
#[tracing::instrument(skip_all, fields(input = %input.display()))]
pub fn convert_point_cloud(
    input: &Path,
    output: &Path,
    config: &ConvertConfig,
) -> Result<ConvertSummary, ConvertError> {
    config.validate()?;
    let cloud = load_point_cloud(input)?;
    let mesh = point_cloud_to_mesh(cloud, config)?;
    finish(mesh, output, config)
}

/// Run every geometry stage on an in-memory cloud.
pub fn point_cloud_to_mesh(
    cloud: PointCloud,
    config: &ConvertConfig,
) -> Result<Mesh, ConvertError> {
    let cloud = ensure_normals(cloud, config.normal_params())?;
    let mesh = reconstruct_with(&cloud, &config.poisson())?;
    debug!(
        "Reconstructed {} vertices, {} faces",
        mesh.vertex_count(),
        mesh.face_count()
    );

    let mesh = clean(mesh)?;
    if mesh.face_count() == 0 {
        return Err(ConvertError::EmptyMesh { stage: "cleaning" });
    }
    let mesh = match config.simplify_target() {
        Some(target) => decimate(mesh, target),
        None => mesh,
    };

    let mesh = compute_vertex_normals(mesh);
    Ok(transfer_colors(mesh, &cloud))
}

/// OBJ mesh to asset. Geometry is written as loaded.
#[tracing::instrument(skip_all, fields(input = %input.display()))]
pub fn convert_mesh(
    input: &Path,
    output: &Path,
    config: &ConvertConfig,
) -> Result<ConvertSummary, ConvertError> {
    config.validate()?;
    let mut mesh = load_obj_mesh(input)?;
    if let Some(colors) = mesh.colors.as_mut() {
        for color in colors.iter_mut() {
            *color = color.clamp(Vec3::ZERO, Vec3::ONE);
        }
    }
    finish(mesh, output, config)
}

fn finish(mesh: Mesh, output: &Path, config: &ConvertConfig) -> Result<ConvertSummary, ConvertError> {
    let bounds = compute_bounds(&mesh)?;
    let summary = ConvertSummary {
        output: output.to_path_buf(),
        vertices: mesh.vertex_count(),
        faces: mesh.face_count(),
    };
    let doc = AssetDocument::from_mesh(
        mesh,
        bounds,
        StageMetadata::with_meters_per_unit(config.meters_per_unit),
    )?;
    write(doc, output)?;
    info!(
        "Saved asset {} ({} vertices, {} faces)",
        output.display(),
        summary.vertices,
        summary.faces
    );
    Ok(summary)
}
