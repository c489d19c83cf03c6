//! Poisson surface reconstruction from oriented point samples.
//!
//! The indicator function of the sampled solid is recovered by solving
//! `Δχ = ∇·V`, where `V` is the normal field splatted onto an octree grid.
//! A coarse level is solved on the full grid; finer levels are solved only in
//! a band of cells around the samples, with the coarser solution prolonged in
//! as boundary values and initial guess. The surface is the level set of χ at
//! the mean indicator value over the samples.
//!
//! The requested depth is an upper bound. Levels finer than the sample
//! spacing supports are skipped, since their cells would resolve the gaps
//! between samples rather than the surface.
//!
//! Callers must estimate normals first (see [`crate::normals::ensure_normals`]);
//! a cloud without normals is rejected, not repaired.

mod extract;
mod octree;
mod solver;

use crate::eigen::{SymmetricEigen, covariance};
use crate::error::ReconstructionError;
use assetgen_data::{BoundingBox, Mesh, PointCloud};
use extract::Extractor;
use glam::DVec3;
use octree::{
    Domain, Hierarchy, Level, NodeValues, Samples, band_cells, cell_corners, density_depth,
    edge_key, is_boundary_node, node_position, pack, resolution, splat_normals, unpack,
};
use solver::{FIXED, LaplacianSystem};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Deepest supported octree.
pub const MAX_DEPTH: u32 = 12;

/// Octree depth used by the conversion pipeline.
pub const DEFAULT_DEPTH: u32 = 9;

/// Reconstruction parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PoissonConfig {
    /// Finest octree level; `2^depth` cells per axis.
    pub depth: u32,
    /// Deepest level solved on the full grid.
    pub dense_depth: u32,
    /// Domain edge as a multiple of the longest bounding-box extent.
    pub scale: f64,
    /// Cells around each sample kept in the sparse band.
    pub band: u32,
    /// Average samples per occupied cell the finest level must keep;
    /// zero always solves at `depth`.
    pub samples_per_cell: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for PoissonConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            dense_depth: 6,
            scale: 1.1,
            band: 2,
            samples_per_cell: 1.5,
            max_iterations: 1000,
            tolerance: 1e-6,
        }
    }
}

impl PoissonConfig {
    pub fn with_depth(depth: u32) -> Self {
        Self {
            depth,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), ReconstructionError> {
        if !(1..=MAX_DEPTH).contains(&self.depth) {
            return Err(ReconstructionError::InvalidDepth {
                depth: self.depth,
                max: MAX_DEPTH,
            });
        }
        if self.dense_depth == 0 {
            return Err(ReconstructionError::InvalidParameter(
                "dense depth must be at least 1".to_string(),
            ));
        }
        if !(self.scale.is_finite() && self.scale > 1.0) {
            return Err(ReconstructionError::InvalidParameter(format!(
                "domain scale must be greater than 1, got {}",
                self.scale
            )));
        }
        if self.band == 0 {
            return Err(ReconstructionError::InvalidParameter(
                "band must be at least one cell".to_string(),
            ));
        }
        if !(self.samples_per_cell.is_finite() && self.samples_per_cell >= 0.0) {
            return Err(ReconstructionError::InvalidParameter(format!(
                "samples per cell must be non-negative, got {}",
                self.samples_per_cell
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ReconstructionError::InvalidParameter(format!(
                "solver tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Reconstruct a triangle mesh at the given octree depth.
pub fn reconstruct(cloud: &PointCloud, depth: u32) -> Result<Mesh, ReconstructionError> {
    reconstruct_with(cloud, &PoissonConfig::with_depth(depth))
}

/// Reconstruct a triangle mesh with explicit parameters.
#[tracing::instrument(skip_all, fields(points = cloud.len(), depth = config.depth))]
pub fn reconstruct_with(
    cloud: &PointCloud,
    config: &PoissonConfig,
) -> Result<Mesh, ReconstructionError> {
    config.validate()?;
    let normals = cloud.normals().ok_or(ReconstructionError::MissingNormals)?;

    let (positions, directions): (Vec<_>, Vec<_>) = cloud
        .positions()
        .iter()
        .zip(normals)
        .filter_map(|(p, n)| {
            let n = n.as_dvec3();
            (p.is_finite() && n.is_finite() && n.length_squared() > 0.0)
                .then(|| (*p, n.normalize()))
        })
        .unzip();
    if positions.is_empty() {
        return Err(ReconstructionError::DegenerateNormals);
    }
    if positions.len() < cloud.len() {
        debug!(
            "Ignoring {} samples with zero or non-finite normals",
            cloud.len() - positions.len()
        );
    }

    let spread = SymmetricEigen::new(covariance(positions.iter().map(|p| p.as_dvec3())));
    let largest = spread.values[2];
    if largest <= 0.0 || spread.values[1] <= largest * 1e-12 {
        return Err(ReconstructionError::CollinearPoints);
    }

    let bounds =
        BoundingBox::from_points(&positions).ok_or(ReconstructionError::DegenerateNormals)?;
    let domain = Domain::around(&bounds, config.scale);
    let units: Vec<DVec3> = positions.iter().map(|p| domain.to_unit(*p)).collect();
    let depth = density_depth(&units, config.depth, config.samples_per_cell);
    if depth < config.depth {
        info!(
            "Sample density limits the octree to depth {} (requested {})",
            depth, config.depth
        );
    }
    let samples = Samples::new(units, directions, depth);

    let dense_depth = config.dense_depth.min(depth);
    let mut hierarchy = Hierarchy::default();
    hierarchy.levels.push(solve_dense(&samples, dense_depth, config)?);
    for level in dense_depth + 1..=depth {
        let band = band_cells(&samples.positions, level, config.band);
        let solved = solve_band(&samples, level, &band, &hierarchy, config)?;
        debug!(
            "Level {}: {} band cells, {} nodes",
            level,
            band.len(),
            solved.values.len()
        );
        hierarchy.levels.push(solved);
    }

    let iso = samples
        .positions
        .iter()
        .map(|u| hierarchy.sample(*u))
        .sum::<f64>()
        / samples.len() as f64;
    debug!("Iso value {:.6}", iso);

    let seeds = band_cells(&samples.positions, depth, config.band);
    let mesh = extract_surface(&hierarchy, &domain, depth, &seeds, iso);
    if mesh.is_empty() {
        return Err(ReconstructionError::EmptySurface);
    }
    info!(
        "Poisson reconstruction: {} vertices, {} faces",
        mesh.vertex_count(),
        mesh.face_count()
    );
    Ok(mesh)
}

/// Solve the full grid of `depth` with zero boundary values.
fn solve_dense(
    samples: &Samples,
    depth: u32,
    config: &PoissonConfig,
) -> Result<Level, ReconstructionError> {
    let n = resolution(depth);
    let mut active = Vec::with_capacity(((n - 1) as usize).pow(3));
    for z in 1..n {
        for y in 1..n {
            for x in 1..n {
                active.push([x, y, z]);
            }
        }
    }
    let empty = Hierarchy::default();
    let solved = solve_level(samples, depth, &active, &empty, config)?;
    let mut values = NodeValues::dense(depth);
    for (node, value) in active.into_iter().zip(solved) {
        values.set(node, value);
    }
    Ok(Level { depth, values })
}

/// Solve the corners of the band cells, taking everything outside the band
/// from the coarser levels.
fn solve_band(
    samples: &Samples,
    depth: u32,
    band: &HashSet<u64>,
    coarse: &Hierarchy,
    config: &PoissonConfig,
) -> Result<Level, ReconstructionError> {
    let mut nodes: HashSet<[u32; 3]> = HashSet::new();
    for cell in band {
        nodes.extend(cell_corners(unpack(*cell)));
    }
    let mut active: Vec<[u32; 3]> = nodes
        .iter()
        .copied()
        .filter(|c| !is_boundary_node(*c, depth))
        .collect();
    active.sort_unstable_by_key(|c| pack(*c));

    let solved = solve_level(samples, depth, &active, coarse, config)?;
    let mut values: HashMap<u64, f64> = nodes.into_iter().map(|c| (pack(c), 0.0)).collect();
    values.extend(active.iter().map(|c| pack(*c)).zip(solved));
    Ok(Level {
        depth,
        values: NodeValues::Sparse(values),
    })
}

/// Assemble and solve the Laplacian over `active` nodes of `depth`, returning
/// the solved values in the order of `active`.
///
/// Neighbors that are not active take their value from `coarse` (or zero on
/// the domain boundary) and move to the right-hand side.
fn solve_level(
    samples: &Samples,
    depth: u32,
    active: &[[u32; 3]],
    coarse: &Hierarchy,
    config: &PoissonConfig,
) -> Result<Vec<f64>, ReconstructionError> {
    let field = splat_normals(samples, depth);
    let h = 1.0 / resolution(depth) as f64;
    let index: HashMap<u64, u32> = active
        .iter()
        .enumerate()
        .map(|(i, c)| (pack(*c), i as u32))
        .collect();

    let fixed_value = |c: [u32; 3]| {
        if is_boundary_node(c, depth) {
            0.0
        } else {
            coarse.sample(node_position(c, depth))
        }
    };

    let mut neighbors = Vec::with_capacity(active.len());
    let mut rhs = Vec::with_capacity(active.len());
    for &c in active {
        let mut slots = [FIXED; 6];
        let mut b = 0.0;
        for axis in 0..3 {
            let mut below = c;
            below[axis] -= 1;
            let mut above = c;
            above[axis] += 1;

            let incoming = field.get(&edge_key(axis, below)).copied().unwrap_or(0.0);
            let outgoing = field.get(&edge_key(axis, c)).copied().unwrap_or(0.0);
            b += h * (incoming - outgoing);

            for (slot, neighbor) in [(2 * axis, below), (2 * axis + 1, above)] {
                match index.get(&pack(neighbor)) {
                    Some(&j) => slots[slot] = j,
                    None => b += fixed_value(neighbor),
                }
            }
        }
        neighbors.push(slots);
        rhs.push(b);
    }

    let mut x: Vec<f64> = active
        .iter()
        .map(|c| coarse.sample(node_position(*c, depth)))
        .collect();
    let system = LaplacianSystem { neighbors, rhs };
    let stats = system
        .solve(&mut x, config.max_iterations, config.tolerance)
        .ok_or(ReconstructionError::SolverDiverged { level: depth })?;
    debug!(
        "Level {}: {} unknowns, {} iterations",
        depth,
        active.len(),
        stats.iterations
    );
    if !stats.converged {
        warn!(
            "Level {} stopped after {} iterations at relative residual {:.3e}",
            depth, stats.iterations, stats.relative_residual
        );
    }

    Ok(x)
}

/// Node values of the finest grid: solved values where the finest level has
/// them, prolonged from the coarser levels elsewhere.
struct NodeField<'a> {
    hierarchy: &'a Hierarchy,
    depth: u32,
    cache: HashMap<u64, f64>,
}

impl NodeField<'_> {
    fn value(&mut self, c: [u32; 3]) -> f64 {
        let (hierarchy, depth) = (self.hierarchy, self.depth);
        *self.cache.entry(pack(c)).or_insert_with(|| {
            hierarchy
                .finest()
                .and_then(|level| level.values.get(c))
                .unwrap_or_else(|| hierarchy.sample(node_position(c, depth)))
        })
    }

    fn corners(&mut self, cell: [u32; 3]) -> [f64; 8] {
        cell_corners(cell).map(|c| self.value(c))
    }
}

/// Extract the level set on the finest grid.
///
/// Starting from the seed cells, the walk crosses every cell face whose
/// corners straddle the iso level. Each sheet passing through a seed is thus
/// extracted whole, including where it leaves the band, and comes out closed.
fn extract_surface(
    hierarchy: &Hierarchy,
    domain: &Domain,
    depth: u32,
    seeds: &HashSet<u64>,
    iso: f64,
) -> Mesh {
    let mut extractor = Extractor::new(domain, depth, iso);
    let level = extractor.level();
    let mut field = NodeField {
        hierarchy,
        depth,
        cache: HashMap::new(),
    };
    let n = resolution(depth);

    let mut visited: HashSet<u64> = HashSet::with_capacity(seeds.len());
    let mut queue: Vec<[u32; 3]> = seeds.iter().map(|k| unpack(*k)).collect();
    let mut crossing = Vec::new();
    while let Some(cell) = queue.pop() {
        if !visited.insert(pack(cell)) {
            continue;
        }
        let corners = cell_corners(cell);
        let values = field.corners(cell);
        let inside: [bool; 8] =
            std::array::from_fn(|i| level.offset(corners[i], values[i]) < 0.0);
        if inside.iter().all(|&s| s == inside[0]) {
            continue;
        }
        crossing.push(cell);

        for axis in 0..3 {
            for side in 0..2 {
                let count = (0..8)
                    .filter(|&i| (i >> axis) & 1 == side && inside[i])
                    .count();
                if count == 0 || count == 4 {
                    continue;
                }
                let mut next = cell;
                if side == 0 {
                    if cell[axis] == 0 {
                        continue;
                    }
                    next[axis] -= 1;
                } else {
                    if cell[axis] + 1 >= n {
                        continue;
                    }
                    next[axis] += 1;
                }
                if !visited.contains(&pack(next)) {
                    queue.push(next);
                }
            }
        }
    }
    debug!(
        "{} crossing cells from {} seeds, {} cached nodes",
        crossing.len(),
        seeds.len(),
        field.cache.len()
    );

    crossing.sort_unstable_by_key(|c| pack(*c));
    for cell in crossing {
        let values = field.corners(cell);
        extractor.add_cell(cell, values);
    }
    extractor.finish()
}
