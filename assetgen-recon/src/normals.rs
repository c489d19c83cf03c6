//! Per-point normal estimation for clouds that arrive without normals.
//!
//! Each normal is the smallest-eigenvalue direction of the covariance of the
//! point's hybrid radius/k-nearest neighborhood. Signs are then made
//! consistent by walking a minimum spanning tree of the neighbor graph.
//!
//! Points with fewer than [`MIN_NEIGHBORS`] neighbors (themselves included)
//! cannot support a plane fit. They receive [`FALLBACK_NORMAL`], are left out
//! of orientation propagation, and are never flipped.

use crate::eigen::{SymmetricEigen, covariance};
use crate::error::ReconstructionError;
use assetgen_data::{PointCloud, PointIndex};
use glam::Vec3;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::{debug, info, warn};

/// Normal assigned to points whose neighborhood is too sparse to fit.
pub const FALLBACK_NORMAL: Vec3 = Vec3::Z;

/// Neighborhood size (including the point itself) needed for a plane fit.
pub const MIN_NEIGHBORS: usize = 3;

/// Neighborhood search parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalParams {
    /// Search radius in source units.
    pub radius: f32,
    /// Maximum neighbors kept per point, nearest first.
    pub max_neighbors: usize,
}

impl Default for NormalParams {
    fn default() -> Self {
        Self {
            radius: 0.05,
            max_neighbors: 30,
        }
    }
}

/// Estimated normals plus which of them took the fallback.
#[derive(Debug, Clone)]
pub struct NormalEstimate {
    pub normals: Vec<Vec3>,
    pub fallback: Vec<bool>,
}

impl NormalEstimate {
    pub fn fallback_count(&self) -> usize {
        self.fallback.iter().filter(|f| **f).count()
    }
}

/// Return `cloud` unchanged if it already has normals, otherwise estimate
/// and orient them.
#[tracing::instrument(skip_all, fields(points = cloud.len()))]
pub fn ensure_normals(
    cloud: PointCloud,
    params: NormalParams,
) -> Result<PointCloud, ReconstructionError> {
    if cloud.has_normals() {
        debug!("Point cloud already carries normals");
        return Ok(cloud);
    }
    let estimate = estimate_normals(cloud.positions(), params)?;
    Ok(cloud.with_normals(estimate.normals)?)
}

/// Fit and orient a normal for every point.
pub fn estimate_normals(
    positions: &[Vec3],
    params: NormalParams,
) -> Result<NormalEstimate, ReconstructionError> {
    if !(params.radius.is_finite() && params.radius > 0.0) {
        return Err(ReconstructionError::InvalidParameter(format!(
            "normal search radius must be positive, got {}",
            params.radius
        )));
    }
    if params.max_neighbors < MIN_NEIGHBORS {
        return Err(ReconstructionError::InvalidParameter(format!(
            "max neighbors must be at least {}, got {}",
            MIN_NEIGHBORS, params.max_neighbors
        )));
    }

    let index = PointIndex::new(positions, params.radius);
    let neighborhoods: Vec<Vec<usize>> = positions
        .iter()
        .map(|p| index.within_radius(*p, params.radius, params.max_neighbors))
        .collect();

    let mut normals = Vec::with_capacity(positions.len());
    let mut fallback = Vec::with_capacity(positions.len());
    for neighbors in &neighborhoods {
        match fit_normal(positions, neighbors) {
            Some(n) => {
                normals.push(n);
                fallback.push(false);
            }
            None => {
                normals.push(FALLBACK_NORMAL);
                fallback.push(true);
            }
        }
    }

    let mut estimate = NormalEstimate { normals, fallback };
    let flipped = orient_normals(positions, &neighborhoods, &mut estimate);

    let fallbacks = estimate.fallback_count();
    if fallbacks > 0 {
        warn!(
            "{} of {} points had fewer than {} neighbors within {}; assigned fallback normal {:?}",
            fallbacks,
            positions.len(),
            MIN_NEIGHBORS,
            params.radius,
            FALLBACK_NORMAL
        );
    }
    info!(
        "Estimated {} normals ({} flipped for consistency)",
        positions.len(),
        flipped
    );
    Ok(estimate)
}

fn fit_normal(positions: &[Vec3], neighbors: &[usize]) -> Option<Vec3> {
    if neighbors.len() < MIN_NEIGHBORS {
        return None;
    }
    let cov = covariance(neighbors.iter().map(|&i| positions[i].as_dvec3()));
    let eig = SymmetricEigen::new(cov);
    // Coincident neighbors leave nothing to fit.
    if eig.values[2] <= 0.0 {
        return None;
    }
    let normal = eig.smallest_vector().as_vec3();
    normal.is_finite().then_some(normal).filter(|n| n.length_squared() > 0.5)
}

/// Make normal signs consistent along a minimum spanning tree whose edge
/// weights are `1 - |ni . nj|`. Each connected component is seeded at its
/// highest point, whose normal is turned to face +Z. Returns the number of
/// flipped normals.
fn orient_normals(
    positions: &[Vec3],
    neighborhoods: &[Vec<usize>],
    estimate: &mut NormalEstimate,
) -> usize {
    let n = positions.len();
    let mut adjacency: Vec<Vec<u32>> = vec![Vec::new(); n];
    for (i, neighbors) in neighborhoods.iter().enumerate() {
        if estimate.fallback[i] {
            continue;
        }
        for &j in neighbors {
            if j != i && !estimate.fallback[j] {
                adjacency[i].push(j as u32);
                adjacency[j].push(i as u32);
            }
        }
    }
    for list in &mut adjacency {
        list.sort_unstable();
        list.dedup();
    }

    let mut seeds: Vec<usize> = (0..n).filter(|&i| !estimate.fallback[i]).collect();
    seeds.sort_by(|&a, &b| positions[b].z.total_cmp(&positions[a].z).then(a.cmp(&b)));

    let normals = &mut estimate.normals;
    let mut visited = vec![false; n];
    let mut flipped = 0usize;
    let mut components = 0usize;
    let mut heap: BinaryHeap<Reverse<(OrderedFloat<f32>, u32, u32)>> = BinaryHeap::new();

    for seed in seeds {
        if visited[seed] {
            continue;
        }
        components += 1;
        visited[seed] = true;
        if normals[seed].z < 0.0 {
            normals[seed] = -normals[seed];
            flipped += 1;
        }
        push_edges(seed, &adjacency, &visited, normals, &mut heap);

        while let Some(Reverse((_, to, from))) = heap.pop() {
            let (to, from) = (to as usize, from as usize);
            if visited[to] {
                continue;
            }
            visited[to] = true;
            if normals[from].dot(normals[to]) < 0.0 {
                normals[to] = -normals[to];
                flipped += 1;
            }
            push_edges(to, &adjacency, &visited, normals, &mut heap);
        }
    }

    debug!("Orientation propagated over {} components", components);
    flipped
}

fn push_edges(
    from: usize,
    adjacency: &[Vec<u32>],
    visited: &[bool],
    normals: &[Vec3],
    heap: &mut BinaryHeap<Reverse<(OrderedFloat<f32>, u32, u32)>>,
) {
    for &to in &adjacency[from] {
        if visited[to as usize] {
            continue;
        }
        let weight = 1.0 - normals[from].dot(normals[to as usize]).abs();
        heap.push(Reverse((OrderedFloat(weight), to, from as u32)));
    }
}
