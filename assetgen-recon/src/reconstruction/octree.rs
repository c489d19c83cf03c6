//! Regular octree levels over the reconstruction domain.
//!
//! Level `d` divides the domain cube into `2^d` cells per axis. Nodes sit on
//! cell corners and are addressed by packed integer keys; the vector field
//! lives on the edges between nodes (a staggered grid).

use assetgen_data::BoundingBox;
use glam::{DVec3, Vec3};
use std::collections::{HashMap, HashSet};

const COORD_BITS: u32 = 20;
const COORD_MASK: u64 = (1 << COORD_BITS) - 1;

/// Pack node or cell coordinates into one key.
pub fn pack(c: [u32; 3]) -> u64 {
    c[0] as u64 | (c[1] as u64) << COORD_BITS | (c[2] as u64) << (2 * COORD_BITS)
}

pub fn unpack(key: u64) -> [u32; 3] {
    [
        (key & COORD_MASK) as u32,
        ((key >> COORD_BITS) & COORD_MASK) as u32,
        ((key >> (2 * COORD_BITS)) & COORD_MASK) as u32,
    ]
}

/// Key of the edge leaving node `c` along `axis`.
pub fn edge_key(axis: usize, c: [u32; 3]) -> u64 {
    pack(c) | (axis as u64) << (3 * COORD_BITS)
}

/// The cube all levels subdivide.
#[derive(Debug, Clone, Copy)]
pub struct Domain {
    pub origin: DVec3,
    pub size: f64,
}

impl Domain {
    /// Cube centered on `bounds` with edge `scale` times the longest extent.
    pub fn around(bounds: &BoundingBox, scale: f64) -> Self {
        let size = bounds.extent().as_dvec3().max_element() * scale;
        Self {
            origin: bounds.center().as_dvec3() - DVec3::splat(size * 0.5),
            size,
        }
    }

    /// Position in unit domain coordinates.
    pub fn to_unit(&self, p: Vec3) -> DVec3 {
        (p.as_dvec3() - self.origin) / self.size
    }

    pub fn from_unit(&self, u: DVec3) -> Vec3 {
        (self.origin + u * self.size).as_vec3()
    }
}

/// Cells per axis at `depth`.
pub fn resolution(depth: u32) -> u32 {
    1 << depth
}

/// Cell of `depth` containing a unit-coordinate point, clamped to the grid.
pub fn cell_of(u: DVec3, depth: u32) -> [u32; 3] {
    let n = resolution(depth);
    let g = (u * n as f64).floor();
    [g.x, g.y, g.z].map(|v| (v.max(0.0) as u32).min(n - 1))
}

/// Unit-coordinate position of a node at `depth`.
pub fn node_position(c: [u32; 3], depth: u32) -> DVec3 {
    DVec3::new(c[0] as f64, c[1] as f64, c[2] as f64) / resolution(depth) as f64
}

pub fn is_boundary_node(c: [u32; 3], depth: u32) -> bool {
    let n = resolution(depth);
    c.iter().any(|&v| v == 0 || v == n)
}

/// The eight corners of a cell; bit 0 of the index steps x, bit 1 y, bit 2 z.
pub fn cell_corners(cell: [u32; 3]) -> [[u32; 3]; 8] {
    std::array::from_fn(|i| {
        [
            cell[0] + (i as u32 & 1),
            cell[1] + ((i as u32 >> 1) & 1),
            cell[2] + ((i as u32 >> 2) & 1),
        ]
    })
}

/// Deepest level up to `max_depth` whose occupied cells hold at least
/// `samples_per_cell` samples on average. Finer levels would resolve the gaps
/// between samples instead of the surface through them.
pub fn density_depth(samples: &[DVec3], max_depth: u32, samples_per_cell: f64) -> u32 {
    if samples_per_cell <= 0.0 {
        return max_depth;
    }
    for depth in (2..=max_depth).rev() {
        let occupied: HashSet<[u32; 3]> = samples.iter().map(|u| cell_of(*u, depth)).collect();
        if samples.len() as f64 >= samples_per_cell * occupied.len() as f64 {
            return depth;
        }
    }
    1
}

/// Cells holding at least one sample, dilated by `margin` cells.
pub fn band_cells(samples: &[DVec3], depth: u32, margin: u32) -> HashSet<u64> {
    let n = resolution(depth) as i64;
    let margin = margin as i64;
    let occupied: HashSet<[u32; 3]> = samples.iter().map(|u| cell_of(*u, depth)).collect();

    let mut band = HashSet::new();
    for cell in occupied {
        for dx in -margin..=margin {
            for dy in -margin..=margin {
                for dz in -margin..=margin {
                    let c = [cell[0] as i64 + dx, cell[1] as i64 + dy, cell[2] as i64 + dz];
                    if c.iter().all(|&v| (0..n).contains(&v)) {
                        band.insert(pack(c.map(|v| v as u32)));
                    }
                }
            }
        }
    }
    band
}

/// Oriented samples in unit coordinates with their area weights.
pub struct Samples {
    pub positions: Vec<DVec3>,
    pub normals: Vec<DVec3>,
    pub areas: Vec<f64>,
}

impl Samples {
    /// Weight each sample by the finest-cell area it shares with the other
    /// samples in that cell.
    pub fn new(positions: Vec<DVec3>, normals: Vec<DVec3>, finest: u32) -> Self {
        let mut counts: HashMap<[u32; 3], u32> = HashMap::new();
        for u in &positions {
            *counts.entry(cell_of(*u, finest)).or_default() += 1;
        }
        let h = 1.0 / resolution(finest) as f64;
        let areas = positions
            .iter()
            .map(|u| {
                let shared = counts.get(&cell_of(*u, finest)).copied().unwrap_or(1);
                h * h / shared as f64
            })
            .collect();
        Self {
            positions,
            normals,
            areas,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }
}

/// Splat sample normals onto the edges of `depth` with trilinear weights.
///
/// Each value approximates the normal field averaged over the dual volume of
/// its edge, so the indicator jumps by about one across the surface at every
/// level.
pub fn splat_normals(samples: &Samples, depth: u32) -> HashMap<u64, f64> {
    let n = resolution(depth);
    let h = 1.0 / n as f64;
    let inv_volume = 1.0 / (h * h * h);
    let mut field: HashMap<u64, f64> = HashMap::new();

    for ((u, normal), area) in samples
        .positions
        .iter()
        .zip(&samples.normals)
        .zip(&samples.areas)
    {
        for axis in 0..3 {
            let mut q = *u * n as f64;
            q[axis] -= 0.5;
            let base = q.floor();
            let frac = q - base;
            for corner in 0..8 {
                let step = [corner & 1, (corner >> 1) & 1, (corner >> 2) & 1];
                let mut idx = [0i64; 3];
                let mut weight = 1.0;
                for k in 0..3 {
                    idx[k] = base[k] as i64 + step[k] as i64;
                    weight *= if step[k] == 1 { frac[k] } else { 1.0 - frac[k] };
                }
                let in_range = (0..3).all(|k| {
                    let limit = if k == axis { n as i64 - 1 } else { n as i64 };
                    (0..=limit).contains(&idx[k])
                });
                if !in_range || weight == 0.0 {
                    continue;
                }
                let key = edge_key(axis, idx.map(|v| v as u32));
                *field.entry(key).or_default() += weight * normal[axis] * area * inv_volume;
            }
        }
    }
    field
}

/// Node values of one level.
pub enum NodeValues {
    /// Every node of the grid, x fastest.
    Dense { side: u32, values: Vec<f64> },
    /// Nodes of a band, by packed key.
    Sparse(HashMap<u64, f64>),
}

impl NodeValues {
    /// Zero-filled storage for all `(2^depth + 1)^3` nodes.
    pub fn dense(depth: u32) -> Self {
        let side = resolution(depth) + 1;
        Self::Dense {
            side,
            values: vec![0.0; (side as usize).pow(3)],
        }
    }

    fn index(side: u32, c: [u32; 3]) -> Option<usize> {
        if c.iter().any(|&v| v >= side) {
            return None;
        }
        let s = side as usize;
        Some(c[0] as usize + s * (c[1] as usize + s * c[2] as usize))
    }

    pub fn get(&self, c: [u32; 3]) -> Option<f64> {
        match self {
            Self::Dense { side, values } => Self::index(*side, c).map(|i| values[i]),
            Self::Sparse(map) => map.get(&pack(c)).copied(),
        }
    }

    pub fn set(&mut self, c: [u32; 3], value: f64) {
        match self {
            Self::Dense { side, values } => {
                if let Some(i) = Self::index(*side, c) {
                    values[i] = value;
                }
            }
            Self::Sparse(map) => {
                map.insert(pack(c), value);
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Dense { values, .. } => values.len(),
            Self::Sparse(map) => map.len(),
        }
    }
}

/// Solved indicator values of one level.
pub struct Level {
    pub depth: u32,
    pub values: NodeValues,
}

impl Level {
    /// Trilinear interpolation inside the cell containing `u`, if all of the
    /// cell's corners were solved on this level.
    pub fn sample(&self, u: DVec3) -> Option<f64> {
        let cell = cell_of(u, self.depth);
        let g = u * resolution(self.depth) as f64;
        let f = DVec3::new(
            g.x - cell[0] as f64,
            g.y - cell[1] as f64,
            g.z - cell[2] as f64,
        )
        .clamp(DVec3::ZERO, DVec3::ONE);

        let mut value = 0.0;
        for (i, corner) in cell_corners(cell).iter().enumerate() {
            let v = self.values.get(*corner)?;
            let wx = if i & 1 == 1 { f.x } else { 1.0 - f.x };
            let wy = if i & 2 == 2 { f.y } else { 1.0 - f.y };
            let wz = if i & 4 == 4 { f.z } else { 1.0 - f.z };
            value += wx * wy * wz * v;
        }
        Some(value)
    }
}

/// Levels solved so far, coarsest first.
#[derive(Default)]
pub struct Hierarchy {
    pub levels: Vec<Level>,
}

impl Hierarchy {
    /// Indicator value at `u` from the finest level that covers it.
    pub fn sample(&self, u: DVec3) -> f64 {
        self.levels
            .iter()
            .rev()
            .find_map(|level| level.sample(u))
            .unwrap_or(0.0)
    }

    pub fn finest(&self) -> Option<&Level> {
        self.levels.last()
    }
}
