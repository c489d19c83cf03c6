//! Uniform hash-grid index over point positions.
//!
//! Serves the two neighborhood queries the pipeline needs: hybrid
//! radius/k-nearest gathering for normal fitting, and single nearest-point
//! lookup for attribute transfer.

use glam::Vec3;
use std::collections::HashMap;

type CellKey = [i32; 3];

/// Hash grid over a borrowed slice of points.
pub struct PointIndex<'a> {
    points: &'a [Vec3],
    cell_size: f32,
    cells: HashMap<CellKey, Vec<u32>>,
    min_key: CellKey,
    max_key: CellKey,
}

impl<'a> PointIndex<'a> {
    /// Build an index with the given cell size.
    ///
    /// Radius queries are cheapest when `cell_size` equals the query radius.
    pub fn new(points: &'a [Vec3], cell_size: f32) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            1.0
        };
        let mut cells: HashMap<CellKey, Vec<u32>> = HashMap::new();
        let mut min_key = [i32::MAX; 3];
        let mut max_key = [i32::MIN; 3];
        for (i, p) in points.iter().enumerate() {
            let key = key_of(*p, cell_size);
            for axis in 0..3 {
                min_key[axis] = min_key[axis].min(key[axis]);
                max_key[axis] = max_key[axis].max(key[axis]);
            }
            cells.entry(key).or_default().push(i as u32);
        }
        Self {
            points,
            cell_size,
            cells,
            min_key,
            max_key,
        }
    }

    /// Build an index whose cell size roughly matches the average spacing of
    /// a surface sampled by `points`.
    pub fn with_auto_cell_size(points: &'a [Vec3]) -> Self {
        let extent = match crate::types::BoundingBox::from_points(points) {
            Some(bounds) => bounds.extent().max_element(),
            None => 1.0,
        };
        let per_axis = (points.len() as f32).sqrt().max(1.0);
        Self::new(points, extent / per_axis)
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Indices of up to `max_neighbors` points within `radius` of `query`,
    /// nearest first. A point equal to `query` is included.
    pub fn within_radius(&self, query: Vec3, radius: f32, max_neighbors: usize) -> Vec<usize> {
        if self.points.is_empty() || max_neighbors == 0 {
            return Vec::new();
        }
        let radius_sq = radius * radius;
        let lo = key_of(query - Vec3::splat(radius), self.cell_size);
        let hi = key_of(query + Vec3::splat(radius), self.cell_size);

        let mut found: Vec<(f32, u32)> = Vec::new();
        for x in lo[0]..=hi[0] {
            for y in lo[1]..=hi[1] {
                for z in lo[2]..=hi[2] {
                    let Some(bucket) = self.cells.get(&[x, y, z]) else {
                        continue;
                    };
                    for &i in bucket {
                        let d = self.points[i as usize].distance_squared(query);
                        if d <= radius_sq {
                            found.push((d, i));
                        }
                    }
                }
            }
        }

        found.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        found.truncate(max_neighbors);
        found.into_iter().map(|(_, i)| i as usize).collect()
    }

    /// Index of the point nearest to `query`; ties go to the lower index.
    pub fn nearest(&self, query: Vec3) -> Option<usize> {
        if self.points.is_empty() {
            return None;
        }
        let center = key_of(query, self.cell_size);
        let max_ring = (0..3)
            .map(|axis| {
                (center[axis] - self.min_key[axis])
                    .abs()
                    .max((self.max_key[axis] - center[axis]).abs())
            })
            .max()
            .unwrap_or(0);

        let mut best: Option<(f32, u32)> = None;
        for ring in 0..=max_ring {
            self.scan_shell(center, ring, |i| {
                let d = self.points[i as usize].distance_squared(query);
                let better = match best {
                    None => true,
                    Some((best_d, best_i)) => d < best_d || (d == best_d && i < best_i),
                };
                if better {
                    best = Some((d, i));
                }
            });
            // Everything beyond this ring is at least `ring` cells away.
            if let Some((d, _)) = best {
                let reach = ring as f32 * self.cell_size;
                if d <= reach * reach {
                    break;
                }
            }
        }
        best.map(|(_, i)| i as usize)
    }

    fn scan_shell(&self, center: CellKey, ring: i32, mut visit: impl FnMut(u32)) {
        for dx in -ring..=ring {
            for dy in -ring..=ring {
                for dz in -ring..=ring {
                    if dx.abs().max(dy.abs()).max(dz.abs()) != ring {
                        continue;
                    }
                    let key = [center[0] + dx, center[1] + dy, center[2] + dz];
                    if let Some(bucket) = self.cells.get(&key) {
                        bucket.iter().for_each(|&i| visit(i));
                    }
                }
            }
        }
    }
}

fn key_of(p: Vec3, cell_size: f32) -> CellKey {
    let k = (p / cell_size).floor();
    [k.x as i32, k.y as i32, k.z as i32]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_points() -> Vec<Vec3> {
        let mut points = Vec::new();
        for x in 0..10 {
            for y in 0..10 {
                points.push(Vec3::new(x as f32 * 0.1, y as f32 * 0.1, 0.0));
            }
        }
        points
    }

    #[test]
    fn test_within_radius_includes_self_and_sorts() {
        let points = grid_points();
        let index = PointIndex::new(&points, 0.15);
        let query = points[55];
        let found = index.within_radius(query, 0.15, 30);
        assert_eq!(found[0], 55);
        // Self, four axis neighbors at 0.1 and four diagonals at 0.141.
        assert_eq!(found.len(), 9);
        for pair in found.windows(2) {
            assert!(
                points[pair[0]].distance(query) <= points[pair[1]].distance(query) + 1e-6
            );
        }
    }

    #[test]
    fn test_within_radius_truncates_to_max_neighbors() {
        let points = grid_points();
        let index = PointIndex::new(&points, 0.5);
        let found = index.within_radius(points[0], 0.5, 5);
        assert_eq!(found.len(), 5);
        assert_eq!(found[0], 0);
    }

    #[test]
    fn test_nearest_matches_brute_force() {
        let points = grid_points();
        let index = PointIndex::with_auto_cell_size(&points);
        let queries = [
            Vec3::new(0.33, 0.71, 0.2),
            Vec3::new(-3.0, 5.0, 1.0),
            Vec3::new(0.95, 0.05, -0.4),
        ];
        for q in queries {
            let expected = points
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.distance_squared(q).total_cmp(&b.1.distance_squared(q)))
                .map(|(i, _)| i);
            let got = index.nearest(q);
            assert_eq!(
                points[got.unwrap()].distance(q),
                points[expected.unwrap()].distance(q)
            );
        }
    }

    #[test]
    fn test_empty_index() {
        let points: Vec<Vec3> = Vec::new();
        let index = PointIndex::new(&points, 1.0);
        assert!(index.nearest(Vec3::ZERO).is_none());
        assert!(index.within_radius(Vec3::ZERO, 1.0, 10).is_empty());
    }
}
