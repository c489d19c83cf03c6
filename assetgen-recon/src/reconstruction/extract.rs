//! Isosurface extraction by marching tetrahedra.
//!
//! Every cell is split into six tetrahedra around its main diagonal. The split
//! is the same in every cell, so neighboring cells agree on their shared faces
//! and the surface has no cracks. Vertices are keyed by grid edge and shared
//! between all tetrahedra touching that edge.
//!
//! Cells must arrive in non-decreasing z order. Vertices on edges below the
//! current slab can no longer be shared and are dropped from the edge map.

use super::octree::{Domain, cell_corners, is_boundary_node, node_position, pack, unpack};
use assetgen_data::Mesh;
use glam::Vec3;
use std::collections::HashMap;

/// Kuhn split of a cell into tetrahedra, as corner indices.
const TETS: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 1, 5, 7],
    [0, 2, 3, 7],
    [0, 2, 6, 7],
    [0, 4, 5, 7],
    [0, 4, 6, 7],
];

/// Keeps interpolated vertices strictly inside their edge.
const EDGE_CLAMP: f64 = 0.01;

/// Signed distance of indicator values from the iso level.
#[derive(Debug, Clone, Copy)]
pub struct IsoLevel {
    iso: f64,
    snap: f64,
    depth: u32,
}

impl IsoLevel {
    pub fn new(iso: f64, depth: u32) -> Self {
        Self {
            iso,
            snap: iso.abs().max(1e-12) * 1e-6,
            depth,
        }
    }

    /// Value of `node` relative to the iso level; negative is inside.
    pub fn offset(&self, node: [u32; 3], raw: f64) -> f64 {
        let mut value = raw - self.iso;
        // Values on the level set count as outside.
        if value.abs() < self.snap {
            value = self.snap;
        }
        // The domain boundary is always outside, which closes the surface.
        if is_boundary_node(node, self.depth) {
            value = value.max(self.snap);
        }
        value
    }
}

/// A grid node with its indicator value relative to the iso level.
#[derive(Clone, Copy)]
struct Corner {
    key: u64,
    position: Vec3,
    value: f64,
}

impl Corner {
    fn inside(&self) -> bool {
        self.value < 0.0
    }
}

/// Collects triangles while sharing edge vertices.
pub struct Extractor<'a> {
    domain: &'a Domain,
    level: IsoLevel,
    positions: Vec<Vec3>,
    faces: Vec<[u32; 3]>,
    edge_vertices: HashMap<(u64, u64), u32>,
    slab: Option<u32>,
}

impl<'a> Extractor<'a> {
    pub fn new(domain: &'a Domain, depth: u32, iso: f64) -> Self {
        Self {
            domain,
            level: IsoLevel::new(iso, depth),
            positions: Vec::new(),
            faces: Vec::new(),
            edge_vertices: HashMap::new(),
            slab: None,
        }
    }

    pub fn level(&self) -> IsoLevel {
        self.level
    }

    /// Polygonize one cell given the indicator values of its eight corners.
    pub fn add_cell(&mut self, cell: [u32; 3], values: [f64; 8]) {
        if self.slab != Some(cell[2]) {
            let z = cell[2];
            // Only edges lying in the bottom plane of the new slab stay shared.
            self.edge_vertices
                .retain(|&(a, b), _| unpack(a)[2] == z && unpack(b)[2] == z);
            self.slab = Some(z);
        }

        let corners = cell_corners(cell);
        let depth = self.level.depth;
        let nodes: [Corner; 8] = std::array::from_fn(|i| Corner {
            key: pack(corners[i]),
            position: self.domain.from_unit(node_position(corners[i], depth)),
            value: self.level.offset(corners[i], values[i]),
        });

        for tet in TETS {
            self.add_tet(tet.map(|i| nodes[i]));
        }
    }

    fn add_tet(&mut self, tet: [Corner; 4]) {
        let (inside, outside): (Vec<Corner>, Vec<Corner>) =
            tet.iter().partition(|c| c.inside());
        match (inside.as_slice(), outside.as_slice()) {
            ([a], [b, c, d]) => {
                let tri = [self.vertex(a, b), self.vertex(a, c), self.vertex(a, d)];
                self.push_oriented(tri, &inside, &outside);
            }
            ([a, b, c], [d]) => {
                let tri = [self.vertex(a, d), self.vertex(b, d), self.vertex(c, d)];
                self.push_oriented(tri, &inside, &outside);
            }
            ([a, b], [c, d]) => {
                let quad = [
                    self.vertex(a, c),
                    self.vertex(a, d),
                    self.vertex(b, d),
                    self.vertex(b, c),
                ];
                self.push_oriented([quad[0], quad[1], quad[2]], &inside, &outside);
                self.push_oriented([quad[0], quad[2], quad[3]], &inside, &outside);
            }
            _ => {}
        }
    }

    /// Vertex on the edge between an inside and an outside node.
    fn vertex(&mut self, a: &Corner, b: &Corner) -> u32 {
        let (lo, hi) = if a.key < b.key { (a, b) } else { (b, a) };
        if let Some(&index) = self.edge_vertices.get(&(lo.key, hi.key)) {
            return index;
        }
        let t = (lo.value / (lo.value - hi.value)).clamp(EDGE_CLAMP, 1.0 - EDGE_CLAMP);
        let position = lo.position + (hi.position - lo.position) * t as f32;
        let index = self.positions.len() as u32;
        self.positions.push(position);
        self.edge_vertices.insert((lo.key, hi.key), index);
        index
    }

    /// Wind the triangle so its normal points from the inside nodes toward
    /// the outside nodes.
    fn push_oriented(&mut self, tri: [u32; 3], inside: &[Corner], outside: &[Corner]) {
        let centroid = |corners: &[Corner]| {
            corners.iter().map(|c| c.position).sum::<Vec3>() / corners.len() as f32
        };
        let outward = centroid(outside) - centroid(inside);
        let [a, b, c] = tri.map(|i| self.positions[i as usize]);
        let normal = (b - a).cross(c - a);
        if normal.dot(outward) < 0.0 {
            self.faces.push([tri[0], tri[2], tri[1]]);
        } else {
            self.faces.push(tri);
        }
    }

    pub fn finish(self) -> Mesh {
        Mesh::new(self.positions, self.faces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn unit_domain() -> Domain {
        Domain {
            origin: DVec3::ZERO,
            size: 1.0,
        }
    }

    #[test]
    fn test_single_corner_inside_gives_one_triangle_per_tet() {
        let domain = unit_domain();
        let mut extractor = Extractor::new(&domain, 4, 0.0);
        let mut values = [1.0; 8];
        values[0] = -1.0;
        extractor.add_cell([5, 5, 5], values);
        let mesh = extractor.finish();
        // Corner 0 is shared by all six tetrahedra.
        assert_eq!(mesh.face_count(), 6);
        // Edges from corner 0: three axis edges, three face diagonals, one body diagonal.
        assert_eq!(mesh.vertex_count(), 7);
    }

    #[test]
    fn test_winding_points_away_from_inside() {
        let domain = unit_domain();
        let mut extractor = Extractor::new(&domain, 4, 0.0);
        let mut values = [1.0; 8];
        values[0] = -1.0;
        extractor.add_cell([5, 5, 5], values);
        let mesh = extractor.finish();
        let inside = domain.from_unit(node_position([5, 5, 5], 4));
        for face in &mesh.faces {
            let [a, b, c] = mesh.triangle(*face);
            let normal = (b - a).cross(c - a);
            let center = (a + b + c) / 3.0;
            assert!(normal.dot(center - inside) > 0.0);
        }
    }

    #[test]
    fn test_adjacent_cells_share_vertices() {
        let domain = unit_domain();
        let mut extractor = Extractor::new(&domain, 4, 0.5);
        // Plane x = 0.5 in grid units through two cells stacked along y.
        let values = [0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        extractor.add_cell([3, 3, 3], values);
        extractor.add_cell([3, 4, 3], values);
        let mesh = extractor.finish();
        // Nine crossing edges per cell, three of them on the shared face.
        assert_eq!(mesh.vertex_count(), 15);
        for p in &mesh.positions {
            assert!((p.x * 16.0 - 3.5).abs() < 1e-5);
        }
        for (i, a) in mesh.positions.iter().enumerate() {
            for b in &mesh.positions[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_boundary_nodes_are_outside() {
        let domain = unit_domain();
        let mut extractor = Extractor::new(&domain, 2, 0.0);
        extractor.add_cell([0, 0, 0], [-1.0; 8]);
        let mesh = extractor.finish();
        // Only corner 7 is interior, so the surface wraps it.
        assert_eq!(mesh.face_count(), 6);
    }

    #[test]
    fn test_stacked_slabs_share_vertices() {
        let domain = unit_domain();
        let mut extractor = Extractor::new(&domain, 4, 0.5);
        let values = [0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        extractor.add_cell([3, 3, 3], values);
        extractor.add_cell([3, 3, 4], values);
        // Three vertices on the shared face were reused.
        assert_eq!(extractor.positions.len(), 15);
        // Only the upper cell's edges are still tracked.
        assert_eq!(extractor.edge_vertices.len(), 9);
        // Moving two slabs up leaves nothing to share.
        extractor.add_cell([3, 3, 6], values);
        assert_eq!(extractor.edge_vertices.len(), 9);
        let mesh = extractor.finish();
        assert_eq!(mesh.vertex_count(), 24);
    }

    #[test]
    fn test_offset_pushes_ties_and_boundary_outside() {
        let level = IsoLevel::new(-0.5, 3);
        assert!(level.offset([4, 4, 4], -0.5) > 0.0);
        assert!(level.offset([4, 4, 4], -0.75) < 0.0);
        assert!(level.offset([0, 4, 4], -0.75) > 0.0);
        assert!(level.offset([4, 8, 4], -1.0) > 0.0);
    }
}
