//! Quadric error metric edge-collapse simplification.
//!
//! Every vertex accumulates the area-weighted plane quadrics of its faces,
//! plus perpendicular planes along open boundary edges so borders do not
//! shrink. Edges are collapsed cheapest first from a lazy-deletion heap.
//! Collapses that would pinch the surface (link condition) or fold a face
//! over are deferred; if the target is still unmet once only deferred
//! collapses remain, they are forced so the face budget always holds.

use assetgen_data::Mesh;
use glam::{DMat3, DVec3};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::{debug, info};

/// Weight of boundary-preserving planes relative to face planes.
const BOUNDARY_WEIGHT: f64 = 10.0;

/// `x^T A x + 2 b.x + c`, the summed squared distance to a set of planes.
#[derive(Debug, Clone, Copy)]
struct Quadric {
    a: DMat3,
    b: DVec3,
    c: f64,
}

impl Quadric {
    const ZERO: Quadric = Quadric {
        a: DMat3::ZERO,
        b: DVec3::ZERO,
        c: 0.0,
    };

    /// Plane through `point` with unit `normal`, scaled by `weight`.
    fn plane(normal: DVec3, point: DVec3, weight: f64) -> Self {
        let d = -normal.dot(point);
        Self {
            a: DMat3::from_cols(normal * normal.x, normal * normal.y, normal * normal.z) * weight,
            b: normal * d * weight,
            c: d * d * weight,
        }
    }

    fn error(&self, x: DVec3) -> f64 {
        x.dot(self.a * x) + 2.0 * self.b.dot(x) + self.c
    }

    /// Minimizer of the quadric when the system is well conditioned.
    fn optimum(&self) -> Option<DVec3> {
        let scale = self
            .a
            .to_cols_array()
            .iter()
            .fold(0.0f64, |acc, v| acc.max(v.abs()));
        let det = self.a.determinant();
        if scale <= 0.0 || det.abs() <= 1e-9 * scale * scale * scale {
            return None;
        }
        let x = -(self.a.inverse() * self.b);
        x.is_finite().then_some(x)
    }
}

impl std::ops::Add for Quadric {
    type Output = Quadric;

    fn add(self, rhs: Quadric) -> Quadric {
        Quadric {
            a: self.a + rhs.a,
            b: self.b + rhs.b,
            c: self.c + rhs.c,
        }
    }
}

type HeapEntry = Reverse<(OrderedFloat<f64>, u32, u32, u32, u32)>;

struct Decimator {
    positions: Vec<DVec3>,
    quadrics: Vec<Quadric>,
    vertex_alive: Vec<bool>,
    stamps: Vec<u32>,
    vertex_faces: Vec<Vec<u32>>,
    faces: Vec<[u32; 3]>,
    face_alive: Vec<bool>,
    alive_faces: usize,
    heap: BinaryHeap<HeapEntry>,
}

impl Decimator {
    fn new(mesh: &Mesh) -> Self {
        let n = mesh.vertex_count();
        let positions: Vec<DVec3> = mesh.positions.iter().map(|p| p.as_dvec3()).collect();
        let mut quadrics = vec![Quadric::ZERO; n];
        let mut vertex_faces = vec![Vec::new(); n];
        let mut edge_count: HashMap<(u32, u32), u32> = HashMap::new();

        for (fi, face) in mesh.faces.iter().enumerate() {
            for &v in face {
                vertex_faces[v as usize].push(fi as u32);
            }
            for k in 0..3 {
                let (a, b) = (face[k], face[(k + 1) % 3]);
                *edge_count.entry((a.min(b), a.max(b))).or_default() += 1;
            }
            let cross = mesh.face_cross(*face);
            let double_area = cross.length();
            if double_area > 0.0 {
                let q = Quadric::plane(
                    cross / double_area,
                    positions[face[0] as usize],
                    double_area * 0.5,
                );
                for &v in face {
                    quadrics[v as usize] = quadrics[v as usize] + q;
                }
            }
        }

        // Planes through boundary edges, perpendicular to their face.
        for face in &mesh.faces {
            let cross = mesh.face_cross(*face);
            if cross.length_squared() == 0.0 {
                continue;
            }
            for k in 0..3 {
                let (a, b) = (face[k], face[(k + 1) % 3]);
                if edge_count.get(&(a.min(b), a.max(b))) != Some(&1) {
                    continue;
                }
                let edge = positions[b as usize] - positions[a as usize];
                let normal = edge.cross(cross).normalize_or_zero();
                if normal == DVec3::ZERO {
                    continue;
                }
                let q = Quadric::plane(
                    normal,
                    positions[a as usize],
                    edge.length_squared() * BOUNDARY_WEIGHT,
                );
                quadrics[a as usize] = quadrics[a as usize] + q;
                quadrics[b as usize] = quadrics[b as usize] + q;
            }
        }

        Self {
            positions,
            quadrics,
            vertex_alive: vec![true; n],
            stamps: vec![0; n],
            vertex_faces,
            faces: mesh.faces.clone(),
            face_alive: vec![true; mesh.face_count()],
            alive_faces: mesh.face_count(),
            heap: BinaryHeap::new(),
        }
    }

    fn alive_faces_of(&self, v: u32) -> impl Iterator<Item = u32> + '_ {
        self.vertex_faces[v as usize]
            .iter()
            .copied()
            .filter(|f| self.face_alive[*f as usize])
    }

    fn neighbors(&self, v: u32) -> HashSet<u32> {
        self.alive_faces_of(v)
            .flat_map(|f| self.faces[f as usize])
            .filter(|&u| u != v)
            .collect()
    }

    /// Cheapest placement for collapsing `a` and `b` and its error.
    fn placement(&self, a: u32, b: u32) -> (DVec3, f64) {
        let q = self.quadrics[a as usize] + self.quadrics[b as usize];
        let (pa, pb) = (self.positions[a as usize], self.positions[b as usize]);
        let mut candidates = vec![pa, pb, (pa + pb) * 0.5];
        if let Some(x) = q.optimum() {
            // Far-away optima come from nearly flat quadrics; stay local.
            let reach = (pb - pa).length() * 2.0;
            if x.distance((pa + pb) * 0.5) <= reach {
                candidates.insert(0, x);
            }
        }
        candidates
            .into_iter()
            .map(|x| (x, q.error(x).max(0.0)))
            .min_by(|l, r| l.1.total_cmp(&r.1))
            .unwrap_or((pa, 0.0))
    }

    fn push_edge(&mut self, a: u32, b: u32) {
        let (a, b) = (a.min(b), a.max(b));
        let (_, cost) = self.placement(a, b);
        self.heap.push(Reverse((
            OrderedFloat(cost),
            a,
            b,
            self.stamps[a as usize],
            self.stamps[b as usize],
        )));
    }

    fn seed_heap(&mut self) {
        self.heap.clear();
        let mut edges = HashSet::new();
        for (face, alive) in self.faces.iter().zip(&self.face_alive) {
            if !alive {
                continue;
            }
            for k in 0..3 {
                let (a, b) = (face[k], face[(k + 1) % 3]);
                edges.insert((a.min(b), a.max(b)));
            }
        }
        let mut edges: Vec<_> = edges.into_iter().collect();
        edges.sort_unstable();
        for (a, b) in edges {
            self.push_edge(a, b);
        }
    }

    /// Faces containing both `a` and `b`.
    fn shared_faces(&self, a: u32, b: u32) -> Vec<u32> {
        self.alive_faces_of(a)
            .filter(|f| self.faces[*f as usize].contains(&b))
            .collect()
    }

    /// The collapse keeps the surface a manifold: the only common neighbors
    /// of `a` and `b` are the apexes of their shared faces.
    fn link_condition(&self, a: u32, b: u32, shared: &[u32]) -> bool {
        let apexes: HashSet<u32> = shared
            .iter()
            .flat_map(|f| self.faces[*f as usize])
            .filter(|&v| v != a && v != b)
            .collect();
        let common: HashSet<u32> = self
            .neighbors(a)
            .intersection(&self.neighbors(b))
            .copied()
            .collect();
        common == apexes
    }

    /// No surviving face around `a` or `b` turns over or collapses when both
    /// move to `target`.
    fn preserves_orientation(&self, a: u32, b: u32, target: DVec3) -> bool {
        let moved = |v: u32| {
            if v == a || v == b {
                target
            } else {
                self.positions[v as usize]
            }
        };
        self.alive_faces_of(a).chain(self.alive_faces_of(b)).all(|f| {
            let face = self.faces[f as usize];
            if face.contains(&a) && face.contains(&b) {
                return true;
            }
            let [p0, p1, p2] = face.map(|v| self.positions[v as usize]);
            let before = (p1 - p0).cross(p2 - p0);
            let [q0, q1, q2] = face.map(moved);
            let after = (q1 - q0).cross(q2 - q0);
            after.length_squared() > 0.0 && before.dot(after) > 0.0
        })
    }

    /// Merge `b` into `a` at `target`.
    fn collapse(&mut self, a: u32, b: u32, target: DVec3) {
        let (ai, bi) = (a as usize, b as usize);
        self.positions[ai] = target;
        self.quadrics[ai] = self.quadrics[ai] + self.quadrics[bi];
        self.vertex_alive[bi] = false;
        self.stamps[ai] += 1;
        self.stamps[bi] += 1;

        let moved: Vec<u32> = self.vertex_faces[bi].clone();
        for f in moved {
            let fi = f as usize;
            if !self.face_alive[fi] {
                continue;
            }
            if self.faces[fi].contains(&a) {
                self.face_alive[fi] = false;
                self.alive_faces -= 1;
            } else {
                for v in &mut self.faces[fi] {
                    if *v == b {
                        *v = a;
                    }
                }
                self.vertex_faces[ai].push(f);
            }
        }
        self.vertex_faces[bi].clear();
        self.vertex_faces[ai].retain(|f| self.face_alive[*f as usize]);

        let mut around: Vec<u32> = self.neighbors(a).into_iter().collect();
        around.sort_unstable();
        for n in around {
            self.push_edge(a, n);
        }
    }

    /// Pop collapses until the target is met or the heap runs dry. Returns
    /// the number of deferred collapses.
    fn run(&mut self, target: usize, forced: bool) -> usize {
        let mut deferred = 0;
        while self.alive_faces > target {
            let Some(Reverse((_, a, b, stamp_a, stamp_b))) = self.heap.pop() else {
                break;
            };
            let (ai, bi) = (a as usize, b as usize);
            if !self.vertex_alive[ai]
                || !self.vertex_alive[bi]
                || self.stamps[ai] != stamp_a
                || self.stamps[bi] != stamp_b
            {
                continue;
            }
            let shared = self.shared_faces(a, b);
            if shared.is_empty() {
                continue;
            }
            let (position, _) = self.placement(a, b);
            if !forced
                && !(self.link_condition(a, b, &shared)
                    && self.preserves_orientation(a, b, position))
            {
                deferred += 1;
                continue;
            }
            self.collapse(a, b, position);
        }
        deferred
    }

    fn finish(self, mesh: Mesh) -> Mesh {
        let faces: Vec<[u32; 3]> = self
            .faces
            .iter()
            .zip(&self.face_alive)
            .filter_map(|(f, alive)| alive.then_some(*f))
            .collect();
        let mut keep = vec![false; self.positions.len()];
        for &v in faces.iter().flatten() {
            keep[v as usize] = true;
        }
        let out = Mesh {
            positions: self.positions.iter().map(|p| p.as_vec3()).collect(),
            faces,
            normals: None,
            colors: mesh.colors,
        };
        out.retain_vertices(&keep)
    }
}

/// Simplify `mesh` to at most `target` faces.
///
/// Returns the mesh unchanged when `target` is zero or the mesh already has
/// `target` faces or fewer. Otherwise vertex normals are dropped, since the
/// geometry they described has changed, and surviving vertices keep their
/// colors.
#[tracing::instrument(skip_all, fields(faces = mesh.face_count(), target = target))]
pub fn decimate(mesh: Mesh, target: usize) -> Mesh {
    if target == 0 || mesh.face_count() <= target {
        debug!("Decimation skipped");
        return mesh;
    }

    let before = mesh.face_count();
    let mut decimator = Decimator::new(&mesh);
    decimator.seed_heap();
    let deferred = decimator.run(target, false);
    if decimator.alive_faces > target {
        debug!(
            "{} collapses deferred; forcing the rest to reach {} faces",
            deferred, target
        );
        decimator.seed_heap();
        decimator.run(target, true);
    }

    let out = decimator.finish(mesh);
    info!("Decimated {} faces to {}", before, out.face_count());
    out
}
