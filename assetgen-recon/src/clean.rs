//! Mesh repair as an ordered pipeline of named passes.
//!
//! Each pass has a precondition checked before it runs and a postcondition it
//! establishes. Later passes can re-expose defects handled by earlier ones
//! (merging vertices can collapse a face, dropping faces can orphan
//! vertices), so the whole sequence repeats until a round removes nothing.

use crate::error::CleanError;
use assetgen_data::Mesh;
use glam::Vec3;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Faces with area at or below this fraction of the squared bounding-box
/// diagonal are degenerate.
pub const DEGENERATE_AREA_RATIO: f64 = 1e-14;

/// Upper bound on repair rounds; each productive round removes something, so
/// this is only reached on pathological input.
const MAX_ROUNDS: usize = 64;

/// One repair pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CleanPass {
    /// Drop vertices no face references.
    ///
    /// Pre: face indices in range. Post: every vertex is referenced.
    RemoveUnreferencedVertices,
    /// Drop faces with a repeated index or (near) zero area.
    ///
    /// Pre: face indices in range. Post: every face has three distinct
    /// indices and non-negligible area.
    RemoveDegenerateTriangles,
    /// Drop faces over the same vertex set as an earlier face, in any winding.
    ///
    /// Pre: face indices in range. Post: vertex sets are unique.
    RemoveDuplicatedTriangles,
    /// Merge vertices at identical positions into their first occurrence.
    ///
    /// Pre: face indices in range. Post: positions are unique and no face
    /// collapses to a repeated index.
    RemoveDuplicatedVertices,
    /// Keep at most two faces on any edge, dropping the smallest extras.
    ///
    /// Pre: face indices in range and distinct within each face. Post: no
    /// edge has more than two incident faces.
    RemoveNonManifoldEdges,
}

impl CleanPass {
    /// Passes in the order they must run.
    pub const ORDER: [CleanPass; 5] = [
        CleanPass::RemoveUnreferencedVertices,
        CleanPass::RemoveDegenerateTriangles,
        CleanPass::RemoveDuplicatedTriangles,
        CleanPass::RemoveDuplicatedVertices,
        CleanPass::RemoveNonManifoldEdges,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CleanPass::RemoveUnreferencedVertices => "remove_unreferenced_vertices",
            CleanPass::RemoveDegenerateTriangles => "remove_degenerate_triangles",
            CleanPass::RemoveDuplicatedTriangles => "remove_duplicated_triangles",
            CleanPass::RemoveDuplicatedVertices => "remove_duplicated_vertices",
            CleanPass::RemoveNonManifoldEdges => "remove_non_manifold_edges",
        }
    }

    pub fn check_precondition(self, mesh: &Mesh) -> Result<(), CleanError> {
        let violated = |reason: String| CleanError::PreconditionViolated {
            pass: self.name(),
            reason,
        };
        mesh.validate().map_err(|e| violated(e.to_string()))?;
        if self != CleanPass::RemoveNonManifoldEdges {
            return Ok(());
        }
        match mesh.faces.iter().position(has_repeated_index) {
            Some(face) => Err(violated(format!("face {face} repeats a vertex index"))),
            None => Ok(()),
        }
    }

    /// Run the pass, returning the new mesh and how many elements it removed.
    pub fn apply(self, mesh: Mesh) -> (Mesh, usize) {
        match self {
            CleanPass::RemoveUnreferencedVertices => remove_unreferenced_vertices(mesh),
            CleanPass::RemoveDegenerateTriangles => remove_degenerate_triangles(mesh),
            CleanPass::RemoveDuplicatedTriangles => remove_duplicated_triangles(mesh),
            CleanPass::RemoveDuplicatedVertices => remove_duplicated_vertices(mesh),
            CleanPass::RemoveNonManifoldEdges => remove_non_manifold_edges(mesh),
        }
    }

    /// Whether the pass's postcondition holds for `mesh`.
    pub fn postcondition_holds(self, mesh: &Mesh) -> bool {
        match self {
            CleanPass::RemoveUnreferencedVertices => {
                referenced(mesh).iter().all(|r| *r)
            }
            CleanPass::RemoveDegenerateTriangles => {
                let threshold = degenerate_threshold(mesh);
                mesh.faces
                    .iter()
                    .all(|f| !has_repeated_index(f) && mesh.face_area(*f) > threshold)
            }
            CleanPass::RemoveDuplicatedTriangles => {
                let mut seen = HashSet::new();
                mesh.faces.iter().all(|f| seen.insert(sorted(*f)))
            }
            CleanPass::RemoveDuplicatedVertices => {
                let mut seen = HashSet::new();
                mesh.positions.iter().all(|p| seen.insert(position_key(*p)))
                    && !mesh.faces.iter().any(has_repeated_index)
            }
            CleanPass::RemoveNonManifoldEdges => {
                edge_faces(&mesh.faces).values().all(|faces| faces.len() <= 2)
            }
        }
    }
}

/// Removal counts from one [`clean_with_report`] run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanReport {
    pub rounds: usize,
    /// The last round removed nothing.
    pub converged: bool,
    pub removed: HashMap<CleanPass, usize>,
}

impl CleanReport {
    pub fn removed_by(&self, pass: CleanPass) -> usize {
        self.removed.get(&pass).copied().unwrap_or(0)
    }
}

/// Apply every pass in [`CleanPass::ORDER`] until the mesh stops changing.
pub fn clean(mesh: Mesh) -> Result<Mesh, CleanError> {
    clean_with_report(mesh).map(|(mesh, _)| mesh)
}

#[tracing::instrument(skip_all, fields(vertices = mesh.vertex_count(), faces = mesh.face_count()))]
pub fn clean_with_report(mesh: Mesh) -> Result<(Mesh, CleanReport), CleanError> {
    clean_rounds(mesh, MAX_ROUNDS)
}

fn clean_rounds(mut mesh: Mesh, max_rounds: usize) -> Result<(Mesh, CleanReport), CleanError> {
    let mut report = CleanReport::default();
    let mut last_change = None;
    for round in 1..=max_rounds {
        report.rounds = round;
        let mut removed_this_round = 0;
        for pass in CleanPass::ORDER {
            pass.check_precondition(&mesh)?;
            let (next, removed) = pass.apply(mesh);
            mesh = next;
            if removed > 0 {
                debug!("Round {}: {} removed {}", round, pass.name(), removed);
                last_change = Some(pass);
            }
            *report.removed.entry(pass).or_default() += removed;
            removed_this_round += removed;
        }
        if removed_this_round == 0 {
            report.converged = true;
            break;
        }
    }
    if !report.converged {
        warn!(
            "Mesh still changing after {} repair rounds, last by {}",
            report.rounds,
            last_change.map_or("no pass", CleanPass::name)
        );
    }
    debug!(
        "Cleaned mesh: {} vertices, {} faces after {} rounds",
        mesh.vertex_count(),
        mesh.face_count(),
        report.rounds
    );
    Ok((mesh, report))
}

fn has_repeated_index(face: &[u32; 3]) -> bool {
    face[0] == face[1] || face[1] == face[2] || face[0] == face[2]
}

fn sorted(mut face: [u32; 3]) -> [u32; 3] {
    face.sort_unstable();
    face
}

/// Bit-exact key; `-0.0` and `0.0` are the same position.
fn position_key(p: Vec3) -> [u32; 3] {
    (p + Vec3::ZERO).to_array().map(f32::to_bits)
}

fn referenced(mesh: &Mesh) -> Vec<bool> {
    let mut used = vec![false; mesh.vertex_count()];
    for &i in mesh.faces.iter().flatten() {
        used[i as usize] = true;
    }
    used
}

fn degenerate_threshold(mesh: &Mesh) -> f64 {
    let diagonal = mesh.bounds().map_or(0.0, |b| b.diagonal() as f64);
    DEGENERATE_AREA_RATIO * diagonal * diagonal
}

fn edge_faces(faces: &[[u32; 3]]) -> HashMap<(u32, u32), Vec<usize>> {
    let mut map: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
    for (fi, f) in faces.iter().enumerate() {
        for k in 0..3 {
            let (a, b) = (f[k], f[(k + 1) % 3]);
            map.entry((a.min(b), a.max(b))).or_default().push(fi);
        }
    }
    map
}

fn remove_unreferenced_vertices(mesh: Mesh) -> (Mesh, usize) {
    let keep = referenced(&mesh);
    let removed = keep.iter().filter(|k| !**k).count();
    if removed == 0 {
        return (mesh, 0);
    }
    (mesh.retain_vertices(&keep), removed)
}

fn remove_degenerate_triangles(mut mesh: Mesh) -> (Mesh, usize) {
    let threshold = degenerate_threshold(&mesh);
    let before = mesh.faces.len();
    let faces = std::mem::take(&mut mesh.faces);
    mesh.faces = faces
        .into_iter()
        .filter(|f| !has_repeated_index(f) && mesh.face_area(*f) > threshold)
        .collect();
    let removed = before - mesh.faces.len();
    (mesh, removed)
}

fn remove_duplicated_triangles(mut mesh: Mesh) -> (Mesh, usize) {
    let before = mesh.faces.len();
    let mut seen = HashSet::with_capacity(before);
    mesh.faces.retain(|f| seen.insert(sorted(*f)));
    let removed = before - mesh.faces.len();
    (mesh, removed)
}

fn remove_duplicated_vertices(mesh: Mesh) -> (Mesh, usize) {
    let mut first: HashMap<[u32; 3], u32> = HashMap::with_capacity(mesh.vertex_count());
    let mut remap = Vec::with_capacity(mesh.vertex_count());
    let mut keep = Vec::with_capacity(mesh.vertex_count());
    for (i, p) in mesh.positions.iter().enumerate() {
        let target = *first.entry(position_key(*p)).or_insert(i as u32);
        remap.push(target);
        keep.push(target == i as u32);
    }
    let merged = keep.iter().filter(|k| !**k).count();
    if merged == 0 {
        return (mesh, 0);
    }

    let mut mesh = mesh.remap_faces(&remap);
    let before = mesh.faces.len();
    mesh.faces.retain(|f| !has_repeated_index(f));
    let collapsed = before - mesh.faces.len();
    (mesh.retain_vertices(&keep), merged + collapsed)
}

fn remove_non_manifold_edges(mut mesh: Mesh) -> (Mesh, usize) {
    let incident = edge_faces(&mesh.faces);
    let mut edges: Vec<(&(u32, u32), &Vec<usize>)> =
        incident.iter().filter(|(_, faces)| faces.len() > 2).collect();
    if edges.is_empty() {
        return (mesh, 0);
    }
    edges.sort_unstable_by_key(|(edge, _)| **edge);

    let mut alive = vec![true; mesh.faces.len()];
    for (_, faces) in edges {
        let mut remaining: Vec<usize> = faces.iter().copied().filter(|f| alive[*f]).collect();
        if remaining.len() <= 2 {
            continue;
        }
        // Largest first; ties keep the earlier face.
        remaining.sort_by(|a, b| {
            let (area_a, area_b) = (mesh.face_area(mesh.faces[*a]), mesh.face_area(mesh.faces[*b]));
            area_b.total_cmp(&area_a).then(a.cmp(b))
        });
        for &f in &remaining[2..] {
            alive[f] = false;
        }
    }

    let before = mesh.faces.len();
    let faces = std::mem::take(&mut mesh.faces);
    mesh.faces = faces
        .into_iter()
        .zip(&alive)
        .filter_map(|(f, keep)| keep.then_some(f))
        .collect();
    let removed = before - mesh.faces.len();
    (mesh, removed)
}
