//! Conjugate-gradient solve of the 7-point Laplacian on a node subset.

use tracing::{debug, warn};

/// Marker for a neighbor that is not an unknown of the system.
pub const FIXED: u32 = u32::MAX;

/// `6 x_i - sum(x_neighbors) = rhs_i` over the unknown nodes.
///
/// Contributions of fixed neighbors are already folded into `rhs`.
pub struct LaplacianSystem {
    pub neighbors: Vec<[u32; 6]>,
    pub rhs: Vec<f64>,
}

/// Outcome of a solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveStats {
    pub iterations: usize,
    pub relative_residual: f64,
    pub converged: bool,
}

impl LaplacianSystem {
    pub fn len(&self) -> usize {
        self.rhs.len()
    }

    fn apply(&self, x: &[f64], out: &mut [f64]) {
        for (i, (slot, neighbors)) in out.iter_mut().zip(&self.neighbors).enumerate() {
            let mut acc = 6.0 * x[i];
            for &j in neighbors {
                if j != FIXED {
                    acc -= x[j as usize];
                }
            }
            *slot = acc;
        }
    }

    /// Solve in place starting from `x`. Returns `None` if the iteration
    /// produced non-finite values.
    pub fn solve(&self, x: &mut [f64], max_iterations: usize, tolerance: f64) -> Option<SolveStats> {
        let n = self.len();
        let rhs_norm = norm(&self.rhs).max(f64::MIN_POSITIVE);

        let mut r = vec![0.0; n];
        self.apply(x, &mut r);
        for (ri, bi) in r.iter_mut().zip(&self.rhs) {
            *ri = bi - *ri;
        }
        let mut p = r.clone();
        let mut ap = vec![0.0; n];
        let mut rr = dot(&r, &r);
        if !rr.is_finite() {
            return None;
        }

        let mut iterations = 0;
        while iterations < max_iterations && rr.sqrt() > tolerance * rhs_norm {
            self.apply(&p, &mut ap);
            let pap = dot(&p, &ap);
            if pap <= 0.0 {
                break;
            }
            let alpha = rr / pap;
            for i in 0..n {
                x[i] += alpha * p[i];
                r[i] -= alpha * ap[i];
            }
            let rr_next = dot(&r, &r);
            if !rr_next.is_finite() {
                return None;
            }
            let beta = rr_next / rr;
            for i in 0..n {
                p[i] = r[i] + beta * p[i];
            }
            rr = rr_next;
            iterations += 1;
        }

        if !x.iter().all(|v| v.is_finite()) {
            return None;
        }
        let relative_residual = rr.sqrt() / rhs_norm;
        let converged = relative_residual <= tolerance;
        if converged {
            debug!(
                "CG converged in {} iterations over {} unknowns (residual {:.2e})",
                iterations, n, relative_residual
            );
        } else {
            warn!(
                "CG stopped after {} iterations over {} unknowns with residual {:.2e}",
                iterations, n, relative_residual
            );
        }
        Some(SolveStats {
            iterations,
            relative_residual,
            converged,
        })
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}
