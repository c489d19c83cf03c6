//! Symmetric 3x3 eigen-decomposition by cyclic Jacobi rotations.

use glam::DVec3;

const MAX_SWEEPS: usize = 50;

/// Eigenvalues in ascending order with their unit eigenvectors.
#[derive(Debug, Clone, Copy)]
pub struct SymmetricEigen {
    pub values: [f64; 3],
    pub vectors: [DVec3; 3],
}

impl SymmetricEigen {
    /// Decompose a symmetric matrix given as rows.
    pub fn new(matrix: [[f64; 3]; 3]) -> Self {
        let mut a = matrix;
        let mut v = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

        let scale = a
            .iter()
            .flatten()
            .fold(0.0f64, |acc, x| acc.max(x.abs()));

        for _ in 0..MAX_SWEEPS {
            let off = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
            if off <= (scale * f64::EPSILON).powi(2) {
                break;
            }
            for (p, q) in [(0, 1), (0, 2), (1, 2)] {
                if a[p][q] == 0.0 {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for row in a.iter_mut() {
                    let (kp, kq) = (row[p], row[q]);
                    row[p] = c * kp - s * kq;
                    row[q] = s * kp + c * kq;
                }
                for k in 0..3 {
                    let (pk, qk) = (a[p][k], a[q][k]);
                    a[p][k] = c * pk - s * qk;
                    a[q][k] = s * pk + c * qk;
                }
                for row in v.iter_mut() {
                    let (kp, kq) = (row[p], row[q]);
                    row[p] = c * kp - s * kq;
                    row[q] = s * kp + c * kq;
                }
            }
        }

        let mut order = [0usize, 1, 2];
        order.sort_by(|&i, &j| a[i][i].total_cmp(&a[j][j]));
        let column = |j: usize| DVec3::new(v[0][j], v[1][j], v[2][j]).normalize_or_zero();

        Self {
            values: order.map(|i| a[i][i]),
            vectors: order.map(column),
        }
    }

    /// Eigenvector of the smallest eigenvalue.
    pub fn smallest_vector(&self) -> DVec3 {
        self.vectors[0]
    }
}

/// Covariance of a point set about its centroid, as matrix rows.
pub fn covariance(points: impl IntoIterator<Item = DVec3> + Clone) -> [[f64; 3]; 3] {
    let mut count = 0usize;
    let mut sum = DVec3::ZERO;
    for p in points.clone() {
        sum += p;
        count += 1;
    }
    if count == 0 {
        return [[0.0; 3]; 3];
    }
    let mean = sum / count as f64;
    let mut m = [[0.0; 3]; 3];
    for p in points {
        let d = (p - mean).to_array();
        for (i, row) in m.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell += d[i] * d[j];
            }
        }
    }
    for row in m.iter_mut() {
        for cell in row.iter_mut() {
            *cell /= count as f64;
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagonal_matrix() {
        let eig = SymmetricEigen::new([[3.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 2.0]]);
        assert_eq!(eig.values, [1.0, 2.0, 3.0]);
        assert!((eig.smallest_vector().abs() - DVec3::Y).length() < 1e-12);
    }

    #[test]
    fn test_reconstructs_matrix() {
        let m = [[4.0, 1.0, 0.5], [1.0, 3.0, -0.25], [0.5, -0.25, 1.0]];
        let eig = SymmetricEigen::new(m);
        for k in 0..3 {
            let v = eig.vectors[k];
            let mv = DVec3::new(
                m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
                m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
                m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
            );
            assert!((mv - v * eig.values[k]).length() < 1e-9);
        }
        assert!(eig.values[0] <= eig.values[1] && eig.values[1] <= eig.values[2]);
    }

    #[test]
    fn test_planar_covariance_normal() {
        let points = [
            DVec3::new(0.0, 0.0, 1.0),
            DVec3::new(1.0, 0.0, 1.0),
            DVec3::new(0.0, 1.0, 1.0),
            DVec3::new(1.0, 1.0, 1.0),
            DVec3::new(0.5, 0.3, 1.0),
        ];
        let eig = SymmetricEigen::new(covariance(points));
        assert!(eig.values[0].abs() < 1e-12);
        assert!((eig.smallest_vector().z.abs() - 1.0).abs() < 1e-9);
    }
}
