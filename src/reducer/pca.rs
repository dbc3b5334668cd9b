//! Principal component analysis over one song's feature matrix.
//!
//! The covariance matrix of the centered data is diagonalized with the cyclic Jacobi
//! method. Components come out as rows, ordered by explained variance, with each row's
//! sign fixed so its largest-magnitude entry is positive. Results are deterministic.

use ndarray::{Array1, Array2, Axis, s};
use thiserror::Error;

/// Sweeps over all off-diagonal pairs before giving up on convergence.
const MAX_SWEEPS: usize = 100;

/// Relative off-diagonal mass below which the matrix counts as diagonal.
const TOLERANCE: f64 = 1e-22;

#[derive(Error, Debug, PartialEq)]
pub enum PcaError {
    #[error("no rows to fit")]
    Empty,
    #[error("non-finite value in input")]
    NonFinite,
}

/// A fitted PCA model.
#[derive(Debug, Clone)]
pub struct Pca {
    /// Principal axes, one per row (n_components × n_features).
    pub components: Array2<f64>,
    /// Variance along each component.
    pub explained_variance: Array1<f64>,
}

impl Pca {
    /// Fit `n_components` components to `data` (rows = samples, columns = features).
    ///
    /// The component count is clamped to `min(rows, columns)`.
    pub fn fit(data: &Array2<f64>, n_components: usize) -> Result<Self, PcaError> {
        let (n_samples, n_features) = data.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(PcaError::Empty);
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(PcaError::NonFinite);
        }
        let k = n_components.min(n_samples).min(n_features);

        let mean = data.mean_axis(Axis(0)).ok_or(PcaError::Empty)?;
        let centered = data - &mean;
        let denom = (n_samples.max(2) - 1) as f64;
        let covariance = centered.t().dot(&centered) / denom;

        let (eigenvalues, eigenvectors) = symmetric_eigen(covariance);

        // Descending variance; stable so ties keep feature order
        let mut order: Vec<usize> = (0..n_features).collect();
        order.sort_by(|&a, &b| eigenvalues[b].total_cmp(&eigenvalues[a]));

        let mut components = Array2::<f64>::zeros((k, n_features));
        let mut explained_variance = Array1::<f64>::zeros(k);
        for (row, &col) in order.iter().take(k).enumerate() {
            let mut axis = eigenvectors.column(col).to_owned();
            flip_sign(&mut axis);
            components.row_mut(row).assign(&axis);
            explained_variance[row] = eigenvalues[col].max(0.0);
        }

        Ok(Self {
            components,
            explained_variance,
        })
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    /// Components copied into a `rows × cols` zero matrix and flattened row-major.
    ///
    /// Components beyond `rows` and features beyond `cols` are dropped; missing ones stay
    /// zero. The result always has `rows * cols` entries.
    pub fn fixed_summary(&self, rows: usize, cols: usize) -> Vec<f64> {
        let mut fixed = Array2::<f64>::zeros((rows, cols));
        let r = self.components.nrows().min(rows);
        let c = self.components.ncols().min(cols);
        fixed
            .slice_mut(s![..r, ..c])
            .assign(&self.components.slice(s![..r, ..c]));
        fixed.iter().copied().collect()
    }
}

/// Make the largest-magnitude entry positive.
fn flip_sign(axis: &mut Array1<f64>) {
    let pivot = axis
        .iter()
        .copied()
        .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
    if pivot < 0.0 {
        axis.mapv_inplace(|v| -v);
    }
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns `(eigenvalues, eigenvectors)` with eigenvector `i` in column `i`.
fn symmetric_eigen(mut a: Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut v = Array2::<f64>::eye(n);

    let total: f64 = a.iter().map(|x| x * x).sum();
    if total == 0.0 {
        return (a.diag().to_owned(), v);
    }

    for _ in 0..MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        if off <= TOLERANCE * total {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    (a.diag().to_owned(), v)
}
