//! Label-signed kernel matrix view for the solver
//!
//! `Q[i][j] = y[i] * y[j] * K(x_i, x_j)`, served column-wise through the
//! bounded cache. The view holds non-owning references into the problem,
//! so shrinking swaps positions here without touching the problem itself.

use crate::cache::{CacheStats, ColumnCache};
use crate::core::FeatureVector;
use crate::kernel::KernelFunction;

/// Column access to the Q matrix of one binary subproblem
pub struct QMatrix<'a> {
    x: Vec<&'a FeatureVector>,
    y: Vec<i8>,
    kernel: KernelFunction,
    qd: Vec<f64>,
    cache: ColumnCache,
}

impl<'a> QMatrix<'a> {
    /// Build the view over a subproblem's vectors and +/-1 labels
    ///
    /// # Panics
    /// Panics if `x` and `y` differ in length
    pub fn new(
        x: Vec<&'a FeatureVector>,
        y: Vec<i8>,
        kernel: KernelFunction,
        cache_units: usize,
    ) -> Self {
        assert_eq!(x.len(), y.len(), "vector and label counts must match");
        let l = x.len();
        let qd: Vec<f64> = x.iter().map(|v| kernel.evaluate(v, v)).collect();
        Self {
            x,
            y,
            kernel,
            qd,
            cache: ColumnCache::new(l, cache_units),
        }
    }

    /// Number of vectors in the view
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Whether the view is empty
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Kernel value for the vectors currently at positions `i` and `j`
    ///
    /// Always evaluated analytically; the cache only ever holds whole
    /// columns, so this is the ground truth the cache is checked against.
    pub fn evaluate(&self, i: usize, j: usize) -> f64 {
        self.kernel.evaluate(self.x[i], self.x[j])
    }

    /// Column `i` of Q for positions `[0, len)`
    pub fn column(&mut self, i: usize, len: usize) -> &[f32] {
        let (buffer, filled) = self.cache.column(i, len);
        if filled < len {
            let yi = self.y[i] as f64;
            let xi = self.x[i];
            for j in filled..len {
                let k = self.kernel.evaluate(xi, self.x[j]);
                buffer[j] = (yi * self.y[j] as f64 * k) as f32;
            }
        }
        &buffer[..len]
    }

    /// Diagonal of Q (`y_i * y_i` is always 1, so this is `K(i, i)`)
    pub fn diagonal(&self) -> &[f64] {
        &self.qd
    }

    /// Exchange positions `i` and `j` across the view and the cache
    pub fn swap_index(&mut self, i: usize, j: usize) {
        self.cache.swap_index(i, j);
        self.x.swap(i, j);
        self.y.swap(i, j);
        self.qd.swap(i, j);
    }

    /// Drop all cached columns, e.g. between independent runs over the
    /// same view
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Cache statistics for diagnostics
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FeatureVector;

    fn vectors() -> Vec<FeatureVector> {
        vec![
            FeatureVector::new(vec![1.0, 0.0], 1.0),
            FeatureVector::new(vec![2.0, 0.0], 1.0),
            FeatureVector::new(vec![0.0, 1.0], -1.0),
        ]
    }

    fn qmatrix(vs: &[FeatureVector]) -> QMatrix<'_> {
        QMatrix::new(
            vs.iter().collect(),
            vec![1, 1, -1],
            KernelFunction::Rbf { gamma: 0.5 },
            1000,
        )
    }

    #[test]
    fn test_diagonal_is_one_for_rbf() {
        let vs = vectors();
        let q = qmatrix(&vs);
        for &d in q.diagonal() {
            assert!((d - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_column_sign_and_symmetry() {
        let vs = vectors();
        let mut q = qmatrix(&vs);
        let l = q.len();

        let mut m = vec![vec![0.0f32; l]; l];
        for i in 0..l {
            m[i].copy_from_slice(q.column(i, l));
        }

        for i in 0..l {
            for j in 0..l {
                assert!((m[i][j] - m[j][i]).abs() < 1e-6);
            }
        }
        // Opposite labels flip the sign
        assert!(m[0][2] < 0.0);
        assert!(m[0][1] > 0.0);
    }

    #[test]
    fn test_column_matches_evaluate_after_swap() {
        let vs = vectors();
        let mut q = qmatrix(&vs);
        let l = q.len();

        // Warm the cache, swap, then verify columns against direct evaluation
        for i in 0..l {
            q.column(i, l);
        }
        q.swap_index(0, 2);

        for i in 0..l {
            let column = q.column(i, l).to_vec();
            for j in 0..l {
                let expected = q.evaluate(i, j);
                let signed = column[j] as f64;
                // Strip the label signs to compare kernel values
                let unsigned = signed.abs();
                assert!(
                    (unsigned - expected.abs()).abs() < 1e-6,
                    "mismatch at ({i}, {j})"
                );
            }
        }
    }

    #[test]
    fn test_cached_column_reused() {
        let vs = vectors();
        let mut q = qmatrix(&vs);
        q.column(0, 3);
        q.column(0, 3);
        assert!(q.cache_stats().hits >= 1);
    }

    #[test]
    fn test_clear_cache_still_serves_correct_columns() {
        let vs = vectors();
        let mut q = qmatrix(&vs);
        let before = q.column(0, 3).to_vec();
        q.clear_cache();
        assert_eq!(q.cache_stats().cached_columns, 0);
        assert_eq!(q.column(0, 3), &before[..]);
    }
}
