//! Kernel functions
//!
//! The engine supports a closed set of kernels selected at problem-setup
//! time. RBF evaluation goes through the memoized squared norms of the
//! feature vectors, so `||x - y||^2` costs one dot product per pair.

use crate::core::{FeatureVector, Result, SvmError};
use serde::{Deserialize, Serialize};

/// Pairwise similarity function
///
/// Every variant must satisfy Mercer's condition for the dual problem to
/// be convex; the polynomial kernel additionally requires a non-negative
/// `coef0` for odd degrees, which is left to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum KernelFunction {
    /// `K(x, y) = x . y`
    Linear,
    /// `K(x, y) = (gamma * x . y + coef0) ^ degree`
    Polynomial { degree: u32, gamma: f64, coef0: f64 },
    /// `K(x, y) = exp(-gamma * ||x - y||^2)`
    Rbf { gamma: f64 },
    /// `K(x, y) = tanh(gamma * x . y + coef0)`
    Sigmoid { gamma: f64, coef0: f64 },
}

impl KernelFunction {
    /// RBF kernel with `gamma = 1 / dim`, a common default
    pub fn rbf_with_auto_gamma(dim: usize) -> Self {
        Self::Rbf {
            gamma: 1.0 / (dim.max(1) as f64),
        }
    }

    /// Validate the hyperparameters
    pub fn validate(&self) -> Result<()> {
        match *self {
            KernelFunction::Linear => Ok(()),
            KernelFunction::Polynomial { degree, gamma, .. } => {
                if degree == 0 {
                    return Err(SvmError::InvalidParameter(
                        "polynomial degree must be >= 1".to_string(),
                    ));
                }
                Self::check_gamma(gamma)
            }
            KernelFunction::Rbf { gamma } | KernelFunction::Sigmoid { gamma, .. } => {
                Self::check_gamma(gamma)
            }
        }
    }

    fn check_gamma(gamma: f64) -> Result<()> {
        if gamma <= 0.0 || !gamma.is_finite() {
            return Err(SvmError::InvalidParameter(format!(
                "gamma must be > 0, got {gamma}"
            )));
        }
        Ok(())
    }

    /// Evaluate `K(x, y)`
    pub fn evaluate(&self, x: &FeatureVector, y: &FeatureVector) -> f64 {
        match *self {
            KernelFunction::Linear => x.dot(y),
            KernelFunction::Polynomial {
                degree,
                gamma,
                coef0,
            } => (gamma * x.dot(y) + coef0).powi(degree as i32),
            KernelFunction::Rbf { gamma } => (-gamma * x.squared_distance(y)).exp(),
            KernelFunction::Sigmoid { gamma, coef0 } => (gamma * x.dot(y) + coef0).tanh(),
        }
    }

    /// Short identifier used by the model store
    pub fn type_name(&self) -> &'static str {
        match self {
            KernelFunction::Linear => "linear",
            KernelFunction::Polynomial { .. } => "polynomial",
            KernelFunction::Rbf { .. } => "rbf",
            KernelFunction::Sigmoid { .. } => "sigmoid",
        }
    }
}

impl Default for KernelFunction {
    /// Linear kernel
    fn default() -> Self {
        KernelFunction::Linear
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fv(components: &[f64]) -> FeatureVector {
        FeatureVector::new(components.to_vec(), 0.0)
    }

    #[test]
    fn test_linear_kernel_is_dot_product() {
        let k = KernelFunction::Linear;
        let x = fv(&[1.0, 3.0, 2.0]);
        let y = fv(&[2.0, 0.0, 4.0]);
        assert_eq!(k.evaluate(&x, &y), 10.0);
    }

    #[test]
    fn test_rbf_kernel_identical_vectors() {
        let k = KernelFunction::Rbf { gamma: 0.5 };
        let x = fv(&[1.0, 2.0, 3.0]);
        assert!((k.evaluate(&x, &x) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rbf_kernel_known_value() {
        let k = KernelFunction::Rbf { gamma: 0.5 };
        let x = fv(&[1.0, 0.0]);
        let y = fv(&[0.0, 1.0]);
        // ||x - y||^2 = 2, K = exp(-1)
        assert!((k.evaluate(&x, &y) - (-1.0f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_rbf_kernel_decreases_with_distance() {
        let k = KernelFunction::Rbf { gamma: 1.0 };
        let x = fv(&[0.0]);
        let near = k.evaluate(&x, &fv(&[1.0]));
        let far = k.evaluate(&x, &fv(&[2.0]));
        assert!(near > far);
        assert!(far > 0.0);
    }

    #[test]
    fn test_polynomial_kernel() {
        let k = KernelFunction::Polynomial {
            degree: 2,
            gamma: 1.0,
            coef0: 1.0,
        };
        let x = fv(&[1.0, 1.0]);
        let y = fv(&[2.0, 0.0]);
        // (x.y + 1)^2 = 9
        assert_eq!(k.evaluate(&x, &y), 9.0);
    }

    #[test]
    fn test_sigmoid_kernel_bounded() {
        let k = KernelFunction::Sigmoid {
            gamma: 0.1,
            coef0: 0.0,
        };
        let x = fv(&[5.0, -3.0]);
        let y = fv(&[1.0, 4.0]);
        let v = k.evaluate(&x, &y);
        assert!(v > -1.0 && v < 1.0);
    }

    #[test]
    fn test_kernel_symmetry() {
        let kernels = [
            KernelFunction::Linear,
            KernelFunction::Polynomial {
                degree: 3,
                gamma: 0.5,
                coef0: 1.0,
            },
            KernelFunction::Rbf { gamma: 0.5 },
            KernelFunction::Sigmoid {
                gamma: 0.5,
                coef0: -1.0,
            },
        ];
        let x = fv(&[1.0, 2.0, -1.0]);
        let y = fv(&[0.5, -2.0, 3.0]);
        for k in kernels {
            assert_eq!(k.evaluate(&x, &y), k.evaluate(&y, &x), "{k:?}");
        }
    }

    #[test]
    fn test_validation() {
        assert!(KernelFunction::Linear.validate().is_ok());
        assert!(KernelFunction::Rbf { gamma: 0.5 }.validate().is_ok());
        assert!(KernelFunction::Rbf { gamma: -1.0 }.validate().is_err());
        assert!(KernelFunction::Rbf { gamma: 0.0 }.validate().is_err());
        assert!(KernelFunction::Polynomial {
            degree: 0,
            gamma: 1.0,
            coef0: 0.0
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_auto_gamma() {
        assert_eq!(
            KernelFunction::rbf_with_auto_gamma(4),
            KernelFunction::Rbf { gamma: 0.25 }
        );
    }
}
