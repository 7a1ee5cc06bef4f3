//! Core value types for the SVM engine

use crate::core::{Result, SvmError};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Dense feature vector with a class label (or regression target)
///
/// The squared Euclidean norm is memoized on first use since RBF kernel
/// evaluation needs it for every pair. Any mutation of the components
/// invalidates the memo.
#[derive(Debug, Serialize, Deserialize)]
pub struct FeatureVector {
    components: Vec<f64>,
    label: f64,
    #[serde(skip)]
    norm_sq: OnceLock<f64>,
}

impl FeatureVector {
    /// Create a new feature vector
    pub fn new(components: Vec<f64>, label: f64) -> Self {
        Self {
            components,
            label,
            norm_sq: OnceLock::new(),
        }
    }

    /// Number of components
    pub fn dim(&self) -> usize {
        self.components.len()
    }

    /// Class label (or regression target)
    pub fn label(&self) -> f64 {
        self.label
    }

    /// Read-only view of the components
    pub fn components(&self) -> &[f64] {
        &self.components
    }

    /// Component at `i`
    ///
    /// # Panics
    /// Panics if `i >= dim()`
    pub fn component(&self, i: usize) -> f64 {
        self.components[i]
    }

    /// Set component `i`, invalidating the memoized norm
    pub fn set_component(&mut self, i: usize, value: f64) {
        self.components[i] = value;
        self.norm_sq = OnceLock::new();
    }

    /// Mutable view of the components, invalidating the memoized norm
    pub fn components_mut(&mut self) -> &mut [f64] {
        self.norm_sq = OnceLock::new();
        &mut self.components
    }

    /// Squared Euclidean norm, computed once and memoized
    pub fn squared_norm(&self) -> f64 {
        *self
            .norm_sq
            .get_or_init(|| self.components.iter().map(|&v| v * v).sum())
    }

    /// Dot product with another vector of the same dimensionality
    pub fn dot(&self, other: &FeatureVector) -> f64 {
        self.components
            .iter()
            .zip(other.components.iter())
            .map(|(&a, &b)| a * b)
            .sum()
    }

    /// Squared Euclidean distance, expressed through the memoized norms
    ///
    /// Clamped at zero to absorb cancellation error for near-identical vectors.
    pub fn squared_distance(&self, other: &FeatureVector) -> f64 {
        (self.squared_norm() + other.squared_norm() - 2.0 * self.dot(other)).max(0.0)
    }
}

impl Clone for FeatureVector {
    fn clone(&self) -> Self {
        let norm_sq = OnceLock::new();
        if let Some(&v) = self.norm_sq.get() {
            let _ = norm_sq.set(v);
        }
        Self {
            components: self.components.clone(),
            label: self.label,
            norm_sq,
        }
    }
}

impl PartialEq for FeatureVector {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components && self.label == other.label
    }
}

/// Training problem: an ordered collection of labeled feature vectors
///
/// Sample count and dimensionality are fixed for the problem's lifetime.
/// The solver and kernel layers only ever borrow the vectors.
#[derive(Debug, Clone)]
pub struct Problem {
    vectors: Vec<FeatureVector>,
    dim: usize,
}

impl Problem {
    /// Create a problem from labeled vectors
    ///
    /// Rejects empty collections, inconsistent dimensionalities, and
    /// non-finite components or labels before any training starts.
    pub fn new(vectors: Vec<FeatureVector>) -> Result<Self> {
        let first = vectors.first().ok_or(SvmError::EmptyProblem)?;
        let dim = first.dim();

        for v in &vectors {
            if v.dim() != dim {
                return Err(SvmError::DimensionMismatch {
                    expected: dim,
                    actual: v.dim(),
                });
            }
            if !v.label().is_finite() {
                return Err(SvmError::InvalidParameter(format!(
                    "non-finite label {}",
                    v.label()
                )));
            }
            if v.components().iter().any(|c| !c.is_finite()) {
                return Err(SvmError::InvalidParameter(
                    "non-finite feature component".to_string(),
                ));
            }
        }

        Ok(Self { vectors, dim })
    }

    /// Number of vectors
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Always false: construction rejects empty problems
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Dimensionality of every vector
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Vector at `i`
    ///
    /// # Panics
    /// Panics if `i >= len()`
    pub fn vector(&self, i: usize) -> &FeatureVector {
        &self.vectors[i]
    }

    /// All vectors in order
    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vectors
    }

    /// Labels in vector order
    pub fn labels(&self) -> Vec<f64> {
        self.vectors.iter().map(|v| v.label()).collect()
    }

    /// Distinct class labels in ascending order
    pub fn distinct_labels(&self) -> Vec<f64> {
        let mut labels = self.labels();
        labels.sort_by(|a, b| a.partial_cmp(b).expect("labels validated finite"));
        labels.dedup();
        labels
    }
}

/// Which dual formulation to solve
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SvmVariant {
    /// Classic C-SVM: box constraint `[0, C]`
    CSvc { c: f64 },
    /// Nu-SVM: additional equality constraint controlled by `nu` in (0, 1]
    NuSvc { nu: f64 },
}

/// Hyperparameters for one training run
#[derive(Debug, Clone)]
pub struct TrainParams {
    /// Formulation and its cost/fraction parameter
    pub variant: SvmVariant,
    /// Convergence tolerance on the maximal constraint violation
    pub epsilon: f64,
    /// Enable the shrinking heuristic
    pub shrinking: bool,
    /// Kernel cache budget in cache units (cached similarity values)
    pub cache_units: usize,
    /// Hard cap on solver iterations
    pub max_iterations: usize,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            variant: SvmVariant::CSvc { c: 1.0 },
            epsilon: 0.001,
            shrinking: true,
            cache_units: 8_000_000,
            max_iterations: 10_000_000,
        }
    }
}

impl TrainParams {
    /// Validate the hyperparameters before any solve loop starts
    pub fn validate(&self) -> Result<()> {
        match self.variant {
            SvmVariant::CSvc { c } => {
                if c <= 0.0 || !c.is_finite() {
                    return Err(SvmError::InvalidParameter(format!("C must be > 0, got {c}")));
                }
            }
            SvmVariant::NuSvc { nu } => {
                if !(nu > 0.0 && nu <= 1.0) {
                    return Err(SvmError::InvalidParameter(format!(
                        "nu must be in (0, 1], got {nu}"
                    )));
                }
            }
        }
        if self.epsilon <= 0.0 || !self.epsilon.is_finite() {
            return Err(SvmError::InvalidParameter(format!(
                "epsilon must be > 0, got {}",
                self.epsilon
            )));
        }
        if self.cache_units == 0 {
            return Err(SvmError::InvalidParameter(
                "cache budget must be nonzero".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(SvmError::InvalidParameter(
                "iteration cap must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Prediction of a single binary decision function
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Predicted class label
    pub label: f64,
    /// Raw decision function value
    pub decision_value: f64,
}

impl Prediction {
    /// Create a new prediction
    pub fn new(label: f64, decision_value: f64) -> Self {
        Self {
            label,
            decision_value,
        }
    }

    /// Distance from the decision boundary
    pub fn confidence(&self) -> f64 {
        self.decision_value.abs()
    }
}
