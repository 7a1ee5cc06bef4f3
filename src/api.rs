//! High-level training interface
//!
//! # Quick Start
//!
//! ```rust
//! use svmkit::api::Svm;
//! use svmkit::core::{FeatureVector, Problem};
//! use svmkit::kernel::KernelFunction;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let problem = Problem::new(vec![
//!     FeatureVector::new(vec![2.0, 0.0], 1.0),
//!     FeatureVector::new(vec![-2.0, 0.0], -1.0),
//! ])?;
//!
//! let model = Svm::new()
//!     .with_kernel(KernelFunction::Rbf { gamma: 0.5 })
//!     .with_c(1.0)
//!     .train(&problem)?;
//!
//! let label = model.classify(problem.vector(0))?;
//! assert_eq!(label, 1.0);
//! # Ok(())
//! # }
//! ```

use crate::core::{NullProgress, Problem, ProgressSink, Result, SvmVariant, TrainParams};
use crate::kernel::KernelFunction;
use crate::model::MultiClassModel;

/// Builder-style entry point configuring kernel and hyperparameters
///
/// Training always goes through the one-vs-one wrapper; a two-class
/// problem simply yields a single pairwise model.
#[derive(Debug, Clone, Default)]
pub struct Svm {
    kernel: KernelFunction,
    params: TrainParams,
}

impl Svm {
    /// SVM with linear kernel and default parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the kernel function
    pub fn with_kernel(mut self, kernel: KernelFunction) -> Self {
        self.kernel = kernel;
        self
    }

    /// Use the classic C-SVM formulation with cost `c`
    pub fn with_c(mut self, c: f64) -> Self {
        self.params.variant = SvmVariant::CSvc { c };
        self
    }

    /// Use the nu-SVM formulation with fraction parameter `nu`
    pub fn with_nu(mut self, nu: f64) -> Self {
        self.params.variant = SvmVariant::NuSvc { nu };
        self
    }

    /// Set the convergence tolerance
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.params.epsilon = epsilon;
        self
    }

    /// Enable or disable the shrinking heuristic
    pub fn with_shrinking(mut self, shrinking: bool) -> Self {
        self.params.shrinking = shrinking;
        self
    }

    /// Set the kernel cache budget in cache units
    pub fn with_cache_units(mut self, cache_units: usize) -> Self {
        self.params.cache_units = cache_units;
        self
    }

    /// Set the solver iteration cap
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.params.max_iterations = max_iterations;
        self
    }

    /// The configured hyperparameters
    pub fn params(&self) -> &TrainParams {
        &self.params
    }

    /// The configured kernel
    pub fn kernel(&self) -> &KernelFunction {
        &self.kernel
    }

    /// Train on a problem without progress reporting
    pub fn train(&self, problem: &Problem) -> Result<MultiClassModel> {
        self.train_with_progress(problem, &NullProgress)
    }

    /// Train on a problem, reporting progress and honoring cancellation
    pub fn train_with_progress(
        &self,
        problem: &Problem,
        sink: &dyn ProgressSink,
    ) -> Result<MultiClassModel> {
        MultiClassModel::train(problem, self.kernel, &self.params, sink)
    }
}
