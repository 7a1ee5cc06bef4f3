//! Two-class decision function
//!
//! A `BinaryModel` is the persisted unit of one solve: the support vectors,
//! their signed dual coefficients, the bias, the pair of class labels it
//! discriminates, and the kernel it was trained with. It is immutable once
//! built and never refers back to the training problem.

use crate::core::{
    FeatureVector, Prediction, ProgressSink, Result, SvmError, SvmVariant, TrainParams,
};
use crate::kernel::KernelFunction;
use crate::solver::{solve, QMatrix, SolutionInfo, SolveStatus, SolverVariant};

/// Trained two-class decision function
#[derive(Debug, Clone)]
pub struct BinaryModel {
    label_pos: f64,
    label_neg: f64,
    kernel: KernelFunction,
    dim: usize,
    support_vectors: Vec<FeatureVector>,
    coefficients: Vec<f64>,
    rho: f64,
    status: SolveStatus,
}

impl BinaryModel {
    /// Train one decision function separating `positives` from `negatives`
    ///
    /// `label_pos` / `label_neg` are the class labels reported by
    /// [`predict`](Self::predict). A cancelled solve still returns a model,
    /// marked [`SolveStatus::Cancelled`]; the caller decides whether to keep
    /// it.
    pub fn train(
        positives: &[&FeatureVector],
        negatives: &[&FeatureVector],
        label_pos: f64,
        label_neg: f64,
        kernel: KernelFunction,
        params: &TrainParams,
        sink: &dyn ProgressSink,
    ) -> Result<BinaryModel> {
        params.validate()?;
        kernel.validate()?;
        if positives.is_empty() || negatives.is_empty() {
            return Err(SvmError::InvalidParameter(
                "both classes need at least one vector".to_string(),
            ));
        }

        let np = positives.len();
        let nn = negatives.len();
        let l = np + nn;
        let dim = positives[0].dim();

        let x: Vec<&FeatureVector> = positives.iter().chain(negatives.iter()).copied().collect();
        if let Some(v) = x.iter().find(|v| v.dim() != dim) {
            return Err(SvmError::DimensionMismatch {
                expected: dim,
                actual: v.dim(),
            });
        }
        let mut y = vec![1i8; np];
        y.extend(std::iter::repeat(-1i8).take(nn));

        let (alpha, info) = match params.variant {
            SvmVariant::CSvc { c } => Self::solve_c_svc(&x, &y, c, kernel, params, sink),
            SvmVariant::NuSvc { nu } => Self::solve_nu_svc(&x, &y, nu, kernel, params, sink)?,
        };

        let mut support_vectors = Vec::new();
        let mut coefficients = Vec::new();
        for i in 0..l {
            if alpha[i].abs() > 0.0 {
                support_vectors.push(x[i].clone());
                coefficients.push(alpha[i]);
            }
        }

        if support_vectors.is_empty() {
            log::warn!(
                "training {label_pos} vs {label_neg} produced zero support vectors"
            );
        }
        log::debug!(
            "trained {label_pos} vs {label_neg}: {} support vectors, rho {:.6}, {:?}",
            support_vectors.len(),
            info.rho,
            info.status
        );

        Ok(BinaryModel {
            label_pos,
            label_neg,
            kernel,
            dim,
            support_vectors,
            coefficients,
            rho: info.rho,
            status: info.status,
        })
    }

    /// Classic C-SVM: linear term -1, box `[0, C]`; the returned alpha is
    /// already multiplied by the labels
    fn solve_c_svc(
        x: &[&FeatureVector],
        y: &[i8],
        c: f64,
        kernel: KernelFunction,
        params: &TrainParams,
        sink: &dyn ProgressSink,
    ) -> (Vec<f64>, SolutionInfo) {
        let l = x.len();
        let q = QMatrix::new(x.to_vec(), y.to_vec(), kernel, params.cache_units);
        let p = vec![-1.0; l];
        let alpha0 = vec![0.0; l];

        let (mut alpha, info) = solve(
            SolverVariant::Classic,
            q,
            &p,
            y,
            &alpha0,
            c,
            c,
            params.epsilon,
            params.shrinking,
            params.max_iterations,
            sink,
        );
        for i in 0..l {
            alpha[i] *= y[i] as f64;
        }
        (alpha, info)
    }

    /// Nu-SVM: box `[0, 1]`, the nu equality constraint, and a post-solve
    /// rescaling by the margin constant `r`
    fn solve_nu_svc(
        x: &[&FeatureVector],
        y: &[i8],
        nu: f64,
        kernel: KernelFunction,
        params: &TrainParams,
        sink: &dyn ProgressSink,
    ) -> Result<(Vec<f64>, SolutionInfo)> {
        let l = x.len();
        let np = y.iter().filter(|&&v| v == 1).count();
        let nn = l - np;

        if nu * l as f64 / 2.0 > np.min(nn) as f64 {
            return Err(SvmError::InfeasibleNu(nu));
        }

        let mut alpha0 = vec![0.0; l];
        let mut sum_pos = nu * l as f64 / 2.0;
        let mut sum_neg = nu * l as f64 / 2.0;
        for i in 0..l {
            if y[i] == 1 {
                alpha0[i] = sum_pos.min(1.0);
                sum_pos -= alpha0[i];
            } else {
                alpha0[i] = sum_neg.min(1.0);
                sum_neg -= alpha0[i];
            }
        }

        let q = QMatrix::new(x.to_vec(), y.to_vec(), kernel, params.cache_units);
        let p = vec![0.0; l];

        let (mut alpha, mut info) = solve(
            SolverVariant::Nu,
            q,
            &p,
            y,
            &alpha0,
            1.0,
            1.0,
            params.epsilon,
            params.shrinking,
            params.max_iterations,
            sink,
        );

        let r = info.r;
        if r <= 0.0 || !r.is_finite() {
            return Err(SvmError::InvalidParameter(format!(
                "degenerate nu solve, scaling constant r = {r}"
            )));
        }
        for i in 0..l {
            alpha[i] *= y[i] as f64 / r;
        }
        info.rho /= r;
        info.objective /= r * r;
        info.upper_bound_p = 1.0 / r;
        info.upper_bound_n = 1.0 / r;

        Ok((alpha, info))
    }

    /// Reassemble a model from persisted parts
    ///
    /// Used by the model store; validates that coefficient count and
    /// support-vector dimensionality are consistent.
    pub fn from_parts(
        label_pos: f64,
        label_neg: f64,
        kernel: KernelFunction,
        dim: usize,
        support_vectors: Vec<FeatureVector>,
        coefficients: Vec<f64>,
        rho: f64,
        status: SolveStatus,
    ) -> Result<BinaryModel> {
        if support_vectors.len() != coefficients.len() {
            return Err(SvmError::AttributeSize {
                name: "coefficients".to_string(),
                expected: support_vectors.len(),
                actual: coefficients.len(),
            });
        }
        if let Some(v) = support_vectors.iter().find(|v| v.dim() != dim) {
            return Err(SvmError::DimensionMismatch {
                expected: dim,
                actual: v.dim(),
            });
        }
        Ok(BinaryModel {
            label_pos,
            label_neg,
            kernel,
            dim,
            support_vectors,
            coefficients,
            rho,
            status,
        })
    }

    /// Raw decision function value `sum_i coef_i K(sv_i, x) - rho`
    pub fn decision_value(&self, x: &FeatureVector) -> f64 {
        let mut sum = 0.0;
        for (sv, &coef) in self.support_vectors.iter().zip(self.coefficients.iter()) {
            sum += coef * self.kernel.evaluate(sv, x);
        }
        sum - self.rho
    }

    /// Predict the class of `x`
    ///
    /// A strictly positive decision value votes for the positive label;
    /// zero and negative values vote for the negative label.
    pub fn predict(&self, x: &FeatureVector) -> Prediction {
        let dv = self.decision_value(x);
        let label = if dv > 0.0 {
            self.label_pos
        } else {
            self.label_neg
        };
        Prediction::new(label, dv)
    }

    /// The two class labels as `(positive, negative)`
    pub fn labels(&self) -> (f64, f64) {
        (self.label_pos, self.label_neg)
    }

    /// Kernel the model was trained with
    pub fn kernel(&self) -> &KernelFunction {
        &self.kernel
    }

    /// Input dimensionality
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Support vectors
    pub fn support_vectors(&self) -> &[FeatureVector] {
        &self.support_vectors
    }

    /// Signed dual coefficients, one per support vector
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Bias term
    pub fn rho(&self) -> f64 {
        self.rho
    }

    /// Number of support vectors
    pub fn n_support_vectors(&self) -> usize {
        self.support_vectors.len()
    }

    /// Terminal solver state this model was built from
    pub fn status(&self) -> SolveStatus {
        self.status
    }

    /// Whether the solve ran to its terminal criterion (not cancelled)
    pub fn is_complete(&self) -> bool {
        self.status != SolveStatus::Cancelled
    }
}
