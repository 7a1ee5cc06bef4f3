//! One-vs-one multi-class wrapper
//!
//! Trains one binary model per unordered class pair and aggregates by
//! majority vote. Pair trainings are independent and run on worker threads;
//! each solve gets its own kernel cache, so no cached similarity ever leaks
//! between pairs.
//!
//! Voting ties break to the smallest class label. The class list is sorted
//! ascending at training time, so the first class reaching the maximal vote
//! count wins.

use crate::core::{
    BatchProgress, BatchStatus, FeatureVector, Problem, ProgressSink, Result, SvmError,
    TrainParams,
};
use crate::kernel::KernelFunction;
use crate::model::BinaryModel;
use rayon::prelude::*;

/// Multi-class classifier aggregating pairwise binary models
#[derive(Debug, Clone)]
pub struct MultiClassModel {
    classes: Vec<f64>,
    dim: usize,
    models: Vec<BinaryModel>,
}

/// Label plus the per-class vote counts behind it
#[derive(Debug, Clone, PartialEq)]
pub struct VoteOutcome {
    /// Winning class label
    pub label: f64,
    /// Votes per class, aligned with the model's class list
    pub votes: Vec<usize>,
}

/// Labels of a cancellable batch classification
///
/// Entries are `None` for vectors skipped after cancellation.
#[derive(Debug, Clone)]
pub struct BatchClassification {
    pub labels: Vec<Option<f64>>,
    pub status: BatchStatus,
}

impl MultiClassModel {
    /// Train one binary model per class pair of `problem`
    ///
    /// For the pair `(a, b)` with `a < b` in the sorted class list, class
    /// `a` maps to the positive side. Pairs train in parallel; the sink
    /// sees one progress tick per finished pair and its cancellation flag
    /// is forwarded into every solve.
    pub fn train(
        problem: &Problem,
        kernel: KernelFunction,
        params: &TrainParams,
        sink: &dyn ProgressSink,
    ) -> Result<MultiClassModel> {
        params.validate()?;
        kernel.validate()?;

        let classes = problem.distinct_labels();
        if classes.len() < 2 {
            return Err(SvmError::InvalidParameter(format!(
                "multi-class training needs at least two classes, got {}",
                classes.len()
            )));
        }

        let by_class: Vec<Vec<&FeatureVector>> = classes
            .iter()
            .map(|&label| {
                problem
                    .vectors()
                    .iter()
                    .filter(|v| v.label() == label)
                    .collect()
            })
            .collect();

        let pairs: Vec<(usize, usize)> = (0..classes.len())
            .flat_map(|a| ((a + 1)..classes.len()).map(move |b| (a, b)))
            .collect();

        log::info!(
            "training one-vs-one: {} classes, {} pairwise models",
            classes.len(),
            pairs.len()
        );
        sink.update_status(&format!("training {} pairwise models", pairs.len()));

        let batch = BatchProgress::new(sink, pairs.len());
        let models = pairs
            .par_iter()
            .map(|&(a, b)| {
                let model = BinaryModel::train(
                    &by_class[a],
                    &by_class[b],
                    classes[a],
                    classes[b],
                    kernel,
                    params,
                    sink,
                )?;
                batch.item_done();
                Ok(model)
            })
            .collect::<Result<Vec<BinaryModel>>>()?;

        Ok(MultiClassModel {
            classes,
            dim: problem.dim(),
            models,
        })
    }

    /// Reassemble a model from persisted parts
    ///
    /// `models` must hold exactly one binary model per class pair, in the
    /// `(a, b), a < b` order produced by training.
    pub fn from_parts(
        classes: Vec<f64>,
        dim: usize,
        models: Vec<BinaryModel>,
    ) -> Result<MultiClassModel> {
        let k = classes.len();
        if k < 2 {
            return Err(SvmError::InvalidParameter(
                "class list needs at least two entries".to_string(),
            ));
        }
        let expected = k * (k - 1) / 2;
        if models.len() != expected {
            return Err(SvmError::AttributeSize {
                name: "pairwise models".to_string(),
                expected,
                actual: models.len(),
            });
        }
        Ok(MultiClassModel {
            classes,
            dim,
            models,
        })
    }

    /// Class labels in ascending order
    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Input dimensionality
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Pairwise binary models in `(a, b), a < b` order
    pub fn binary_models(&self) -> &[BinaryModel] {
        &self.models
    }

    /// Whether every pairwise solve ran to its terminal criterion
    ///
    /// False when any solve was cut short by cancellation; such a model is
    /// usable but explicitly incomplete.
    pub fn is_complete(&self) -> bool {
        self.models.iter().all(|m| m.is_complete())
    }

    /// Classify a single vector by majority vote
    pub fn classify(&self, x: &FeatureVector) -> Result<f64> {
        Ok(self.classify_with_votes(x)?.label)
    }

    /// Classify a single vector, returning the vote counts as well
    pub fn classify_with_votes(&self, x: &FeatureVector) -> Result<VoteOutcome> {
        if x.dim() != self.dim {
            return Err(SvmError::DimensionMismatch {
                expected: self.dim,
                actual: x.dim(),
            });
        }

        let k = self.classes.len();
        let mut votes = vec![0usize; k];
        let mut model_iter = self.models.iter();
        for a in 0..k {
            for b in (a + 1)..k {
                let model = model_iter.next().expect("one model per class pair");
                if model.decision_value(x) > 0.0 {
                    votes[a] += 1;
                } else {
                    votes[b] += 1;
                }
            }
        }

        // Ties break to the smallest class label: classes are sorted
        // ascending and only a strictly greater count replaces the winner
        let mut winner = 0;
        for (idx, &count) in votes.iter().enumerate() {
            if count > votes[winner] {
                winner = idx;
            }
        }

        Ok(VoteOutcome {
            label: self.classes[winner],
            votes,
        })
    }

    /// Classify a batch of vectors on worker threads
    ///
    /// Each vector is scored independently against the immutable model;
    /// the sink sees one progress tick per vector. After cancellation,
    /// in-flight vectors finish and the rest stay `None`.
    pub fn classify_batch(
        &self,
        vectors: &[FeatureVector],
        sink: &dyn ProgressSink,
    ) -> Result<BatchClassification> {
        if let Some(v) = vectors.iter().find(|v| v.dim() != self.dim) {
            return Err(SvmError::DimensionMismatch {
                expected: self.dim,
                actual: v.dim(),
            });
        }

        let batch = BatchProgress::new(sink, vectors.len());
        let labels: Vec<Option<f64>> = vectors
            .par_iter()
            .map(|v| {
                if batch.is_cancelled() {
                    return None;
                }
                let outcome = self
                    .classify_with_votes(v)
                    .expect("dimensions validated above");
                batch.item_done();
                Some(outcome.label)
            })
            .collect();

        let completed = batch.completed();
        let cancelled = labels.iter().any(|l| l.is_none());
        Ok(BatchClassification {
            labels,
            status: BatchStatus {
                completed,
                cancelled,
            },
        })
    }
}
