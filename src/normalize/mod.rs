//! Feature normalization pipeline
//!
//! Feature vectors are partitioned into ordered, named, non-overlapping
//! groups. Each group is normalized independently, in a fixed order: first
//! the group slice is scaled to unit norm (if the group's mode asks for
//! it), then each feature is centered and scaled using statistics learned
//! from the training set (if the mode asks for that).
//!
//! Computing statistics is an explicit, one-time `fit`; `apply` only ever
//! replays them. Classifying with stored parameters therefore reproduces
//! the training-time transformation exactly.

use crate::core::{
    BatchProgress, BatchStatus, FeatureVector, ProgressSink, Result, SvmError,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// What a feature group's normalization applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizationMode {
    /// Leave the group untouched
    None,
    /// Center and scale each feature with fitted statistics
    ZeroMeanUnitStddev,
    /// Scale the group slice to unit Euclidean norm
    UnitNorm,
    /// Unit norm first, then per-feature standardization
    Combined,
}

impl NormalizationMode {
    /// Whether the mode needs fitted statistics
    pub fn standardizes(self) -> bool {
        matches!(
            self,
            NormalizationMode::ZeroMeanUnitStddev | NormalizationMode::Combined
        )
    }

    /// Whether the mode rescales the group slice to unit norm
    pub fn scales_to_unit_norm(self) -> bool {
        matches!(self, NormalizationMode::UnitNorm | NormalizationMode::Combined)
    }

    /// Integer flag used by the model store
    pub fn flag(self) -> i64 {
        match self {
            NormalizationMode::None => 0,
            NormalizationMode::ZeroMeanUnitStddev => 1,
            NormalizationMode::UnitNorm => 2,
            NormalizationMode::Combined => 3,
        }
    }

    /// Inverse of [`flag`](Self::flag)
    pub fn from_flag(flag: i64) -> Result<Self> {
        match flag {
            0 => Ok(NormalizationMode::None),
            1 => Ok(NormalizationMode::ZeroMeanUnitStddev),
            2 => Ok(NormalizationMode::UnitNorm),
            3 => Ok(NormalizationMode::Combined),
            other => Err(SvmError::InvalidParameter(format!(
                "unknown normalization mode flag {other}"
            ))),
        }
    }
}

/// Named, ordered slice of the feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureGroup {
    /// Group name, unique within a normalizer
    pub name: String,
    /// Feature names; the group's width is their count
    pub feature_names: Vec<String>,
    /// Normalization applied to this group
    pub mode: NormalizationMode,
}

/// Fitted per-feature statistics of one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStatistics {
    pub means: Vec<f64>,
    pub stddevs: Vec<f64>,
}

/// Normalization pipeline over all feature groups
#[derive(Debug, Clone, PartialEq)]
pub struct Normalizer {
    groups: Vec<FeatureGroup>,
    statistics: Option<Vec<GroupStatistics>>,
}

impl Normalizer {
    /// Create an unfitted normalizer over the given groups
    pub fn new(groups: Vec<FeatureGroup>) -> Result<Self> {
        if groups.is_empty() {
            return Err(SvmError::InvalidParameter(
                "normalizer needs at least one feature group".to_string(),
            ));
        }
        for group in &groups {
            if group.feature_names.is_empty() {
                return Err(SvmError::InvalidParameter(format!(
                    "feature group '{}' is empty",
                    group.name
                )));
            }
        }
        for (i, a) in groups.iter().enumerate() {
            if groups[i + 1..].iter().any(|b| b.name == a.name) {
                return Err(SvmError::InvalidParameter(format!(
                    "duplicate feature group name '{}'",
                    a.name
                )));
            }
        }
        Ok(Self {
            groups,
            statistics: None,
        })
    }

    /// Reassemble a normalizer from persisted parts
    pub fn from_parts(
        groups: Vec<FeatureGroup>,
        statistics: Option<Vec<GroupStatistics>>,
    ) -> Result<Self> {
        let normalizer = Self::new(groups)?;
        if let Some(stats) = &statistics {
            if stats.len() != normalizer.groups.len() {
                return Err(SvmError::AttributeSize {
                    name: "group statistics".to_string(),
                    expected: normalizer.groups.len(),
                    actual: stats.len(),
                });
            }
            for (group, stat) in normalizer.groups.iter().zip(stats.iter()) {
                let width = group.feature_names.len();
                if stat.means.len() != width || stat.stddevs.len() != width {
                    return Err(SvmError::AttributeSize {
                        name: format!("statistics of group '{}'", group.name),
                        expected: width,
                        actual: stat.means.len().max(stat.stddevs.len()),
                    });
                }
            }
        }
        Ok(Self {
            statistics,
            ..normalizer
        })
    }

    /// Total feature dimensionality covered by the groups
    pub fn dim(&self) -> usize {
        self.groups.iter().map(|g| g.feature_names.len()).sum()
    }

    /// The feature groups in order
    pub fn groups(&self) -> &[FeatureGroup] {
        &self.groups
    }

    /// Fitted statistics, one entry per group, if `fit` has run
    pub fn statistics(&self) -> Option<&[GroupStatistics]> {
        self.statistics.as_deref()
    }

    /// Whether statistics have been fitted
    pub fn is_fitted(&self) -> bool {
        self.statistics.is_some()
    }

    /// Compute per-feature means and standard deviations from `vectors`
    ///
    /// Statistics are measured on the same view that `apply` standardizes:
    /// for groups whose mode includes unit-norm scaling, on the unit-normed
    /// slice. Calling `fit` again is an explicit re-fit and overwrites the
    /// previous statistics; `apply` never recomputes them.
    pub fn fit(&mut self, vectors: &[FeatureVector]) -> Result<()> {
        if vectors.is_empty() {
            return Err(SvmError::EmptyProblem);
        }
        self.check_dim(vectors[0].dim())?;
        for v in vectors {
            self.check_dim(v.dim())?;
        }

        log::info!(
            "fitting normalization statistics over {} vectors, {} groups",
            vectors.len(),
            self.groups.len()
        );

        let n = vectors.len() as f64;
        let mut statistics = Vec::with_capacity(self.groups.len());
        let mut start = 0;
        for group in &self.groups {
            let width = group.feature_names.len();
            let scaled = |v: &FeatureVector| -> Vec<f64> {
                let mut slice = v.components()[start..start + width].to_vec();
                if group.mode.scales_to_unit_norm() {
                    scale_to_unit_norm(&mut slice);
                }
                slice
            };

            let mut means = vec![0.0; width];
            for v in vectors {
                for (m, value) in means.iter_mut().zip(scaled(v)) {
                    *m += value;
                }
            }
            for m in &mut means {
                *m /= n;
            }

            let mut stddevs = vec![0.0; width];
            for v in vectors {
                for ((s, &m), value) in stddevs.iter_mut().zip(means.iter()).zip(scaled(v)) {
                    *s += (value - m) * (value - m);
                }
            }
            for s in &mut stddevs {
                *s = (*s / n).sqrt();
            }

            statistics.push(GroupStatistics { means, stddevs });
            start += width;
        }

        self.statistics = Some(statistics);
        Ok(())
    }

    /// Normalize one vector in place using the stored parameters
    ///
    /// Fails if a group's mode needs statistics that were never fitted.
    /// Degenerate features (stddev zero or non-finite, i.e. constant across
    /// the training set) are centered but not scaled.
    pub fn apply(&self, vector: &mut FeatureVector) -> Result<()> {
        self.check_dim(vector.dim())?;
        self.check_fitted()?;

        let statistics = self.statistics.as_deref();
        let components = vector.components_mut();
        let mut start = 0;
        for (idx, group) in self.groups.iter().enumerate() {
            let width = group.feature_names.len();
            let slice = &mut components[start..start + width];

            if group.mode.scales_to_unit_norm() {
                scale_to_unit_norm(slice);
            }
            if group.mode.standardizes() {
                let stats = &statistics.expect("fit checked above")[idx];
                for ((value, &mean), &stddev) in
                    slice.iter_mut().zip(&stats.means).zip(&stats.stddevs)
                {
                    let divisor = if stddev > 0.0 && stddev.is_finite() {
                        stddev
                    } else {
                        1.0
                    };
                    *value = (*value - mean) / divisor;
                }
            }
            start += width;
        }
        Ok(())
    }

    /// Normalize a batch of vectors on worker threads
    ///
    /// One progress tick per vector; after cancellation, in-flight vectors
    /// finish and the remaining ones are left untouched, reported via the
    /// returned status.
    pub fn apply_batch(
        &self,
        vectors: &mut [FeatureVector],
        sink: &dyn ProgressSink,
    ) -> Result<BatchStatus> {
        for v in vectors.iter() {
            self.check_dim(v.dim())?;
        }
        self.check_fitted()?;

        let batch = BatchProgress::new(sink, vectors.len());
        let touched: Vec<bool> = vectors
            .par_iter_mut()
            .map(|v| {
                if batch.is_cancelled() {
                    return false;
                }
                self.apply(v).expect("dimensions and fit checked above");
                batch.item_done();
                true
            })
            .collect();

        Ok(BatchStatus {
            completed: batch.completed(),
            cancelled: touched.iter().any(|&t| !t),
        })
    }

    fn check_dim(&self, dim: usize) -> Result<()> {
        if dim != self.dim() {
            return Err(SvmError::DimensionMismatch {
                expected: self.dim(),
                actual: dim,
            });
        }
        Ok(())
    }

    fn check_fitted(&self) -> Result<()> {
        if self.statistics.is_none() {
            if let Some(group) = self.groups.iter().find(|g| g.mode.standardizes()) {
                return Err(SvmError::NotFitted(group.name.clone()));
            }
        }
        Ok(())
    }
}

/// Scale a slice to unit Euclidean norm; zero slices stay untouched
fn scale_to_unit_norm(slice: &mut [f64]) {
    let norm_sq: f64 = slice.iter().map(|&v| v * v).sum();
    if norm_sq > 0.0 {
        let factor = 1.0 / norm_sq.sqrt();
        for value in slice.iter_mut() {
            *value *= factor;
        }
    }
}
