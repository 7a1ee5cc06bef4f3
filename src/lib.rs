//! Support Vector Machine training and classification engine
//!
//! Sequential Minimal Optimization solver (classic C-SVM and nu-SVM), a
//! bounded kernel column cache, a one-vs-one multi-class wrapper, a feature
//! normalization pipeline, and hierarchical model persistence.

pub mod api;
pub mod cache;
pub mod core;
pub mod kernel;
pub mod model;
pub mod normalize;
pub mod solver;
pub mod store;

// Re-export main types for convenience
pub use crate::api::Svm;
pub use crate::cache::{CacheStats, ColumnCache};
pub use crate::core::error::*;
pub use crate::core::progress::*;
pub use crate::core::types::*;
pub use crate::kernel::KernelFunction;
pub use crate::model::{BatchClassification, BinaryModel, MultiClassModel, VoteOutcome};
pub use crate::normalize::{FeatureGroup, GroupStatistics, NormalizationMode, Normalizer};
pub use crate::solver::{SolutionInfo, SolveStatus};
pub use crate::store::{load_binary, load_classifier, save_binary, save_classifier, AttrGroup};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
