//! Trained models: binary decision functions and the one-vs-one wrapper

pub mod binary;
pub mod multiclass;

pub use self::binary::BinaryModel;
pub use self::multiclass::{BatchClassification, MultiClassModel, VoteOutcome};
