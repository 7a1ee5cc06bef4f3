//! Core types for the SVM engine

pub mod error;
pub mod progress;
pub mod types;

pub use self::error::*;
pub use self::progress::*;
pub use self::types::*;
