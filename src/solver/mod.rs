//! SMO solver for the SVM dual problem

pub mod qmatrix;
pub mod smo;

pub use self::qmatrix::QMatrix;
pub use self::smo::{solve, SolutionInfo, SolveStatus, SolverVariant};
