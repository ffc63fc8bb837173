//! BCI-Core: Foundation types for the continuous classification pipeline
//!
//! Row-major dense matrices with axis-aware reductions, symmetric
//! eigendecomposition and SVD, and the shared error type.

pub mod decomposition;
pub mod error;
pub mod matrix;

pub use decomposition::{EigOrder, EigenResult, SvdResult};
pub use error::{PipelineError, PipelineResult};
pub use matrix::{Axis, DenseMatrix, DetrendMode};
