//! Error types for gridlu

use crate::dispatch::OpKind;
use thiserror::Error;

/// Result type alias using gridlu's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during setup or a factorization run
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid run configuration, detected before any work begins
    #[error("Invalid configuration '{param}': {reason}")]
    InvalidConfiguration {
        /// The offending parameter
        param: &'static str,
        /// Why it is invalid
        reason: String,
    },

    /// An accelerator operation completed with a non-success status.
    ///
    /// Fatal for the run: a partially factorized tile cannot be safely
    /// re-attempted without re-deriving its dependency chain.
    #[error("Accelerator op {kind} failed on block ({block_row}, {block_col}): {reason}")]
    Accelerator {
        /// The failing operation kind
        kind: OpKind,
        /// Global block-row coordinate of the output block
        block_row: usize,
        /// Global block-column coordinate of the output block
        block_col: usize,
        /// Completion diagnostic reported by the backend
        reason: String,
    },

    /// A pivot element too small to divide by on the no-pivoting path
    #[error("Singular pivot at local index {index} (|pivot| = {magnitude:e})")]
    SingularPivot {
        /// Row/column index of the pivot within its block
        index: usize,
        /// Absolute value of the offending pivot
        magnitude: f64,
    },

    /// A collective was called with a buffer size that does not match the root's
    #[error("Collective size mismatch: root sent {expected} bytes, local buffer holds {got}")]
    CollectiveMismatch {
        /// Byte length published by the root
        expected: usize,
        /// Byte length of the local buffer
        got: usize,
    },

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}
