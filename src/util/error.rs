//! Error types for anchordet.

use thiserror::Error;

/// Result alias for anchordet operations.
pub type AnchorDetResult<T> = std::result::Result<T, AnchorDetError>;

/// Errors that can occur when configuring or running the pipeline.
#[derive(Debug, Error, PartialEq)]
pub enum AnchorDetError {
    /// A per-level configuration list does not have one entry per pyramid level.
    #[error("expected {expected} per-level values for {what}, got {got}")]
    LevelCountMismatch {
        /// Which configuration list is malformed.
        what: &'static str,
        /// Required entry count (one per pyramid level).
        expected: usize,
        /// Entry count actually supplied.
        got: usize,
    },
    /// A configuration list that must not be empty is empty.
    #[error("{what} must not be empty")]
    EmptyConfig {
        /// Which configuration list is empty.
        what: &'static str,
    },
    /// Two batched inputs disagree on batch size.
    #[error("batch size mismatch for {context}: expected {expected}, got {got}")]
    BatchSizeMismatch {
        /// Which input carries the wrong batch size.
        context: &'static str,
        /// Batch size derived from the image tensor.
        expected: usize,
        /// Batch size of the offending input.
        got: usize,
    },
    /// An input's row count does not match the anchor count.
    #[error("anchor count mismatch for {context}: expected {expected} rows, got {got}")]
    AnchorCountMismatch {
        /// Which input carries the wrong row count.
        context: &'static str,
        /// Expected row count.
        expected: usize,
        /// Row count actually supplied.
        got: usize,
    },
    /// An input's trailing dimension has the wrong size.
    #[error("{context} must have trailing dimension {expected}, got {got}")]
    TrailingDimMismatch {
        /// Which input carries the wrong trailing dimension.
        context: &'static str,
        /// Required trailing dimension.
        expected: usize,
        /// Trailing dimension actually supplied.
        got: usize,
    },
    /// Two arrays that must agree element-wise have different shapes.
    #[error("shape mismatch for {context}: {left:?} vs {right:?}")]
    ShapeMismatch {
        /// Which pair of inputs disagrees.
        context: &'static str,
        /// Shape of the first array.
        left: [usize; 3],
        /// Shape of the second array.
        right: [usize; 3],
    },
    /// The class dimension of the score tensor is empty.
    #[error("class scores must contain at least one class")]
    NoClasses,
}
