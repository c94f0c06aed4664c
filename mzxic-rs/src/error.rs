//! Error taxonomy for the indexing, chromatogram and resampling operations
//!
//! Every operation in this crate fails fast: the error is raised at the call
//! that violates the contract and nothing is partially constructed. Callers
//! decide whether to skip a target, skip a scan or abort a batch.

use thiserror::Error;

/// Minimum number of points accepted by spline resampling
pub const MIN_SPLINE_POINTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum XicError {
    /// Malformed arguments: mismatched peak arrays, non-positive tolerance or step, ...
    #[error("{0}")]
    InvalidInput(String),

    /// An extracted ion chromatogram was requested from zero peaks
    #[error("An extracted ion chromatogram requires at least one peak.")]
    EmptyInput,

    /// A query start index lies beyond the indexed scans
    #[error("Scan index {index} is out of range ({scan_count} scans indexed).")]
    IndexOutOfRange { index: usize, scan_count: usize },

    #[error("Input arrays must contain at least 5 points.")]
    InsufficientData,

    #[error("Input arrays must have the same length.")]
    LengthMismatch,
}

impl XicError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        XicError::InvalidInput(msg.into())
    }
}

pub type XicResult<T> = std::result::Result<T, XicError>;
