//! Error types for the analysis engine.

use thiserror::Error;

/// Errors reported by the analysis engine.
///
/// Degenerate numeric situations (zero-variance columns, zero-width value
/// ranges, constant KDE input) are *not* errors: they resolve locally to
/// documented fallback values. Only contract violations the caller must
/// react to are surfaced here.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Empty or length-mismatched input data.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// A requested dimension is incompatible with the data, e.g. more PCA
    /// components than `min(n_samples, n_features)`.
    #[error("dimension mismatch for {what}: expected at most {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A custom normalization expression failed validation or produced a
    /// non-finite value while being probed. The message is user-facing.
    #[error("expression error: {reason}")]
    Expression { reason: String },
}

impl Error {
    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        Error::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn expression(reason: impl Into<String>) -> Self {
        Error::Expression {
            reason: reason.into(),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
