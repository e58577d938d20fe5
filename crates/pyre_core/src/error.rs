//! # Runtime Error Types
//!
//! Only contract violations and configuration problems are errors.
//! Budget denial, invalid reload descriptors and stale handles are
//! ordinary outcomes and never show up here.

use thiserror::Error;

/// Errors raised by the particle runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VfxError {
    /// A caller broke an argument contract.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument {
        /// Argument name.
        name: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Config file could not be read.
    #[error("failed to read {path}: {reason}")]
    Io {
        /// File path.
        path: String,
        /// OS error text.
        reason: String,
    },

    /// Renderer pipeline factory failed.
    #[error("pipeline build failed: {0}")]
    PipelineBuild(String),

    /// The rebuild worker has stopped.
    #[error("pipeline rebuild worker unavailable")]
    WorkerUnavailable,
}

impl VfxError {
    /// Shorthand for [`VfxError::InvalidArgument`].
    #[must_use]
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}

/// Result type for runtime operations.
pub type VfxResult<T> = Result<T, VfxError>;
