//! Error taxonomy for the selection and timing core.
//!
//! Input errors are fatal for the call that raised them. Empty-result errors
//! are fatal for the whole compilation. Per-segment failures are not errors
//! at this level; they are collected in [`crate::report::FailureSummary`].

/// Errors raised by the pure selection, sync, and timeline functions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("invalid candidate from '{source_id}': {reason}")]
    InvalidCandidate { source_id: String, reason: String },

    #[error("invalid query '{text}': {reason}")]
    InvalidQuery { text: String, reason: String },

    #[error("invalid duration: {reason}")]
    InvalidDuration { reason: String },

    #[error("selection produced no segments")]
    EmptySelection,

    #[error("assembly produced no timeline units")]
    EmptyTimeline,
}

impl CoreError {
    /// True for errors that describe malformed input rather than an empty result.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidCandidate { .. }
                | CoreError::InvalidQuery { .. }
                | CoreError::InvalidDuration { .. }
        )
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
