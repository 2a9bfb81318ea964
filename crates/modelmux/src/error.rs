//! Orchestrator error taxonomy with retry classification.
//!
//! Every failure the orchestrator can surface is represented here. The
//! dispatcher queries `is_retriable()` to decide whether to fail over to
//! another candidate; callers read `code()` for the wire taxonomy.
//!
//! ## Retry behavior
//!
//! | Code                     | Retried | How |
//! |--------------------------|---------|-----|
//! | `backend_timeout`        | yes     | next candidate model |
//! | `backend_transport`      | yes     | next candidate model |
//! | `response_incomplete`    | yes     | one amended retry, same model |
//! | `normalization_error`    | no      | surfaced to caller |
//! | `all_backends_unavailable` | no    | surfaced to caller |
//! | `deadline_exceeded`      | no      | surfaced to caller |
//! | `config_error`           | no      | startup failure |
//!
//! Classification ambiguity is deliberately absent: the classifier always
//! falls through to `chat`, so there is no error to represent.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire-level failure code, stable across error message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    NormalizationError,
    AllBackendsUnavailable,
    BackendTimeout,
    BackendTransport,
    ResponseIncomplete,
    DeadlineExceeded,
    ConfigError,
}

impl std::fmt::Display for FailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NormalizationError => write!(f, "normalization_error"),
            Self::AllBackendsUnavailable => write!(f, "all_backends_unavailable"),
            Self::BackendTimeout => write!(f, "backend_timeout"),
            Self::BackendTransport => write!(f, "backend_transport"),
            Self::ResponseIncomplete => write!(f, "response_incomplete"),
            Self::DeadlineExceeded => write!(f, "deadline_exceeded"),
            Self::ConfigError => write!(f, "config_error"),
        }
    }
}

/// Unified error type for the orchestration pipeline.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Attachment could not be normalized (corrupt file, unsupported
    /// format, over size cap). Surfaced to the caller, never retried.
    #[error("Normalization failed: {0}")]
    Normalization(String),

    /// Every candidate for the task kind is Open or probe-busy.
    #[error("No backend available for this task kind")]
    AllBackendsUnavailable,

    /// A backend call exceeded its timeout. Recorded against the breaker.
    #[error("Backend '{model}' timed out")]
    BackendTimeout { model: String },

    /// A backend call failed at the transport/protocol level.
    #[error("Backend '{model}' transport error: {message}")]
    BackendTransport { model: String, message: String },

    /// The validator rejected the response as incomplete and the amended
    /// retry was rejected too (or could not be made).
    #[error("Response incomplete: {reason}")]
    ResponseIncomplete { reason: String },

    /// The caller's deadline left no room for another worthwhile attempt.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Invalid configuration detected at startup (uncovered task kind,
    /// missing backend facet). Never raised at request time.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl OrchestratorError {
    /// Stable taxonomy code for this error.
    pub fn code(&self) -> FailureCode {
        match self {
            Self::Normalization(_) => FailureCode::NormalizationError,
            Self::AllBackendsUnavailable => FailureCode::AllBackendsUnavailable,
            Self::BackendTimeout { .. } => FailureCode::BackendTimeout,
            Self::BackendTransport { .. } => FailureCode::BackendTransport,
            Self::ResponseIncomplete { .. } => FailureCode::ResponseIncomplete,
            Self::DeadlineExceeded => FailureCode::DeadlineExceeded,
            Self::Config(_) => FailureCode::ConfigError,
        }
    }

    /// Whether the dispatcher may recover locally (fail over / amended
    /// retry) after this error. Everything else propagates immediately.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::BackendTimeout { .. }
                | Self::BackendTransport { .. }
                | Self::ResponseIncomplete { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_retriable() {
        let err = OrchestratorError::BackendTimeout {
            model: "gpt-local".into(),
        };
        assert!(err.is_retriable());
        assert_eq!(err.code(), FailureCode::BackendTimeout);
    }

    #[test]
    fn normalization_is_terminal() {
        let err = OrchestratorError::Normalization("corrupt pdf".into());
        assert!(!err.is_retriable());
        assert_eq!(err.code(), FailureCode::NormalizationError);
    }

    #[test]
    fn deadline_exceeded_is_terminal() {
        assert!(!OrchestratorError::DeadlineExceeded.is_retriable());
    }

    #[test]
    fn code_serializes_snake_case() {
        let json = serde_json::to_string(&FailureCode::AllBackendsUnavailable).unwrap();
        assert_eq!(json, "\"all_backends_unavailable\"");
        assert_eq!(
            FailureCode::AllBackendsUnavailable.to_string(),
            "all_backends_unavailable"
        );
    }
}
