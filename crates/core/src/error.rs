//! Error types for the governance gateway.

use thiserror::Error;

use crate::types::{GuardrailCode, SafetyCode, Severity};

/// Result type alias using the gateway's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Client Errors
    // =========================================================================
    #[error("Prompt is empty")]
    EmptyPrompt,

    // =========================================================================
    // Governance Rejections
    // =========================================================================
    #[error("Safety violation ({severity}): {}", join(.violations))]
    SafetyViolation {
        violations: Vec<SafetyCode>,
        severity: Severity,
    },

    #[error("Guardrail violation: {}", join(.violations))]
    GuardrailViolation { violations: Vec<GuardrailCode> },

    #[error("Rate limit exceeded: {current}/{limit} requests per minute")]
    RateLimitExceeded { current: u32, limit: u32 },

    #[error("Cost limit exceeded: {reason}")]
    CostLimitExceeded { reason: String },

    // =========================================================================
    // Backend Errors
    // =========================================================================
    #[error("Model service unavailable: {cause}")]
    BackendUnavailable { cause: String },

    #[error("No valid response from model service")]
    BackendInvalidResponse,

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {cause}")]
    InternalError { cause: String },
}

/// How a failed request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Expected refusal: bad input or a governance stage said no.
    Rejected,
    /// Backend or internal failure.
    Failed,
}

impl Error {
    /// Create a backend-unavailable error.
    pub fn backend_unavailable(cause: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            cause: cause.into(),
        }
    }

    /// Create a cost-limit error.
    pub fn cost_limit(reason: impl Into<String>) -> Self {
        Self::CostLimitExceeded {
            reason: reason.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(cause: impl Into<String>) -> Self {
        Self::InternalError {
            cause: cause.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::EmptyPrompt => "empty_prompt",
            Error::SafetyViolation { .. } => "safety_violation",
            Error::GuardrailViolation { .. } => "guardrail_violation",
            Error::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Error::CostLimitExceeded { .. } => "cost_limit_exceeded",
            Error::BackendUnavailable { .. } => "backend_unavailable",
            Error::BackendInvalidResponse => "backend_invalid_response",
            Error::Config(_) => "config_error",
            Error::InternalError { .. } => "internal_error",
        }
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            Error::EmptyPrompt
            | Error::SafetyViolation { .. }
            | Error::GuardrailViolation { .. }
            | Error::RateLimitExceeded { .. }
            | Error::CostLimitExceeded { .. } => Disposition::Rejected,
            Error::BackendUnavailable { .. }
            | Error::BackendInvalidResponse
            | Error::Config(_)
            | Error::InternalError { .. } => Disposition::Failed,
        }
    }

    /// HTTP status the gateway answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::EmptyPrompt | Error::SafetyViolation { .. } => 400,
            Error::CostLimitExceeded { .. } => 402,
            Error::GuardrailViolation { .. } => 422,
            Error::RateLimitExceeded { .. } => 429,
            Error::BackendUnavailable { .. } | Error::BackendInvalidResponse => 503,
            Error::Config(_) | Error::InternalError { .. } => 500,
        }
    }

    /// Every accumulated violation code, for machine-readable rejection bodies.
    pub fn reasons(&self) -> Vec<String> {
        match self {
            Error::SafetyViolation { violations, .. } => {
                violations.iter().map(ToString::to_string).collect()
            }
            Error::GuardrailViolation { violations } => {
                violations.iter().map(ToString::to_string).collect()
            }
            Error::CostLimitExceeded { reason } => vec![reason.clone()],
            _ => Vec::new(),
        }
    }

    /// Message safe to return to a client. Internal detail is withheld.
    pub fn public_message(&self) -> String {
        match self {
            Error::InternalError { .. } | Error::Config(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PiiKind;

    #[test]
    fn test_safety_violation_lists_every_code() {
        let err = Error::SafetyViolation {
            violations: vec![
                SafetyCode::BannedKeyword("bomb".into()),
                SafetyCode::Pii(PiiKind::Ssn),
            ],
            severity: Severity::High,
        };
        assert_eq!(err.reasons(), vec!["banned_keyword:bomb", "pii_detected:ssn"]);
        assert_eq!(
            err.to_string(),
            "Safety violation (high): banned_keyword:bomb, pii_detected:ssn"
        );
        assert_eq!(err.disposition(), Disposition::Rejected);
    }

    #[test]
    fn test_internal_error_is_opaque() {
        let err = Error::internal("db password leaked in stack trace");
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(err.disposition(), Disposition::Failed);
    }

    #[test]
    fn test_rate_limit_message() {
        let err = Error::RateLimitExceeded { current: 5, limit: 5 };
        assert_eq!(err.to_string(), "Rate limit exceeded: 5/5 requests per minute");
        assert_eq!(err.kind(), "rate_limit_exceeded");
        assert_eq!(err.status_code(), 429);
    }

    #[test]
    fn test_backend_errors_are_failures() {
        let err = Error::backend_unavailable("connection refused");
        assert_eq!(err.status_code(), 503);
        assert_eq!(err.disposition(), Disposition::Failed);
        assert_eq!(Error::BackendInvalidResponse.status_code(), 503);
    }
}
