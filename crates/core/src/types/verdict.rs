use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Safety
// =============================================================================

/// Worst safety issue found in one scan. Ordered `None < Medium < High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Medium,
    High,
}

impl Severity {
    /// Raise to `other` if it is worse. Never lowers.
    pub fn raise(&mut self, other: Severity) {
        if other > *self {
            *self = other;
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of personal data recognised by the safety scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    Ssn,
    CreditCard,
    Email,
}

impl PiiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiKind::Ssn => "ssn",
            PiiKind::CreditCard => "credit_card",
            PiiKind::Email => "email",
        }
    }
}

/// A single finding of the content safety scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum SafetyCode {
    /// A banned keyword appeared in the text.
    BannedKeyword(String),
    /// Known prompt-injection phrasing.
    PromptInjection,
    /// Personal data of the given shape.
    Pii(PiiKind),
}

impl SafetyCode {
    /// Severity this finding contributes on its own.
    pub fn severity(&self) -> Severity {
        match self {
            SafetyCode::BannedKeyword(_) => Severity::High,
            SafetyCode::PromptInjection => Severity::None,
            SafetyCode::Pii(_) => Severity::Medium,
        }
    }

    /// Whether the finding stops a request outright.
    ///
    /// PII is reported but not blocking: a prompt carrying an email address
    /// is admitted, and addresses are redacted from generated output.
    pub fn is_blocking(&self) -> bool {
        !matches!(self, SafetyCode::Pii(_))
    }

    /// Metric label for the finding, without the variable suffix.
    pub fn kind(&self) -> &'static str {
        match self {
            SafetyCode::BannedKeyword(_) => "banned_keyword",
            SafetyCode::PromptInjection => "prompt_injection_detected",
            SafetyCode::Pii(_) => "pii_detected",
        }
    }
}

impl fmt::Display for SafetyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyCode::BannedKeyword(word) => write!(f, "banned_keyword:{}", word),
            SafetyCode::PromptInjection => f.write_str("prompt_injection_detected"),
            SafetyCode::Pii(kind) => write!(f, "pii_detected:{}", kind.as_str()),
        }
    }
}

/// Result of a content safety scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    /// `true` when no violation was found.
    pub safe: bool,
    /// Findings, in detection order.
    pub violations: Vec<SafetyCode>,
    /// Worst severity across all findings.
    pub severity: Severity,
}

impl SafetyVerdict {
    /// Build a verdict from findings and the severity reached while scanning.
    pub fn new(violations: Vec<SafetyCode>, severity: Severity) -> Self {
        Self {
            safe: violations.is_empty(),
            violations,
            severity,
        }
    }

    /// Whether any finding blocks the request.
    pub fn is_blocking(&self) -> bool {
        self.violations.iter().any(SafetyCode::is_blocking)
    }

    /// Violation codes as strings.
    pub fn codes(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }
}

impl Default for SafetyVerdict {
    fn default() -> Self {
        Self::new(Vec::new(), Severity::None)
    }
}

// =============================================================================
// Guardrails
// =============================================================================

/// A request-shape policy breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailCode {
    /// Prompt longer than the character ceiling.
    PromptTooLong,
    /// Requested output tokens above the global ceiling.
    MaxTokensExceeded,
    /// Requested output tokens above the caller's tier override.
    TierMaxTokensExceeded,
}

impl GuardrailCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardrailCode::PromptTooLong => "prompt_too_long",
            GuardrailCode::MaxTokensExceeded => "max_tokens_exceeded",
            GuardrailCode::TierMaxTokensExceeded => "tier_max_tokens_exceeded",
        }
    }
}

impl fmt::Display for GuardrailCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of guardrail validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailVerdict {
    pub valid: bool,
    pub violations: Vec<GuardrailCode>,
}

impl GuardrailVerdict {
    pub fn new(violations: Vec<GuardrailCode>) -> Self {
        Self {
            valid: violations.is_empty(),
            violations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(Severity::None < Severity::Medium);
        assert!(Severity::Medium < Severity::High);

        let mut s = Severity::High;
        s.raise(Severity::Medium);
        assert_eq!(s, Severity::High);
    }

    #[test]
    fn test_safety_code_display() {
        assert_eq!(
            SafetyCode::BannedKeyword("bomb".into()).to_string(),
            "banned_keyword:bomb"
        );
        assert_eq!(SafetyCode::PromptInjection.to_string(), "prompt_injection_detected");
        assert_eq!(
            SafetyCode::Pii(PiiKind::CreditCard).to_string(),
            "pii_detected:credit_card"
        );
    }

    #[test]
    fn test_pii_only_verdict_is_not_blocking() {
        let verdict = SafetyVerdict::new(vec![SafetyCode::Pii(PiiKind::Email)], Severity::Medium);
        assert!(!verdict.safe);
        assert!(!verdict.is_blocking());

        let verdict = SafetyVerdict::new(vec![SafetyCode::PromptInjection], Severity::None);
        assert!(verdict.is_blocking());
    }
}
