//! Content safety filter for prompts and generated text.
//!
//! Lexical scan only:
//! - banned keywords (case-insensitive substring match)
//! - prompt-injection phrasing
//! - PII shapes (SSN, credit card numbers, email addresses)

use regex::{NoExpand, Regex};

use llmops_core::{
    config::SafetyConfig,
    types::{PiiKind, SafetyCode, SafetyVerdict, Severity},
    Error, Result,
};

const INJECTION_PATTERNS: &[&str] = &[
    r"(?i)\bignore\s+(?:all\s+)?(?:the\s+)?(?:previous|prior|above|earlier)\s+instructions?\b",
    r"(?i)\bdisregard\s+(?:all\s+)?(?:the\s+)?(?:previous|prior|above)\b",
    r"(?i)\byou\s+are\s+now\b",
    r"(?i)\bforget\s+(?:everything|all)\b",
    r"(?i)\bpretend\s+(?:you\s+are|to\s+be)\b",
    r"(?i)\b(?:reveal|show|print)\s+(?:me\s+)?(?:your|the)\s+system\s+prompt\b",
];

const SSN_PATTERN: &str = r"\b\d{3}-\d{2}-\d{4}\b";

// Visa, Mastercard, Discover (16 digits) and Amex (15 digits), optionally
// grouped with spaces or dashes.
const CREDIT_CARD_PATTERN: &str = r"\b(?:(?:4\d{3}|5[1-5]\d{2}|6(?:011|5\d{2}))(?:[ -]?\d{4}){3}|3[47]\d{2}[ -]?\d{6}[ -]?\d{5})\b";

const EMAIL_PATTERN: &str = r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}";

/// Lexical content safety filter.
pub struct ContentSafetyFilter {
    /// Lowercased banned keywords.
    banned_keywords: Vec<String>,
    injection: Vec<Regex>,
    /// Checked in order; the order fixes the order of PII violations.
    pii: Vec<(PiiKind, Regex)>,
    email: Regex,
    redaction_token: String,
}

impl ContentSafetyFilter {
    /// Build a filter from configuration.
    pub fn new(config: &SafetyConfig) -> Result<Self> {
        let injection = INJECTION_PATTERNS
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>>>()?;

        let pii = vec![
            (PiiKind::Ssn, compile(SSN_PATTERN)?),
            (PiiKind::CreditCard, compile(CREDIT_CARD_PATTERN)?),
            (PiiKind::Email, compile(EMAIL_PATTERN)?),
        ];

        Ok(Self {
            banned_keywords: config
                .banned_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            injection,
            pii,
            email: compile(EMAIL_PATTERN)?,
            redaction_token: config.redaction_token.clone(),
        })
    }

    /// Scan `text` for banned content, injection phrasing and PII.
    pub fn check(&self, text: &str) -> SafetyVerdict {
        let mut violations = Vec::new();
        let mut severity = Severity::None;

        let lowered = text.to_lowercase();
        for keyword in &self.banned_keywords {
            if lowered.contains(keyword.as_str()) {
                violations.push(SafetyCode::BannedKeyword(keyword.clone()));
                severity.raise(Severity::High);
            }
        }

        if self.injection.iter().any(|p| p.is_match(text)) {
            violations.push(SafetyCode::PromptInjection);
        }

        for (kind, pattern) in &self.pii {
            if pattern.is_match(text) {
                violations.push(SafetyCode::Pii(*kind));
                severity.raise(Severity::Medium);
            }
        }

        SafetyVerdict::new(violations, severity)
    }

    /// Redact email addresses. SSNs and card numbers are left as-is.
    pub fn sanitize(&self, text: &str) -> String {
        self.email
            .replace_all(text, NoExpand(&self.redaction_token))
            .into_owned()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::config(format!("invalid safety pattern: {}", e)))
}
