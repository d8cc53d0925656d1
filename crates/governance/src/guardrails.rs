//! Static request-shape guardrails.
//!
//! Rules are checked independently and every breach is reported:
//! - prompt length (characters) against a global ceiling
//! - requested output tokens against a global ceiling
//! - requested output tokens against the caller tier's override, if any

use std::sync::Arc;

use llmops_core::{
    config::{GuardrailConfig, TierTable},
    types::{GuardrailCode, GuardrailVerdict},
};

/// Validates request shape against business limits.
pub struct GuardrailValidator {
    max_prompt_chars: usize,
    max_tokens: u32,
    tiers: Arc<TierTable>,
}

impl GuardrailValidator {
    pub fn new(config: &GuardrailConfig, tiers: Arc<TierTable>) -> Self {
        Self {
            max_prompt_chars: config.max_prompt_chars,
            max_tokens: config.max_tokens,
            tiers,
        }
    }

    /// Validate a request. Violations accumulate in rule order.
    pub fn validate(&self, prompt: &str, max_tokens: u32, identity: &str) -> GuardrailVerdict {
        let mut violations = Vec::new();

        if prompt.chars().count() > self.max_prompt_chars {
            violations.push(GuardrailCode::PromptTooLong);
        }

        if max_tokens > self.max_tokens {
            violations.push(GuardrailCode::MaxTokensExceeded);
        }

        if let Some(ceiling) = self.tiers.resolve(identity).max_tokens_override {
            if max_tokens > ceiling {
                violations.push(GuardrailCode::TierMaxTokensExceeded);
            }
        }

        GuardrailVerdict::new(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> GuardrailValidator {
        let config = GuardrailConfig {
            max_prompt_chars: 20,
            max_tokens: 200,
        };
        GuardrailValidator::new(&config, Arc::new(TierTable::default()))
    }

    #[test]
    fn test_valid_request() {
        let verdict = validator().validate("short prompt", 50, "alice");
        assert!(verdict.valid);
        assert!(verdict.violations.is_empty());
    }

    #[test]
    fn test_both_caps_reported() {
        let long = "x".repeat(21);
        let verdict = validator().validate(&long, 500, "alice");
        assert!(!verdict.valid);
        assert_eq!(
            verdict.violations,
            vec![GuardrailCode::PromptTooLong, GuardrailCode::MaxTokensExceeded]
        );
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        // 20 characters, 40 bytes.
        let prompt = "é".repeat(20);
        assert!(validator().validate(&prompt, 10, "alice").valid);
    }

    #[test]
    fn test_restricted_identity_has_lower_ceiling() {
        let v = validator();
        assert!(v.validate("hi", 100, "alice").valid);

        let verdict = v.validate("hi", 100, "restricted");
        assert_eq!(verdict.violations, vec![GuardrailCode::TierMaxTokensExceeded]);
        assert!(v.validate("hi", 50, "restricted").valid);
    }

    #[test]
    fn test_is_deterministic() {
        let v = validator();
        let long = "y".repeat(100);
        let first = v.validate(&long, 300, "restricted");
        let second = v.validate(&long, 300, "restricted");
        assert_eq!(first, second);
        assert_eq!(first.violations.len(), 3);
    }
}
