use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RequestConfig;
use crate::error::{Error, Result};

// =============================================================================
// Inbound
// =============================================================================

/// Generation request as received from a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Caller identity. Older clients send it as `user`.
    #[serde(default, alias = "user")]
    pub identity: Option<String>,
    /// Prompt text. Required, non-empty after trimming.
    #[serde(default)]
    pub prompt: String,
    /// Requested output token count.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f64>,
}

impl GenerationRequest {
    /// Create a request with only a prompt set.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Set the caller identity.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Set the requested output tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Apply defaults and clamps, rejecting an empty prompt.
    pub fn normalize(self, defaults: &RequestConfig) -> Result<NormalizedRequest> {
        let prompt = self.prompt.trim().to_string();
        if prompt.is_empty() {
            return Err(Error::EmptyPrompt);
        }

        let identity = self
            .identity
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| defaults.default_identity.clone());

        let max_tokens = self
            .max_tokens
            .unwrap_or(defaults.default_max_tokens)
            .min(defaults.max_tokens_cap);

        let temperature = match self.temperature {
            Some(t) if t.is_finite() => t.clamp(0.0, 2.0),
            _ => defaults.default_temperature,
        };

        Ok(NormalizedRequest {
            trace_id: Uuid::new_v4().to_string(),
            identity,
            prompt,
            max_tokens,
            temperature,
        })
    }
}

/// Request after defaults and clamps have been applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRequest {
    /// Unique trace ID for this request.
    pub trace_id: String,
    pub identity: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

// =============================================================================
// Backend
// =============================================================================

/// Payload sent to the generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stream: bool,
}

/// Text produced by the generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendResponse {
    /// Generated text, trimmed and non-empty.
    pub text: String,
}

// =============================================================================
// Outbound
// =============================================================================

/// Usage figures returned with every successful generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetrics {
    pub latency_seconds: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub max_tokens: u32,
}

/// Successful generation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub trace_id: String,
    pub backend: String,
    pub model: String,
    pub user: String,
    pub generated_text: String,
    /// Set when the backend output was replaced by the filtered placeholder.
    pub filtered: bool,
    pub metrics: GenerationMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_defaults() {
        let req = GenerationRequest::new("  hello  ");
        let normalized = req.normalize(&RequestConfig::default()).unwrap();

        assert_eq!(normalized.prompt, "hello");
        assert_eq!(normalized.identity, "anonymous");
        assert_eq!(normalized.max_tokens, 50);
        assert!((normalized.temperature - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_normalize_clamps() {
        let req = GenerationRequest::new("hi")
            .with_max_tokens(5000)
            .with_temperature(9.0);
        let normalized = req.normalize(&RequestConfig::default()).unwrap();

        assert_eq!(normalized.max_tokens, 200);
        assert_eq!(normalized.temperature, 2.0);

        let req = GenerationRequest::new("hi").with_temperature(-1.0);
        assert_eq!(req.normalize(&RequestConfig::default()).unwrap().temperature, 0.0);
    }

    #[test]
    fn test_normalize_rejects_blank_prompt() {
        let result = GenerationRequest::new("   \n").normalize(&RequestConfig::default());
        assert!(matches!(result, Err(Error::EmptyPrompt)));
    }

    #[test]
    fn test_user_alias() {
        let req: GenerationRequest =
            serde_json::from_str(r#"{"user": "bob", "prompt": "hi"}"#).unwrap();
        assert_eq!(req.identity.as_deref(), Some("bob"));
    }
}
