//! Model backend traits.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{BackendRequest, BackendResponse};

/// Remote text-generation backend.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Backend label used in metrics (e.g. "ollama").
    fn name(&self) -> &str;

    /// Model served by this backend.
    fn model(&self) -> &str;

    /// Generate text for a prompt.
    ///
    /// Transport and HTTP failures map to `Error::BackendUnavailable`;
    /// a body without usable text maps to `Error::BackendInvalidResponse`.
    async fn generate(&self, request: &BackendRequest) -> Result<BackendResponse>;

    /// Whether the backend answers its health probe.
    async fn health(&self) -> bool;
}

/// Token counter used for billing and metrics.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// Counts whitespace-separated words. Used when no tokenizer is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceCounter;

impl TokenCounter for WhitespaceCounter {
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}
