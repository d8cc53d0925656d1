#![deny(unused)]
//! Model backends for the governance gateway.
//!
//! This crate provides:
//! - Ollama-compatible HTTP generation backend
//! - Tokenizer-backed token counting

pub mod ollama;
pub mod tokenizer;

pub use ollama::OllamaBackend;
pub use tokenizer::TiktokenCounter;

use std::sync::Arc;

use llmops_core::{config::BackendConfig, traits::GenerationBackend, Error, Result};

/// Create the generation backend named in configuration.
pub fn create_backend(config: &BackendConfig) -> Result<Arc<dyn GenerationBackend>> {
    match config.name.to_lowercase().as_str() {
        "ollama" => Ok(Arc::new(OllamaBackend::new(config)?)),
        other => Err(Error::config(format!("unsupported backend: {}", other))),
    }
}
