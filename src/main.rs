#![deny(unused)]
//! LLMOps governance gateway.
//!
//! Puts rate limiting, content safety, guardrails and cost budgets in front
//! of a self-hosted text-generation backend.

use std::sync::Arc;

use llmops_core::config::AppConfig;
use llmops_gateway::GatewayServer;
use llmops_governance::RequestGovernor;
use llmops_model_gateway::TiktokenCounter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // Initialize tracing
    llmops_governance::configure_tracing(config.logging.json)?;

    tracing::info!("Starting LLMOps gateway v{}", env!("CARGO_PKG_VERSION"));

    // =========================================================================
    // Observability
    // =========================================================================
    let metrics_handle = llmops_governance::setup_metrics_recorder()?;
    llmops_governance::record_model_info(
        &config.backend.model,
        &config.backend.name,
        env!("CARGO_PKG_VERSION"),
    );

    // =========================================================================
    // Backend
    // =========================================================================
    let backend = llmops_model_gateway::create_backend(&config.backend)?;
    tracing::info!(
        backend = %backend.name(),
        model = %backend.model(),
        url = %config.backend.base_url,
        "Backend configured"
    );

    if backend.health().await {
        tracing::info!("Backend is reachable");
    } else {
        tracing::warn!("Backend health probe failed; requests will fail until it recovers");
    }

    // =========================================================================
    // Governance
    // =========================================================================
    let governor = RequestGovernor::builder(config.clone())
        .with_backend(backend)
        .with_token_counter(Arc::new(TiktokenCounter::new()))
        .build()?;
    tracing::info!(tiers = config.tiers.len(), "Request governor initialized");

    // =========================================================================
    // Gateway
    // =========================================================================
    let server = GatewayServer::new(config.server.clone(), Arc::new(governor))
        .with_metrics(metrics_handle);

    server.run().await?;

    Ok(())
}
