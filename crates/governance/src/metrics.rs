//! Metrics implementation using Prometheus.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use llmops_core::{Error, Result};

/// Initialize Prometheus recorder and return the handle.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::internal(format!("Failed to install Prometheus recorder: {}", e)))?;

    describe_metrics();
    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

fn describe_metrics() {
    metrics::describe_counter!("llm_requests_total", "Total LLM requests");
    metrics::describe_histogram!("llm_request_latency_seconds", "Request processing time");
    metrics::describe_gauge!("llm_active_requests", "Current processing requests");
    metrics::describe_counter!("llm_input_tokens_total", "Total input tokens processed");
    metrics::describe_counter!("llm_output_tokens_total", "Total output tokens processed");
    metrics::describe_gauge!("llm_tokens_per_second", "Current token generation rate");
    metrics::describe_counter!("llm_user_requests_total", "Admitted requests per user");
    metrics::describe_counter!("llm_rate_limit_exceeded_total", "Rate limit violations");
    metrics::describe_counter!("llm_safety_violations_total", "Content safety violations");
    metrics::describe_counter!("llm_guardrail_violations_total", "Guardrail violations");
    metrics::describe_counter!("llm_cost_blocked_total", "Requests blocked by budget");
    metrics::describe_counter!("llm_cost_usd_total", "Spend recorded per user");
    metrics::describe_gauge!("llm_model_info", "Information about the deployed model");
}

/// Publish the deployed model as an info-style gauge.
pub fn record_model_info(model: &str, backend: &str, version: &str) {
    metrics::gauge!(
        "llm_model_info",
        "model_name" => model.to_string(),
        "backend" => backend.to_string(),
        "version" => version.to_string()
    )
    .set(1.0);
}

/// Usage of one finished request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestUsage {
    pub latency_secs: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Track a finished request: count, latency and token throughput.
pub fn record_request(backend: &str, user: &str, model: &str, status: u16, usage: RequestUsage) {
    metrics::counter!(
        "llm_requests_total",
        "backend" => backend.to_string(),
        "user" => user.to_string(),
        "status" => status.to_string(),
        "model" => model.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "llm_request_latency_seconds",
        "backend" => backend.to_string(),
        "model" => model.to_string()
    )
    .record(usage.latency_secs);

    if usage.tokens_in > 0 {
        metrics::counter!(
            "llm_input_tokens_total",
            "backend" => backend.to_string(),
            "user" => user.to_string(),
            "model" => model.to_string()
        )
        .increment(usage.tokens_in);
    }
    if usage.tokens_out > 0 {
        metrics::counter!(
            "llm_output_tokens_total",
            "backend" => backend.to_string(),
            "user" => user.to_string(),
            "model" => model.to_string()
        )
        .increment(usage.tokens_out);
    }

    let total_tokens = usage.tokens_in + usage.tokens_out;
    if usage.latency_secs > 0.0 && total_tokens > 0 {
        metrics::gauge!(
            "llm_tokens_per_second",
            "backend" => backend.to_string(),
            "model" => model.to_string()
        )
        .set(total_tokens as f64 / usage.latency_secs);
    }
}

pub fn record_user_request(user: &str) {
    metrics::counter!("llm_user_requests_total", "user" => user.to_string()).increment(1);
}

pub fn record_rate_limit_exceeded(user: &str) {
    metrics::counter!("llm_rate_limit_exceeded_total", "user" => user.to_string()).increment(1);
}

/// `stage` is "input" or "output".
pub fn record_safety_violation(user: &str, kind: &'static str, stage: &'static str) {
    metrics::counter!(
        "llm_safety_violations_total",
        "user" => user.to_string(),
        "kind" => kind,
        "stage" => stage
    )
    .increment(1);
}

pub fn record_guardrail_violation(user: &str, kind: &'static str) {
    metrics::counter!(
        "llm_guardrail_violations_total",
        "user" => user.to_string(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_cost_blocked(user: &str) {
    metrics::counter!("llm_cost_blocked_total", "user" => user.to_string()).increment(1);
}

pub fn record_cost(user: &str, usd: f64) {
    // Counters are integral; spend is kept in micro-dollars.
    let micros = (usd.max(0.0) * 1_000_000.0).round() as u64;
    metrics::counter!("llm_cost_usd_total", "user" => user.to_string()).increment(micros);
}

/// Scoped hold on the active-request gauge.
///
/// Increments on acquisition and decrements on drop, so every exit path of
/// a request releases it.
pub struct ActiveRequestGuard {
    active: Arc<AtomicUsize>,
}

impl ActiveRequestGuard {
    pub fn acquire(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        metrics::gauge!("llm_active_requests").increment(1.0);
        Self { active }
    }
}

impl Drop for ActiveRequestGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        metrics::gauge!("llm_active_requests").decrement(1.0);
    }
}
