#![deny(unused)]
//! Request governance for the LLM gateway.
//!
//! This crate provides:
//! - Sliding-window rate limiting per identity
//! - Lexical content safety (banned terms, prompt injection, PII)
//! - Request-shape guardrails
//! - Daily cost budgets
//! - The request governor that runs them around a backend call
//! - Prometheus metrics and log setup

pub mod budget;
pub mod governor;
pub mod guardrails;
pub mod metrics;
pub mod rate_limit;
pub mod safety;
pub mod store;
pub mod tracing_layer;

pub use budget::{CostController, CostDecision, LedgerEntry, COST_EPOCH};
pub use governor::{RequestContext, RequestGovernor, RequestGovernorBuilder, Stage};
pub use guardrails::GuardrailValidator;
pub use crate::metrics::{record_model_info, setup_metrics_recorder, ActiveRequestGuard};
pub use rate_limit::{RateDecision, RateLimiter, RateWindow, RATE_WINDOW};
pub use safety::ContentSafetyFilter;
pub use store::InMemoryIdentityStore;
pub use tracing_layer::configure_tracing;
