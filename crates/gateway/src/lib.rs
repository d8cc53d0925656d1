#![deny(unused)]
//! HTTP entry point for the governance gateway.
//!
//! Exposes the request governor over axum, together with health and
//! Prometheus endpoints.

pub mod server;

pub use server::{ApiError, ErrorResponse, GatewayServer, HealthResponse};
