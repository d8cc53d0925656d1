//! Axum-based HTTP server for the gateway.

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::any::Any as PanicPayload;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use llmops_core::{config::ServerConfig, types::GenerationRequest, Error, Result};
use llmops_governance::RequestGovernor;

/// Shared application state.
pub struct AppState {
    pub governor: Arc<RequestGovernor>,
}

use metrics_exporter_prometheus::PrometheusHandle;

/// Gateway server.
pub struct GatewayServer {
    config: ServerConfig,
    state: Arc<AppState>,
    metrics_handle: Option<PrometheusHandle>,
}

impl GatewayServer {
    /// Create a new gateway server.
    pub fn new(config: ServerConfig, governor: Arc<RequestGovernor>) -> Self {
        Self {
            config,
            state: Arc::new(AppState { governor }),
            metrics_handle: None,
        }
    }

    /// Set metrics handle.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Build the Axum router.
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/generate", post(generate_handler))
            .with_state(self.state.clone());

        if let Some(handle) = &self.metrics_handle {
            let handle = handle.clone();
            router = router.route("/metrics", get(move || async move { handle.render() }));
        }

        router = router.layer(CatchPanicLayer::custom(panic_response));

        if self.config.enable_cors {
            router = router.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any));
        }

        if self.config.enable_tracing {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Run the server.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::internal(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!(addr = %addr, "Gateway server starting");

        axum::serve(listener, self.build_router())
            .await
            .map_err(|e| Error::internal(format!("Server error: {}", e)))?;

        Ok(())
    }
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Service banner.
#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub service: String,
}

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy" when the backend answers its probe, else "degraded".
    pub status: String,
    pub backend_healthy: bool,
    pub model: String,
    pub active_requests: usize,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error kind.
    pub error: String,
    pub message: String,
    /// Every violation code behind a governance rejection.
    pub violations: Vec<String>,
    /// Worst safety severity, for safety rejections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    /// Requests counted in the window, for rate-limit rejections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<u32>,
    /// Requests per minute allowed, for rate-limit rejections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    pub trace_id: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, message: impl Into<String>, trace_id: String) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            violations: Vec::new(),
            severity: None,
            current: None,
            limit: None,
            trace_id,
        }
    }

    fn from_error(error: &Error, trace_id: String) -> Self {
        let mut body = Self::new(error.kind(), error.public_message(), trace_id);
        body.violations = error.reasons();
        match error {
            Error::SafetyViolation { severity, .. } => {
                body.severity = Some(severity.as_str().to_string());
            }
            Error::RateLimitExceeded { current, limit } => {
                body.current = Some(*current);
                body.limit = Some(*limit);
            }
            _ => {}
        }
        body
    }
}

/// Gateway-level error carrying the trace id of the failed request.
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn new(error: &Error, trace_id: String) -> Self {
        let status =
            StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            body: ErrorResponse::from_error(error, trace_id),
        }
    }

    fn malformed(rejection: JsonRejection, trace_id: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse::new("invalid_request", rejection.body_text(), trace_id),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Turn a panic on the request path into an opaque internal error.
fn panic_response(payload: Box<dyn PanicPayload + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");

    let error = Error::internal(detail);
    let trace_id = Uuid::new_v4().to_string();
    tracing::error!(trace_id = %trace_id, error = %error, "Request handler panicked");
    ApiError::new(&error, trace_id).into_response()
}

// =============================================================================
// Handlers
// =============================================================================

async fn root_handler() -> impl IntoResponse {
    Json(RootResponse {
        service: "llmops governance gateway".to_string(),
    })
}

/// Health check handler. Always answers 200; backend state is in the body.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let backend = state.governor.backend();
    let backend_healthy = backend.health().await;

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();

    Json(HealthResponse {
        status: if backend_healthy { "healthy" } else { "degraded" }.to_string(),
        backend_healthy,
        model: backend.model().to_string(),
        active_requests: state.governor.active_requests(),
        timestamp,
    })
}

/// Generation handler.
async fn generate_handler(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<GenerationRequest>, JsonRejection>,
) -> std::result::Result<Response, ApiError> {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            let trace_id = Uuid::new_v4().to_string();
            tracing::warn!(trace_id = %trace_id, error = %rejection, "Malformed generate request");
            return Err(ApiError::malformed(rejection, trace_id));
        }
    };

    match state.governor.process(request).await {
        Ok(response) => Ok((StatusCode::OK, Json(response)).into_response()),
        Err(e) => {
            let trace_id = Uuid::new_v4().to_string();
            if let Error::InternalError { .. } | Error::Config(_) = e {
                tracing::error!(trace_id = %trace_id, error = %e, "Internal error");
            }
            Err(ApiError::new(&e, trace_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmops_core::types::{SafetyCode, Severity};

    #[tokio::test]
    async fn test_root_handler() {
        let response = root_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (Error::EmptyPrompt, StatusCode::BAD_REQUEST),
            (Error::cost_limit("over"), StatusCode::PAYMENT_REQUIRED),
            (
                Error::GuardrailViolation { violations: vec![] },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                Error::RateLimitExceeded { current: 1, limit: 1 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (Error::BackendInvalidResponse, StatusCode::SERVICE_UNAVAILABLE),
            (Error::internal("secret"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            let api = ApiError::new(&error, "t".into());
            assert_eq!(api.status, status, "{}", error);
        }

        let api = ApiError::new(&Error::internal("secret detail"), "t".into());
        assert_eq!(api.body.message, "Internal server error");
    }

    #[test]
    fn test_error_body_carries_structured_detail() {
        let api = ApiError::new(&Error::RateLimitExceeded { current: 5, limit: 5 }, "t".into());
        assert_eq!(api.body.current, Some(5));
        assert_eq!(api.body.limit, Some(5));
        assert_eq!(api.body.severity, None);

        let api = ApiError::new(
            &Error::SafetyViolation {
                violations: vec![SafetyCode::BannedKeyword("bomb".into())],
                severity: Severity::High,
            },
            "t".into(),
        );
        assert_eq!(api.body.severity.as_deref(), Some("high"));
        assert_eq!(api.body.violations, vec!["banned_keyword:bomb"]);
        assert_eq!(api.body.current, None);
    }

    #[test]
    fn test_panic_becomes_opaque_internal_error() {
        let response = panic_response(Box::new("backend exploded"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
