//! Ollama-compatible HTTP backend.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use llmops_core::{
    config::BackendConfig,
    traits::GenerationBackend,
    types::{BackendRequest, BackendResponse},
    Error, Result,
};

/// Generation backend speaking the Ollama `/api/generate` protocol.
pub struct OllamaBackend {
    client: reqwest::Client,
    name: String,
    model: String,
    generate_url: String,
    version_url: String,
    health_timeout: Duration,
}

impl OllamaBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        let base_url = config.base_url.trim_end_matches('/');
        Ok(Self {
            client,
            name: config.name.clone(),
            model: config.model.clone(),
            generate_url: format!("{}/api/generate", base_url),
            version_url: format!("{}/api/version", base_url),
            health_timeout: Duration::from_secs(config.health_timeout_secs),
        })
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &BackendRequest) -> Result<BackendResponse> {
        tracing::debug!(url = %self.generate_url, model = %request.model, "Calling backend");

        let response = self
            .client
            .post(&self.generate_url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::backend_unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::backend_unavailable(format!(
                "backend returned HTTP {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::backend_unavailable(e.to_string()))?;

        let json: Value = match serde_json::from_str(&body) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Backend returned non-JSON body");
                return Err(Error::BackendInvalidResponse);
            }
        };

        extract_generated_text(&json)
            .map(|text| BackendResponse { text })
            .ok_or(Error::BackendInvalidResponse)
    }

    async fn health(&self) -> bool {
        let probe = self
            .client
            .get(&self.version_url)
            .timeout(self.health_timeout)
            .send()
            .await;

        match probe {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Backend health probe failed");
                false
            }
        }
    }
}

/// Pull generated text out of a backend body.
///
/// Accepts `{"response": "..."}` or `{"completions": [{"text": "..."}]}`.
/// Text is trimmed; empty text counts as absent.
pub fn extract_generated_text(body: &Value) -> Option<String> {
    let text = match body.get("response") {
        Some(Value::String(text)) => text.as_str(),
        _ => body
            .get("completions")?
            .as_array()?
            .first()?
            .get("text")?
            .as_str()?,
    };

    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;

    async fn spawn_stub(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn backend(base_url: String) -> OllamaBackend {
        OllamaBackend::new(&BackendConfig {
            base_url,
            timeout_secs: 5,
            health_timeout_secs: 1,
            ..Default::default()
        })
        .unwrap()
    }

    fn request() -> BackendRequest {
        BackendRequest {
            model: "tinyllama".into(),
            prompt: "What is Rust?".into(),
            temperature: 0.7,
            max_tokens: 50,
            stream: false,
        }
    }

    #[test]
    fn test_extract_response_field() {
        let body = json!({"response": "  Rust is a language.  "});
        assert_eq!(
            extract_generated_text(&body).as_deref(),
            Some("Rust is a language.")
        );
    }

    #[test]
    fn test_extract_completions_field() {
        let body = json!({"completions": [{"text": "first "}, {"text": "second"}]});
        assert_eq!(extract_generated_text(&body).as_deref(), Some("first"));
    }

    #[test]
    fn test_extract_rejects_missing_or_blank() {
        assert_eq!(extract_generated_text(&json!({})), None);
        assert_eq!(extract_generated_text(&json!({"response": "   "})), None);
        assert_eq!(extract_generated_text(&json!({"completions": []})), None);
        assert_eq!(extract_generated_text(&json!({"response": 42})), None);
    }

    #[tokio::test]
    async fn test_generate_posts_request_body() {
        let app = Router::new().route(
            "/api/generate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "tinyllama");
                assert_eq!(body["stream"], false);
                assert_eq!(body["max_tokens"], 50);
                Json(json!({"response": format!("echo: {}", body["prompt"].as_str().unwrap_or(""))}))
            }),
        );
        let backend = backend(spawn_stub(app).await);

        let response = backend.generate(&request()).await.unwrap();
        assert_eq!(response.text, "echo: What is Rust?");
    }

    #[tokio::test]
    async fn test_http_error_is_unavailable() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let backend = backend(spawn_stub(app).await);

        match backend.generate(&request()).await {
            Err(Error::BackendUnavailable { cause }) => assert!(cause.contains("500")),
            other => panic!("expected BackendUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_body_is_invalid() {
        let app = Router::new().route("/api/generate", post(|| async { "not json" }));
        let backend = backend(spawn_stub(app).await);

        assert!(matches!(
            backend.generate(&request()).await,
            Err(Error::BackendInvalidResponse)
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = backend(format!("http://{}", addr));
        assert!(matches!(
            backend.generate(&request()).await,
            Err(Error::BackendUnavailable { .. })
        ));
        assert!(!backend.health().await);
    }

    #[tokio::test]
    async fn test_health_probe() {
        let app = Router::new().route(
            "/api/version",
            get(|| async { Json(json!({"version": "0.1.32"})) }),
        );
        let backend = backend(spawn_stub(app).await);
        assert!(backend.health().await);
    }
}
