//! Mock implementations of core traits for testing.
//!
//! Shared by unit and integration tests across the workspace.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::{
    traits::{Clock, GenerationBackend},
    types::{BackendRequest, BackendResponse},
    Error, Result,
};

// =============================================================================
// Mock Clock
// =============================================================================

/// Controllable clock. Clones share the same time value.
#[derive(Debug, Clone)]
pub struct MockClock {
    current_time: Arc<Mutex<Instant>>,
}

impl MockClock {
    /// Create a mock clock starting at a specific instant.
    pub fn new(start: Instant) -> Self {
        Self {
            current_time: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: Duration) {
        let mut time = self.current_time.lock().unwrap();
        *time += duration;
    }

    /// Set the clock to a specific instant.
    pub fn set(&self, instant: Instant) {
        *self.current_time.lock().unwrap() = instant;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.current_time.lock().unwrap()
    }
}

// =============================================================================
// Mock Backend
// =============================================================================

/// Scripted reply of a [`MockBackend`].
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this text.
    Text(String),
    /// Fail with `BackendUnavailable`.
    Unavailable(String),
    /// Fail with `BackendInvalidResponse`.
    Invalid,
}

/// Scripted backend that cycles through predefined replies.
pub struct MockBackend {
    replies: Vec<MockReply>,
    calls: Mutex<Vec<BackendRequest>>,
    healthy: bool,
}

impl MockBackend {
    /// Create a backend with a queue of replies (repeated cyclically).
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies,
            calls: Mutex::new(Vec::new()),
            healthy: true,
        }
    }

    /// Backend that always answers with the same text.
    pub fn constant(text: &str) -> Self {
        Self::new(vec![MockReply::Text(text.to_string())])
    }

    /// Backend that is always unreachable.
    pub fn unavailable(cause: &str) -> Self {
        let mut backend = Self::new(vec![MockReply::Unavailable(cause.to_string())]);
        backend.healthy = false;
        backend
    }

    /// Number of generate calls received.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Requests received so far.
    pub fn calls(&self) -> Vec<BackendRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn generate(&self, request: &BackendRequest) -> Result<BackendResponse> {
        let idx = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request.clone());
            calls.len() - 1
        };

        match self.replies.get(idx % self.replies.len().max(1)) {
            Some(MockReply::Text(text)) => Ok(BackendResponse { text: text.clone() }),
            Some(MockReply::Unavailable(cause)) => Err(Error::backend_unavailable(cause.clone())),
            Some(MockReply::Invalid) | None => Err(Error::BackendInvalidResponse),
        }
    }

    async fn health(&self) -> bool {
        self.healthy
    }
}
