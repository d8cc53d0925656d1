//! Request governor.
//!
//! Runs every generation request through the admission pipeline
//!
//! ```text
//! Received -> InputSafetyChecked -> GuardrailsChecked -> RateLimited
//!          -> CostPrechecked -> BackendInvoked -> OutputSafetyChecked
//!          -> Accounted -> Completed
//! ```
//!
//! The first failing stage ends the request as `Rejected` (governance and
//! client errors) or `Failed` (backend and internal errors); later stages
//! never run. A rate-limit slot consumed before a backend failure is not
//! refunded, and no cost is recorded for a failed backend call.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use llmops_core::{
    config::AppConfig,
    traits::{Clock, GenerationBackend, SystemClock, TokenCounter, WhitespaceCounter},
    types::{
        BackendRequest, GenerationMetrics, GenerationRequest, GenerationResponse,
        NormalizedRequest,
    },
    Disposition, Error, Result,
};

use crate::budget::{CostController, LedgerEntry};
use crate::guardrails::GuardrailValidator;
use crate::metrics::{self, ActiveRequestGuard, RequestUsage};
use crate::rate_limit::{RateDecision, RateLimiter};
use crate::safety::ContentSafetyFilter;
use crate::store::InMemoryIdentityStore;

/// Pipeline position of a request. Variants are declared in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    InputSafetyChecked,
    GuardrailsChecked,
    RateLimited,
    CostPrechecked,
    BackendInvoked,
    OutputSafetyChecked,
    Accounted,
    Completed,
    Rejected,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::InputSafetyChecked => "input_safety_checked",
            Stage::GuardrailsChecked => "guardrails_checked",
            Stage::RateLimited => "rate_limited",
            Stage::CostPrechecked => "cost_prechecked",
            Stage::BackendInvoked => "backend_invoked",
            Stage::OutputSafetyChecked => "output_safety_checked",
            Stage::Accounted => "accounted",
            Stage::Completed => "completed",
            Stage::Rejected => "rejected",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request state, owned by the governor call handling the request.
#[derive(Debug)]
pub struct RequestContext {
    pub request: NormalizedRequest,
    pub stage: Stage,
    pub started: Instant,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    /// Budget held by the cost precheck, if reservations are enabled.
    pub reserved: f64,
}

impl RequestContext {
    fn new(request: NormalizedRequest, started: Instant) -> Self {
        Self {
            request,
            stage: Stage::Received,
            started,
            input_tokens: 0,
            output_tokens: 0,
            cost: 0.0,
            reserved: 0.0,
        }
    }

    fn advance(&mut self, stage: Stage) {
        tracing::debug!(
            trace_id = %self.request.trace_id,
            from = %self.stage,
            to = %stage,
            "Stage transition"
        );
        self.stage = stage;
    }

    fn identity(&self) -> &str {
        &self.request.identity
    }
}

/// Backend output after the output safety stage.
struct CheckedOutput {
    text: String,
    filtered: bool,
}

/// Orchestrates the governance stages around a backend call.
pub struct RequestGovernor {
    safety: Arc<ContentSafetyFilter>,
    guardrails: Arc<GuardrailValidator>,
    rate_limiter: Arc<RateLimiter>,
    cost: Arc<CostController>,
    backend: Arc<dyn GenerationBackend>,
    counter: Arc<dyn TokenCounter>,
    config: AppConfig,
    backend_timeout: Duration,
    active: Arc<AtomicUsize>,
}

impl RequestGovernor {
    /// Start building a governor from configuration.
    pub fn builder(config: AppConfig) -> RequestGovernorBuilder {
        RequestGovernorBuilder::new(config)
    }

    /// Number of requests currently inside the pipeline.
    pub fn active_requests(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn backend(&self) -> &Arc<dyn GenerationBackend> {
        &self.backend
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn cost_controller(&self) -> &CostController {
        &self.cost
    }

    /// Run one request through the pipeline.
    pub async fn process(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        let _active = ActiveRequestGuard::acquire(self.active.clone());
        let started = Instant::now();

        let request = match request.normalize(&self.config.request) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Rejected malformed request");
                return Err(e);
            }
        };

        let mut ctx = RequestContext::new(request, started);
        match self.run(&mut ctx).await {
            Ok(response) => Ok(response),
            Err(e) => {
                self.finish_with_error(&mut ctx, &e);
                Err(e)
            }
        }
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<GenerationResponse> {
        self.check_input_safety(ctx)?;
        ctx.advance(Stage::InputSafetyChecked);

        self.check_guardrails(ctx)?;
        ctx.advance(Stage::GuardrailsChecked);

        self.check_rate_limit(ctx)?;
        ctx.advance(Stage::RateLimited);

        self.precheck_cost(ctx)?;
        ctx.advance(Stage::CostPrechecked);

        let raw = match self.invoke_backend(ctx).await {
            Ok(text) => text,
            Err(e) => {
                self.cost.release(ctx.identity(), ctx.reserved);
                return Err(e);
            }
        };
        ctx.advance(Stage::BackendInvoked);

        let output = self.check_output_safety(ctx, &raw);
        ctx.advance(Stage::OutputSafetyChecked);

        let latency = self.account(ctx, &output.text);
        ctx.advance(Stage::Accounted);

        let response = GenerationResponse {
            trace_id: ctx.request.trace_id.clone(),
            backend: self.backend.name().to_string(),
            model: self.backend.model().to_string(),
            user: ctx.request.identity.clone(),
            generated_text: output.text,
            filtered: output.filtered,
            metrics: GenerationMetrics {
                latency_seconds: (latency * 1000.0).round() / 1000.0,
                input_tokens: ctx.input_tokens,
                output_tokens: ctx.output_tokens,
                total_tokens: ctx.input_tokens + ctx.output_tokens,
                max_tokens: ctx.request.max_tokens,
            },
        };
        ctx.advance(Stage::Completed);

        tracing::info!(
            trace_id = %response.trace_id,
            user = %response.user,
            latency_secs = latency,
            tokens = response.metrics.total_tokens,
            cost = ctx.cost,
            "Request completed"
        );
        Ok(response)
    }

    // =========================================================================
    // Stages
    // =========================================================================

    fn check_input_safety(&self, ctx: &RequestContext) -> Result<()> {
        let verdict = self.safety.check(&ctx.request.prompt);
        for violation in &verdict.violations {
            metrics::record_safety_violation(ctx.identity(), violation.kind(), "input");
        }

        if verdict.is_blocking() {
            return Err(Error::SafetyViolation {
                violations: verdict.violations,
                severity: verdict.severity,
            });
        }
        if !verdict.safe {
            tracing::info!(
                trace_id = %ctx.request.trace_id,
                violations = ?verdict.codes(),
                severity = %verdict.severity,
                "Admitting prompt with non-blocking safety findings"
            );
        }
        Ok(())
    }

    fn check_guardrails(&self, ctx: &RequestContext) -> Result<()> {
        let verdict = self.guardrails.validate(
            &ctx.request.prompt,
            ctx.request.max_tokens,
            ctx.identity(),
        );
        if verdict.valid {
            return Ok(());
        }

        for violation in &verdict.violations {
            metrics::record_guardrail_violation(ctx.identity(), violation.as_str());
        }
        Err(Error::GuardrailViolation {
            violations: verdict.violations,
        })
    }

    fn check_rate_limit(&self, ctx: &RequestContext) -> Result<()> {
        match self.rate_limiter.check(ctx.identity()) {
            RateDecision::Allowed { .. } => {
                metrics::record_user_request(ctx.identity());
                Ok(())
            }
            RateDecision::Limited { current, limit } => {
                metrics::record_rate_limit_exceeded(ctx.identity());
                Err(Error::RateLimitExceeded { current, limit })
            }
        }
    }

    fn precheck_cost(&self, ctx: &mut RequestContext) -> Result<()> {
        let tokens_in = self.counter.count_tokens(&ctx.request.prompt) as u64;
        let tokens_out = self.cost.estimated_output_tokens(ctx.request.max_tokens);
        let estimated = self.cost.estimate_cost(tokens_in, tokens_out);

        let decision = self.cost.precheck(ctx.identity(), estimated);
        if !decision.allowed {
            metrics::record_cost_blocked(ctx.identity());
            return Err(Error::cost_limit(
                decision
                    .reason
                    .unwrap_or_else(|| "daily budget exceeded".to_string()),
            ));
        }
        ctx.reserved = decision.reserved;
        Ok(())
    }

    async fn invoke_backend(&self, ctx: &RequestContext) -> Result<String> {
        let request = BackendRequest {
            model: self.backend.model().to_string(),
            prompt: ctx.request.prompt.clone(),
            temperature: ctx.request.temperature,
            max_tokens: ctx.request.max_tokens,
            stream: false,
        };

        tracing::info!(
            trace_id = %ctx.request.trace_id,
            user = %ctx.request.identity,
            backend = %self.backend.name(),
            "Processing request"
        );

        let response = tokio::time::timeout(self.backend_timeout, self.backend.generate(&request))
            .await
            .map_err(|_| {
                Error::backend_unavailable(format!(
                    "no response within {}s",
                    self.backend_timeout.as_secs_f64()
                ))
            })??;

        let text = response.text.trim();
        if text.is_empty() {
            return Err(Error::BackendInvalidResponse);
        }
        Ok(text.to_string())
    }

    fn check_output_safety(&self, ctx: &RequestContext, raw: &str) -> CheckedOutput {
        let verdict = self.safety.check(raw);
        for violation in &verdict.violations {
            metrics::record_safety_violation(ctx.identity(), violation.kind(), "output");
        }

        if verdict.is_blocking() {
            tracing::warn!(
                trace_id = %ctx.request.trace_id,
                violations = ?verdict.codes(),
                "Backend output filtered"
            );
            return CheckedOutput {
                text: self.config.safety.filtered_placeholder.clone(),
                filtered: true,
            };
        }

        CheckedOutput {
            text: self.safety.sanitize(raw),
            filtered: false,
        }
    }

    /// Bill the actual prompt and returned text. Returns latency in seconds.
    fn account(&self, ctx: &mut RequestContext, returned: &str) -> f64 {
        ctx.input_tokens = self.counter.count_tokens(&ctx.request.prompt) as u64;
        ctx.output_tokens = self.counter.count_tokens(returned) as u64;
        ctx.cost = self.cost.estimate_cost(ctx.input_tokens, ctx.output_tokens);

        let identity = ctx.request.identity.as_str();
        self.cost.settle(identity, ctx.reserved, ctx.cost);
        ctx.reserved = 0.0;
        metrics::record_cost(identity, ctx.cost);

        let latency = ctx.started.elapsed().as_secs_f64();
        metrics::record_request(
            self.backend.name(),
            identity,
            self.backend.model(),
            200,
            RequestUsage {
                latency_secs: latency,
                tokens_in: ctx.input_tokens,
                tokens_out: ctx.output_tokens,
            },
        );
        latency
    }

    fn finish_with_error(&self, ctx: &mut RequestContext, error: &Error) {
        let reached = ctx.stage;
        match error.disposition() {
            Disposition::Rejected => {
                ctx.advance(Stage::Rejected);
                tracing::warn!(
                    trace_id = %ctx.request.trace_id,
                    user = %ctx.request.identity,
                    after = %reached,
                    kind = error.kind(),
                    reasons = ?error.reasons(),
                    "Request rejected"
                );
            }
            Disposition::Failed => {
                ctx.advance(Stage::Failed);
                tracing::error!(
                    trace_id = %ctx.request.trace_id,
                    user = %ctx.request.identity,
                    after = %reached,
                    error = %error,
                    "Request failed"
                );
            }
        }

        // Requests turned away before reaching the backend are counted by
        // their dedicated governance counters only.
        if reached >= Stage::CostPrechecked {
            metrics::record_request(
                self.backend.name(),
                ctx.identity(),
                self.backend.model(),
                error.status_code(),
                RequestUsage {
                    latency_secs: ctx.started.elapsed().as_secs_f64(),
                    ..Default::default()
                },
            );
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`RequestGovernor`].
pub struct RequestGovernorBuilder {
    config: AppConfig,
    backend: Option<Arc<dyn GenerationBackend>>,
    counter: Arc<dyn TokenCounter>,
    clock: Arc<dyn Clock>,
}

impl RequestGovernorBuilder {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            backend: None,
            counter: Arc::new(WhitespaceCounter),
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the generation backend. Required.
    pub fn with_backend(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the token counter. Defaults to whitespace counting.
    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Set the clock driving rate windows and budget epochs.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<RequestGovernor> {
        let backend = self
            .backend
            .ok_or_else(|| Error::config("request governor requires a generation backend"))?;

        self.config.tiers.validate()?;
        let tiers = Arc::new(self.config.tiers.clone());

        let safety = ContentSafetyFilter::new(&self.config.safety)?;
        let guardrails = GuardrailValidator::new(&self.config.guardrails, tiers.clone());
        let rate_limiter = RateLimiter::new(tiers.clone()).with_clock(self.clock.clone());
        let cost = CostController::with_parts(
            &self.config.cost,
            tiers,
            Arc::new(InMemoryIdentityStore::<LedgerEntry>::new()),
            self.clock,
        );

        Ok(RequestGovernor {
            safety: Arc::new(safety),
            guardrails: Arc::new(guardrails),
            rate_limiter: Arc::new(rate_limiter),
            cost: Arc::new(cost),
            backend,
            counter: self.counter,
            backend_timeout: Duration::from_secs(self.config.backend.timeout_secs),
            config: self.config,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }
}
