//! Integration tests for the request governor.

use std::sync::Arc;
use std::time::Duration;

use llmops_core::config::{AppConfig, TierConfig};
use llmops_core::mocks::{MockBackend, MockClock};
use llmops_core::{Error, GenerationRequest};
use llmops_governance::{RequestGovernor, Stage};

fn build(config: AppConfig, backend: Arc<MockBackend>, clock: MockClock) -> Arc<RequestGovernor> {
    Arc::new(
        RequestGovernor::builder(config)
            .with_backend(backend)
            .with_clock(Arc::new(clock))
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn test_concurrent_requests_respect_rate_limit() {
    let mut config = AppConfig::default();
    config.tiers = config.tiers.with_tier("burst", TierConfig::new(10, 100.0));
    let backend = Arc::new(MockBackend::constant("ok"));
    let governor = build(config, backend.clone(), MockClock::default());

    let mut handles = Vec::new();
    for i in 0..25 {
        let governor = governor.clone();
        handles.push(tokio::spawn(async move {
            governor
                .process(GenerationRequest::new(format!("question {}", i)).with_identity("burst"))
                .await
        }));
    }

    let mut admitted = 0;
    let mut limited = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(Error::RateLimitExceeded { limit, .. }) => {
                assert_eq!(limit, 10);
                limited += 1;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(admitted, 10);
    assert_eq!(limited, 15);
    assert_eq!(backend.call_count(), 10);
    assert_eq!(governor.active_requests(), 0);
}

#[tokio::test]
async fn test_window_reopens_after_a_minute() {
    let clock = MockClock::default();
    let governor = build(
        AppConfig::default(),
        Arc::new(MockBackend::constant("ok")),
        clock.clone(),
    );

    let bob = || GenerationRequest::new("hello").with_identity("bob");
    assert!(governor.process(bob()).await.is_ok());
    assert!(governor.process(bob()).await.is_err());

    clock.advance(Duration::from_secs(61));
    assert!(governor.process(bob()).await.is_ok());
}

#[tokio::test]
async fn test_spend_accumulates_until_budget_then_resets_next_day() {
    let mut config = AppConfig::default();
    // Each request estimates 0.0001 input + 0.2 output; actual output is one token.
    config.cost.input_cost_per_1k = 0.1;
    config.cost.output_cost_per_1k = 1.0;
    config.tiers = config.tiers.with_tier("carol", TierConfig::new(100, 0.25));
    let clock = MockClock::default();
    let governor = build(config, Arc::new(MockBackend::constant("ok")), clock.clone());

    let request = || {
        GenerationRequest::new("hi")
            .with_identity("carol")
            .with_max_tokens(200)
    };

    // Spend grows by 0.0011 per request; the precheck allows while
    // spend + 0.2001 <= 0.25, i.e. while spend <= 0.0499.
    let mut served = 0;
    loop {
        match governor.process(request()).await {
            Ok(_) => served += 1,
            Err(Error::CostLimitExceeded { reason }) => {
                assert!(reason.contains("daily budget exceeded"));
                break;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
        assert!(served < 1000, "budget never enforced");
    }
    assert_eq!(served, 46);

    clock.advance(Duration::from_secs(86_401));
    assert!(governor.process(request()).await.is_ok());
}

#[test]
fn test_stage_order() {
    assert!(Stage::Received < Stage::InputSafetyChecked);
    assert!(Stage::RateLimited < Stage::CostPrechecked);
    assert!(Stage::BackendInvoked < Stage::Accounted);
    assert_eq!(Stage::OutputSafetyChecked.to_string(), "output_safety_checked");
}
