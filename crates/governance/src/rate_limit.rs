//! Sliding-window request rate limiter.
//!
//! Each identity owns a window of admission timestamps covering the trailing
//! minute. A request is admitted while the pruned window holds fewer entries
//! than the identity's tier ceiling.
//!
//! Windows of idle identities are swept at most once per window length, so
//! the store only holds identities seen during the last minute or so.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use llmops_core::{
    config::TierTable,
    traits::{Clock, IdentityStore, SystemClock},
};

use crate::store::InMemoryIdentityStore;

/// Length of the trailing window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Admission timestamps of one identity, oldest first.
#[derive(Debug, Clone, Default)]
pub struct RateWindow {
    timestamps: VecDeque<Instant>,
}

impl RateWindow {
    /// Drop timestamps older than `window` relative to `now`.
    fn prune(&mut self, now: Instant, window: Duration) {
        self.timestamps
            .retain(|t| now.saturating_duration_since(*t) <= window);
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Admitted; `current` counts this request.
    Allowed { current: u32, limit: u32 },
    /// Rejected; the window already holds `current` requests.
    Limited { current: u32, limit: u32 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Per-identity sliding-window rate limiter.
pub struct RateLimiter {
    tiers: Arc<TierTable>,
    store: Arc<dyn IdentityStore<RateWindow>>,
    clock: Arc<dyn Clock>,
    window: Duration,
    last_sweep: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter with an in-memory store and the system clock.
    pub fn new(tiers: Arc<TierTable>) -> Self {
        Self {
            tiers,
            store: Arc::new(InMemoryIdentityStore::<RateWindow>::new()),
            clock: Arc::new(SystemClock),
            window: RATE_WINDOW,
            last_sweep: Mutex::new(None),
        }
    }

    /// Set the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the window store.
    pub fn with_store(mut self, store: Arc<dyn IdentityStore<RateWindow>>) -> Self {
        self.store = store;
        self
    }

    /// Requests per minute allowed for `identity`.
    pub fn limit_for(&self, identity: &str) -> u32 {
        self.tiers.resolve(identity).rate_limit
    }

    /// Check and, when admitted, record a request for `identity`.
    ///
    /// Ties at the ceiling reject. A rejected request leaves the window
    /// pruned but otherwise untouched.
    pub fn check(&self, identity: &str) -> RateDecision {
        self.sweep_idle();

        let limit = self.limit_for(identity);
        let window = self.window;
        let mut decision = RateDecision::Limited { current: 0, limit };

        self.store.with_record(identity, &mut |record: &mut RateWindow| {
            // Read the clock under the identity's lock so timestamps stay ordered.
            let now = self.clock.now();
            record.prune(now, window);

            let current = record.len() as u32;
            decision = if current >= limit {
                RateDecision::Limited { current, limit }
            } else {
                record.timestamps.push_back(now);
                RateDecision::Allowed {
                    current: current + 1,
                    limit,
                }
            };
        });

        if let RateDecision::Limited { current, limit } = decision {
            tracing::debug!(identity, current, limit, "Rate limit reached");
        }
        decision
    }

    /// Admit a request for `identity`, returning whether it was accepted.
    pub fn admit(&self, identity: &str) -> bool {
        self.check(identity).is_allowed()
    }

    /// Number of identities holding a rate window.
    pub fn tracked_identities(&self) -> usize {
        self.store.len()
    }

    /// Drop windows with no timestamp left inside the window.
    fn sweep_idle(&self) {
        let now = self.clock.now();
        {
            let mut last = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
            match *last {
                Some(t) if now.saturating_duration_since(t) <= self.window => return,
                _ => *last = Some(now),
            }
        }

        let window = self.window;
        let before = self.store.len();
        self.store.retain(&mut |record: &mut RateWindow| {
            record.prune(now, window);
            !record.is_empty()
        });
        let dropped = before.saturating_sub(self.store.len());
        if dropped > 0 {
            tracing::debug!(dropped, "Swept idle rate windows");
        }
    }

    /// Requests currently counted against `identity`, without recording one.
    pub fn current(&self, identity: &str) -> u32 {
        let now = self.clock.now();
        let window = self.window;
        let mut count = 0;
        self.store.inspect(identity, &mut |record: Option<&RateWindow>| {
            count = record
                .map(|w| {
                    w.timestamps
                        .iter()
                        .filter(|t| now.saturating_duration_since(**t) <= window)
                        .count()
                })
                .unwrap_or(0) as u32;
        });
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmops_core::config::TierConfig;
    use llmops_core::mocks::MockClock;

    fn limiter() -> (RateLimiter, MockClock) {
        let clock = MockClock::default();
        let limiter =
            RateLimiter::new(Arc::new(TierTable::default())).with_clock(Arc::new(clock.clone()));
        (limiter, clock)
    }

    #[test]
    fn test_limit_plus_one_rejects_exactly_once() {
        let (limiter, _clock) = limiter();
        let limit = limiter.limit_for("mallory");
        assert_eq!(limit, 5);

        for i in 0..limit {
            assert!(limiter.admit("mallory"), "request {} should be admitted", i + 1);
        }
        assert_eq!(
            limiter.check("mallory"),
            RateDecision::Limited { current: 5, limit: 5 }
        );
    }

    #[test]
    fn test_bob_one_per_minute() {
        let (limiter, clock) = limiter();

        assert!(limiter.admit("bob"));
        clock.advance(Duration::from_millis(300));
        assert!(!limiter.admit("bob"));
    }

    #[test]
    fn test_window_slides() {
        let (limiter, clock) = limiter();

        assert!(limiter.admit("bob"));
        clock.advance(Duration::from_secs(30));
        assert!(!limiter.admit("bob"));

        // The t=0 request no longer counts at t=61.
        clock.advance(Duration::from_secs(31));
        assert!(limiter.admit("bob"));
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let (limiter, clock) = limiter();

        assert!(limiter.admit("bob"));
        clock.advance(Duration::from_secs(60));
        assert!(!limiter.admit("bob"));
        assert_eq!(limiter.current("bob"), 1);
    }

    #[test]
    fn test_rejection_does_not_extend_window() {
        let (limiter, clock) = limiter();

        assert!(limiter.admit("bob"));
        for _ in 0..10 {
            clock.advance(Duration::from_secs(5));
            assert!(!limiter.admit("bob"));
        }
        clock.advance(Duration::from_secs(11));
        assert!(limiter.admit("bob"));
    }

    #[test]
    fn test_identities_are_independent() {
        let (limiter, _clock) = limiter();

        assert!(limiter.admit("bob"));
        assert!(!limiter.admit("bob"));
        assert!(limiter.admit("alice"));
    }

    #[test]
    fn test_idle_windows_are_swept() {
        let (limiter, clock) = limiter();

        for i in 0..10_000 {
            assert!(limiter.admit(&format!("caller-{}", i)));
        }
        assert_eq!(limiter.tracked_identities(), 10_000);

        clock.advance(Duration::from_secs(3600));
        assert!(limiter.admit("late-caller"));
        assert_eq!(limiter.tracked_identities(), 1);
    }

    #[test]
    fn test_sweep_keeps_live_windows() {
        let (limiter, clock) = limiter();

        assert!(limiter.admit("alice"));
        clock.advance(Duration::from_secs(50));
        assert!(limiter.admit("bob"));

        // alice's request has left the window, bob's has not.
        clock.advance(Duration::from_secs(20));
        assert!(limiter.admit("carol"));
        assert_eq!(limiter.tracked_identities(), 2);
        assert!(!limiter.admit("bob"));
    }

    #[test]
    fn test_concurrent_admissions_never_exceed_limit() {
        let tiers = TierTable::default().with_tier("burst", TierConfig::new(50, 1.0));
        let limiter = Arc::new(RateLimiter::new(Arc::new(tiers)));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..20).filter(|_| limiter.admit("burst")).count())
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(admitted, 50);
    }
}
