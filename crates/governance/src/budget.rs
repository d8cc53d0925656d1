//! Per-identity daily cost controller.
//!
//! Spend is tracked per identity for the current 24-hour epoch. The epoch is
//! process-wide: once it expires the whole ledger is cleared at once.

use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use llmops_core::{
    config::{CostConfig, TierTable},
    traits::{Clock, IdentityStore, SystemClock},
};

use crate::store::InMemoryIdentityStore;

/// Length of one accounting epoch.
pub const COST_EPOCH: Duration = Duration::from_secs(86_400);

/// Ledger entry for one identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerEntry {
    /// Committed spend in USD. Never negative.
    pub spend: f64,
    /// Estimated cost held by in-flight requests (reservation mode only).
    pub reserved: f64,
}

/// Result of a budget precheck.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    /// Amount reserved on the ledger; zero unless reservations are enabled.
    pub reserved: f64,
}

impl CostDecision {
    fn allow(reserved: f64) -> Self {
        Self {
            allowed: true,
            reason: None,
            reserved,
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            reserved: 0.0,
        }
    }
}

/// Daily spend ledger with budget enforcement.
pub struct CostController {
    tiers: Arc<TierTable>,
    input_cost_per_1k: f64,
    output_cost_per_1k: f64,
    precheck_output_ceiling: u32,
    reserve_budget: bool,
    ledger: Arc<dyn IdentityStore<LedgerEntry>>,
    clock: Arc<dyn Clock>,
    epoch: Duration,
    epoch_start: RwLock<Instant>,
}

impl CostController {
    /// Create a controller with an in-memory ledger and the system clock.
    pub fn new(config: &CostConfig, tiers: Arc<TierTable>) -> Self {
        Self::with_parts(
            config,
            tiers,
            Arc::new(InMemoryIdentityStore::<LedgerEntry>::new()),
            Arc::new(SystemClock),
        )
    }

    /// Create a controller with an explicit ledger store and clock.
    pub fn with_parts(
        config: &CostConfig,
        tiers: Arc<TierTable>,
        ledger: Arc<dyn IdentityStore<LedgerEntry>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let epoch_start = RwLock::new(clock.now());
        Self {
            tiers,
            input_cost_per_1k: config.input_cost_per_1k,
            output_cost_per_1k: config.output_cost_per_1k,
            precheck_output_ceiling: config.precheck_output_ceiling,
            reserve_budget: config.reserve_budget,
            ledger,
            clock,
            epoch: COST_EPOCH,
            epoch_start,
        }
    }

    /// Linear cost of a request in USD.
    pub fn estimate_cost(&self, tokens_in: u64, tokens_out: u64) -> f64 {
        let input_cost = (tokens_in as f64 / 1000.0) * self.input_cost_per_1k;
        let output_cost = (tokens_out as f64 / 1000.0) * self.output_cost_per_1k;
        input_cost + output_cost
    }

    /// Output length assumed before the backend has answered.
    pub fn estimated_output_tokens(&self, max_tokens: u32) -> u64 {
        u64::from(max_tokens.min(self.precheck_output_ceiling))
    }

    /// Daily budget for `identity`.
    pub fn budget_for(&self, identity: &str) -> f64 {
        self.tiers.resolve(identity).daily_budget
    }

    /// Whether prechecks reserve their estimate.
    pub fn reserves_budget(&self) -> bool {
        self.reserve_budget
    }

    /// Check whether `estimated_cost` fits in the identity's remaining budget.
    ///
    /// In reservation mode an allowed precheck also holds the estimate on the
    /// ledger until [`settle`](Self::settle) or [`release`](Self::release).
    pub fn precheck(&self, identity: &str, estimated_cost: f64) -> CostDecision {
        let budget = self.budget_for(identity);
        let estimated = estimated_cost.max(0.0);
        let reserve = self.reserve_budget;
        let mut decision = CostDecision::deny(String::new());

        self.with_current_epoch(|| {
            self.ledger.with_record(identity, &mut |entry: &mut LedgerEntry| {
                let committed = entry.spend + entry.reserved;
                decision = if committed + estimated > budget {
                    CostDecision::deny(format!(
                        "daily budget exceeded: spent {:.4} + estimated {:.4} > budget {:.4}",
                        committed, estimated, budget
                    ))
                } else if reserve {
                    entry.reserved += estimated;
                    CostDecision::allow(estimated)
                } else {
                    CostDecision::allow(0.0)
                };
            });
        });

        if !decision.allowed {
            tracing::debug!(identity, estimated, budget, "Cost precheck failed");
        }
        decision
    }

    /// Add `actual_cost` to the identity's spend.
    pub fn record(&self, identity: &str, actual_cost: f64) {
        self.settle(identity, 0.0, actual_cost);
    }

    /// Commit `actual_cost` and drop a reservation of `reserved`.
    pub fn settle(&self, identity: &str, reserved: f64, actual_cost: f64) {
        let actual = actual_cost.max(0.0);
        self.with_current_epoch(|| {
            self.ledger.with_record(identity, &mut |entry: &mut LedgerEntry| {
                entry.reserved = (entry.reserved - reserved).max(0.0);
                entry.spend += actual;
            });
        });

        tracing::debug!(identity, cost = actual, "Recorded request cost");
    }

    /// Drop a reservation without committing any spend.
    pub fn release(&self, identity: &str, reserved: f64) {
        if reserved <= 0.0 {
            return;
        }
        self.with_current_epoch(|| {
            self.ledger.with_record(identity, &mut |entry: &mut LedgerEntry| {
                entry.reserved = (entry.reserved - reserved).max(0.0);
            });
        });
    }

    /// Committed spend for `identity` in the current epoch.
    pub fn spend(&self, identity: &str) -> f64 {
        let mut spend = 0.0;
        self.with_current_epoch(|| {
            self.ledger.inspect(identity, &mut |entry: Option<&LedgerEntry>| {
                spend = entry.map(|e| e.spend).unwrap_or(0.0);
            });
        });
        spend
    }

    /// Run `f` inside the current epoch, rolling the epoch over first if it
    /// has expired. Rollover clears the ledger under the write lock, so no
    /// ledger update can interleave with it.
    fn with_current_epoch<T>(&self, f: impl FnOnce() -> T) -> T {
        let now = self.clock.now();

        let expired = {
            let start = self.epoch_start.read().unwrap_or_else(PoisonError::into_inner);
            now.saturating_duration_since(*start) > self.epoch
        };

        if expired {
            let mut start = self
                .epoch_start
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            // Another request may have rolled over while we waited.
            if now.saturating_duration_since(*start) > self.epoch {
                self.ledger.clear();
                *start = now;
                tracing::info!("Cost epoch expired, ledger cleared");
            }
        }

        let _epoch = self.epoch_start.read().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}
