//! Run budgets: tokens, queries, and wall-clock time.
//!
//! Budget exhaustion is an expected terminal condition of deep exploration,
//! not a fault, so `reserve` answers with a boolean and never errors.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::ResearchConfig;

/// Estimated or actual cost of one research operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BudgetCost {
    /// Tokens the operation is expected to consume (or consumed).
    pub tokens: u64,
    /// Retrieval queries the operation will issue (or issued).
    pub queries: u64,
}

impl BudgetCost {
    /// Cost of a single retrieval query.
    pub fn query() -> Self {
        Self {
            tokens: 0,
            queries: 1,
        }
    }

    /// Cost of an LLM call estimated at the given token count.
    pub fn tokens(tokens: u64) -> Self {
        Self { tokens, queries: 0 }
    }
}

/// Snapshot of consumed budget, suitable for run summaries.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BudgetUsage {
    pub tokens_consumed: u64,
    pub queries_issued: u64,
    pub elapsed_secs: f64,
}

#[derive(Debug, Default)]
struct Counters {
    tokens: u64,
    queries: u64,
}

/// Tracks consumed budget for one run and gates new operations.
///
/// All limits are optional; a tracker with no limits always admits.
/// `reserve` commits an estimate atomically (check and mutate under one
/// lock) so concurrent branches cannot jointly overshoot; `release`
/// reconciles the estimate with the actual cost afterwards.
#[derive(Debug)]
pub struct BudgetTracker {
    max_tokens: Option<u64>,
    max_queries: Option<u64>,
    deadline: Option<Instant>,
    started_at: Instant,
    counters: Mutex<Counters>,
}

impl BudgetTracker {
    /// Create a tracker from the run configuration. The wall clock starts
    /// now.
    pub fn from_config(config: &ResearchConfig) -> Self {
        let started_at = Instant::now();
        Self {
            max_tokens: config.max_token_budget,
            max_queries: config.max_queries,
            deadline: config
                .max_wall_clock_secs
                .map(|secs| started_at + Duration::from_secs(secs)),
            started_at,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Create a tracker with no limits.
    pub fn unlimited() -> Self {
        Self::from_config(&ResearchConfig::default())
    }

    /// Atomically check whether `estimated` fits within the remaining
    /// budget and, if so, commit the reservation.
    ///
    /// Returns `false` without mutating state when any limit would be
    /// exceeded, including the wall-clock deadline.
    pub fn reserve(&self, estimated: BudgetCost) -> bool {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return false;
            }
        }

        let mut counters = self.counters.lock().expect("budget lock poisoned");
        if let Some(max) = self.max_tokens {
            if counters.tokens + estimated.tokens > max {
                return false;
            }
        }
        if let Some(max) = self.max_queries {
            if counters.queries + estimated.queries > max {
                return false;
            }
        }
        counters.tokens += estimated.tokens;
        counters.queries += estimated.queries;
        true
    }

    /// Reconcile a reservation with the real cost after the operation
    /// completed. Credits back any over-estimate; counters never go
    /// negative.
    pub fn release(&self, estimated: BudgetCost, actual: BudgetCost) {
        let mut counters = self.counters.lock().expect("budget lock poisoned");
        if estimated.tokens > actual.tokens {
            let credit = estimated.tokens - actual.tokens;
            counters.tokens = counters.tokens.saturating_sub(credit);
        } else {
            counters.tokens += actual.tokens - estimated.tokens;
        }
        if estimated.queries > actual.queries {
            let credit = estimated.queries - actual.queries;
            counters.queries = counters.queries.saturating_sub(credit);
        } else {
            counters.queries += actual.queries - estimated.queries;
        }
    }

    /// Whether any budget dimension is already exhausted.
    pub fn exhausted(&self) -> bool {
        !self.reserve_would_admit()
    }

    fn reserve_would_admit(&self) -> bool {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return false;
            }
        }
        let counters = self.counters.lock().expect("budget lock poisoned");
        if let Some(max) = self.max_tokens {
            if counters.tokens >= max {
                return false;
            }
        }
        if let Some(max) = self.max_queries {
            if counters.queries >= max {
                return false;
            }
        }
        true
    }

    /// Snapshot of consumed budget so far.
    pub fn usage(&self) -> BudgetUsage {
        let counters = self.counters.lock().expect("budget lock poisoned");
        BudgetUsage {
            tokens_consumed: counters.tokens,
            queries_issued: counters.queries,
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(tokens: Option<u64>, queries: Option<u64>) -> ResearchConfig {
        ResearchConfig {
            max_token_budget: tokens,
            max_queries: queries,
            ..Default::default()
        }
    }

    #[test]
    fn test_unlimited_always_admits() {
        let tracker = BudgetTracker::unlimited();
        for _ in 0..100 {
            assert!(tracker.reserve(BudgetCost {
                tokens: 1_000_000,
                queries: 50,
            }));
        }
    }

    #[test]
    fn test_reserve_rejects_over_token_budget() {
        let tracker = BudgetTracker::from_config(&config_with(Some(100), None));
        assert!(tracker.reserve(BudgetCost::tokens(60)));
        assert!(!tracker.reserve(BudgetCost::tokens(50)));
        // The failed reservation did not mutate state
        assert!(tracker.reserve(BudgetCost::tokens(40)));
    }

    #[test]
    fn test_zero_budget_rejects_first_reservation() {
        let tracker = BudgetTracker::from_config(&config_with(None, Some(0)));
        assert!(!tracker.reserve(BudgetCost::query()));
        assert!(tracker.exhausted());
    }

    #[test]
    fn test_release_credits_over_estimate() {
        let tracker = BudgetTracker::from_config(&config_with(Some(100), None));
        assert!(tracker.reserve(BudgetCost::tokens(80)));
        tracker.release(BudgetCost::tokens(80), BudgetCost::tokens(30));
        assert_eq!(tracker.usage().tokens_consumed, 30);
        assert!(tracker.reserve(BudgetCost::tokens(70)));
    }

    #[test]
    fn test_release_charges_under_estimate() {
        let tracker = BudgetTracker::unlimited();
        assert!(tracker.reserve(BudgetCost::tokens(10)));
        tracker.release(BudgetCost::tokens(10), BudgetCost::tokens(25));
        assert_eq!(tracker.usage().tokens_consumed, 25);
    }

    #[test]
    fn test_release_never_goes_negative() {
        let tracker = BudgetTracker::unlimited();
        tracker.release(BudgetCost::tokens(50), BudgetCost::tokens(0));
        assert_eq!(tracker.usage().tokens_consumed, 0);
    }

    #[test]
    fn test_wall_clock_deadline() {
        let config = ResearchConfig {
            max_wall_clock_secs: Some(0),
            ..Default::default()
        };
        let tracker = BudgetTracker::from_config(&config);
        assert!(!tracker.reserve(BudgetCost::query()));
    }

    #[test]
    fn test_concurrent_reservations_respect_limit() {
        use std::sync::Arc;

        let tracker = Arc::new(BudgetTracker::from_config(&config_with(None, Some(10))));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let tracker = tracker.clone();
            handles.push(std::thread::spawn(move || {
                let mut admitted = 0u64;
                for _ in 0..10 {
                    if tracker.reserve(BudgetCost::query()) {
                        admitted += 1;
                    }
                }
                admitted
            }));
        }
        let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 10);
        assert_eq!(tracker.usage().queries_issued, 10);
    }
}
