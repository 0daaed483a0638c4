//! Per-engine rate and time budget.
//!
//! Every engine owns one [`EngineCell`]: its static [`BudgetPolicy`] plus the
//! mutable [`RateState`] behind a mutex. All admission decisions for an
//! engine are taken while holding that mutex, so concurrent sessions can
//! never both claim the last in-flight slot.
//!
//! Admission order: circuit breaker, then concurrency cap, then spacing.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use veil_common::{EngineId, UnresponsiveReason};

/// Retry hint handed out when an engine is at its in-flight ceiling.
pub const BUSY_RETRY_HINT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetPolicy {
    pub max_in_flight: u32,
    pub min_interval: Duration,
    /// Failures within `failure_window` that open the circuit. `0` disables the breaker.
    pub failure_threshold: u32,
    pub failure_window: Duration,
    pub cooldown: Duration,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            min_interval: Duration::ZERO,
            failure_threshold: 5,
            failure_window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        }
    }
}

/// How an admitted call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Timeout,
    Error,
    /// The caller went away before the call finished. Frees the slot
    /// without counting against the engine.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    CircuitOpen,
}

#[derive(Debug)]
pub enum Admission {
    Admitted(Permit),
    Deferred { retry_after: Duration },
    Rejected(RejectReason),
}

impl Admission {
    /// How a non-admitted engine is reported to the caller.
    pub fn unresponsive_reason(&self) -> Option<UnresponsiveReason> {
        match self {
            Admission::Admitted(_) => None,
            Admission::Deferred { .. } => Some(UnresponsiveReason::RateLimited),
            Admission::Rejected(RejectReason::CircuitOpen) => {
                Some(UnresponsiveReason::CircuitOpen)
            }
        }
    }
}

#[derive(Debug, Default)]
struct RateState {
    last_invocation: Option<Instant>,
    in_flight: u32,
    recent_failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
}

impl RateState {
    fn prune(&mut self, window: Duration, now: Instant) {
        while let Some(&oldest) = self.recent_failures.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.recent_failures.pop_front();
            } else {
                break;
            }
        }
    }
}

#[derive(Debug)]
struct EngineCell {
    policy: BudgetPolicy,
    state: Mutex<RateState>,
}

impl EngineCell {
    fn new(policy: BudgetPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(RateState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, outcome: Outcome, now: Instant) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if matches!(outcome, Outcome::Success | Outcome::Cancelled) {
            return;
        }
        state.recent_failures.push_back(now);
        state.prune(self.policy.failure_window, now);
        let threshold = self.policy.failure_threshold as usize;
        if threshold > 0 && state.opened_at.is_none() && state.recent_failures.len() >= threshold {
            state.opened_at = Some(now);
        }
    }
}

/// Claim on one in-flight slot of an engine.
///
/// Dropping a permit without calling [`Permit::release`] releases it as
/// [`Outcome::Cancelled`]: the slot is freed and no failure is recorded.
#[derive(Debug)]
pub struct Permit {
    engine: EngineId,
    cell: Arc<EngineCell>,
    released: bool,
}

impl Permit {
    pub fn engine(&self) -> &EngineId {
        &self.engine
    }

    pub fn release(self, outcome: Outcome) {
        self.release_at(outcome, Instant::now());
    }

    pub(crate) fn release_at(mut self, outcome: Outcome, now: Instant) {
        self.released = true;
        self.cell.finish(outcome, now);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if !self.released {
            tracing::debug!(engine = %self.engine, "budget.permit.dropped");
            self.cell.finish(Outcome::Cancelled, Instant::now());
        }
    }
}

/// Point-in-time view of one engine's budget, for `/stats`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BudgetSnapshot {
    pub engine: EngineId,
    pub in_flight: u32,
    pub recent_failures: usize,
    pub circuit_open: bool,
}

/// Shared across sessions; cloning is cheap.
#[derive(Clone, Default)]
pub struct Budgeter {
    cells: Arc<DashMap<EngineId, Arc<EngineCell>>>,
}

impl Budgeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the policy of an engine, resetting its state.
    pub fn configure(&self, engine: EngineId, policy: BudgetPolicy) {
        self.cells.insert(engine, Arc::new(EngineCell::new(policy)));
    }

    fn cell(&self, engine: &EngineId) -> Arc<EngineCell> {
        self.cells
            .entry(engine.clone())
            .or_insert_with(|| Arc::new(EngineCell::new(BudgetPolicy::default())))
            .clone()
    }

    pub fn admit(&self, engine: &EngineId) -> Admission {
        self.admit_at(engine, Instant::now())
    }

    pub(crate) fn admit_at(&self, engine: &EngineId, now: Instant) -> Admission {
        let cell = self.cell(engine);
        let policy = &cell.policy;
        let mut state = cell.lock();

        if let Some(opened) = state.opened_at {
            if now.saturating_duration_since(opened) < policy.cooldown {
                return Admission::Rejected(RejectReason::CircuitOpen);
            }
            tracing::info!(engine = %engine, "budget.circuit.reset");
            state.opened_at = None;
            state.recent_failures.clear();
        }

        if state.in_flight >= policy.max_in_flight {
            return Admission::Deferred {
                retry_after: BUSY_RETRY_HINT,
            };
        }

        if let Some(last) = state.last_invocation {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < policy.min_interval {
                return Admission::Deferred {
                    retry_after: policy.min_interval - elapsed,
                };
            }
        }

        state.in_flight += 1;
        state.last_invocation = Some(now);
        drop(state);

        Admission::Admitted(Permit {
            engine: engine.clone(),
            cell,
            released: false,
        })
    }

    pub fn release(&self, permit: Permit, outcome: Outcome) {
        permit.release(outcome);
    }

    /// Snapshot of every known engine, sorted by id.
    pub fn snapshot(&self) -> Vec<BudgetSnapshot> {
        let now = Instant::now();
        let mut out: Vec<BudgetSnapshot> = self
            .cells
            .iter()
            .map(|entry| {
                let cell = entry.value();
                let mut state = cell.lock();
                state.prune(cell.policy.failure_window, now);
                let circuit_open = state
                    .opened_at
                    .is_some_and(|at| now.saturating_duration_since(at) < cell.policy.cooldown);
                BudgetSnapshot {
                    engine: entry.key().clone(),
                    in_flight: state.in_flight,
                    recent_failures: state.recent_failures.len(),
                    circuit_open,
                }
            })
            .collect();
        out.sort_by(|a, b| a.engine.cmp(&b.engine));
        out
    }
}
