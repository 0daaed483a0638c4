use crate::budget::{BudgetSnapshot, Budgeter};
use crate::cache::CacheStore;
use crate::registry::EngineRegistry;
use serde::Serialize;
use std::collections::BTreeMap;
use veil_common::{EngineId, UnresponsiveReason};

const STATS_PREFIX: &str = "veil:stats";

/// Outcome label for an engine that answered.
pub const OUTCOME_OK: &str = "ok";

/// Every label a per-engine counter can carry.
pub const OUTCOME_LABELS: [&str; 6] = [
    OUTCOME_OK,
    "timeout",
    "error",
    "rate_limited",
    "circuit_open",
    "skipped",
];

pub fn stat_key(engine: &EngineId, outcome: &str) -> String {
    format!("{STATS_PREFIX}:{engine}:{outcome}")
}

pub fn outcome_label(reason: Option<UnresponsiveReason>) -> &'static str {
    reason.map(UnresponsiveReason::as_str).unwrap_or(OUTCOME_OK)
}

/// Bump one outcome counter. Failures are logged and otherwise ignored.
pub async fn record_outcome(cache: &dyn CacheStore, engine: &EngineId, outcome: &str) {
    if let Err(err) = cache.incr(&stat_key(engine, outcome), 1).await {
        tracing::warn!(engine = %engine, outcome, error = %err, "stats.record.failed");
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub engine: EngineId,
    pub enabled: bool,
    pub outcomes: BTreeMap<&'static str, i64>,
    pub in_flight: u32,
    pub recent_failures: usize,
    pub circuit_open: bool,
}

/// Counters plus live budget state for every configured engine, in configuration order.
pub async fn collect(
    cache: &dyn CacheStore,
    registry: &EngineRegistry,
    budgeter: &Budgeter,
) -> Vec<EngineStats> {
    let snapshots: BTreeMap<EngineId, BudgetSnapshot> = budgeter
        .snapshot()
        .into_iter()
        .map(|s| (s.engine.clone(), s))
        .collect();

    let mut out = Vec::with_capacity(registry.len());
    for entry in registry.iter() {
        let id = &entry.settings.id;
        let mut outcomes = BTreeMap::new();
        for label in OUTCOME_LABELS {
            let value = match cache.counter(&stat_key(id, label)).await {
                Ok(v) => v,
                Err(err) => {
                    tracing::warn!(engine = %id, label, error = %err, "stats.read.failed");
                    0
                }
            };
            outcomes.insert(label, value);
        }
        let snap = snapshots.get(id);
        out.push(EngineStats {
            engine: id.clone(),
            enabled: entry.settings.enabled,
            outcomes,
            in_flight: snap.map(|s| s.in_flight).unwrap_or(0),
            recent_failures: snap.map(|s| s.recent_failures).unwrap_or(0),
            circuit_open: snap.is_some_and(|s| s.circuit_open),
        });
    }
    out
}
