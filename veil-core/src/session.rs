//! Per-request orchestration.
//!
//! ```text
//! Init -> CacheCheck -> CacheHit -> Done
//!                    -> CacheMiss -> Dispatching -> Merging -> CacheStore -> Done
//! ```

use crate::budget::{Admission, Budgeter, Outcome, Permit};
use crate::cache::{CacheError, CacheStore};
use crate::dispatch::{DispatchTarget, Dispatcher};
use crate::merge::{merge, EngineGroup, MergePolicy};
use crate::normalize::normalize;
use crate::registry::{EngineRegistry, RegisteredEngine};
use crate::stats::{self, EngineStats};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;
use veil_common::{
    AggregationResult, Category, EngineId, Query, RawEngineResponse, SearchRequest,
    UnresponsiveEngine, UnresponsiveReason, ValidationError,
};
use veil_engines::EngineRequest;

const CACHE_PREFIX: &str = "veil:search:";

/// Cache key of a validated query: prefix + hex BLAKE3 of its canonical form.
pub fn cache_key(query: &Query) -> String {
    let digest = blake3::hash(query.canonical_form().as_bytes());
    format!("{CACHE_PREFIX}{}", hex::encode(digest.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub default_categories: Vec<Category>,
    pub merge: MergePolicy,
    /// `None` disables result caching; counters are still kept.
    pub cache_ttl: Option<Duration>,
    pub global_concurrency: usize,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            default_categories: vec![Category::General],
            merge: MergePolicy::default(),
            cache_ttl: Some(Duration::from_secs(300)),
            global_concurrency: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Init,
    CacheCheck,
    CacheHit,
    CacheMiss,
    Dispatching,
    Merging,
    CacheStore,
    Done,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Init => "init",
            SessionState::CacheCheck => "cache_check",
            SessionState::CacheHit => "cache_hit",
            SessionState::CacheMiss => "cache_miss",
            SessionState::Dispatching => "dispatching",
            SessionState::Merging => "merging",
            SessionState::CacheStore => "cache_store",
            SessionState::Done => "done",
        };
        f.write_str(s)
    }
}

struct Session {
    id: Uuid,
    state: SessionState,
    started: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Init,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: SessionState) {
        tracing::trace!(session = %self.id, from = %self.state, to = %next, "session.state");
        self.state = next;
    }
}

/// One engine chosen for this request and the category it is asked for.
struct Selected<'r> {
    entry: &'r RegisteredEngine,
    category: Category,
}

/// Entry point of the aggregation engine. Cheap to share behind an `Arc`.
pub struct Aggregator {
    registry: Arc<EngineRegistry>,
    budgeter: Budgeter,
    dispatcher: Dispatcher,
    cache: Arc<dyn CacheStore>,
    settings: AggregatorSettings,
}

impl Aggregator {
    pub fn new(
        registry: EngineRegistry,
        cache: Arc<dyn CacheStore>,
        settings: AggregatorSettings,
    ) -> Self {
        let budgeter = Budgeter::new();
        for entry in registry.iter() {
            budgeter.configure(entry.settings.id.clone(), entry.settings.policy.clone());
        }
        Self {
            registry: Arc::new(registry),
            budgeter,
            dispatcher: Dispatcher::new(settings.global_concurrency),
            cache,
            settings,
        }
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn budgeter(&self) -> &Budgeter {
        &self.budgeter
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub async fn stats(&self) -> Vec<EngineStats> {
        stats::collect(self.cache.as_ref(), &self.registry, &self.budgeter).await
    }

    /// Validate, consult the cache, fan out, merge and cache one request.
    ///
    /// Only validation fails the call; engine failures of any kind end up in
    /// `unresponsive_engines`.
    pub async fn search(&self, request: SearchRequest) -> Result<AggregationResult, ValidationError> {
        let mut session = Session::new();

        let query = request.into_query(&self.settings.default_categories)?;
        if let Some(named) = query.engines() {
            if let Some(unknown) = named.iter().find(|id| !self.registry.contains(id)) {
                return Err(ValidationError::UnknownEngine(unknown.to_string()));
            }
        }
        let (selected, skipped) = self.select(&query);

        session.advance(SessionState::CacheCheck);
        let key = cache_key(&query);
        if let Some(hit) = self.lookup(&key).await {
            session.advance(SessionState::CacheHit);
            tracing::debug!(session = %session.id, "session.cache.hit");
            session.advance(SessionState::Done);
            return Ok(hit);
        }
        session.advance(SessionState::CacheMiss);

        session.advance(SessionState::Dispatching);
        let mut unresponsive: Vec<UnresponsiveEngine> = skipped
            .into_iter()
            .map(|engine| UnresponsiveEngine {
                engine,
                reason: UnresponsiveReason::Skipped,
            })
            .collect();
        let mut permits: BTreeMap<EngineId, Permit> = BTreeMap::new();
        let mut targets = Vec::new();
        let mut admitted: Vec<&Selected<'_>> = Vec::new();

        for sel in &selected {
            let id = &sel.entry.settings.id;
            match self.budgeter.admit(id) {
                Admission::Admitted(permit) => {
                    permits.insert(id.clone(), permit);
                    targets.push(DispatchTarget {
                        id: id.clone(),
                        engine: sel.entry.adapter.clone(),
                        request: EngineRequest {
                            text: query.text().to_string(),
                            category: sel.category,
                            language: query.language().map(str::to_string),
                            page: query.page(),
                            timeout: sel.entry.settings.timeout,
                        },
                    });
                    admitted.push(sel);
                }
                other => {
                    let reason = other
                        .unresponsive_reason()
                        .unwrap_or(UnresponsiveReason::RateLimited);
                    tracing::debug!(engine = %id, %reason, "session.engine.not_admitted");
                    unresponsive.push(UnresponsiveEngine {
                        engine: id.clone(),
                        reason,
                    });
                }
            }
        }

        let responses = if targets.is_empty() {
            BTreeMap::new()
        } else {
            let longest = admitted
                .iter()
                .map(|s| s.entry.settings.timeout)
                .max()
                .unwrap_or_default();
            self.dispatcher
                .dispatch(targets, Instant::now() + longest)
                .await
        };

        session.advance(SessionState::Merging);
        let mut groups = Vec::with_capacity(admitted.len());
        for sel in admitted {
            let settings = &sel.entry.settings;
            let response = responses
                .get(&settings.id)
                .cloned()
                .unwrap_or(RawEngineResponse::Timeout);

            let outcome = match &response {
                RawEngineResponse::Ok(_) => Outcome::Success,
                RawEngineResponse::Timeout => Outcome::Timeout,
                RawEngineResponse::Error(_) | RawEngineResponse::Skipped(_) => Outcome::Error,
            };
            if let Some(permit) = permits.remove(&settings.id) {
                self.budgeter.release(permit, outcome);
            }

            match response.unresponsive_reason() {
                Some(reason) => unresponsive.push(UnresponsiveEngine {
                    engine: settings.id.clone(),
                    reason,
                }),
                None => {
                    let suggestions = match &response {
                        RawEngineResponse::Ok(payload) => payload.suggestions.clone(),
                        _ => Vec::new(),
                    };
                    groups.push(EngineGroup {
                        engine: settings.id.clone(),
                        order: sel.entry.order,
                        weight: settings.weight,
                        records: normalize(&settings.id, sel.category, &response),
                        suggestions,
                    });
                }
            }
        }

        let answered = groups.len();
        let merged = merge(groups, &self.settings.merge);
        unresponsive.sort_by(|a, b| a.engine.cmp(&b.engine));

        self.record_outcomes(&selected, &unresponsive).await;

        let result = AggregationResult {
            query: query.text().to_string(),
            results: merged.results,
            suggestions: merged.suggestions,
            unresponsive_engines: unresponsive,
        };

        session.advance(SessionState::CacheStore);
        if answered == 0 && !selected.is_empty() {
            // no engine answered
            tracing::debug!(session = %session.id, "session.cache.skip_unanswered");
        } else {
            self.store(&key, &result).await;
        }

        session.advance(SessionState::Done);
        tracing::info!(
            session = %session.id,
            engines = selected.len(),
            results = result.results.len(),
            unresponsive = result.unresponsive_engines.len(),
            elapsed_ms = session.started.elapsed().as_millis() as u64,
            "session.done"
        );
        Ok(result)
    }

    /// Explicitly named engines (config order), otherwise every enabled engine
    /// serving one of the requested categories. Named but disabled engines are
    /// returned separately so they can be reported as skipped.
    fn select(&self, query: &Query) -> (Vec<Selected<'_>>, Vec<EngineId>) {
        let mut selected = Vec::new();
        let mut skipped = Vec::new();

        for entry in self.registry.iter() {
            let settings = &entry.settings;
            let requested = query.categories().iter().copied().find(|c| settings.supports(*c));

            match query.engines() {
                Some(named) => {
                    if !named.contains(&settings.id) {
                        continue;
                    }
                    if !settings.enabled {
                        skipped.push(settings.id.clone());
                        continue;
                    }
                    let category = requested
                        .or_else(|| settings.categories.first().copied())
                        .unwrap_or(Category::General);
                    selected.push(Selected { entry, category });
                }
                None => {
                    if let (true, Some(category)) = (settings.enabled, requested) {
                        selected.push(Selected { entry, category });
                    }
                }
            }
        }
        (selected, skipped)
    }

    async fn lookup(&self, key: &str) -> Option<AggregationResult> {
        let bytes = match self.cache.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(error = %err, "session.cache.get_failed");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(result) => Some(result),
            Err(err) => {
                tracing::warn!(error = %CacheError::from(err), "session.cache.decode_failed");
                None
            }
        }
    }

    async fn store(&self, key: &str, result: &AggregationResult) {
        let Some(ttl) = self.settings.cache_ttl else {
            return;
        };
        let stored = match serde_json::to_vec(result) {
            Ok(bytes) => self.cache.set(key, bytes, ttl).await,
            Err(err) => Err(CacheError::from(err)),
        };
        if let Err(err) = stored {
            tracing::warn!(error = %err, "session.cache.set_failed");
        }
    }

    async fn record_outcomes(&self, selected: &[Selected<'_>], unresponsive: &[UnresponsiveEngine]) {
        let reasons: BTreeMap<&EngineId, UnresponsiveReason> =
            unresponsive.iter().map(|u| (&u.engine, u.reason)).collect();
        for sel in selected {
            let id = &sel.entry.settings.id;
            let label = stats::outcome_label(reasons.get(id).copied());
            stats::record_outcome(self.cache.as_ref(), id, label).await;
        }
        for u in unresponsive.iter().filter(|u| u.reason == UnresponsiveReason::Skipped) {
            let label = stats::outcome_label(Some(u.reason));
            stats::record_outcome(self.cache.as_ref(), &u.engine, label).await;
        }
    }
}
