use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use veil_common::{Category, EngineId};
use veil_config::{EngineDetails, EngineSpec, SearchConfig, VeilConfig};
use veil_core::{
    Aggregator, AggregatorSettings, BudgetPolicy, CacheStore, EngineRegistry, EngineSettings,
    MemoryCache, MergePolicy,
};
use veil_engines::{BraveEngine, Engine, JsonApiEngine};

/// Everything the binary needs after configuration has been read.
pub struct Wired {
    pub aggregator: Arc<Aggregator>,
    pub cache: MemoryCache,
    pub sweep_every: Duration,
}

pub fn build_from_config(cfg: VeilConfig) -> Result<Wired> {
    let mut registry = EngineRegistry::new();
    for spec in cfg.engines {
        let settings = engine_settings(&spec, &cfg.search);
        let id = settings.id.clone();
        let adapter = make_adapter(id.clone(), spec.details)
            .with_context(|| format!("failed to build engine {id}"))?;
        tracing::info!(
            engine = %id,
            enabled = settings.enabled,
            weight = settings.weight,
            timeout_ms = settings.timeout.as_millis() as u64,
            "wiring.engine"
        );
        registry.register(settings, adapter)?;
    }
    if registry.is_empty() {
        tracing::warn!("wiring.no_engines");
    }

    let cache = MemoryCache::new();
    let settings = AggregatorSettings {
        default_categories: cfg.search.default_categories.clone(),
        merge: MergePolicy {
            agreement_boost: cfg.search.agreement_boost,
        },
        cache_ttl: cfg
            .cache
            .enabled
            .then(|| Duration::from_secs(cfg.cache.ttl_secs)),
        global_concurrency: cfg.search.global_concurrency,
    };
    let store: Arc<dyn CacheStore> = Arc::new(cache.clone());
    let aggregator = Arc::new(Aggregator::new(registry, store, settings));

    Ok(Wired {
        aggregator,
        cache,
        sweep_every: Duration::from_secs(cfg.cache.sweep_interval_secs.max(1)),
    })
}

fn engine_settings(spec: &EngineSpec, search: &SearchConfig) -> EngineSettings {
    let defaults = BudgetPolicy::default();
    let policy = BudgetPolicy {
        max_in_flight: spec.max_in_flight.unwrap_or(defaults.max_in_flight),
        min_interval: spec
            .min_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.min_interval),
        failure_threshold: spec.failure_threshold.unwrap_or(defaults.failure_threshold),
        failure_window: spec
            .failure_window_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.failure_window),
        cooldown: spec
            .cooldown_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.cooldown),
    };
    let categories = if spec.categories.is_empty() {
        vec![Category::General]
    } else {
        spec.categories.clone()
    };

    EngineSettings {
        id: EngineId::new(spec.id.clone()),
        categories,
        weight: spec.weight.unwrap_or(1.0),
        timeout: Duration::from_millis(spec.timeout_ms.unwrap_or(search.default_timeout_ms)),
        policy,
        enabled: spec.is_enabled(),
    }
}

fn make_adapter(id: EngineId, details: EngineDetails) -> Result<Arc<dyn Engine>> {
    let adapter: Arc<dyn Engine> = match details {
        EngineDetails::Brave { config } => Arc::new(BraveEngine::new(id, &config)?),
        EngineDetails::Json { config } => Arc::new(JsonApiEngine::new(id, config)?),
    };
    Ok(adapter)
}
