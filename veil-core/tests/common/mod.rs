#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use veil_common::observability::{LogConfig, LogFormat};
use veil_common::{Category, EngineId, EnginePayload, RawHit};
use veil_core::{
    Aggregator, AggregatorSettings, CacheError, CacheStore, EngineRegistry, EngineSettings,
    MemoryCache,
};
use veil_engines::{Engine, EngineError, EngineRequest};

static INIT_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let config = LogConfig {
            app_name: "veil-tests",
            emit_stderr: true,
            format: if std::env::var("VEIL_LOG_FORMAT")
                .map(|raw| raw.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(false)
            {
                LogFormat::Json
            } else {
                LogFormat::Text
            },
            default_filter: "debug".into(),
            log_dir: Some(std::env::temp_dir().join("veil-tests")),
        };

        veil_common::observability::init_logging(config).unwrap_or_default()
    });
}

#[derive(Clone)]
pub enum Script {
    Hits(Vec<RawHit>),
    HitsWithSuggestions(Vec<RawHit>, Vec<String>),
    Fail(String),
}

/// Engine double that answers from a script after a fixed delay.
pub struct ScriptedEngine {
    id: EngineId,
    delay: Duration,
    script: Script,
    calls: AtomicUsize,
    current: AtomicUsize,
    peak: AtomicUsize,
    last_request: Mutex<Option<EngineRequest>>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedEngine {
    pub fn new(id: &str, delay: Duration, script: Script) -> Arc<Self> {
        Arc::new(Self {
            id: EngineId::from(id),
            delay,
            script,
            calls: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    pub fn hits(id: &str, delay: Duration, urls: &[&str]) -> Arc<Self> {
        let hits = urls
            .iter()
            .map(|u| RawHit::new(format!("{id} {u}"), *u).with_content(format!("from {id}")))
            .collect();
        Self::new(id, delay, Script::Hits(hits))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<EngineRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    fn id(&self) -> &EngineId {
        &self.id
    }

    async fn issue(&self, request: &EngineRequest) -> Result<EnginePayload, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());

        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.current);

        tokio::time::sleep(self.delay).await;
        match &self.script {
            Script::Hits(hits) => Ok(EnginePayload {
                hits: hits.clone(),
                suggestions: vec![],
            }),
            Script::HitsWithSuggestions(hits, suggestions) => Ok(EnginePayload {
                hits: hits.clone(),
                suggestions: suggestions.clone(),
            }),
            Script::Fail(msg) => Err(EngineError::Payload(msg.clone())),
        }
    }
}

pub fn settings(id: &str, timeout_ms: u64) -> EngineSettings {
    let mut s = EngineSettings::new(id);
    s.timeout = Duration::from_millis(timeout_ms);
    s
}

pub fn aggregator(
    engines: Vec<(EngineSettings, Arc<ScriptedEngine>)>,
    settings: AggregatorSettings,
) -> Aggregator {
    aggregator_with_cache(engines, settings, Arc::new(MemoryCache::new()))
}

pub fn aggregator_with_cache(
    engines: Vec<(EngineSettings, Arc<ScriptedEngine>)>,
    settings: AggregatorSettings,
    cache: Arc<dyn CacheStore>,
) -> Aggregator {
    let mut registry = EngineRegistry::new();
    for (s, engine) in engines {
        registry.register(s, engine).expect("unique engine ids");
    }
    Aggregator::new(registry, cache, settings)
}

/// Cache double whose operations can be switched to fail, or to return
/// bytes that do not decode.
#[derive(Default)]
pub struct FlakyCache {
    inner: MemoryCache,
    pub fail_get: AtomicBool,
    pub fail_set: AtomicBool,
    pub fail_counters: AtomicBool,
    pub garbage: AtomicBool,
    pub sets: AtomicUsize,
}

impl FlakyCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn down(flag: &AtomicBool) -> Result<(), CacheError> {
        if flag.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for FlakyCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Self::down(&self.fail_get)?;
        if self.garbage.load(Ordering::SeqCst) {
            return Ok(Some(b"{not json".to_vec()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        Self::down(&self.fail_set)?;
        self.inner.set(key, value, ttl).await
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        Self::down(&self.fail_counters)?;
        self.inner.incr(key, by).await
    }

    async fn decr(&self, key: &str, by: i64) -> Result<i64, CacheError> {
        Self::down(&self.fail_counters)?;
        self.inner.decr(key, by).await
    }

    async fn counter(&self, key: &str) -> Result<i64, CacheError> {
        Self::down(&self.fail_counters)?;
        self.inner.counter(key).await
    }
}

pub fn general() -> Vec<Category> {
    vec![Category::General]
}
