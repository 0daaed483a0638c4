use crate::{Category, EngineId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One hit as reported by an engine adapter, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,
    /// Adapter-supplied relevance in `[0, 1]`; overrides position decay.
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl RawHit {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_published_date(mut self, date: DateTime<Utc>) -> Self {
        self.published_date = Some(date);
        self
    }
}

/// Everything an adapter extracted from one successful upstream call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnginePayload {
    pub hits: Vec<RawHit>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Outcome of invoking a single engine for a single request.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEngineResponse {
    Ok(EnginePayload),
    Timeout,
    Error(String),
    Skipped(String),
}

impl RawEngineResponse {
    /// Why the engine counts as unresponsive, or `None` when it answered.
    pub fn unresponsive_reason(&self) -> Option<UnresponsiveReason> {
        match self {
            RawEngineResponse::Ok(_) => None,
            RawEngineResponse::Timeout => Some(UnresponsiveReason::Timeout),
            RawEngineResponse::Error(_) => Some(UnresponsiveReason::Error),
            RawEngineResponse::Skipped(_) => Some(UnresponsiveReason::Skipped),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, RawEngineResponse::Ok(_))
    }
}

/// Canonical search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub title: String,
    pub url: String,
    pub content: String,
    pub engine: EngineId,
    pub score: f64,
    pub category: Category,
    #[serde(rename = "publishedDate", default)]
    pub published_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresponsiveReason {
    Timeout,
    Error,
    RateLimited,
    CircuitOpen,
    Skipped,
}

impl UnresponsiveReason {
    pub fn as_str(self) -> &'static str {
        match self {
            UnresponsiveReason::Timeout => "timeout",
            UnresponsiveReason::Error => "error",
            UnresponsiveReason::RateLimited => "rate_limited",
            UnresponsiveReason::CircuitOpen => "circuit_open",
            UnresponsiveReason::Skipped => "skipped",
        }
    }
}

impl fmt::Display for UnresponsiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresponsiveEngine {
    pub engine: EngineId,
    pub reason: UnresponsiveReason,
}

/// Final answer for one request. Built once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub query: String,
    pub results: Vec<ResultRecord>,
    pub suggestions: Vec<String>,
    pub unresponsive_engines: Vec<UnresponsiveEngine>,
}

impl AggregationResult {
    pub fn unresponsive_ids(&self) -> impl Iterator<Item = &EngineId> {
        self.unresponsive_engines.iter().map(|u| &u.engine)
    }
}
