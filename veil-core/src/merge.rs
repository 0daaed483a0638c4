//! Cross-engine deduplication, scoring and ordering.
//!
//! Groups are processed in configuration order, never completion order, so
//! the same inputs always produce the same ranked list.

use crate::urlkey::identity_key;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use veil_common::{EngineId, ResultRecord};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergePolicy {
    /// Extra weight per additional engine agreeing on a result.
    pub agreement_boost: f64,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            agreement_boost: 0.1,
        }
    }
}

/// Normalized output of one engine for one request.
#[derive(Debug, Clone)]
pub struct EngineGroup {
    pub engine: EngineId,
    /// Position of the engine in configuration order.
    pub order: usize,
    pub weight: f64,
    /// Records in the engine's own ranking order.
    pub records: Vec<ResultRecord>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Merged {
    pub results: Vec<ResultRecord>,
    pub suggestions: Vec<String>,
}

struct Bucket {
    key: String,
    /// Primary contribution: earliest engine in config order, then earliest position.
    primary: ResultRecord,
    primary_order: usize,
    content: String,
    published_date: Option<DateTime<Utc>>,
    /// Best weighted score per engine.
    engine_scores: BTreeMap<EngineId, f64>,
}

pub fn merge(mut groups: Vec<EngineGroup>, policy: &MergePolicy) -> Merged {
    groups.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.engine.cmp(&b.engine)));

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<Bucket> = Vec::new();

    for group in &groups {
        for record in &group.records {
            let key = identity_key(&record.url).unwrap_or_else(|| record.url.clone());
            let weighted = group.weight * record.score;

            let slot = match index.get(&key) {
                Some(&i) => i,
                None => {
                    index.insert(key.clone(), buckets.len());
                    buckets.push(Bucket {
                        key,
                        primary: record.clone(),
                        primary_order: group.order,
                        content: String::new(),
                        published_date: None,
                        engine_scores: BTreeMap::new(),
                    });
                    buckets.len() - 1
                }
            };
            let bucket = &mut buckets[slot];

            if record.content.chars().count() > bucket.content.chars().count() {
                bucket.content = record.content.clone();
            }
            if bucket.published_date.is_none() {
                bucket.published_date = record.published_date;
            }
            bucket
                .engine_scores
                .entry(group.engine.clone())
                .and_modify(|best| {
                    if weighted.total_cmp(best) == Ordering::Greater {
                        *best = weighted;
                    }
                })
                .or_insert(weighted);
        }
    }

    let mut scored: Vec<(f64, Bucket)> = buckets
        .into_iter()
        .map(|b| (combined_score(&b.engine_scores, policy), b))
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| {
        sb.total_cmp(sa)
            .then_with(|| a.primary_order.cmp(&b.primary_order))
            .then_with(|| a.primary.url.cmp(&b.primary.url))
            .then_with(|| a.key.cmp(&b.key))
    });

    let results = scored
        .into_iter()
        .map(|(score, b)| ResultRecord {
            content: b.content,
            published_date: b.published_date,
            score,
            ..b.primary
        })
        .collect();

    Merged {
        results,
        suggestions: merge_suggestions(&groups),
    }
}

fn combined_score(engine_scores: &BTreeMap<EngineId, f64>, policy: &MergePolicy) -> f64 {
    let n = engine_scores.len();
    let sum: f64 = engine_scores.values().sum();
    let boost = 1.0 + policy.agreement_boost * n.saturating_sub(1) as f64;
    (sum * boost).max(0.0)
}

/// Union of suggestions, deduplicated case-insensitively and ranked by how
/// many engines proposed them, then by first appearance.
fn merge_suggestions(groups: &[EngineGroup]) -> Vec<String> {
    struct Seen {
        spelling: String,
        engines: usize,
        first: usize,
    }

    let mut seen: HashMap<String, Seen> = HashMap::new();
    let mut counter = 0usize;

    for group in groups {
        let mut this_engine: Vec<String> = Vec::new();
        for raw in &group.suggestions {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            let norm = trimmed.to_lowercase();
            if this_engine.contains(&norm) {
                continue;
            }
            this_engine.push(norm.clone());

            seen.entry(norm)
                .and_modify(|s| s.engines += 1)
                .or_insert_with(|| {
                    counter += 1;
                    Seen {
                        spelling: trimmed.to_string(),
                        engines: 1,
                        first: counter,
                    }
                });
        }
    }

    let mut out: Vec<Seen> = seen.into_values().collect();
    out.sort_by(|a, b| b.engines.cmp(&a.engines).then_with(|| a.first.cmp(&b.first)));
    out.into_iter().map(|s| s.spelling).collect()
}
