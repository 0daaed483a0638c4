//! Generic adapter for JSON search APIs.
//!
//! Parameter names and result field paths come from configuration, so one
//! adapter covers SearXNG instances (`format=json`) and most simple
//! self-hosted search APIs. Field paths may be dotted (`web.results`).

use crate::{parse_published, Engine, EngineError, EngineRequest};
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use serde_json::Value;
use std::borrow::Cow;
use std::time::Instant;
use veil_common::{EngineId, EnginePayload, RawHit};
use veil_config::JsonApiConfig;
use veil_http::{Auth, HttpClient, RequestOpts};

pub struct JsonApiEngine {
    id: EngineId,
    http: HttpClient,
    endpoint: String,
    config: JsonApiConfig,
    key_header: Option<(HeaderName, HeaderValue)>,
}

impl JsonApiEngine {
    pub fn new(id: EngineId, config: JsonApiConfig) -> Result<Self, EngineError> {
        let http = HttpClient::new(&config.endpoint)?.with_retries(0);
        let key_header = match (&config.api_key, &config.api_key_header) {
            (Some(key), Some(header)) => {
                let name = HeaderName::from_bytes(header.trim().as_bytes())
                    .map_err(|e| EngineError::Config(format!("invalid api_key_header: {e}")))?;
                let value = HeaderValue::from_str(key.trim())
                    .map_err(|e| EngineError::Config(format!("invalid api_key: {e}")))?;
                Some((name, value))
            }
            _ => None,
        };
        Ok(Self {
            id,
            http,
            endpoint: config.endpoint.clone(),
            config,
            key_header,
        })
    }

    fn auth(&self) -> Option<Auth<'_>> {
        if let Some((name, value)) = &self.key_header {
            return Some(Auth::Header {
                name: name.clone(),
                value: value.clone(),
            });
        }
        self.config.api_key.as_deref().map(Auth::Bearer)
    }

    fn params<'a>(&'a self, request: &'a EngineRequest) -> Vec<(&'a str, Cow<'a, str>)> {
        let cfg = &self.config;
        let mut params: Vec<(&str, Cow<'_, str>)> = cfg
            .static_params
            .iter()
            .map(|(k, v)| (k.as_str(), Cow::Borrowed(v.as_str())))
            .collect();
        params.push((cfg.query_param.as_str(), Cow::Borrowed(request.text.as_str())));
        if let Some(name) = &cfg.page_param {
            params.push((name.as_str(), request.page.to_string().into()));
        }
        if let (Some(name), Some(lang)) = (&cfg.language_param, &request.language) {
            params.push((name.as_str(), Cow::Borrowed(lang.as_str())));
        }
        if let Some(name) = &cfg.category_param {
            params.push((name.as_str(), Cow::Borrowed(request.category.as_str())));
        }
        params
    }

    fn extract(&self, body: &Value) -> Result<EnginePayload, EngineError> {
        let cfg = &self.config;
        let items = lookup(body, &cfg.results_field)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                EngineError::Payload(format!("missing results array `{}`", cfg.results_field))
            })?;

        let mut hits: Vec<RawHit> = items
            .iter()
            .map(|item| RawHit {
                title: string_at(item, &cfg.title_field).unwrap_or_default(),
                url: string_at(item, &cfg.url_field).unwrap_or_default(),
                content: string_at(item, &cfg.content_field).unwrap_or_default(),
                published_date: cfg
                    .published_field
                    .as_deref()
                    .and_then(|f| string_at(item, f))
                    .and_then(|s| parse_published(&s)),
                confidence: cfg
                    .score_field
                    .as_deref()
                    .and_then(|f| lookup(item, f))
                    .and_then(Value::as_f64),
            })
            .collect();
        rescale_scores(&mut hits);

        let suggestions = cfg
            .suggestions_field
            .as_deref()
            .and_then(|f| lookup(body, f))
            .and_then(Value::as_array)
            .map(|xs| {
                xs.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(EnginePayload { hits, suggestions })
    }
}

/// A response whose best score exceeds 1 is divided by that score. Scores
/// already within `[0, 1]` are left alone.
fn rescale_scores(hits: &mut [RawHit]) {
    let max = hits
        .iter()
        .filter_map(|h| h.confidence)
        .filter(|c| c.is_finite())
        .fold(0.0_f64, f64::max);
    if max <= 1.0 {
        return;
    }
    for confidence in hits.iter_mut().filter_map(|h| h.confidence.as_mut()) {
        *confidence /= max;
    }
}

/// Follow a dotted path through nested objects.
fn lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .filter(|seg| !seg.is_empty())
        .try_fold(value, |cur, seg| cur.get(seg))
}

fn string_at(value: &Value, path: &str) -> Option<String> {
    match lookup(value, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl Engine for JsonApiEngine {
    fn id(&self) -> &EngineId {
        &self.id
    }

    async fn issue(&self, request: &EngineRequest) -> Result<EnginePayload, EngineError> {
        let started = Instant::now();
        let body: Value = self
            .http
            .get_json(
                &self.endpoint,
                RequestOpts {
                    auth: self.auth(),
                    query: Some(self.params(request)),
                    timeout: Some(request.timeout),
                    retries: Some(0),
                    allow_absolute: true,
                    ..Default::default()
                },
            )
            .await?;

        let payload = self.extract(&body)?;
        tracing::debug!(
            target: "engine.json",
            engine = %self.id,
            category = %request.category,
            hit_count = payload.hits.len(),
            suggestion_count = payload.suggestions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "json.search.done"
        );
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(yaml_like: Value) -> JsonApiConfig {
        serde_json::from_value(yaml_like).unwrap()
    }

    #[test]
    fn lookup_follows_dotted_paths() {
        let v = json!({"web": {"results": [1, 2]}});
        assert_eq!(lookup(&v, "web.results"), Some(&json!([1, 2])));
        assert_eq!(lookup(&v, "web.missing"), None);
    }

    #[test]
    fn extracts_searxng_shape() {
        let engine = JsonApiEngine::new(
            EngineId::from("searx"),
            config(json!({
                "endpoint": "https://searx.example.org/search",
                "published_field": "publishedDate",
                "score_field": "score",
                "suggestions_field": "suggestions"
            })),
        )
        .unwrap();

        let payload = engine
            .extract(&json!({
                "query": "docker",
                "results": [
                    {"title": "Docker", "url": "https://docker.com", "content": "c", "score": 0.7,
                     "publishedDate": "2024-05-01T00:00:00"},
                    {"title": "No url"}
                ],
                "suggestions": ["docker compose", 3]
            }))
            .unwrap();

        assert_eq!(payload.hits.len(), 2);
        assert_eq!(payload.hits[0].confidence, Some(0.7));
        assert!(payload.hits[0].published_date.is_some());
        assert_eq!(payload.hits[1].url, "");
        assert_eq!(payload.suggestions, vec!["docker compose".to_string()]);
    }

    #[test]
    fn unbounded_scores_are_scaled_by_the_best_hit() {
        let engine = JsonApiEngine::new(
            EngineId::from("searx"),
            config(json!({
                "endpoint": "https://searx.example.org/search",
                "score_field": "score"
            })),
        )
        .unwrap();

        let payload = engine
            .extract(&json!({
                "results": [
                    {"title": "a", "url": "https://a.example/", "score": 4.0},
                    {"title": "b", "url": "https://b.example/", "score": 2.0},
                    {"title": "c", "url": "https://c.example/", "score": 1.0},
                    {"title": "d", "url": "https://d.example/"}
                ]
            }))
            .unwrap();

        let scores: Vec<Option<f64>> = payload.hits.iter().map(|h| h.confidence).collect();
        assert_eq!(scores, vec![Some(1.0), Some(0.5), Some(0.25), None]);
    }

    #[test]
    fn missing_results_field_is_a_payload_error() {
        let engine = JsonApiEngine::new(
            EngineId::from("x"),
            config(json!({"endpoint": "https://x.example/api", "results_field": "items"})),
        )
        .unwrap();
        let err = engine.extract(&json!({"results": []})).unwrap_err();
        assert!(matches!(err, EngineError::Payload(_)));
    }

    #[test]
    fn header_key_requires_valid_header_name() {
        let res = JsonApiEngine::new(
            EngineId::from("x"),
            config(json!({
                "endpoint": "https://x.example/api",
                "api_key": "k",
                "api_key_header": "bad header"
            })),
        );
        assert!(matches!(res, Err(EngineError::Config(_))));
    }
}
