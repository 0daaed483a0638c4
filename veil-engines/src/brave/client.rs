use super::types::{BraveResult, QueryInfo, VerticalApiResponse, WebSearchApiResponse};
use crate::{parse_published, Engine, EngineError, EngineRequest};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderName, HeaderValue};
use std::borrow::Cow;
use std::sync::OnceLock;
use std::time::Instant;
use veil_common::{Category, EngineId, EnginePayload, RawHit};
use veil_config::BraveConfig;
use veil_http::{Auth, HttpClient, HttpError, RequestOpts};

const BRAVE_MAX_COUNT: u32 = 20;
const BRAVE_MAX_OFFSET: u32 = 9;

/// Brave highlights matches with inline markup in descriptions.
fn markup() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?[a-zA-Z][^>]*>").ok())
        .as_ref()
}

fn strip_markup(s: &str) -> String {
    match markup() {
        Some(re) => re.replace_all(s, "").into_owned(),
        None => s.to_string(),
    }
}

fn vertical_path(category: Category) -> &'static str {
    match category {
        Category::News => "res/v1/news/search",
        Category::Images => "res/v1/images/search",
        Category::Videos => "res/v1/videos/search",
        _ => "res/v1/web/search",
    }
}

/// Adapter for the Brave Search API.
pub struct BraveEngine {
    id: EngineId,
    http: HttpClient,
    token: HeaderValue,
    safesearch: Option<String>,
    count: u32,
}

impl BraveEngine {
    pub fn new(id: EngineId, config: &BraveConfig) -> Result<Self, EngineError> {
        let http = HttpClient::new(&config.endpoint)?.with_retries(0);
        let token = HeaderValue::from_str(config.api_key.trim())
            .map_err(|e| EngineError::Config(format!("invalid Brave api key: {e}")))?;
        Ok(Self {
            id,
            http,
            token,
            safesearch: config.safesearch.clone(),
            count: config.count.unwrap_or(BRAVE_MAX_COUNT).clamp(1, BRAVE_MAX_COUNT),
        })
    }

    fn params<'a>(&'a self, request: &'a EngineRequest) -> Vec<(&'a str, Cow<'a, str>)> {
        let mut params: Vec<(&str, Cow<'_, str>)> = Vec::with_capacity(6);
        params.push(("q", Cow::Borrowed(request.text.as_str())));
        params.push(("count", self.count.to_string().into()));
        let offset = request.page.saturating_sub(1).min(BRAVE_MAX_OFFSET);
        if offset > 0 {
            params.push(("offset", offset.to_string().into()));
        }
        if let Some(lang) = &request.language {
            params.push(("search_lang", Cow::Borrowed(lang.as_str())));
        }
        if let Some(safe) = &self.safesearch {
            params.push(("safesearch", Cow::Borrowed(safe.as_str())));
        }
        params
    }

    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        request: &EngineRequest,
    ) -> Result<T, HttpError> {
        self.http
            .get_json(
                vertical_path(request.category),
                RequestOpts {
                    auth: Some(Auth::Header {
                        name: HeaderName::from_static("x-subscription-token"),
                        value: self.token.clone(),
                    }),
                    query: Some(self.params(request)),
                    timeout: Some(request.timeout),
                    retries: Some(0),
                    ..Default::default()
                },
            )
            .await
    }
}

fn to_hit(r: BraveResult) -> RawHit {
    RawHit {
        title: strip_markup(&r.title),
        url: r.url,
        content: r.description.as_deref().map(strip_markup).unwrap_or_default(),
        published_date: r.page_age.as_deref().and_then(parse_published),
        confidence: None,
    }
}

fn suggestions(query: Option<QueryInfo>) -> Vec<String> {
    let Some(q) = query else {
        return Vec::new();
    };
    match (q.altered, q.original) {
        (Some(altered), Some(original)) if altered.trim() != original.trim() => vec![altered],
        (Some(altered), None) => vec![altered],
        _ => Vec::new(),
    }
}

#[async_trait]
impl Engine for BraveEngine {
    fn id(&self) -> &EngineId {
        &self.id
    }

    async fn issue(&self, request: &EngineRequest) -> Result<EnginePayload, EngineError> {
        let started = Instant::now();
        let (results, query) = match request.category {
            Category::News | Category::Images | Category::Videos => {
                let resp: VerticalApiResponse = self.fetch(request).await?;
                (resp.results, resp.query)
            }
            _ => {
                let resp: WebSearchApiResponse = self.fetch(request).await?;
                (resp.web.map(|w| w.results).unwrap_or_default(), resp.query)
            }
        };

        let payload = EnginePayload {
            hits: results.into_iter().map(to_hit).collect(),
            suggestions: suggestions(query),
        };
        tracing::debug!(
            target: "engine.brave",
            engine = %self.id,
            category = %request.category,
            hit_count = payload.hits.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "brave.search.done"
        );
        Ok(payload)
    }
}
