use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::set_header::SetResponseHeaderLayer;
use veil_common::{OutputFormat, SearchRequest, ValidationError};
use veil_core::Aggregator;

use crate::render;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub shutdown: CancellationToken,
}

/// Query string of `GET /search`. Everything arrives as text so that bad
/// values surface as validation errors instead of extractor rejections.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    q: String,
    format: Option<String>,
    categories: Option<String>,
    engines: Option<String>,
    language: Option<String>,
    pageno: Option<String>,
}

impl SearchParams {
    fn into_request(self) -> Result<(SearchRequest, OutputFormat), ValidationError> {
        let format = match self.format.as_deref() {
            Some(raw) if !raw.trim().is_empty() => OutputFormat::from_str(raw)?,
            _ => OutputFormat::Json,
        };
        let page = match self.pageno.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<u32>().map_err(|_| ValidationError::InvalidPage)?),
        };
        let request = SearchRequest {
            text: self.q,
            categories: self.categories.into_iter().collect(),
            engines: self.engines.into_iter().collect(),
            language: self.language.filter(|l| !l.trim().is_empty()),
            page,
        };
        Ok((request, format))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/search", get(search))
        .route("/healthz", get(healthz))
        .route("/stats", get(stats))
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    // query strings carry the search text
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

/// Serve until the shutdown token is cancelled.
pub async fn serve(bind: &str, state: AppState) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(addr = %listener.local_addr()?, "server.listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("server.stopped");
    Ok(())
}

async fn search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Response {
    let (request, format) = match params.into_request() {
        Ok(parsed) => parsed,
        Err(err) => return bad_request(err),
    };

    match state.aggregator.search(request).await {
        Ok(result) => match format {
            OutputFormat::Json => Json(result).into_response(),
            OutputFormat::Html => Html(render::results_page(&result)).into_response(),
        },
        Err(err) => bad_request(err),
    }
}

fn bad_request(err: ValidationError) -> Response {
    tracing::debug!(error = %err, "server.search.rejected");
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": err.to_string() })),
    )
        .into_response()
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    if state.shutdown.is_cancelled() {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting down")
    } else {
        (StatusCode::OK, "ok")
    }
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.aggregator.stats().await)
}
