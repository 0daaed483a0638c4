use url::Url;
use veil_common::{Category, EngineId, RawEngineResponse, RawHit, ResultRecord};

const SNIPPET_MAX_CHARS: usize = 300;

/// Map one engine's raw response onto canonical records.
///
/// Position `p` (1-based) scores `1 / p` unless the adapter supplied a
/// confidence. Hits without an absolute http(s) URL are dropped but still
/// consume their position. Non-`Ok` responses produce nothing.
pub fn normalize(
    engine: &EngineId,
    category: Category,
    response: &RawEngineResponse,
) -> Vec<ResultRecord> {
    let RawEngineResponse::Ok(payload) = response else {
        return Vec::new();
    };

    payload
        .hits
        .iter()
        .enumerate()
        .filter_map(|(idx, hit)| normalize_hit(engine, category, idx + 1, hit))
        .collect()
}

fn normalize_hit(
    engine: &EngineId,
    category: Category,
    position: usize,
    hit: &RawHit,
) -> Option<ResultRecord> {
    let url = hit.url.trim();
    if !is_web_url(url) {
        tracing::trace!(engine = %engine, position, "normalize.hit.dropped");
        return None;
    }

    let title = collapse(&hit.title);
    Some(ResultRecord {
        title: if title.is_empty() { url.to_string() } else { title },
        url: url.to_string(),
        content: snippet(&hit.content),
        engine: engine.clone(),
        score: score(position, hit.confidence),
        category,
        published_date: hit.published_date,
    })
}

fn is_web_url(raw: &str) -> bool {
    match Url::parse(raw) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

fn score(position: usize, confidence: Option<f64>) -> f64 {
    match confidence {
        Some(c) if !c.is_nan() => c.clamp(0.0, 1.0),
        _ => 1.0 / position as f64,
    }
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn snippet(raw: &str) -> String {
    let text = collapse(raw);
    if text.chars().count() <= SNIPPET_MAX_CHARS {
        return text;
    }
    let mut out: String = text.chars().take(SNIPPET_MAX_CHARS).collect();
    out.truncate(out.trim_end().len());
    out.push('…');
    out
}
