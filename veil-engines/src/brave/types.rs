use serde::Deserialize;

/// Response of `res/v1/web/search`. Only the fields the adapter reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct WebSearchApiResponse {
    #[serde(default)]
    pub query: Option<QueryInfo>,
    #[serde(default)]
    pub web: Option<Section>,
}

/// Response of the `news`, `images` and `videos` endpoints: a flat result list.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct VerticalApiResponse {
    #[serde(default)]
    pub query: Option<QueryInfo>,
    #[serde(default)]
    pub results: Vec<BraveResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct QueryInfo {
    #[serde(default)]
    pub original: Option<String>,
    /// Spell-corrected query, when Brave altered it.
    #[serde(default)]
    pub altered: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Section {
    #[serde(default)]
    pub results: Vec<BraveResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct BraveResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    /// ISO timestamp of the page, when known.
    #[serde(default)]
    pub page_age: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tolerates_missing_sections() {
        let resp: WebSearchApiResponse =
            serde_json::from_value(json!({"type": "search"})).unwrap();
        assert!(resp.web.is_none());
        assert!(resp.query.is_none());
    }

    #[test]
    fn reads_web_results_and_altered_query() {
        let resp: WebSearchApiResponse = serde_json::from_value(json!({
            "type": "search",
            "query": {"original": "dokcer", "altered": "docker"},
            "web": {"results": [
                {"title": "Docker", "url": "https://docker.com", "description": "x", "page_age": "2024-01-02T00:00:00"}
            ]}
        }))
        .unwrap();
        assert_eq!(resp.query.unwrap().altered.as_deref(), Some("docker"));
        assert_eq!(resp.web.unwrap().results[0].title, "Docker");
    }
}
