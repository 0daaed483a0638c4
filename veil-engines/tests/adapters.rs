use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use veil_common::{Category, EngineId};
use veil_config::{BraveConfig, JsonApiConfig};
use veil_engines::{BraveEngine, Engine, EngineRequest, JsonApiEngine};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(category: Category) -> EngineRequest {
    EngineRequest {
        text: "docker".into(),
        category,
        language: Some("en".into()),
        page: 2,
        timeout: Duration::from_secs(2),
    }
}

fn brave_config(endpoint: String) -> BraveConfig {
    BraveConfig {
        api_key: "brave-key".into(),
        endpoint,
        safesearch: Some("strict".into()),
        count: Some(5),
    }
}

fn json_config(endpoint: String) -> JsonApiConfig {
    JsonApiConfig {
        endpoint,
        query_param: "q".into(),
        page_param: Some("pageno".into()),
        language_param: Some("language".into()),
        category_param: Some("categories".into()),
        static_params: BTreeMap::from([("format".to_string(), "json".to_string())]),
        results_field: "results".into(),
        title_field: "title".into(),
        url_field: "url".into(),
        content_field: "content".into(),
        published_field: Some("publishedDate".into()),
        score_field: None,
        suggestions_field: Some("suggestions".into()),
        api_key: None,
        api_key_header: None,
    }
}

#[tokio::test]
async fn brave_web_search_maps_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/res/v1/web/search"))
        .and(query_param("q", "docker"))
        .and(query_param("count", "5"))
        .and(query_param("offset", "1"))
        .and(query_param("search_lang", "en"))
        .and(query_param("safesearch", "strict"))
        .and(header("x-subscription-token", "brave-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "search",
            "query": {"original": "docker", "altered": "docker desktop"},
            "web": {"results": [
                {"title": "<strong>Docker</strong>", "url": "https://www.docker.com/", "description": "Build <strong>containers</strong>"},
                {"title": "Docker Hub", "url": "https://hub.docker.com/", "page_age": "2024-02-01T08:00:00"}
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let engine = BraveEngine::new(EngineId::from("brave"), &brave_config(server.uri())).unwrap();
    let payload = engine.issue(&request(Category::General)).await.unwrap();

    assert_eq!(engine.id().as_str(), "brave");
    assert_eq!(payload.hits.len(), 2);
    assert_eq!(payload.hits[0].title, "Docker");
    assert_eq!(payload.hits[0].content, "Build containers");
    assert!(payload.hits[1].published_date.is_some());
    assert_eq!(payload.suggestions, vec!["docker desktop".to_string()]);
}

#[tokio::test]
async fn brave_news_uses_news_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/res/v1/news/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "news",
            "results": [{"title": "Release", "url": "https://news.example/1"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let engine = BraveEngine::new(EngineId::from("brave"), &brave_config(server.uri())).unwrap();
    let payload = engine.issue(&request(Category::News)).await.unwrap();
    assert_eq!(payload.hits.len(), 1);
}

#[tokio::test]
async fn brave_auth_failure_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "bad token"})))
        .mount(&server)
        .await;

    let engine = BraveEngine::new(EngineId::from("brave"), &brave_config(server.uri())).unwrap();
    let err = engine.issue(&request(Category::General)).await.unwrap_err();
    assert!(!err.is_timeout());
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn json_adapter_speaks_searxng() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "docker"))
        .and(query_param("format", "json"))
        .and(query_param("pageno", "2"))
        .and(query_param("language", "en"))
        .and(query_param("categories", "it"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "query": "docker",
            "results": [
                {"title": "Docker docs", "url": "https://docs.docker.com", "content": "Docs",
                 "publishedDate": "2023-11-05T10:00:00Z"}
            ],
            "suggestions": ["docker run"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let engine = JsonApiEngine::new(
        EngineId::from("searx"),
        json_config(format!("{}/search", server.uri())),
    )
    .unwrap();
    let payload = engine.issue(&request(Category::It)).await.unwrap();

    assert_eq!(payload.hits.len(), 1);
    assert_eq!(payload.hits[0].url, "https://docs.docker.com");
    assert!(payload.hits[0].published_date.is_some());
    assert_eq!(payload.suggestions, vec!["docker run".to_string()]);
}

#[tokio::test]
async fn json_adapter_sends_configured_key_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("x-api-key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .expect(1)
        .mount(&server)
        .await;

    let mut cfg = json_config(format!("{}/api", server.uri()));
    cfg.api_key = Some("secret".into());
    cfg.api_key_header = Some("x-api-key".into());
    let engine = JsonApiEngine::new(EngineId::from("private"), cfg).unwrap();

    let payload = engine.issue(&request(Category::General)).await.unwrap();
    assert!(payload.hits.is_empty());
}

#[tokio::test]
async fn json_adapter_reports_timeouts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"results": []}))
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;

    let engine = JsonApiEngine::new(
        EngineId::from("slow"),
        json_config(format!("{}/search", server.uri())),
    )
    .unwrap();
    let mut req = request(Category::General);
    req.timeout = Duration::from_millis(50);
    let err = engine.issue(&req).await.unwrap_err();
    assert!(err.is_timeout(), "got {err:?}");
}
