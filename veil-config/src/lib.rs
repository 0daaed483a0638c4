//! Loader for the gateway configuration: YAML file + environment overlays.
//!
//! Sources are merged in the order they are added, with `VEIL__`-prefixed
//! environment variables applied last (`VEIL__SEARCH__GLOBAL_CONCURRENCY=32`
//! overrides `search.global_concurrency`). After merging, every string value
//! is passed through `${VAR}` expansion so secrets can stay out of the file.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use veil_common::observability::LogFormat;
use veil_common::Category;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Deserialize)]
pub struct VeilConfig {
    pub version: Option<String>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engines: Vec<EngineSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8888".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Categories used when a request names none.
    pub default_categories: Vec<Category>,
    /// Ceiling on engine calls in flight across all sessions.
    pub global_concurrency: usize,
    /// Extra weight per additional engine agreeing on a result.
    pub agreement_boost: f64,
    /// Timeout for engines that do not set `timeout_ms`.
    pub default_timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_categories: vec![Category::General],
            global_concurrency: 64,
            agreement_boost: 0.1,
            default_timeout_ms: 3000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub dir: Option<String>,
    pub emit_stderr: bool,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            dir: None,
            emit_stderr: true,
            filter: "info".into(),
        }
    }
}

/// Shared engine fields + the per-kind adapter settings.
#[derive(Debug, Deserialize)]
pub struct EngineSpec {
    pub id: String,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_in_flight: Option<u32>,
    #[serde(default)]
    pub min_interval_ms: Option<u64>,
    #[serde(default)]
    pub failure_threshold: Option<u32>,
    #[serde(default)]
    pub failure_window_secs: Option<u64>,
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
    #[serde(flatten)]
    pub details: EngineDetails,
}

impl EngineSpec {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// The tag is `kind`; the payload lives in `config`.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind")]
pub enum EngineDetails {
    #[serde(rename = "brave")]
    Brave { config: BraveConfig },

    #[serde(rename = "json")]
    Json { config: JsonApiConfig },
}

#[derive(Debug, Deserialize)]
pub struct BraveConfig {
    pub api_key: String,
    #[serde(default = "default_brave_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub safesearch: Option<String>,
    #[serde(default)]
    pub count: Option<u32>,
}

/// Generic JSON search API. Field names default to the SearXNG `format=json` shape.
#[derive(Debug, Deserialize)]
pub struct JsonApiConfig {
    pub endpoint: String,
    #[serde(default = "default_query_param")]
    pub query_param: String,
    #[serde(default)]
    pub page_param: Option<String>,
    #[serde(default)]
    pub language_param: Option<String>,
    #[serde(default)]
    pub category_param: Option<String>,
    #[serde(default)]
    pub static_params: BTreeMap<String, String>,
    #[serde(default = "default_results_field")]
    pub results_field: String,
    #[serde(default = "default_title_field")]
    pub title_field: String,
    #[serde(default = "default_url_field")]
    pub url_field: String,
    #[serde(default = "default_content_field")]
    pub content_field: String,
    #[serde(default)]
    pub published_field: Option<String>,
    /// Relevance score per hit. Responses scoring above 1 are rescaled by
    /// their best score.
    #[serde(default)]
    pub score_field: Option<String>,
    #[serde(default)]
    pub suggestions_field: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_header: Option<String>,
}

fn default_brave_endpoint() -> String {
    "https://api.search.brave.com".into()
}
fn default_query_param() -> String {
    "q".into()
}
fn default_results_field() -> String {
    "results".into()
}
fn default_title_field() -> String {
    "title".into()
}
fn default_url_field() -> String {
    "url".into()
}
fn default_content_field() -> String {
    "content".into()
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

fn validate(cfg: &VeilConfig) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for spec in &cfg.engines {
        if spec.id.trim().is_empty() {
            return Err(ConfigError::Message("engine id must not be empty".into()));
        }
        if !seen.insert(spec.id.as_str()) {
            return Err(ConfigError::Message(format!(
                "duplicate engine id: {}",
                spec.id
            )));
        }
        if let Some(w) = spec.weight {
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::Message(format!(
                    "engine {}: weight must be a finite non-negative number",
                    spec.id
                )));
            }
        }
        if spec.max_in_flight == Some(0) {
            return Err(ConfigError::Message(format!(
                "engine {}: max_in_flight must be at least 1",
                spec.id
            )));
        }
    }
    if cfg.search.global_concurrency == 0 {
        return Err(ConfigError::Message(
            "search.global_concurrency must be at least 1".into(),
        ));
    }
    if !cfg.search.agreement_boost.is_finite() || cfg.search.agreement_boost < 0.0 {
        return Err(ConfigError::Message(
            "search.agreement_boost must be a finite non-negative number".into(),
        ));
    }
    Ok(())
}

/// Builder hiding the `config` crate wiring (YAML + env overrides).
pub struct VeilConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for VeilConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl VeilConfigLoader {
    /// Start with no file sources; `VEIL__` environment overrides are always applied last.
    ///
    /// ```
    /// use veil_config::VeilConfigLoader;
    ///
    /// let config = VeilConfigLoader::new()
    ///     .with_yaml_str("version: '1'\nengines: []")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.version.as_deref(), Some("1"));
    /// assert!(config.engines.is_empty());
    /// assert_eq!(config.cache.ttl_secs, 300);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Like [`with_file`](Self::with_file), but a missing file is not an error,
    /// so deployments can rely purely on environment variables.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    ///
    /// ```
    /// use veil_config::{EngineDetails, VeilConfigLoader};
    ///
    /// let cfg = VeilConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// version: "test"
    /// engines:
    ///   - id: "instance"
    ///     kind: "json"
    ///     categories: [general, it]
    ///     config:
    ///       endpoint: "https://searx.example.org/search"
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.engines.len(), 1);
    /// assert!(matches!(cfg.engines[0].details, EngineDetails::Json { .. }));
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder and deserialize the merged sources into typed config.
    ///
    /// ```
    /// use veil_config::{EngineDetails, VeilConfigLoader};
    ///
    /// temp_env::with_var("BRAVE_TOKEN", Some("injected-from-env"), || {
    ///     let config = VeilConfigLoader::new()
    ///         .with_yaml_str(r#"
    /// engines:
    ///   - id: "brave"
    ///     kind: "brave"
    ///     config:
    ///       api_key: "${BRAVE_TOKEN}"
    /// "#)
    ///         .load()
    ///         .expect("valid configuration");
    ///
    ///     match &config.engines[0].details {
    ///         EngineDetails::Brave { config } => {
    ///             assert_eq!(config.api_key, "injected-from-env");
    ///             assert_eq!(config.endpoint, "https://api.search.brave.com");
    ///         }
    ///         _ => panic!("expected Brave configuration"),
    ///     }
    /// });
    /// ```
    pub fn load(self) -> Result<VeilConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix("VEIL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: VeilConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        validate(&typed)?;
        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("FOO", Some("bar"), || {
            let mut v = json!("prefix-${FOO}-suffix");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_inside_nested_engine_config() {
        temp_env::with_vars([("HOST", Some("searx.local")), ("KEY", Some("k1"))], || {
            let mut v = json!({
                "engines": [
                    { "config": { "endpoint": "https://${HOST}/search", "api_key": "$KEY" } },
                    42,
                    null
                ]
            });
            expand_env_in_value(&mut v);
            assert_eq!(
                v,
                json!({
                    "engines": [
                        { "config": { "endpoint": "https://searx.local/search", "api_key": "k1" } },
                        42,
                        null
                    ]
                })
            );
        });
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${VEIL_DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${VEIL_DOES_NOT_EXIST}"));
    }

    #[test]
    fn rejects_duplicate_engine_ids() {
        let err = VeilConfigLoader::new()
            .with_yaml_str(
                r#"
engines:
  - id: dup
    kind: json
    config: { endpoint: "https://a.example/search" }
  - id: dup
    kind: json
    config: { endpoint: "https://b.example/search" }
"#,
            )
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate engine id"));
    }

    #[test]
    fn rejects_unknown_category() {
        let res = VeilConfigLoader::new()
            .with_yaml_str(
                r#"
engines:
  - id: one
    kind: json
    categories: [recipes]
    config: { endpoint: "https://a.example/search" }
"#,
            )
            .load();
        assert!(res.is_err());
    }

    #[test]
    fn json_engine_fields_default_to_searxng_shape() {
        let cfg = VeilConfigLoader::new()
            .with_yaml_str(
                r#"
engines:
  - id: one
    kind: json
    config: { endpoint: "https://a.example/search" }
"#,
            )
            .load()
            .unwrap();
        let EngineDetails::Json { config } = &cfg.engines[0].details else {
            panic!("expected json engine");
        };
        assert_eq!(config.query_param, "q");
        assert_eq!(config.results_field, "results");
        assert_eq!(config.url_field, "url");
        assert!(cfg.engines[0].is_enabled());
    }
}
