use serial_test::serial;
use std::{fs, path::PathBuf};
use tempfile::TempDir;
use veil_common::Category;
use veil_config::{EngineDetails, VeilConfigLoader};

/// Helper to write a YAML file in a temp dir and return its path.
fn write_yaml(tmp: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let p = tmp.path().join(name);
    fs::write(&p, yaml).expect("write yaml");
    p
}

const FILE_YAML: &str = r#"
version: "1"
search:
  default_categories: [general]
  global_concurrency: 16
cache:
  ttl_secs: 120
engines:
  - id: brave
    kind: brave
    categories: [general, news]
    weight: 1.5
    timeout_ms: 2500
    max_in_flight: 2
    min_interval_ms: 1000
    config:
      api_key: "${VEIL_TEST_BRAVE_KEY}"
  - id: searx
    kind: json
    enabled: false
    categories: [general, it]
    config:
      endpoint: "https://searx.example.org/search"
      static_params:
        format: json
"#;

#[test]
#[serial]
fn loads_engines_in_file_order() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "veil.yaml", FILE_YAML);

    let config = temp_env::with_var("VEIL_TEST_BRAVE_KEY", Some("secret-key"), || {
        VeilConfigLoader::new()
            .with_file(&p)
            .load()
            .expect("load config")
    });

    let ids: Vec<_> = config.engines.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["brave", "searx"]);
    assert_eq!(config.search.global_concurrency, 16);
    assert_eq!(config.cache.ttl_secs, 120);

    let brave = &config.engines[0];
    assert_eq!(brave.categories, vec![Category::General, Category::News]);
    assert_eq!(brave.weight, Some(1.5));
    assert_eq!(brave.max_in_flight, Some(2));
    match &brave.details {
        EngineDetails::Brave { config } => assert_eq!(config.api_key, "secret-key"),
        other => panic!("unexpected engine kind: {other:?}"),
    }

    let searx = &config.engines[1];
    assert!(!searx.is_enabled());
    match &searx.details {
        EngineDetails::Json { config } => {
            assert_eq!(config.static_params.get("format").map(String::as_str), Some("json"))
        }
        other => panic!("unexpected engine kind: {other:?}"),
    }
}

#[test]
#[serial]
fn environment_overrides_file_values() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "veil.yaml", FILE_YAML);

    let config = temp_env::with_vars(
        [
            ("VEIL_TEST_BRAVE_KEY", Some("k")),
            ("VEIL__SEARCH__GLOBAL_CONCURRENCY", Some("4")),
            ("VEIL__SERVER__BIND", Some("0.0.0.0:9999")),
        ],
        || VeilConfigLoader::new().with_file(&p).load().expect("load config"),
    );

    assert_eq!(config.search.global_concurrency, 4);
    assert_eq!(config.server.bind, "0.0.0.0:9999");
}

#[test]
#[serial]
fn missing_optional_file_yields_defaults() {
    let tmp = TempDir::new().unwrap();
    let config = VeilConfigLoader::new()
        .with_optional_file(tmp.path().join("absent.yaml"))
        .load()
        .expect("defaults");

    assert!(config.engines.is_empty());
    assert_eq!(config.server.bind, "127.0.0.1:8888");
    assert_eq!(config.search.default_categories, vec![Category::General]);
    assert!(config.cache.enabled);
}

#[test]
#[serial]
fn missing_required_file_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let res = VeilConfigLoader::new()
        .with_file(tmp.path().join("absent.yaml"))
        .load();
    assert!(res.is_err());
}
