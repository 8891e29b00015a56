//! Registry files loaded from disk and used by a live dispatcher.

mod common;

use ai_stream_gateway::error_code::ErrorKind;
use ai_stream_gateway::{Dispatcher, GatewayConfig, Message, Registry, Settings};
use common::*;
use std::path::PathBuf;
use tokio_test::{assert_err, assert_ok};

const REGISTRY_YAML: &str = r#"
providers:
  - id: deepseek
    api_style: openai_compatible
    base_url: https://api.deepseek.com/v1
    api_key_env: AI_GATEWAY_TEST_DEEPSEEK_KEY_NOT_SET
    models:
      - id: deepseek-chat
        input_cost_per_1k: 0.001
        output_cost_per_1k: 0.002
        context_window: 64000
  - id: local
    api_style: ollama
    base_url: http://127.0.0.1:11434
    models:
      - id: qwen2.5
"#;

fn write_registry(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("{}-{}.yaml", name, std::process::id()));
    std::fs::write(&path, REGISTRY_YAML).unwrap();
    path
}

#[test]
fn test_load_registry_from_file() {
    let path = write_registry("gateway-registry-load");
    let reg = assert_ok!(Registry::from_path(&path));
    std::fs::remove_file(&path).ok();

    assert_eq!(reg.ids(), vec!["deepseek", "local"]);
    let rates = reg.rates("deepseek", "deepseek-chat").unwrap();
    assert_eq!(rates.input_cost_per_1k, 0.001);
    assert!(reg.validate_model("local", "qwen2.5"));
    assert!(!reg.validate_model("local", "deepseek-chat"));
}

#[test]
fn test_missing_registry_file_is_an_error() {
    let path = std::env::temp_dir().join("gateway-registry-does-not-exist.yaml");
    assert_err!(Registry::from_path(&path));
}

#[tokio::test]
async fn test_dispatcher_uses_registry_path() {
    let path = write_registry("gateway-registry-dispatch");
    let upstream = ScriptedUpstream::new(vec![body(OPENAI_HELLO)]);
    let mut config = GatewayConfig::default().with_api_key("deepseek", "ds-test");
    config.registry_path = Some(path.clone());

    let d = Dispatcher::builder()
        .config(config)
        .upstream(upstream.clone())
        .build()
        .unwrap();
    std::fs::remove_file(&path).ok();

    let outcome = d
        .stream(&[Message::user("hi")], &Settings::new("deepseek", "deepseek-chat"))
        .collect_all()
        .await
        .1;

    let req = &upstream.requests()[0];
    assert_eq!(req.url, "https://api.deepseek.com/v1/chat/completions");
    assert_eq!(req.headers["authorization"], "Bearer ds-test");

    // 12 prompt + 3 completion at the file's rates
    let usage = outcome.usage.unwrap();
    let expected = 12.0 / 1000.0 * 0.001 + 3.0 / 1000.0 * 0.002;
    assert!((usage.cost - expected).abs() < 1e-12);
}

#[tokio::test]
async fn test_unset_key_variable_fails_before_upstream() {
    let upstream = ScriptedUpstream::new(vec![body(OPENAI_HELLO)]);
    let d = Dispatcher::builder()
        .registry(Registry::from_yaml_str(REGISTRY_YAML).unwrap())
        .config(GatewayConfig::default())
        .upstream(upstream.clone())
        .build()
        .unwrap();

    let err = d
        .prepare(&[Message::user("hi")], &Settings::new("deepseek", "deepseek-chat"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    assert!(err.to_string().contains("AI_GATEWAY_TEST_DEEPSEEK_KEY_NOT_SET"));
    assert_eq!(upstream.calls(), 0);
}
