//! Configuration feeding dispatch parameters.

use std::fs;
use std::sync::Arc;

use quill_config::{QuillConfig, ResolvedConfig};
use quill_engine::{DispatchSettings, Engine};
use quill_providers::openai::OpenAiClient;
use quill_types::ApiKey;

use crate::common::{COMPLETIONS_PATH, mount_completion, next_event, request_bodies, start_openai_mock};

#[tokio::test]
async fn configured_parameters_reach_the_request() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[app]
model = "o3-mini"

[request]
temperature = 0.3
max_tokens = 111
max_completion_tokens = 222

[context]
memory_limit = 4
"#,
    )
    .unwrap();

    let config = QuillConfig::load_from(&path).unwrap().unwrap().resolve();
    assert_eq!(config.memory_limit, 4);

    let server = start_openai_mock().await;
    mount_completion(&server, "ok", 3).await;
    let client = OpenAiClient::new(Some(ApiKey::new("sk-test").unwrap()))
        .with_endpoint(format!("{}{COMPLETIONS_PATH}", server.uri()))
        .with_http_client(reqwest::Client::new());
    let settings = DispatchSettings {
        model: config.model.clone(),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        max_completion_tokens: config.max_completion_tokens,
    };
    let mut engine = Engine::new(Arc::new(client), settings, config.memory_limit);
    engine.submit_chat("hi", None);
    next_event(&mut engine).await;

    let body = &request_bodies(&server).await[0];
    assert_eq!(body["model"], "o3-mini");
    assert_eq!(body["temperature"], 0.3);
    assert_eq!(body["max_completion_tokens"], 222);
    assert!(body.get("max_tokens").is_none());
    assert_eq!(engine.context().limit(), 4);
}

#[test]
fn persisted_settings_load_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = ResolvedConfig::default();
    config.memory_limit = 6;
    config.max_tokens = 1234;
    config.persist_to(&path).unwrap();

    let loaded = QuillConfig::load_from(&path).unwrap().unwrap().resolve();
    assert_eq!(loaded.memory_limit, 6);
    assert_eq!(loaded.max_tokens, 1234);
    assert_eq!(loaded.model, config.model);
}
