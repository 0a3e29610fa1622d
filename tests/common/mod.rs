//! Shared test utilities and fixtures
//!
//! A wiremock server standing in for the Chat Completions API, and an engine
//! wired to it through the real OpenAI client.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use quill_engine::{DispatchSettings, Engine, EngineEvent};
use quill_providers::openai::OpenAiClient;
use quill_types::{ApiKey, ModelName, Temperature};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Start a mock server that simulates the OpenAI API
pub async fn start_openai_mock() -> MockServer {
    MockServer::start().await
}

/// Chat Completions success body.
pub fn completion_body(text: &str, total_tokens: u64) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4-0613",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": total_tokens / 2,
            "completion_tokens": total_tokens - total_tokens / 2,
            "total_tokens": total_tokens
        }
    })
}

/// Answer every request with `text`.
pub async fn mount_completion(server: &MockServer, text: &str, total_tokens: u64) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(text, total_tokens)))
        .mount(server)
        .await;
}

/// Answer with an OpenAI-shaped error.
pub async fn mount_error(server: &MockServer, status: u16, message: &str) {
    let body = json!({
        "error": {
            "message": message,
            "type": "invalid_request_error",
            "param": null,
            "code": null
        }
    });
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

/// Replies `re: <last message>` so each answer is traceable to its prompt.
pub struct EchoLastMessage;

impl Respond for EchoLastMessage {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let last = body["messages"]
            .as_array()
            .and_then(|messages| messages.last())
            .and_then(|message| message["content"].as_str())
            .unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(completion_body(&format!("re: {last}"), 10))
    }
}

pub async fn mount_echo(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(EchoLastMessage)
        .mount(server)
        .await;
}

pub fn settings(model: &str) -> DispatchSettings {
    DispatchSettings {
        model: ModelName::parse(model).expect("valid model"),
        temperature: Temperature::default(),
        max_tokens: 4000,
        max_completion_tokens: 3000,
    }
}

/// Engine talking to `server` through the real OpenAI client.
pub fn openai_engine(server: &MockServer, model: &str, memory_limit: usize) -> Engine {
    let client = OpenAiClient::new(Some(ApiKey::new("sk-test-key").expect("non-empty")))
        .with_endpoint(format!("{}{COMPLETIONS_PATH}", server.uri()))
        .with_http_client(reqwest::Client::new());
    Engine::new(Arc::new(client), settings(model), memory_limit)
}

/// Wait for the next outcome the way a blocking consumer would.
pub async fn next_event(engine: &mut Engine) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(10), engine.next_event())
        .await
        .expect("outcome within timeout")
        .expect("result channel open")
}

/// Bodies of every request the server received, in arrival order.
pub async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).expect("json body"))
        .collect()
}
