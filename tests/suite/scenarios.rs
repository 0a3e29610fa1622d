//! End-to-end engine scenarios against a mock Chat Completions server.

use quill_engine::{ArtifactId, ArtifactSnapshot, EngineEvent, FailureKind, RequestKind};

use crate::common::{
    mount_completion, mount_echo, mount_error, next_event, openai_engine, request_bodies,
    start_openai_mock,
};

#[tokio::test]
async fn fenced_edit_reply_is_unwrapped() {
    let server = start_openai_mock().await;
    mount_completion(&server, "```\ncode\n```", 42).await;

    let mut engine = openai_engine(&server, "gpt-4", 10);
    let artifact = ArtifactId::new("/project/main.py");
    engine.open_artifact(&artifact, "print('old')");
    let id = engine.submit_edit(
        "rewrite it",
        ArtifactSnapshot::new(artifact.clone(), "print('old')"),
    );

    let EngineEvent::EditReady {
        id: got,
        artifact: target,
        content,
        ..
    } = next_event(&mut engine).await
    else {
        panic!("expected an edit");
    };
    assert_eq!(got, id);
    assert_eq!(target, artifact);
    assert_eq!(content, "code");

    engine.apply_edit(&artifact, "print('old')", &content);
    let labels: Vec<String> = engine
        .versions()
        .list(&artifact)
        .iter()
        .map(|summary| summary.label.to_string())
        .collect();
    assert_eq!(labels, ["Original", "Before AI edit", "AI edit"]);

    let body = &request_bodies(&server).await[0];
    assert_eq!(body["model"], "gpt-4");
    assert_eq!(body["max_tokens"], 4000);
    assert!(body.get("max_completion_tokens").is_none());
    assert_eq!(body["messages"][0]["role"], "system");
    assert!(
        body["messages"][0]["content"]
            .as_str()
            .unwrap()
            .contains("File: /project/main.py")
    );
    assert_eq!(
        body["messages"][1]["content"],
        "Current file content:\nprint('old')\n\nUser request: rewrite it"
    );
}

#[tokio::test]
async fn context_limit_two_keeps_only_latest_exchange() {
    let server = start_openai_mock().await;
    mount_echo(&server).await;

    let mut engine = openai_engine(&server, "gpt-4", 2);
    for prompt in ["u1", "u2", "u3"] {
        engine.submit_chat(prompt, None);
        next_event(&mut engine).await;
    }

    let turns: Vec<String> = engine
        .context()
        .snapshot()
        .iter()
        .map(|turn| turn.content().to_string())
        .collect();
    assert_eq!(turns, ["u3", "re: u3"]);

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 3);
    let third: Vec<&str> = bodies[2]["messages"]
        .as_array()
        .unwrap()
        .iter()
        .skip(1)
        .map(|message| message["content"].as_str().unwrap())
        .collect();
    assert_eq!(third, ["u2", "re: u2", "u3"]);
}

#[tokio::test]
async fn chat_with_file_context_embeds_the_file() {
    let server = start_openai_mock().await;
    mount_completion(&server, "It prints one.", 12).await;

    let mut engine = openai_engine(&server, "gpt-4.1", 10);
    let file = ArtifactSnapshot::new(ArtifactId::new("/p/app.py"), "print(1)");
    engine.submit_chat("what does this do?", Some(file));

    let EngineEvent::ChatReply { text, .. } = next_event(&mut engine).await else {
        panic!("expected a chat reply");
    };
    assert_eq!(text, "It prints one.");

    let body = &request_bodies(&server).await[0];
    let system = body["messages"][0]["content"].as_str().unwrap();
    assert!(system.contains("File: app.py\n\nContent:\nprint(1)"), "{system}");
    assert_eq!(body["messages"][1]["content"], "what does this do?");
}

#[tokio::test]
async fn gpt5_requests_use_max_completion_tokens() {
    let server = start_openai_mock().await;
    mount_completion(&server, "hi", 5).await;

    let mut engine = openai_engine(&server, "gpt-5", 10);
    engine.submit_chat("hello", None);
    next_event(&mut engine).await;

    let body = &request_bodies(&server).await[0];
    assert_eq!(body["max_completion_tokens"], 3000);
    assert!(body.get("max_tokens").is_none());
}

#[tokio::test]
async fn usage_accumulates_and_prices_unknown_models_at_fallback() {
    let server = start_openai_mock().await;
    mount_completion(&server, "first", 100).await;

    let mut engine = openai_engine(&server, "unknown-model", 10);
    engine.submit_chat("one", None);
    next_event(&mut engine).await;

    server.reset().await;
    mount_completion(&server, "second", 50).await;
    engine.submit_chat("two", None);
    next_event(&mut engine).await;

    assert_eq!(engine.usage().total_tokens(), 150);
    assert_eq!(engine.usage().total_requests(), 2);
    let cost = engine.usage().estimate_cost("unknown-model");
    assert!((cost - 150.0 / 1000.0 * 0.03).abs() < 1e-12, "{cost}");
    assert_eq!(
        engine.usage_report().status_line(),
        "Tokens: 150 | Requests: 2 | Est. Cost: $0.0045"
    );

    engine.reset_usage();
    assert_eq!(engine.usage().estimate_cost("unknown-model"), 0.0);
}

#[tokio::test]
async fn output_length_mismatch_is_rewritten_as_guidance() {
    let server = start_openai_mock().await;
    mount_error(
        &server,
        400,
        "Unsupported parameter: 'max_tokens' is not supported with this model. Use 'max_completion_tokens' instead.",
    )
    .await;

    let mut engine = openai_engine(&server, "gpt-5-mini", 10);
    engine.submit_edit(
        "tidy",
        ArtifactSnapshot::new(ArtifactId::new("/p/a.rs"), "fn main() {}"),
    );

    let EngineEvent::Failed {
        kind,
        reason,
        failure,
        ..
    } = next_event(&mut engine).await
    else {
        panic!("expected a failure");
    };
    assert_eq!(kind, RequestKind::Edit);
    assert_eq!(failure, FailureKind::Parameter);
    assert_eq!(
        reason,
        "gpt-5-mini model error: This model uses 'max_completion_tokens' instead of 'max_tokens'. Please try again."
    );
    assert!(engine.context().is_empty());
    assert_eq!(engine.usage().total_requests(), 0);
}

#[tokio::test]
async fn rejected_key_names_the_environment_variable() {
    let server = start_openai_mock().await;
    mount_error(
        &server,
        401,
        "Incorrect API key provided: sk-test-key-aaaaaaaaaaaaaaaaaaaaaa.",
    )
    .await;

    let mut engine = openai_engine(&server, "gpt-4", 10);
    engine.submit_chat("hello", None);

    let EngineEvent::Failed {
        reason, failure, ..
    } = next_event(&mut engine).await
    else {
        panic!("expected a failure");
    };
    assert_eq!(failure, FailureKind::Transport);
    assert!(reason.contains("OPENAI_API_KEY"), "{reason}");
    assert!(!reason.contains("aaaaaaaaaaaaaaaaaaaaaa"));
}

#[tokio::test]
async fn busy_flag_tracks_outstanding_submissions() {
    let server = start_openai_mock().await;
    mount_completion(&server, "ok", 1).await;

    let mut engine = openai_engine(&server, "gpt-4", 10);
    assert!(!engine.is_busy());
    engine.submit_chat("a", None);
    engine.submit_chat("b", None);
    assert_eq!(engine.in_flight(), 2);

    next_event(&mut engine).await;
    next_event(&mut engine).await;
    assert!(!engine.is_busy());
    assert!(engine.drain().is_empty());
}
