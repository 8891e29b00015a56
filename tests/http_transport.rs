//! End-to-end through the real reqwest transport against a local mock server.

mod common;

use ai_stream_gateway::error_code::ErrorKind;
use ai_stream_gateway::{Dispatcher, GatewayConfig, Message, Registry, Settings, UnifiedEvent};
use common::*;

fn gateway(config: GatewayConfig) -> Dispatcher {
    Dispatcher::builder()
        .registry(Registry::builtin())
        .config(config.with_retry(fast_retry()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_openai_stream_over_http() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_header("content-type", "application/json")
        .match_body(mockito::Matcher::PartialJsonString(
            r#"{"model":"gpt-4o-mini","stream":true}"#.to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(OPENAI_HELLO)
        .create_async()
        .await;

    let d = gateway(test_config().with_base_url("openai", server.url()));
    let (events, outcome) = d
        .stream(&[Message::user("hi")], &Settings::new("openai", "gpt-4o-mini"))
        .collect_all()
        .await;

    mock.assert_async().await;
    assert_consistent(&events, &outcome);
    assert_eq!(outcome.content, "Hello there!");
    assert_eq!(outcome.usage.unwrap().total_tokens, 15);
}

#[tokio::test]
async fn test_rate_limit_retry_after_header() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .with_header("retry-after", "3")
        .with_body(r#"{"error":{"message":"Rate limit reached for gpt-4o","type":"requests","code":"rate_limit_exceeded"}}"#)
        .expect(1)
        .create_async()
        .await;

    let d = gateway(test_config().with_base_url("openai", server.url()));
    let (events, _) = d
        .stream(&[Message::user("hi")], &Settings::new("openai", "gpt-4o"))
        .collect_all()
        .await;

    mock.assert_async().await;
    match events.last().unwrap() {
        UnifiedEvent::Failed {
            kind,
            retryable,
            retry_after_ms,
            message,
        } => {
            assert_eq!(*kind, ErrorKind::RateLimited);
            assert!(*retryable);
            assert_eq!(*retry_after_ms, Some(3000));
            assert!(message.contains("Rate limit reached"));
        }
        other => panic!("expected Failed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unauthorized_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(401)
        .with_body(r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error","code":"invalid_api_key"}}"#)
        .expect(1)
        .create_async()
        .await;

    let d = gateway(test_config().with_base_url("openai", server.url()));
    let (_, outcome) = d
        .stream(&[Message::user("hi")], &Settings::new("openai", "gpt-4o"))
        .collect_all()
        .await;

    mock.assert_async().await;
    let (kind, message) = outcome.failure.unwrap();
    assert_eq!(kind, ErrorKind::AuthenticationError);
    assert!(message.contains("Incorrect API key"));
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(503)
        .with_body("upstream connect error")
        .expect(3)
        .create_async()
        .await;

    let d = gateway(test_config().with_base_url("openai", server.url()));
    let (events, outcome) = d
        .stream(&[Message::user("hi")], &Settings::new("openai", "gpt-4o"))
        .collect_all()
        .await;

    mock.assert_async().await;
    assert_single_terminal(&events);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.failure.unwrap().0, ErrorKind::UpstreamServerError);
}

#[tokio::test]
async fn test_anthropic_headers_and_path() {
    let sse = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":9,\"output_tokens\":1}}}\n\n",
        "event: ping\n",
        "data: {\"type\":\"ping\"}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"max_tokens\"},\"usage\":{\"output_tokens\":1}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .match_header("x-api-key", "sk-ant-test")
        .match_header("anthropic-version", "2023-06-01")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(sse)
        .create_async()
        .await;

    let d = gateway(test_config().with_base_url("anthropic", server.url()));
    let outcome = d
        .stream(
            &[Message::user("hi")],
            &Settings::new("anthropic", "claude-3-haiku-20240307").max_tokens(1),
        )
        .collect_all()
        .await
        .1;

    mock.assert_async().await;
    assert_eq!(outcome.content, "Hi");
    assert_eq!(outcome.finish_reason.as_deref(), Some("length"));
    let usage = outcome.usage.unwrap();
    assert_eq!((usage.prompt_tokens, usage.completion_tokens), (9, 1));
}

#[tokio::test]
async fn test_ollama_ndjson_over_http() {
    let ndjson = concat!(
        "{\"model\":\"llama3.1\",\"message\":{\"role\":\"assistant\",\"content\":\"Bonjour\"},\"done\":false}\n",
        "{\"model\":\"llama3.1\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,",
        "\"done_reason\":\"stop\",\"prompt_eval_count\":26,\"eval_count\":2}\n",
    );
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_header("content-type", "application/x-ndjson")
        .with_body(ndjson)
        .create_async()
        .await;

    let d = gateway(GatewayConfig::default().with_base_url("ollama", server.url()));
    let outcome = d
        .stream(&[Message::user("hi")], &Settings::new("ollama", "llama3.1"))
        .collect_all()
        .await
        .1;

    mock.assert_async().await;
    assert_eq!(outcome.content, "Bonjour");
    let usage = outcome.usage.unwrap();
    assert!(!usage.estimated);
    assert_eq!(usage.total_tokens, 28);
}
