//! Dispatcher happy paths against a scripted upstream.

mod common;

use ai_stream_gateway::error_code::ErrorKind;
use ai_stream_gateway::tokens::{estimate_conversation, estimate_tokens};
use ai_stream_gateway::{Message, Settings, UnifiedEvent};
use common::*;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

#[tokio::test]
async fn test_content_reconstruction_and_usage() {
    let upstream = ScriptedUpstream::new(vec![body(OPENAI_HELLO)]);
    let d = dispatcher(upstream.clone());

    let conv = vec![Message::user("Say hello")];
    let (events, outcome) = d
        .stream(&conv, &Settings::new("openai", "gpt-4o-mini"))
        .collect_all()
        .await;

    assert_consistent(&events, &outcome);
    assert_eq!(content_of(&events), "Hello there!");
    assert_eq!(outcome.content, "Hello there!");
    assert_eq!(outcome.attempts, 1);
    assert_eq!(upstream.calls(), 1);

    match events.last().unwrap() {
        UnifiedEvent::Done {
            finish_reason,
            usage,
        } => {
            assert_eq!(finish_reason, "stop");
            assert_eq!(usage.prompt_tokens, 12);
            assert_eq!(usage.completion_tokens, 3);
            assert_eq!(usage.total_tokens, 15);
            assert!(!usage.estimated);
            let expected = 12.0 / 1000.0 * 0.00015 + 3.0 / 1000.0 * 0.0006;
            assert!((usage.cost - expected).abs() < 1e-12);
        }
        other => panic!("expected Done, got {:?}", other),
    }

    // Usage arrives as its own event before Done
    assert!(events.iter().any(|e| matches!(
        e,
        UnifiedEvent::Usage {
            prompt_tokens: 12,
            completion_tokens: 3
        }
    )));
}

#[tokio::test]
async fn test_invalid_temperature_never_reaches_upstream() {
    let upstream = ScriptedUpstream::new(vec![body(OPENAI_HELLO)]);
    let d = dispatcher(upstream.clone());

    let settings = Settings::new("openai", "gpt-4o").temperature(2.5);
    let (events, outcome) = d
        .stream(&[Message::user("hi")], &settings)
        .collect_all()
        .await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        UnifiedEvent::Failed {
            kind, retryable, ..
        } => {
            assert_eq!(*kind, ErrorKind::ConfigurationError);
            assert!(!retryable);
        }
        other => panic!("expected Failed, got {:?}", other),
    }
    assert_eq!(upstream.calls(), 0);
    assert_eq!(outcome.attempts, 0);
    assert!(!outcome.is_success());
}

#[tokio::test]
async fn test_unknown_model_and_empty_conversation_rejected() {
    let upstream = ScriptedUpstream::new(vec![]);
    let d = dispatcher(upstream.clone());

    let err = d
        .prepare(&[Message::user("hi")], &Settings::new("openai", "gpt-9"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    assert!(err.to_string().contains("gpt-9"));

    let err = d
        .prepare(&[], &Settings::new("openai", "gpt-4o"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationError);

    let (events, _) = d
        .stream(&[Message::user("hi")], &Settings::new("acme", "x"))
        .collect_all()
        .await;
    assert_single_terminal(&events);
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn test_chunk_boundaries_do_not_change_output() {
    for size in [1, 2, 3, 7, 64] {
        let upstream = ScriptedUpstream::new(vec![Step::Body(chunked(OPENAI_HELLO, size))]);
        let d = dispatcher(upstream);
        let (events, outcome) = d
            .stream(&[Message::user("hi")], &Settings::new("openai", "gpt-4o"))
            .collect_all()
            .await;
        assert_consistent(&events, &outcome);
        assert_eq!(outcome.content, "Hello there!", "chunk size {}", size);
    }
}

#[tokio::test]
async fn test_buffered_mode_emits_single_delta() {
    let upstream = ScriptedUpstream::new(vec![body(OPENAI_HELLO)]);
    let d = dispatcher(upstream);

    let settings = Settings::new("openai", "gpt-4o").buffered();
    let (events, outcome) = d
        .stream(&[Message::user("hi")], &settings)
        .collect_all()
        .await;

    assert_consistent(&events, &outcome);
    let deltas: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, UnifiedEvent::ContentDelta { .. }))
        .collect();
    assert_eq!(deltas.len(), 1);
    let n = events.len();
    assert!(matches!(
        &events[n - 2],
        UnifiedEvent::ContentDelta { text } if text == "Hello there!"
    ));
}

#[tokio::test]
async fn test_anthropic_usage_and_cost() {
    let stream_body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":1000,\"output_tokens\":1}}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Bonjour\"}}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":500}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );
    let upstream = ScriptedUpstream::new(vec![body(stream_body)]);
    let d = dispatcher(upstream.clone());

    let conv = vec![Message::system("Answer in French"), Message::user("Hello")];
    let outcome = d
        .stream(&conv, &Settings::new("anthropic", "claude-3-5-sonnet-latest"))
        .collect_all()
        .await
        .1;

    assert_eq!(outcome.content, "Bonjour");
    assert_eq!(outcome.finish_reason.as_deref(), Some("stop"));
    let usage = outcome.usage.unwrap();
    assert_eq!(usage.prompt_tokens, 1000);
    assert_eq!(usage.completion_tokens, 500);
    // 1.0 * 0.003 + 0.5 * 0.015
    assert!((usage.cost - 0.0105).abs() < 1e-12);

    let req = &upstream.requests()[0];
    assert_eq!(req.url, "https://api.anthropic.com/v1/messages");
    assert_eq!(req.headers["x-api-key"], "sk-ant-test");
    assert_eq!(req.body["system"], "Answer in French");
}

#[tokio::test]
async fn test_missing_usage_is_estimated() {
    let ndjson = concat!(
        "{\"message\":{\"role\":\"assistant\",\"content\":\"four score and\"},\"done\":false}\n",
        "{\"message\":{\"role\":\"assistant\",\"content\":\" seven\"},\"done\":false}\n",
        "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
    );
    let upstream = ScriptedUpstream::new(vec![body(ndjson)]);
    let d = dispatcher(upstream);

    let conv = vec![Message::user("Continue the speech")];
    let outcome = d
        .stream(&conv, &Settings::new("ollama", "llama3.1"))
        .collect_all()
        .await
        .1;

    let usage = outcome.usage.unwrap();
    assert!(usage.estimated);
    assert_eq!(usage.prompt_tokens, estimate_conversation(&conv));
    assert_eq!(usage.completion_tokens, estimate_tokens("four score and seven"));
    assert_eq!(usage.cost, 0.0);
}

#[tokio::test]
async fn test_gemini_stream_through_dispatcher() {
    let sse = concat!(
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi\"}],\"role\":\"model\"}}]}\n\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"!\"}]},\"finishReason\":\"MAX_TOKENS\"}],",
        "\"usageMetadata\":{\"promptTokenCount\":2,\"candidatesTokenCount\":2}}\n\n",
    );
    let upstream = ScriptedUpstream::new(vec![body(sse)]);
    let d = dispatcher(upstream.clone());

    let outcome = d
        .stream(&[Message::user("hi")], &Settings::new("gemini", "gemini-1.5-flash"))
        .collect_all()
        .await
        .1;
    assert_eq!(outcome.content, "Hi!");
    assert_eq!(outcome.finish_reason.as_deref(), Some("length"));
    assert!(upstream.requests()[0]
        .url
        .ends_with("/v1beta/models/gemini-1.5-flash:streamGenerateContent?alt=sse"));
}

#[tokio::test]
async fn test_stream_to_with_tiny_channel_preserves_order() {
    let upstream = ScriptedUpstream::new(vec![Step::Body(chunked(OPENAI_HELLO, 5))]);
    let d = dispatcher(upstream);

    let (tx, rx) = mpsc::channel(1);
    let handle = d.stream_to(&[Message::user("hi")], &Settings::new("openai", "gpt-4o"), tx);

    // slow consumer
    let events: Vec<UnifiedEvent> = ReceiverStream::new(rx)
        .then(|ev| async move {
            tokio::task::yield_now().await;
            ev
        })
        .collect()
        .await;
    let outcome = handle.finished().await;
    assert_consistent(&events, &outcome);
    assert_eq!(content_of(&events), "Hello there!");
}

#[tokio::test]
async fn test_event_stream_implements_stream() {
    let upstream = ScriptedUpstream::new(vec![body(OPENAI_HELLO)]);
    let d = dispatcher(upstream);
    let events: Vec<UnifiedEvent> = d
        .stream(&[Message::user("hi")], &Settings::new("openai", "gpt-4o"))
        .collect()
        .await;
    assert_single_terminal(&events);
}
