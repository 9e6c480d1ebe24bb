// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! End-to-end session flow tests over a scripted backend and in-memory sink.

use std::sync::Arc;

use rapport::adapter::{Adapter, ChatAdapter};
use rapport::backend::{MockBackend, MockReply};
use rapport::config::Settings;
use rapport::context::StaticContext;
use rapport::error::{BackendError, Error};
use rapport::session::SessionId;
use rapport::streaming::MemorySink;

fn settings(stream_response: bool) -> Arc<Settings> {
    let mut settings = Settings::from_yaml("adapter: rapport.adapters.Test\n").unwrap();
    settings.system_prompt = "You are helpful.".to_string();
    settings.stream_response = stream_response;
    Arc::new(settings)
}

fn adapter(backend: MockBackend, stream_response: bool) -> ChatAdapter {
    ChatAdapter::new(settings(stream_response), Arc::new(backend))
        .unwrap()
        .with_context_provider(Arc::new(StaticContext::from_text("Doc A text")))
}

#[tokio::test]
async fn test_buffered_scenario() {
    // streaming=false, static context "Doc A text", system "You are helpful.";
    // one message "Hi" answered "Hello!" produces one emitted message and one
    // history pair.
    let backend = MockBackend::new().with_reply("Hello!");
    let chat = adapter(backend.clone(), false);
    let sink = MemorySink::new();
    let session = SessionId::new();

    chat.on_chat_start(session).await.unwrap();
    chat.on_message(session, "Hi", &sink).await.unwrap();

    assert_eq!(sink.finalized_contents(), vec!["Hello!"]);

    // History is visible in the next prompt: user "Hi", assistant "Hello!".
    chat.on_message(session, "again", &sink).await.unwrap();
    let prompt = backend.last_prompt().unwrap();
    assert_eq!(prompt[0].content, "You are helpful.");
    assert_eq!(prompt[1].content, "Doc A text");
    assert_eq!(prompt[2].content, "Hi");
    assert_eq!(prompt[3].content, "Hello!");
    assert_eq!(prompt[4].content, "again");
}

#[tokio::test]
async fn test_streamed_scenario() {
    // streaming=true, fragments ["Hel","lo","!"] produce exactly three
    // visible updates and a final history entry of "Hello!".
    let backend = MockBackend::new().with_fragments(vec!["Hel", "lo", "!"]);
    let chat = adapter(backend.clone(), true);
    let sink = MemorySink::new();
    let session = SessionId::new();

    chat.on_chat_start(session).await.unwrap();
    chat.on_message(session, "Hi", &sink).await.unwrap();

    assert_eq!(sink.visible_updates(), vec!["Hel", "Hello", "Hello!"]);
    assert_eq!(sink.finalized_contents(), vec!["Hello!"]);

    chat.on_message(session, "next", &sink).await.unwrap();
    let prompt = backend.last_prompt().unwrap();
    assert_eq!(prompt[3].content, "Hello!");
}

#[tokio::test]
async fn test_failed_turn_then_successful_resend() {
    // Backend times out on message 2 of 2; history keeps only the first
    // pair, and the resend succeeds as the second pair.
    let backend = MockBackend::new().with_replies(vec![
        MockReply::Text("first answer".to_string()),
        MockReply::Failure(BackendError::Timeout),
        MockReply::Text("second answer".to_string()),
    ]);
    let chat = adapter(backend.clone(), false);
    let sink = MemorySink::new();
    let session = SessionId::new();

    chat.on_chat_start(session).await.unwrap();
    chat.on_message(session, "one", &sink).await.unwrap();

    let err = chat.on_message(session, "two", &sink).await.unwrap_err();
    assert!(matches!(err, Error::Backend(BackendError::Timeout)));
    assert_eq!(sink.finalized_contents(), vec!["first answer"]);

    // The resend sees exactly one prior pair and appends as the second.
    chat.on_message(session, "two", &sink).await.unwrap();
    let prompt = backend.last_prompt().unwrap();
    assert_eq!(prompt.len(), 5);
    assert_eq!(prompt[2].content, "one");
    assert_eq!(prompt[3].content, "first answer");
    assert_eq!(prompt[4].content, "two");
    assert_eq!(
        sink.finalized_contents(),
        vec!["first answer", "second answer"]
    );
}

#[tokio::test]
async fn test_history_length_matches_successful_turns() {
    let backend = MockBackend::new().with_reply("r");
    let chat = adapter(backend.clone(), false);
    let sink = MemorySink::new();
    let session = SessionId::new();

    chat.on_chat_start(session).await.unwrap();
    for i in 0..4 {
        chat.on_message(session, &format!("m{i}"), &sink).await.unwrap();
    }

    // After 4 successful turns the 5th prompt carries 4 pairs before the
    // new input: 2 system slots + 8 history turns + 1 user slot.
    chat.on_message(session, "m4", &sink).await.unwrap();
    let prompt = backend.last_prompt().unwrap();
    assert_eq!(prompt.len(), 2 + 8 + 1);
    for (i, pair) in prompt[2..10].chunks(2).enumerate() {
        assert_eq!(pair[0].content, format!("m{i}"));
        assert_eq!(pair[1].content, "r");
    }
}

#[tokio::test]
async fn test_streamed_and_buffered_agree() {
    // An identical deterministic backend yields byte-identical final
    // content in both modes.
    let reply = "The same deterministic answer.";

    let buffered_sink = MemorySink::new();
    let buffered = adapter(MockBackend::new().with_reply(reply), false);
    let session = SessionId::new();
    buffered.on_chat_start(session).await.unwrap();
    buffered.on_message(session, "Hi", &buffered_sink).await.unwrap();

    let streamed_sink = MemorySink::new();
    let streamed = adapter(
        MockBackend::new().with_reply(reply).with_stream_chunk_chars(3),
        true,
    );
    let session = SessionId::new();
    streamed.on_chat_start(session).await.unwrap();
    streamed.on_message(session, "Hi", &streamed_sink).await.unwrap();

    assert_eq!(
        buffered_sink.finalized_contents(),
        streamed_sink.finalized_contents()
    );
}

#[tokio::test]
async fn test_mid_stream_failure_not_committed() {
    let backend = MockBackend::new().with_replies(vec![
        MockReply::FragmentsThenFail(
            vec!["par".to_string(), "tial".to_string()],
            BackendError::StreamError("reset".to_string()),
        ),
        MockReply::Fragments(vec!["ok".to_string()]),
    ]);
    let chat = adapter(backend.clone(), true);
    let sink = MemorySink::new();
    let session = SessionId::new();

    chat.on_chat_start(session).await.unwrap();
    let err = chat.on_message(session, "Hi", &sink).await.unwrap_err();
    assert!(matches!(err, Error::Backend(BackendError::StreamError(_))));

    // Partial content stayed visible but unfinalized and uncommitted.
    assert!(sink.finalized_contents().is_empty());
    assert_eq!(sink.messages()[0].content, "partial");

    // The retry prompt carries no trace of the failed turn.
    chat.on_message(session, "Hi", &sink).await.unwrap();
    assert_eq!(backend.last_prompt().unwrap().len(), 3);
}

#[tokio::test]
async fn test_starters_empty_without_configuration() {
    let chat = adapter(MockBackend::new(), false);
    assert!(chat.starters().is_empty());
}

#[tokio::test]
async fn test_independent_sessions_interleave() {
    let backend = MockBackend::new().with_reply("shared backend reply");
    let chat = adapter(backend.clone(), false);
    let sink = MemorySink::new();
    let first = SessionId::new();
    let second = SessionId::new();

    chat.on_chat_start(first).await.unwrap();
    chat.on_chat_start(second).await.unwrap();

    chat.on_message(first, "a1", &sink).await.unwrap();
    chat.on_message(second, "b1", &sink).await.unwrap();
    chat.on_message(first, "a2", &sink).await.unwrap();

    // The first session's second prompt has one pair; the interleaved
    // session never leaks into it.
    let prompts = backend.recorded_prompts();
    let last = prompts.last().unwrap();
    assert_eq!(last[2].content, "a1");
    assert_eq!(last[4].content, "a2");

    chat.on_chat_end(first).await.unwrap();
    chat.on_message(second, "b2", &sink).await.unwrap();
    assert_eq!(chat.active_sessions(), 1);
}
