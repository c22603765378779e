use super::{ScriptedClient, StreamEnd, UnreachableStore};
use crate::index::{SearchFilters, SqliteIndex, VectorIndex};
use crate::ingest::{FsContentSource, IngestOutcome, IngestionMessage, SourceType};
use crate::memory::HistoryHints;
use crate::rag::{
    conversation_owner, placeholder_answer, AskRequest, ChunkInput, RagService, StreamEvent,
    DEFAULT_CONFIDENCE,
};
use ark_core::{AppError, RagSettings};
use ark_llm::ChatRole;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const RUST_NOTE: &str = "Rust guarantees memory safety without a garbage collector.";

fn service() -> RagService {
    RagService::builder(RagSettings::default()).build()
}

fn service_with(client: Arc<ScriptedClient>) -> RagService {
    RagService::builder(RagSettings::default()).llm(client).build()
}

fn session(id: &str) -> HistoryHints {
    HistoryHints::default().with_session(id)
}

#[tokio::test]
async fn test_ask_without_backend_returns_placeholder() {
    let service = service();
    service
        .ingest("doc-1", RUST_NOTE, service.chunk_options())
        .await
        .unwrap();

    let question = "How does Rust manage memory?";
    let response = service.ask(AskRequest::new(question)).await.unwrap();

    assert_eq!(response.answer, placeholder_answer(1, question));
    assert_eq!(response.confidence, DEFAULT_CONFIDENCE);
    assert!(!response.metadata.session_id.is_empty());
    assert!(!response.metadata.session_supplied);
    assert_eq!(response.metadata.generator, "placeholder");
    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].owner_id, "doc-1");
    assert_eq!(response.sources[0].content_snippet, RUST_NOTE);

    service.wait_idle().await;
}

#[tokio::test]
async fn test_generated_session_ids_are_distinct() {
    let service = service();

    let first = service.ask(AskRequest::new("one")).await.unwrap();
    let second = service.ask(AskRequest::new("two")).await.unwrap();

    assert_ne!(first.metadata.session_id, second.metadata.session_id);
    assert_eq!(first.metadata.used_history_turns, 0);
    assert_eq!(second.metadata.used_history_turns, 0);

    service.wait_idle().await;
}

#[tokio::test]
async fn test_same_session_accumulates_history() {
    let service = service();

    let first = service
        .ask(AskRequest::new("What is ownership?").with_hints(session("s1")))
        .await
        .unwrap();
    assert!(first.metadata.session_supplied);
    assert_eq!(first.metadata.used_history_turns, 0);

    let second = service
        .ask(AskRequest::new("And borrowing?").with_hints(session("s1")))
        .await
        .unwrap();
    assert_eq!(second.metadata.session_id, "s1");
    assert_eq!(second.metadata.used_history_turns, 1);
    assert!(second.metadata.used_history_tokens > 0);

    let history = service.session_history("s1", 0).await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].role, ChatRole::User);
    assert_eq!(history[0].content, "What is ownership?");

    service.wait_idle().await;
}

#[tokio::test]
async fn test_history_hints_limit_selection() {
    let service = service();
    for question in ["q1", "q2", "q3"] {
        service
            .ask(AskRequest::new(question).with_hints(session("limits")))
            .await
            .unwrap();
    }

    let no_turns = service
        .ask(AskRequest::new("q4").with_hints(session("limits").with_max_turns(0)))
        .await
        .unwrap();
    assert_eq!(no_turns.metadata.used_history_turns, 0);

    let tiny_budget = service
        .ask(AskRequest::new("q5").with_hints(session("limits").with_max_tokens(1)))
        .await
        .unwrap();
    assert_eq!(tiny_budget.metadata.used_history_turns, 0);
    assert_eq!(tiny_budget.metadata.used_history_tokens, 0);

    // A token budget overrides the turn count
    let wide_budget = service
        .ask(
            AskRequest::new("q6").with_hints(
                session("limits")
                    .with_max_turns(1)
                    .with_max_tokens(100_000),
            ),
        )
        .await
        .unwrap();
    assert_eq!(wide_budget.metadata.used_history_turns, 5);

    service.wait_idle().await;
}

#[tokio::test]
async fn test_prompt_carries_history_and_passages() {
    let client = Arc::new(ScriptedClient::new(&["Values ", "have one owner."]));
    let service = service_with(client.clone());
    service
        .ingest("doc-1", RUST_NOTE, service.chunk_options())
        .await
        .unwrap();

    let first = service
        .ask(AskRequest::new("What is ownership?").with_hints(session("chat")))
        .await
        .unwrap();
    assert_eq!(first.answer, "Values have one owner.");
    assert_eq!(first.metadata.generator, "scripted");

    service
        .ask(AskRequest::new("And borrowing?").with_hints(session("chat")))
        .await
        .unwrap();

    let prompts = client.prompts();
    assert_eq!(prompts.len(), 2);

    let second = &prompts[1];
    assert_eq!(second[0].role, ChatRole::System);
    assert_eq!(second[1].content, "What is ownership?");
    assert_eq!(second[2].role, ChatRole::Assistant);
    assert_eq!(second[2].content, "Values have one owner.");

    let user_turn = &second[second.len() - 1];
    assert!(user_turn.content.contains("And borrowing?"));
    assert!(user_turn.content.contains(RUST_NOTE));

    service.wait_idle().await;
}

#[tokio::test]
async fn test_disabled_backend_degrades_to_placeholder() {
    let client = Arc::new(ScriptedClient::new(&["unused"]).disabled());
    let service = service_with(client.clone());

    let response = service.ask(AskRequest::new("anything")).await.unwrap();

    assert_eq!(response.answer, placeholder_answer(0, "anything"));
    assert!(client.prompts().is_empty());
    assert!(!service.has_generator());

    service.wait_idle().await;
}

#[tokio::test]
async fn test_stream_forwards_tokens_then_final() {
    let client = Arc::new(ScriptedClient::new(&["Hel", "lo"]));
    let service = service_with(client);

    let events: Vec<StreamEvent> = service
        .ask_stream(AskRequest::new("Say hello").with_hints(session("stream")))
        .await
        .unwrap()
        .map(|event| event.unwrap())
        .collect()
        .await;

    assert_eq!(events.len(), 3);
    assert_eq!(
        events[0],
        StreamEvent::Token {
            content: "Hel".to_string()
        }
    );
    assert_eq!(
        events[1],
        StreamEvent::Token {
            content: "lo".to_string()
        }
    );
    match &events[2] {
        StreamEvent::Final {
            content, metadata, ..
        } => {
            assert!(content.is_empty());
            assert_eq!(metadata.session_id, "stream");
            assert_eq!(metadata.generator, "scripted");
        }
        other => panic!("expected final event, got {:?}", other),
    }

    let history = service.session_history("stream", 0).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content, "Hello");

    service.wait_idle().await;
}

#[tokio::test]
async fn test_stream_without_backend_sends_single_final() {
    let service = service();

    let events: Vec<_> = service
        .ask_stream(AskRequest::new("fallback?"))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    match events[0].as_ref().unwrap() {
        StreamEvent::Final { content, .. } => {
            assert_eq!(content, &placeholder_answer(0, "fallback?"));
        }
        other => panic!("expected final event, got {:?}", other),
    }

    service.wait_idle().await;
}

#[tokio::test]
async fn test_cancelled_stream_records_nothing() {
    let client = Arc::new(ScriptedClient::new(&["partial"]).ending(StreamEnd::Hang));
    let service = service_with(client);

    let mut stream = service
        .ask_stream(AskRequest::new("long answer").with_hints(session("cancel")))
        .await
        .unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert!(!first.is_final());
    drop(stream);

    tokio::time::sleep(Duration::from_millis(50)).await;
    service.wait_idle().await;

    assert!(service.session_history("cancel", 0).await.unwrap().is_empty());
    assert_eq!(service.indexed_count(&conversation_owner("cancel")).await, 0);
}

#[tokio::test]
async fn test_failed_stream_surfaces_error() {
    let client = Arc::new(ScriptedClient::new(&["par"]).ending(StreamEnd::Fail));
    let service = service_with(client);

    let events: Vec<_> = service
        .ask_stream(AskRequest::new("question").with_hints(session("broken")))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 2);
    assert!(events[0].is_ok());
    assert!(matches!(events[1], Err(AppError::Llm(_))));
    assert!(service.session_history("broken", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_search_falls_back_when_store_fails() {
    let service = RagService::builder(RagSettings::default())
        .store(Arc::new(UnreachableStore))
        .build();
    let ids = service
        .ingest("doc-1", RUST_NOTE, service.chunk_options())
        .await
        .unwrap();

    let hits = service
        .search("memory safety", 5, &SearchFilters::default())
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item.id, ids[0]);

    // Background persistence fails quietly
    service.wait_idle().await;
}

#[tokio::test]
async fn test_store_receives_chunks_in_background() {
    let store = Arc::new(SqliteIndex::open_in_memory(128).unwrap());
    let service = RagService::builder(RagSettings::default())
        .store(store.clone())
        .build();

    let ids = service
        .ingest("doc-1", RUST_NOTE, service.chunk_options())
        .await
        .unwrap();
    service.wait_idle().await;

    assert_eq!(store.count_by_owner("doc-1").await.unwrap(), ids.len());

    let hits = service
        .search("garbage collector", 3, &SearchFilters::owner("doc-1"))
        .await
        .unwrap();
    assert_eq!(hits[0].item.id, ids[0]);

    // Re-persisting the same items does not duplicate them
    assert_eq!(service.persist_owner("doc-1").await.unwrap(), ids.len());
    assert_eq!(store.count_by_owner("doc-1").await.unwrap(), ids.len());
}

#[tokio::test]
async fn test_persist_without_store_is_config_error() {
    let service = service();
    service
        .ingest("doc-1", RUST_NOTE, service.chunk_options())
        .await
        .unwrap();

    assert!(matches!(
        service.persist_owner("doc-1").await,
        Err(AppError::Config(_))
    ));
}

#[tokio::test]
async fn test_exchanges_are_indexed_under_session_owner() {
    let service = service();
    service
        .ask(AskRequest::new("Where is the borrow checker?").with_hints(session("memo")))
        .await
        .unwrap();
    service.wait_idle().await;

    let owner = conversation_owner("memo");
    assert_eq!(service.indexed_count(&owner).await, 2);

    let filters = SearchFilters::owner(owner).with_metadata("content_type", "conversation");
    let hits = service
        .search("borrow checker", 5, &filters)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits
        .iter()
        .all(|hit| hit.item.metadata.get("session_id").map(String::as_str) == Some("memo")));
}

#[tokio::test]
async fn test_upsert_chunks_tags_page_and_timecode() {
    let service = service();
    let mut first = ChunkInput::new("Slide about lifetimes");
    first.page = Some(2);
    let mut second = ChunkInput::new("Lecture intro");
    second.page = Some(0);
    second.timecode = Some("00:01:30".to_string());

    let ids = service
        .upsert_chunks("lecture", vec![first, second])
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);

    let paged = service
        .search("lifetimes", 5, &SearchFilters::default().with_metadata("page", "2"))
        .await
        .unwrap();
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0].item.id, ids[0]);

    let unpaged = service
        .search("intro", 5, &SearchFilters::default().with_metadata("page", "0"))
        .await
        .unwrap();
    assert!(unpaged.is_empty());

    let timed = service
        .search("intro", 5, &SearchFilters::default().with_metadata("timecode", "00:01:30"))
        .await
        .unwrap();
    assert_eq!(timed[0].item.sequence_index, 1);
}

#[tokio::test]
async fn test_forget_owner_removes_items() {
    let service = service();
    let ids = service
        .ingest("doc-1", RUST_NOTE, service.chunk_options())
        .await
        .unwrap();

    let report = service.forget_owner("doc-1").await.unwrap();

    assert_eq!(report.in_process, ids.len());
    assert_eq!(report.persisted, 0);
    assert_eq!(service.indexed_count("doc-1").await, 0);
}

fn message(owner: Option<&str>, locator: Option<&str>) -> IngestionMessage {
    IngestionMessage {
        owner_id: owner.map(String::from),
        source_locator: locator.map(String::from),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_ingestion_message_is_idempotent() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.md"), RUST_NOTE).unwrap();
    let service = RagService::builder(RagSettings::default())
        .content_source(Arc::new(FsContentSource::new(dir.path())))
        .build();

    let first = service
        .process_ingestion_message(&message(Some("file-1"), Some("notes.md")))
        .await
        .unwrap();
    let IngestOutcome::Indexed { chunk_ids } = first else {
        panic!("expected indexed, got {:?}", first);
    };
    assert_eq!(chunk_ids.len(), 1);

    let second = service
        .process_ingestion_message(&message(Some("file-1"), Some("notes.md")))
        .await
        .unwrap();
    assert_eq!(second, IngestOutcome::AlreadyIndexed { existing: 1 });

    let hits = service
        .search("memory", 1, &SearchFilters::owner("file-1"))
        .await
        .unwrap();
    assert_eq!(
        hits[0].item.metadata.get("content_type").map(String::as_str),
        Some("markdown")
    );
}

#[tokio::test]
async fn test_markdown_ingestion_tags_sections() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("guide.md"),
        "Intro paragraph.\n\n# Ownership\nEach value has one owner.\n\n## Borrowing\nReferences borrow values.\n",
    )
    .unwrap();
    let service = RagService::builder(RagSettings::default())
        .content_source(Arc::new(FsContentSource::new(dir.path())))
        .build();

    let outcome = service
        .process_ingestion_message(&message(Some("guide"), Some("guide.md")))
        .await
        .unwrap();
    let IngestOutcome::Indexed { chunk_ids } = outcome else {
        panic!("expected indexed, got {:?}", outcome);
    };
    assert_eq!(chunk_ids.len(), 3);

    let mut items = service
        .search("values", 10, &SearchFilters::owner("guide"))
        .await
        .unwrap()
        .into_iter()
        .map(|hit| hit.item)
        .collect::<Vec<_>>();
    items.sort_by_key(|item| item.sequence_index);

    let tag = |i: usize, key: &str| items[i].metadata.get(key).cloned();
    assert_eq!(tag(0, "section_type").as_deref(), Some("text"));
    assert_eq!(tag(0, "level").as_deref(), Some("0"));
    assert_eq!(tag(0, "section"), None);

    assert_eq!(tag(1, "section").as_deref(), Some("# Ownership"));
    assert_eq!(tag(1, "level").as_deref(), Some("1"));
    assert_eq!(tag(2, "section").as_deref(), Some("## Borrowing"));
    assert_eq!(tag(2, "level").as_deref(), Some("2"));
    assert_eq!(tag(2, "section_type").as_deref(), Some("heading"));

    for (i, item) in items.iter().enumerate() {
        assert_eq!(item.metadata["chunk_index"], i.to_string());
        assert_eq!(item.metadata["total_chunks"], "3");
        assert_eq!(item.metadata["content_type"], "markdown");
    }
}

#[tokio::test]
async fn test_text_documents_are_not_sectioned() {
    let service = service();
    let ids = service
        .ingest_document(
            "plain",
            "1. first step\n2. second step",
            SourceType::Text,
            service.chunk_options(),
            Default::default(),
        )
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);

    let hits = service
        .search("step", 1, &SearchFilters::owner("plain"))
        .await
        .unwrap();
    assert_eq!(hits[0].item.content, "1. first step 2. second step");
    assert_eq!(hits[0].item.metadata["total_chunks"], "1");
    assert!(!hits[0].item.metadata.contains_key("section_type"));
}

#[tokio::test]
async fn test_invalid_ingestion_messages_are_dropped() {
    let dir = TempDir::new().unwrap();
    let service = RagService::builder(RagSettings::default())
        .content_source(Arc::new(FsContentSource::new(dir.path())))
        .build();

    let missing_owner = service
        .process_ingestion_message(&message(None, Some("notes.md")))
        .await
        .unwrap();
    assert!(matches!(missing_owner, IngestOutcome::Dropped { .. }));

    let escaping = service
        .process_ingestion_message(&message(Some("file-2"), Some("../notes.md")))
        .await
        .unwrap();
    assert!(matches!(escaping, IngestOutcome::Dropped { .. }));

    // A missing file is worth retrying, so it is surfaced
    let absent = service
        .process_ingestion_message(&message(Some("file-3"), Some("absent.txt")))
        .await;
    assert!(matches!(absent, Err(AppError::Io(_))));
}

#[tokio::test]
async fn test_ingestion_without_content_source_is_config_error() {
    let service = service();
    let result = service
        .process_ingestion_message(&message(Some("file-1"), Some("notes.md")))
        .await;
    assert!(matches!(result, Err(AppError::Config(_))));
}
