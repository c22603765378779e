//! RAG orchestrator.
//!
//! [`RagService`] wires the chunker, the embedding engine, both index
//! backends, conversation memory and the generation backend together.
//! Clones share all state, so a service can be handed to spawned tasks.

use super::types::{
    AskMetadata, AskRequest, AskResponse, AskStream, ChunkInput, SourceRef, StreamEvent,
    DEFAULT_CONFIDENCE,
};
use crate::background::BackgroundTasks;
use crate::chunker::{chunk_sections, chunk_text, ChunkOptions};
use crate::embeddings::{EmbeddingEngine, RemoteProvider};
use crate::index::{
    Chunk, ExactIndex, HybridWeights, IndexedItem, SearchFilters, SearchHit, SqliteIndex,
    VectorIndex,
};
use crate::ingest::{ContentSource, FsContentSource, IngestOutcome, IngestionMessage, SourceType};
use crate::memory::{
    resolve_session_id, HistoryHints, HistoryPolicy, HistorySelection, InMemoryMemoryStore,
    MemoryStore,
};
use crate::tokens::{HeuristicCounter, TokenCounter};
use ark_core::{AppConfig, AppError, AppResult, RagSettings};
use ark_llm::{create_client, ChatMessage, ChatRole, LlmClient, LlmRequest};
use ark_prompt::{build_chat_prompt, resolve_prompt, PromptDefinition, DEFAULT_ASK_PROMPT_ID};
use futures::StreamExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const PLACEHOLDER_GENERATOR: &str = "placeholder";
const STREAM_BUFFER: usize = 32;

/// Owner id under which a session's exchanges are indexed.
pub fn conversation_owner(session_id: &str) -> String {
    format!("session:{}", session_id)
}

/// Answer used when no generation backend is available.
pub fn placeholder_answer(passages: usize, question: &str) -> String {
    format!(
        "Based on {} context passages, here is a placeholder answer to: {}",
        passages, question
    )
}

/// Items removed by [`RagService::forget_owner`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ForgetReport {
    pub in_process: usize,
    pub persisted: usize,
}

/// Everything the generation step needs, computed once per question.
struct PreparedAsk {
    messages: Vec<ChatMessage>,
    sources: Vec<SourceRef>,
    passages: usize,
    session_id: String,
    session_supplied: bool,
    selection: HistorySelection,
}

impl PreparedAsk {
    fn metadata(&self, generator: &str) -> AskMetadata {
        AskMetadata {
            session_id: self.session_id.clone(),
            session_supplied: self.session_supplied,
            used_history_turns: self.selection.turns_used,
            used_history_tokens: self.selection.tokens_used,
            generator: generator.to_string(),
        }
    }
}

/// Retrieval, memory and generation behind one handle.
#[derive(Clone)]
pub struct RagService {
    settings: RagSettings,
    embedder: EmbeddingEngine,
    index: Arc<dyn VectorIndex>,
    store: Option<Arc<dyn VectorIndex>>,
    memory: Arc<dyn MemoryStore>,
    llm: Option<Arc<dyn LlmClient>>,
    counter: Arc<dyn TokenCounter>,
    prompt: Arc<PromptDefinition>,
    policy: HistoryPolicy,
    content: Option<Arc<dyn ContentSource>>,
    background: BackgroundTasks,
}

impl std::fmt::Debug for RagService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagService")
            .field("index", &self.index.backend_name())
            .field("store", &self.store.as_ref().map(|s| s.backend_name().to_string()))
            .field("llm", &self.llm.as_ref().map(|c| c.provider_name().to_string()))
            .field("prompt", &self.prompt.id)
            .finish()
    }
}

/// Builder for [`RagService`]. Unset parts get in-process defaults.
pub struct RagServiceBuilder {
    settings: RagSettings,
    embedder: Option<EmbeddingEngine>,
    store: Option<Arc<dyn VectorIndex>>,
    memory: Option<Arc<dyn MemoryStore>>,
    llm: Option<Arc<dyn LlmClient>>,
    counter: Option<Arc<dyn TokenCounter>>,
    prompt: Option<PromptDefinition>,
    content: Option<Arc<dyn ContentSource>>,
}

impl RagServiceBuilder {
    pub fn new(settings: RagSettings) -> Self {
        Self {
            settings,
            embedder: None,
            store: None,
            memory: None,
            llm: None,
            counter: None,
            prompt: None,
            content: None,
        }
    }

    pub fn embedder(mut self, embedder: EmbeddingEngine) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Delegated store, preferred for search and used for persistence.
    pub fn store(mut self, store: Arc<dyn VectorIndex>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Generation backend; without one, answers are placeholders.
    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn prompt(mut self, prompt: PromptDefinition) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Resolver for ingestion-message locators.
    pub fn content_source(mut self, content: Arc<dyn ContentSource>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn build(self) -> RagService {
        let settings = self.settings;
        let policy = HistoryPolicy {
            max_turns_cap: settings.max_history_turns_cap,
            default_session_turns: settings.default_session_turns,
        };

        RagService {
            embedder: self
                .embedder
                .unwrap_or_else(|| EmbeddingEngine::local(settings.vector_dim)),
            index: Arc::new(ExactIndex::new(settings.vector_dim)),
            store: self.store,
            memory: self.memory.unwrap_or_else(|| {
                Arc::new(InMemoryMemoryStore::new(settings.max_messages_per_session))
            }),
            llm: self.llm,
            counter: self.counter.unwrap_or_else(|| Arc::new(HeuristicCounter)),
            prompt: Arc::new(self.prompt.unwrap_or_default()),
            policy,
            content: self.content,
            background: BackgroundTasks::new(settings.background_concurrency),
            settings,
        }
    }
}

impl RagService {
    pub fn builder(settings: RagSettings) -> RagServiceBuilder {
        RagServiceBuilder::new(settings)
    }

    /// Assemble a service from loaded configuration.
    ///
    /// - generation backend from `llm`, when configured
    /// - remote embeddings only when an embedding model is named
    /// - SQLite store when `store.path` is set (relative to the workspace)
    /// - prompt override from `.ark/prompts/rag.ask.default.yml`
    /// - ingestion locators resolved below the workspace
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let settings = config.rag.clone();
        let mut builder = Self::builder(settings.clone())
            .prompt(resolve_prompt(&config.workspace, DEFAULT_ASK_PROMPT_ID)?)
            .content_source(Arc::new(FsContentSource::new(&config.workspace)));

        let mut embedder = EmbeddingEngine::local(settings.vector_dim);
        if let Some(client) = create_client(&config.llm) {
            if let Some(model) = config.llm.embedding_model.as_deref().filter(|m| !m.is_empty()) {
                tracing::info!("Using remote embeddings ({})", model);
                embedder = embedder.with_remote(Arc::new(RemoteProvider::new(
                    Arc::clone(&client),
                    model,
                )));
            }
            builder = builder.llm(client);
        }
        builder = builder.embedder(embedder);

        if let Some(path) = &config.store.path {
            let path = config.workspace.join(path);
            builder = builder.store(Arc::new(SqliteIndex::open(&path, settings.vector_dim)?));
        }

        #[cfg(feature = "tiktoken")]
        {
            builder = builder.token_counter(Arc::new(crate::tokens::TiktokenCounter::new()?));
        }

        Ok(builder.build())
    }

    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    /// Whether answers come from a real generation backend.
    pub fn has_generator(&self) -> bool {
        self.generator().is_some()
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Default chunking options from settings.
    pub fn chunk_options(&self) -> ChunkOptions {
        ChunkOptions::new(self.settings.chunk_max_tokens, self.settings.chunk_overlap_tokens)
    }

    fn generator(&self) -> Option<&Arc<dyn LlmClient>> {
        self.llm.as_ref().filter(|client| client.is_enabled())
    }

    fn weights(&self) -> HybridWeights {
        HybridWeights {
            vector: self.settings.hybrid_vector_weight,
            text: self.settings.hybrid_text_weight,
        }
    }

    /// Chunk, embed and index `content` under `owner_id`.
    ///
    /// Returns the new chunk ids in order. Empty content yields no chunks.
    pub async fn ingest(
        &self,
        owner_id: &str,
        content: &str,
        options: ChunkOptions,
    ) -> AppResult<Vec<String>> {
        let tags = BTreeMap::from([("content_type".to_string(), "text".to_string())]);
        self.ingest_tagged(owner_id, content, options, tags).await
    }

    /// Like [`ingest`](Self::ingest) with caller-chosen metadata on every chunk.
    pub async fn ingest_tagged(
        &self,
        owner_id: &str,
        content: &str,
        options: ChunkOptions,
        metadata: BTreeMap<String, String>,
    ) -> AppResult<Vec<String>> {
        let pieces = chunk_text(content, options, self.counter.as_ref())
            .into_iter()
            .map(|piece| (piece, metadata.clone()))
            .collect();
        self.index_pieces(owner_id, pieces).await
    }

    /// Ingest a whole document, choosing the chunking by source type.
    ///
    /// Markdown is split at its headings first and every chunk is tagged
    /// with `section_type`, `level` and, under a heading, `section`. All
    /// chunks get `chunk_index` and `total_chunks`.
    pub async fn ingest_document(
        &self,
        owner_id: &str,
        content: &str,
        source_type: SourceType,
        options: ChunkOptions,
        metadata: BTreeMap<String, String>,
    ) -> AppResult<Vec<String>> {
        let counter = self.counter.as_ref();
        let mut pieces: Vec<(String, BTreeMap<String, String>)> = match source_type {
            SourceType::Markdown => chunk_sections(content, options, counter)
                .into_iter()
                .map(|chunk| {
                    let mut tags = metadata.clone();
                    tags.insert("section_type".to_string(), chunk.section_type.to_string());
                    tags.insert("level".to_string(), chunk.level.to_string());
                    if let Some(heading) = chunk.heading {
                        tags.insert("section".to_string(), heading);
                    }
                    (chunk.content, tags)
                })
                .collect(),
            SourceType::Text => chunk_text(content, options, counter)
                .into_iter()
                .map(|piece| (piece, metadata.clone()))
                .collect(),
        };

        let total = pieces.len();
        for (i, (_, tags)) in pieces.iter_mut().enumerate() {
            tags.insert("chunk_index".to_string(), i.to_string());
            tags.insert("total_chunks".to_string(), total.to_string());
        }

        self.index_pieces(owner_id, pieces).await
    }

    /// Embed and index chunk texts with their metadata, in order.
    async fn index_pieces(
        &self,
        owner_id: &str,
        pieces: Vec<(String, BTreeMap<String, String>)>,
    ) -> AppResult<Vec<String>> {
        if pieces.is_empty() {
            tracing::debug!("Nothing to ingest for owner {}", owner_id);
            return Ok(Vec::new());
        }

        let (texts, tags): (Vec<String>, Vec<BTreeMap<String, String>>) =
            pieces.into_iter().unzip();
        let vectors = self.embedder.embed_texts(&texts).await?;
        let chunks = texts
            .into_iter()
            .zip(tags)
            .zip(vectors)
            .enumerate()
            .map(|(sequence_index, ((content, metadata), vector))| Chunk {
                owner_id: owner_id.to_string(),
                content,
                sequence_index,
                vector,
                metadata,
            })
            .collect();

        let ids = self.index_chunks(chunks).await?;
        tracing::info!("Ingested {} chunks for owner {}", ids.len(), owner_id);
        Ok(ids)
    }

    /// Embed and index pre-chunked content, one item per input.
    ///
    /// Non-zero `page` and non-empty `timecode` are copied into metadata.
    pub async fn upsert_chunks(
        &self,
        owner_id: &str,
        inputs: Vec<ChunkInput>,
    ) -> AppResult<Vec<String>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = inputs.iter().map(|i| i.content.clone()).collect();
        let vectors = self.embedder.embed_texts(&texts).await?;

        let chunks = inputs
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(sequence_index, (input, vector))| Chunk {
                owner_id: owner_id.to_string(),
                metadata: input.tagged_metadata(),
                content: input.content,
                sequence_index,
                vector,
            })
            .collect();

        let ids = self.index_chunks(chunks).await?;
        tracing::info!("Upserted {} chunks for owner {}", ids.len(), owner_id);
        Ok(ids)
    }

    /// Insert into the exact index now and copy to the store in the background.
    async fn index_chunks(&self, chunks: Vec<Chunk>) -> AppResult<Vec<String>> {
        let mut items = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let item = IndexedItem::from_chunk(chunk);
            self.index.insert(item.clone()).await?;
            items.push(item);
        }

        let ids = items.iter().map(|item| item.id.clone()).collect();

        if let Some(store) = &self.store {
            let store = Arc::clone(store);
            self.background.spawn("persist", async move {
                for item in items {
                    store.insert(item).await?;
                }
                Ok(())
            });
        }

        Ok(ids)
    }

    /// Top-k items for a text query.
    ///
    /// Uses hybrid search on the store when there is one and falls back to
    /// the exact index when the store fails.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> AppResult<Vec<SearchHit>> {
        let vector = self.embedder.embed(query).await?;

        if let Some(store) = &self.store {
            match store
                .hybrid_search(&vector, query, top_k, self.weights(), filters)
                .await
            {
                Ok(hits) => return Ok(hits),
                Err(e) => tracing::warn!(
                    "Search on {} failed, using exact index: {}",
                    store.backend_name(),
                    e
                ),
            }
        }

        self.index.search(&vector, top_k, filters).await
    }

    /// Retrieve, select history and build the prompt for a question.
    async fn prepare(&self, request: &AskRequest) -> AppResult<PreparedAsk> {
        let filters = SearchFilters {
            owner_ids: request.owner_ids.clone(),
            ..Default::default()
        };
        let hits = self
            .search(&request.question, self.settings.ask_top_k, &filters)
            .await?;

        let (session_id, session_supplied) = resolve_session_id(&request.hints);
        let selection = self.select_history(&session_id, &request.hints).await;

        let snippets: Vec<String> = hits.iter().map(|hit| hit.item.content.clone()).collect();
        let history: Vec<ChatMessage> = selection.messages.iter().map(ChatMessage::from).collect();
        let built = build_chat_prompt(&self.prompt, &request.question, &history, &snippets)?;

        let sources = hits
            .iter()
            .map(|hit| SourceRef::from_item(&hit.item, hit.score, self.settings.snippet_chars))
            .collect();

        tracing::debug!(
            "Prepared question for session {} ({} passages, {} history turns, {} tokens)",
            session_id,
            hits.len(),
            selection.turns_used,
            selection.tokens_used
        );

        Ok(PreparedAsk {
            messages: built.messages,
            sources,
            passages: hits.len(),
            session_id,
            session_supplied,
            selection,
        })
    }

    async fn select_history(&self, session_id: &str, hints: &HistoryHints) -> HistorySelection {
        let fetch = self
            .settings
            .history_fetch_turns
            .max(self.policy.nominal_turns(hints));

        match self.memory.history(session_id, fetch).await {
            Ok(history) => self.policy.select(&history, hints, self.counter.as_ref()),
            Err(e) => {
                tracing::warn!("Failed to read history for session {}: {}", session_id, e);
                HistorySelection::default()
            }
        }
    }

    /// Answer a question grounded in retrieved passages and session history.
    ///
    /// The exchange is appended to the session afterwards and indexed in the
    /// background; neither step can fail the call.
    pub async fn ask(&self, request: AskRequest) -> AppResult<AskResponse> {
        let prepared = self.prepare(&request).await?;

        let (answer, generator) = match self.generator() {
            Some(client) => {
                let response = client
                    .complete(&LlmRequest::new(prepared.messages.clone()))
                    .await?;
                (response.content, client.provider_name().to_string())
            }
            None => (
                placeholder_answer(prepared.passages, &request.question),
                PLACEHOLDER_GENERATOR.to_string(),
            ),
        };

        self.record_exchange(&prepared.session_id, &request.question, &answer)
            .await;

        Ok(AskResponse {
            answer,
            confidence: DEFAULT_CONFIDENCE,
            metadata: prepared.metadata(&generator),
            sources: prepared.sources,
        })
    }

    /// Stream an answer token by token.
    ///
    /// Tokens are forwarded as they arrive, followed by one
    /// [`StreamEvent::Final`] with empty content. Dropping the stream stops
    /// generation and nothing is recorded. Without a streaming backend the
    /// unary answer arrives as a single final event.
    pub async fn ask_stream(&self, request: AskRequest) -> AppResult<AskStream> {
        let Some(client) = self.generator().cloned() else {
            let response = self.ask(request).await?;
            let event = StreamEvent::Final {
                content: response.answer,
                sources: response.sources,
                metadata: response.metadata,
            };
            return Ok(Box::pin(futures::stream::iter([Ok::<_, AppError>(event)])));
        };

        let prepared = self.prepare(&request).await?;
        let mut upstream = client
            .stream(&LlmRequest::new(prepared.messages.clone()))
            .await?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let service = self.clone();
        let generator = client.provider_name().to_string();

        tokio::spawn(async move {
            let mut answer = String::new();

            loop {
                tokio::select! {
                    biased;
                    _ = tx.closed() => {
                        tracing::debug!("Stream for session {} cancelled", prepared.session_id);
                        return;
                    }
                    next = upstream.next() => match next {
                        Some(Ok(chunk)) => {
                            if !chunk.content.is_empty() {
                                answer.push_str(&chunk.content);
                                let event = StreamEvent::Token { content: chunk.content };
                                if tx.send(Ok(event)).await.is_err() {
                                    return;
                                }
                            }
                            if chunk.done {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!("Generation stream failed: {}", e);
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                        None => break,
                    }
                }
            }
            drop(upstream);

            service
                .record_exchange(&prepared.session_id, &request.question, &answer)
                .await;

            let event = StreamEvent::Final {
                content: String::new(),
                metadata: prepared.metadata(&generator),
                sources: prepared.sources,
            };
            if tx.send(Ok(event)).await.is_err() {
                tracing::debug!("Stream closed before the final event");
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    /// Append the exchange to memory and index it under the session owner.
    async fn record_exchange(&self, session_id: &str, question: &str, answer: &str) {
        for (role, content) in [(ChatRole::User, question), (ChatRole::Assistant, answer)] {
            if let Err(e) = self.memory.append(session_id, role, content).await {
                tracing::warn!("Failed to append to session {}: {}", session_id, e);
            }
        }

        let service = self.clone();
        let owner = conversation_owner(session_id);
        let tags = BTreeMap::from([
            ("content_type".to_string(), "conversation".to_string()),
            ("session_id".to_string(), session_id.to_string()),
        ]);
        let texts = [question.to_string(), answer.to_string()];

        self.background.spawn("self-ingest", async move {
            let options = service.chunk_options();
            for text in texts.iter().filter(|t| !t.trim().is_empty()) {
                service
                    .ingest_tagged(&owner, text, options, tags.clone())
                    .await?;
            }
            Ok(())
        });
    }

    /// Handle one ingestion message.
    ///
    /// Invalid messages are dropped with a warning. An owner that already
    /// has chunks is skipped, which makes redelivery harmless.
    pub async fn process_ingestion_message(
        &self,
        message: &IngestionMessage,
    ) -> AppResult<IngestOutcome> {
        let valid = match message.validate() {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!("Dropping ingestion message: {}", e);
                return Ok(IngestOutcome::Dropped {
                    reason: e.to_string(),
                });
            }
        };

        let existing = self.indexed_count(&valid.owner_id).await;
        if existing > 0 {
            tracing::info!(
                "Owner {} already has {} chunks, skipping",
                valid.owner_id,
                existing
            );
            return Ok(IngestOutcome::AlreadyIndexed { existing });
        }

        let source = self
            .content
            .as_ref()
            .ok_or_else(|| AppError::Config("No content source configured".to_string()))?;

        let text = match source.fetch(&valid.source_locator, valid.source_type).await {
            Ok(text) => text,
            Err(AppError::Validation(reason)) => {
                tracing::warn!("Dropping ingestion message: {}", reason);
                return Ok(IngestOutcome::Dropped { reason });
            }
            Err(e) => return Err(e),
        };

        let mut tags = BTreeMap::from([
            (
                "content_type".to_string(),
                valid.source_type.as_str().to_string(),
            ),
            ("source_locator".to_string(), valid.source_locator.clone()),
        ]);
        if let Some(user_id) = &valid.user_id {
            tags.insert("user_id".to_string(), user_id.clone());
        }

        let chunk_ids = self
            .ingest_document(
                &valid.owner_id,
                &text,
                valid.source_type,
                self.chunk_options(),
                tags,
            )
            .await?;
        Ok(IngestOutcome::Indexed { chunk_ids })
    }

    /// Chunks held for an owner by either backend.
    ///
    /// A failing store counts as empty.
    pub async fn indexed_count(&self, owner_id: &str) -> usize {
        let local = self.index.count_by_owner(owner_id).await.unwrap_or(0);
        let persisted = match &self.store {
            Some(store) => match store.count_by_owner(owner_id).await {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("Failed to count chunks in {}: {}", store.backend_name(), e);
                    0
                }
            },
            None => 0,
        };
        local.max(persisted)
    }

    /// Copy an owner's in-process items to the store now.
    pub async fn persist_owner(&self, owner_id: &str) -> AppResult<usize> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| AppError::Config("No persistent store configured".to_string()))?;

        let items = self.index.items_by_owner(owner_id).await?;
        let count = items.len();
        for item in items {
            store.insert(item).await?;
        }

        tracing::info!("Persisted {} chunks for owner {}", count, owner_id);
        Ok(count)
    }

    /// Remove an owner's items from both backends.
    pub async fn forget_owner(&self, owner_id: &str) -> AppResult<ForgetReport> {
        let in_process = self.index.delete_by_owner(owner_id).await?;
        let persisted = match &self.store {
            Some(store) => store.delete_by_owner(owner_id).await?,
            None => 0,
        };

        tracing::info!(
            "Forgot owner {} ({} in process, {} persisted)",
            owner_id,
            in_process,
            persisted
        );
        Ok(ForgetReport {
            in_process,
            persisted,
        })
    }

    /// Session history, oldest first; `max_turns == 0` returns all of it.
    pub async fn session_history(
        &self,
        session_id: &str,
        max_turns: usize,
    ) -> AppResult<Vec<crate::memory::MemoryMessage>> {
        self.memory.history(session_id, max_turns).await
    }

    /// Wait for background persistence and self-ingestion to finish.
    pub async fn wait_idle(&self) {
        self.background.wait_idle().await;
    }
}
