//! Composition root: one [`RagService`] per process, built from config and
//! shared by the CLI commands and the HTTP server.
//!
//! The service owns the selected [`DocumentStore`] backend and the
//! embedder chain, and serializes deletes per document id so that exactly
//! one concurrent caller observes the document as existing.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::info;

use docrag_core::chunk::ChunkOptions;
use docrag_core::embedding::{Embedder, Embedding};
use docrag_core::ingest::{prepare_document, IngestReport};
use docrag_core::models::{Document, RagContext};
use docrag_core::prompt::build_chat_context;
use docrag_core::search::search_store;
use docrag_core::store::memory::InMemoryStore;
use docrag_core::store::DocumentStore;

use crate::config::{Config, StoreBackend};
use crate::embedding::create_embedder;
use crate::json_store::JsonFileStore;
use crate::sqlite_store::SqliteStore;

/// Open the backend named by `[store]`.
pub async fn open_store(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match config.store.backend {
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(config.store.require_path()?).await?),
        StoreBackend::Json => Arc::new(JsonFileStore::open(config.store.require_path()?).await?),
        StoreBackend::Memory => Arc::new(InMemoryStore::new()),
    };
    Ok(store)
}

/// Create the persistent store if it does not exist yet.
pub async fn init_store(config: &Config) -> Result<()> {
    match config.store.backend {
        StoreBackend::Sqlite => {
            let store = SqliteStore::open(config.store.require_path()?).await?;
            store.close().await;
        }
        StoreBackend::Json => {
            let path = config.store.require_path()?;
            if !path.exists() {
                JsonFileStore::open(path).await?.flush().await?;
            }
        }
        StoreBackend::Memory => {}
    }
    Ok(())
}

pub struct RagService {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkOptions,
    top_k: usize,
    context_results: usize,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RagService {
    pub fn new(store: Arc<dyn DocumentStore>, embedder: Arc<dyn Embedder>, config: &Config) -> Self {
        Self {
            store,
            embedder,
            chunking: config.chunking.options(),
            top_k: config.retrieval.top_k,
            context_results: config.retrieval.context_results,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Open the configured store and embedder chain.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = open_store(config).await?;
        let embedder = Arc::new(create_embedder(&config.embedding)?);
        Ok(Self::new(store, embedder, config))
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn default_top_k(&self) -> usize {
        self.top_k
    }

    async fn lock_document(&self, id: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| anyhow!("document lock table poisoned"))?;
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(id.to_string()).or_default().clone()
        };
        Ok(lock.lock_owned().await)
    }

    /// Extract, chunk, embed and store one upload.
    pub async fn add_document(&self, filename: &str, bytes: &[u8]) -> Result<IngestReport> {
        let prepared =
            prepare_document(self.embedder.as_ref(), filename, bytes, &self.chunking).await?;

        // The id is freshly generated, so no other writer can hold it.
        self.store
            .add_document(&prepared.document, &prepared.chunks)
            .await?;

        info!(
            document = %prepared.report.document_id,
            title = %prepared.report.title,
            chunks = prepared.report.chunk_count,
            fallback = prepared.report.fallback_embeddings,
            "document ingested"
        );
        Ok(prepared.report)
    }

    /// Delete a document and its chunks. Returns whether it existed.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let _guard = self.lock_document(id).await?;
        let existed = self.store.get_document(id).await?.is_some();
        self.store.delete_document(id).await?;
        if existed {
            info!(document = id, "document deleted");
        }
        Ok(existed)
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        self.store.get_all_documents().await
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        self.store.get_document(id).await
    }

    pub async fn document_count(&self) -> Result<usize> {
        self.store.get_document_count().await
    }

    /// Search the store; `top_k` defaults to `retrieval.top_k`.
    pub async fn search(&self, query: &str, top_k: Option<usize>) -> RagContext {
        search_store(
            self.store.as_ref(),
            self.embedder.as_ref(),
            query,
            top_k.unwrap_or(self.top_k),
        )
        .await
    }

    /// Prompt context for `query`; `max_results` defaults to
    /// `retrieval.context_results`.
    pub async fn chat_context(&self, query: &str, max_results: Option<usize>) -> String {
        let ctx = self
            .search(query, Some(max_results.unwrap_or(self.context_results)))
            .await;
        build_chat_context(&ctx.results)
    }

    pub async fn embed(&self, text: &str) -> Result<Embedding> {
        self.embedder.embed(text).await
    }
}
