//! Retrieval over a document corpus: vector similarity with a keyword
//! fallback.
//!
//! [`search`] is the entry point used by every frontend. It never fails:
//!
//! 1. An empty corpus (no documents or no chunks) returns an empty
//!    context immediately.
//! 2. The vector path embeds the query and scores every chunk that has an
//!    embedding by cosine similarity.
//! 3. If the query cannot be embedded, or no chunk has an embedding, the
//!    keyword path scores chunks by token overlap with their content and
//!    their document's title.
//!
//! Both paths sort by score (descending, stable for ties) and truncate to
//! `top_k`. The relevance tiers of the two paths use different scales.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::models::{Document, DocumentChunk, RagContext, Relevance, SearchResult, SearchStrategy};
use crate::store::DocumentStore;
use crate::vector::cosine_similarity;

const VECTOR_HIGH: f64 = 0.3;
const VECTOR_MEDIUM: f64 = 0.1;
const VECTOR_ADMIT: f64 = 0.01;
/// Slightly negative similarities are still admitted at the score floor.
const VECTOR_NEGATIVE_TOLERANCE: f64 = -0.1;
const VECTOR_SCORE_FLOOR: f64 = 0.01;

const KEYWORD_HIGH: f64 = 0.7;
const KEYWORD_MEDIUM: f64 = 0.3;
const KEYWORD_SCORE_FLOOR: f64 = 0.1;
const KEYWORD_MIN_TOKEN_CHARS: usize = 2;

/// Queries containing one of these ask about the documents in general
/// ("what does the document say"), so every chunk is a weak match.
const GENERIC_MARKERS: [&str; 5] = ["文档", "讲", "内容", "啥", "什么"];

/// Punctuation replaced by spaces before keyword tokenization.
const QUERY_PUNCTUATION: &[char] = &[
    '，', '。', '！', '？', '；', '：', '“', '”', '‘', '’', '"', '\'', '（', '）', '【', '】',
];

/// The documents and chunks a search runs over.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub documents: Vec<Document>,
    pub chunks: Vec<DocumentChunk>,
}

impl Corpus {
    pub fn new(documents: Vec<Document>, chunks: Vec<DocumentChunk>) -> Self {
        Self { documents, chunks }
    }

    /// Snapshot every document and chunk from a store.
    pub async fn load(store: &dyn DocumentStore) -> anyhow::Result<Self> {
        let documents = store.get_all_documents().await?;
        let chunks = store.get_all_chunks().await?;
        Ok(Self { documents, chunks })
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() || self.chunks.is_empty()
    }

    fn documents_by_id(&self) -> HashMap<&str, &Document> {
        self.documents.iter().map(|d| (d.id.as_str(), d)).collect()
    }
}

/// Why the vector path could not run.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query embedding failed: {0}")]
    Embedding(String),
    #[error("no chunk in the corpus carries an embedding")]
    NoEmbeddings,
}

/// Rank `corpus` against `query`, returning at most `top_k` results.
pub async fn search(embedder: &dyn Embedder, query: &str, corpus: &Corpus, top_k: usize) -> RagContext {
    let started = Instant::now();

    if corpus.is_empty() {
        debug!(query, "search over empty corpus");
        return RagContext::empty(query, elapsed_ms(started));
    }

    let (results, strategy) = if query.trim().is_empty() {
        (keyword_search(query, corpus, top_k), SearchStrategy::Keyword)
    } else {
        match vector_search(embedder, query, corpus, top_k).await {
            Ok(results) => (results, SearchStrategy::Vector),
            Err(e) => {
                warn!(error = %e, "vector search unavailable, falling back to keyword search");
                (keyword_search(query, corpus, top_k), SearchStrategy::Keyword)
            }
        }
    };

    let search_time = elapsed_ms(started);
    debug!(
        query,
        strategy = %strategy,
        results = results.len(),
        search_time_ms = search_time,
        "search complete"
    );

    RagContext {
        query: query.to_string(),
        total_results: results.len(),
        results,
        search_time,
        strategy,
    }
}

/// Load the corpus from `store` and run [`search`].
///
/// A store read failure is logged and produces an empty context with
/// strategy [`SearchStrategy::StoreUnavailable`].
pub async fn search_store(
    store: &dyn DocumentStore,
    embedder: &dyn Embedder,
    query: &str,
    top_k: usize,
) -> RagContext {
    let started = Instant::now();
    match Corpus::load(store).await {
        Ok(corpus) => search(embedder, query, &corpus, top_k).await,
        Err(e) => {
            warn!(error = %format!("{:#}", e), "failed to read corpus from store");
            RagContext {
                strategy: SearchStrategy::StoreUnavailable,
                ..RagContext::empty(query, elapsed_ms(started))
            }
        }
    }
}

/// Embed `query` and rank chunks by cosine similarity.
pub async fn vector_search(
    embedder: &dyn Embedder,
    query: &str,
    corpus: &Corpus,
    top_k: usize,
) -> Result<Vec<SearchResult>, SearchError> {
    let embedding = embedder
        .embed(query)
        .await
        .map_err(|e| SearchError::Embedding(format!("{:#}", e)))?;
    rank_by_vector(&embedding.vector, corpus, top_k)
}

/// Rank chunks against an already computed query vector.
///
/// Chunks without an embedding or whose document is not in the corpus are
/// skipped. Fails with [`SearchError::NoEmbeddings`] when nothing is left
/// to score.
pub fn rank_by_vector(
    query_vec: &[f32],
    corpus: &Corpus,
    top_k: usize,
) -> Result<Vec<SearchResult>, SearchError> {
    let documents = corpus.documents_by_id();
    let mut scored_any = false;
    let mut results = Vec::new();

    for chunk in &corpus.chunks {
        let (Some(vector), Some(document)) = (chunk.vector(), documents.get(chunk.document_id.as_str()))
        else {
            continue;
        };
        scored_any = true;

        let similarity = cosine_similarity(query_vec, vector) as f64;
        let adjusted = similarity.max(0.0);
        if adjusted <= VECTOR_ADMIT && similarity <= VECTOR_NEGATIVE_TOLERANCE {
            continue;
        }

        results.push(SearchResult {
            chunk: chunk.clone(),
            document: (*document).clone(),
            score: adjusted.max(VECTOR_SCORE_FLOOR),
            relevance: vector_relevance(adjusted),
        });
    }

    if !scored_any {
        return Err(SearchError::NoEmbeddings);
    }

    Ok(sort_and_truncate(results, top_k))
}

fn vector_relevance(score: f64) -> Relevance {
    if score > VECTOR_HIGH {
        Relevance::High
    } else if score > VECTOR_MEDIUM {
        Relevance::Medium
    } else {
        Relevance::Low
    }
}

/// Lowercased query tokens of at least two characters.
pub fn query_tokens(query: &str) -> Vec<String> {
    query_words(query)
        .into_iter()
        .filter(|t| t.chars().count() >= KEYWORD_MIN_TOKEN_CHARS)
        .collect()
}

/// Every whitespace-separated word of the query, short ones included.
fn query_words(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .replace(QUERY_PUNCTUATION, " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn has_generic_marker(query: &str) -> bool {
    GENERIC_MARKERS.iter().any(|m| query.contains(m))
}

/// Rank chunks by keyword overlap with their content and document title.
///
/// Every query token found in the chunk counts one match, and one more if
/// found in the document title. A query with a generic-intent marker gives
/// every otherwise unmatched chunk a single match. The score is
/// `matches / words`, floored at `0.1`; chunks with no match are dropped.
/// Words shorter than two characters never match but still count in the
/// denominator.
pub fn keyword_search(query: &str, corpus: &Corpus, top_k: usize) -> Vec<SearchResult> {
    let tokens = query_tokens(query);
    let generic = has_generic_marker(query);
    let documents = corpus.documents_by_id();
    let word_count = query_words(query).len().max(1) as f64;

    let mut results = Vec::new();

    for chunk in &corpus.chunks {
        let Some(document) = documents.get(chunk.document_id.as_str()) else {
            continue;
        };

        let content = chunk.content.to_lowercase();
        let title = document.title.to_lowercase();
        let mut matches = tokens
            .iter()
            .map(|t| usize::from(content.contains(t.as_str())) + usize::from(title.contains(t.as_str())))
            .sum::<usize>();

        if matches == 0 && generic {
            matches = 1;
        }
        if matches == 0 {
            continue;
        }

        let raw = matches as f64 / word_count;
        results.push(SearchResult {
            chunk: chunk.clone(),
            document: (*document).clone(),
            score: raw.max(KEYWORD_SCORE_FLOOR),
            relevance: keyword_relevance(raw),
        });
    }

    sort_and_truncate(results, top_k)
}

fn keyword_relevance(score: f64) -> Relevance {
    if score > KEYWORD_HIGH {
        Relevance::High
    } else if score > KEYWORD_MEDIUM {
        Relevance::Medium
    } else {
        Relevance::Low
    }
}

/// Stable descending sort by score, then truncate.
fn sort_and_truncate(mut results: Vec<SearchResult>, top_k: usize) -> Vec<SearchResult> {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    results.truncate(top_k);
    results
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{ChainedEmbedder, Embedding, EmbeddingSource};
    use crate::store::memory::InMemoryStore;
    use crate::store::test_support::{chunk, document};
    use async_trait::async_trait;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Embedding> {
            Ok(Embedding {
                vector: self.0.clone(),
                source: EmbeddingSource::Provider("fixed".into()),
            })
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Embedding> {
            anyhow::bail!("embedding service down")
        }
    }

    fn embedded(id: &str, doc: &str, index: usize, content: &str, v: Vec<f32>) -> DocumentChunk {
        let mut c = chunk(id, doc, index, content);
        c.embedding = Some(v);
        c
    }

    fn migration_corpus() -> Corpus {
        Corpus::new(
            vec![document("d1", "迁徙指南")],
            vec![chunk("c1", "d1", 0, "候鸟每年秋季南飞越冬")],
        )
    }

    #[tokio::test]
    async fn test_empty_corpus_returns_nothing() {
        let ctx = search(&FixedEmbedder(vec![1.0]), "anything", &Corpus::default(), 5).await;
        assert_eq!(ctx.total_results, 0);
        assert!(ctx.results.is_empty());
        assert_eq!(ctx.strategy, SearchStrategy::EmptyCorpus);

        let docs_only = Corpus::new(vec![document("d1", "one")], Vec::new());
        let ctx = search(&FixedEmbedder(vec![1.0]), "", &docs_only, 5).await;
        assert_eq!(ctx.strategy, SearchStrategy::EmptyCorpus);
    }

    #[tokio::test]
    async fn test_vector_tiers_and_admission() {
        let corpus = Corpus::new(
            vec![document("d1", "one")],
            vec![
                embedded("weak", "d1", 0, "w", vec![0.2, 1.0]),
                embedded("best", "d1", 1, "b", vec![1.0, 0.0]),
                embedded("opposite", "d1", 2, "o", vec![-1.0, 0.05]),
                embedded("slightly-negative", "d1", 3, "n", vec![-0.05, 1.0]),
            ],
        );
        let ctx = search(&FixedEmbedder(vec![1.0, 0.0]), "query", &corpus, 10).await;
        assert_eq!(ctx.strategy, SearchStrategy::Vector);

        let ids: Vec<&str> = ctx.results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["best", "weak", "slightly-negative"]);
        assert_eq!(ctx.results[0].relevance, Relevance::High);
        assert_eq!(ctx.results[1].relevance, Relevance::Medium);
        assert_eq!(ctx.results[2].relevance, Relevance::Low);
        assert!((ctx.results[2].score - VECTOR_SCORE_FLOOR).abs() < 1e-12);
        assert_eq!(ctx.total_results, 3);
    }

    #[tokio::test]
    async fn test_vector_handles_mixed_dimensions() {
        let corpus = Corpus::new(
            vec![document("d1", "one")],
            vec![
                embedded("long", "d1", 0, "a", vec![1.0, 0.0, 9.0]),
                embedded("short", "d1", 1, "b", vec![1.0]),
            ],
        );
        let ctx = search(&FixedEmbedder(vec![1.0, 0.0]), "q", &corpus, 5).await;
        assert_eq!(ctx.strategy, SearchStrategy::Vector);
        assert_eq!(ctx.total_results, 2);
    }

    #[tokio::test]
    async fn test_keyword_fallback_without_embeddings() {
        let corpus = Corpus::new(
            vec![document("d1", "Rust Guide")],
            vec![
                chunk("c1", "d1", 0, "Ownership and borrowing."),
                chunk("c2", "d1", 1, "Cargo builds crates."),
            ],
        );
        let ctx = search(&FixedEmbedder(vec![1.0]), "cargo crates", &corpus, 5).await;
        assert_eq!(ctx.strategy, SearchStrategy::Keyword);
        assert_eq!(ctx.total_results, 1);
        assert_eq!(ctx.results[0].chunk.id, "c2");
        assert!((ctx.results[0].score - 1.0).abs() < 1e-12);
        assert_eq!(ctx.results[0].relevance, Relevance::High);
    }

    #[tokio::test]
    async fn test_keyword_fallback_on_embedder_failure() {
        let corpus = Corpus::new(
            vec![document("d1", "Rust Guide")],
            vec![embedded("c1", "d1", 0, "Ownership rules", vec![1.0, 0.0])],
        );
        let ctx = search(&FailingEmbedder, "ownership", &corpus, 5).await;
        assert_eq!(ctx.strategy, SearchStrategy::Keyword);
        assert_eq!(ctx.total_results, 1);
    }

    #[tokio::test]
    async fn test_generic_question_matches_unrelated_wording() {
        let ctx = search(&FailingEmbedder, "候鸟为什么南飞", &migration_corpus(), 5).await;
        assert_eq!(ctx.total_results, 1);
        let result = &ctx.results[0];
        assert_eq!(result.chunk.id, "c1");
        assert!(matches!(result.relevance, Relevance::High | Relevance::Medium));
        assert!(result.score >= KEYWORD_SCORE_FLOOR);
    }

    #[test]
    fn test_keyword_counts_title_and_content() {
        let corpus = Corpus::new(
            vec![document("d1", "deploy notes")],
            vec![chunk("c1", "d1", 0, "deploy with docker")],
        );
        let results = keyword_search("deploy kubernetes", &corpus, 5);
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 1.0).abs() < 1e-12);
        assert_eq!(results[0].relevance, Relevance::High);
    }

    #[test]
    fn test_keyword_low_tier_and_floor() {
        let corpus = Corpus::new(
            vec![document("d1", "zz")],
            vec![chunk("c1", "d1", 0, "alpha")],
        );
        let results = keyword_search("alpha b1 c2 d3 e4 f5 g6 h7 i8 j9 k0 l1", &corpus, 5);
        assert_eq!(results.len(), 1);
        assert!((results[0].score - KEYWORD_SCORE_FLOOR).abs() < 1e-12);
        assert_eq!(results[0].relevance, Relevance::Low);
    }

    #[test]
    fn test_keyword_short_words_count_toward_denominator() {
        let corpus = Corpus::new(
            vec![document("d1", "notes")],
            vec![chunk("c1", "d1", 0, "rust ownership")],
        );
        let results = keyword_search("what is a rust", &corpus, 5);
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 0.25).abs() < 1e-12);
        assert_eq!(results[0].relevance, Relevance::Low);

        let results = keyword_search("讲 a", &migration_corpus(), 5);
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 0.5).abs() < 1e-12);
        assert_eq!(results[0].relevance, Relevance::Medium);
    }

    #[test]
    fn test_keyword_blank_query_matches_nothing() {
        assert!(keyword_search("", &migration_corpus(), 5).is_empty());
        assert!(keyword_search("a ， b", &migration_corpus(), 5).is_empty());
    }

    #[tokio::test]
    async fn test_blank_query_uses_keyword_path() {
        let ctx = search(&FixedEmbedder(vec![1.0]), "   ", &migration_corpus(), 5).await;
        assert_eq!(ctx.strategy, SearchStrategy::Keyword);
        assert_eq!(ctx.total_results, 0);
    }

    #[test]
    fn test_query_tokens_strip_punctuation() {
        assert_eq!(
            query_tokens("候鸟，迁徙？（指南）Rust！"),
            vec!["候鸟", "迁徙", "指南", "rust"]
        );
    }

    #[test]
    fn test_top_k_truncation_keeps_tie_order() {
        let chunks: Vec<DocumentChunk> = (0..6)
            .map(|i| chunk(&format!("c{}", i), "d1", i, "shared term"))
            .collect();
        let corpus = Corpus::new(vec![document("d1", "x")], chunks);
        let results = keyword_search("shared", &corpus, 3);
        let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["c0", "c1", "c2"]);
    }

    #[test]
    fn test_orphan_chunks_are_skipped() {
        let corpus = Corpus::new(
            vec![document("d1", "x")],
            vec![embedded("c1", "gone", 0, "shared", vec![1.0])],
        );
        assert!(keyword_search("shared", &corpus, 5).is_empty());
        assert!(matches!(
            rank_by_vector(&[1.0], &corpus, 5),
            Err(SearchError::NoEmbeddings)
        ));
    }

    #[tokio::test]
    async fn test_search_store_with_fallback_embeddings() {
        let store = InMemoryStore::new();
        let embedder = ChainedEmbedder::local();
        let mut c = chunk("c1", "d1", 0, "rust ownership and borrowing");
        c.embedding = Some(embedder.embed(&c.content).await.unwrap().vector);
        store
            .add_document(&document("d1", "rust"), &[c])
            .await
            .unwrap();

        let ctx = search_store(&store, &embedder, "rust ownership", 5).await;
        assert_eq!(ctx.strategy, SearchStrategy::Vector);
        assert_eq!(ctx.total_results, 1);
        assert!(ctx.results[0].score > 0.3);
    }

    struct UnreadableStore;

    #[async_trait]
    impl DocumentStore for UnreadableStore {
        async fn add_document(&self, _: &Document, _: &[DocumentChunk]) -> anyhow::Result<()> {
            Ok(())
        }
        async fn delete_document(&self, _: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_document(&self, _: &str) -> anyhow::Result<Option<Document>> {
            Ok(None)
        }
        async fn get_all_documents(&self) -> anyhow::Result<Vec<Document>> {
            anyhow::bail!("disk unavailable")
        }
        async fn get_all_chunks(&self) -> anyhow::Result<Vec<DocumentChunk>> {
            anyhow::bail!("disk unavailable")
        }
        async fn get_document_count(&self) -> anyhow::Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_search_store_read_failure_is_distinguishable() {
        let ctx = search_store(&UnreadableStore, &ChainedEmbedder::local(), "rust", 5).await;
        assert_eq!(ctx.strategy, SearchStrategy::StoreUnavailable);
        assert_eq!(ctx.total_results, 0);
        assert!(ctx.results.is_empty());

        let empty = search_store(&InMemoryStore::new(), &ChainedEmbedder::local(), "rust", 5).await;
        assert_eq!(empty.strategy, SearchStrategy::EmptyCorpus);
    }
}
