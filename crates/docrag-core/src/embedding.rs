//! Embedding provider trait and the fallback chain.
//!
//! An [`EmbeddingProvider`] is one remote (or otherwise fallible) source of
//! vectors. An [`Embedder`] is what the rest of docrag talks to: it always
//! yields a vector and reports where it came from.
//!
//! [`ChainedEmbedder`] tries its providers in order and ends with
//! [`generate_fallback_embedding`](crate::vector::generate_fallback_embedding),
//! so ingestion and search keep working without credentials or network.
//!
//! Concrete HTTP providers live in the `docrag` app crate.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::vector::generate_fallback_embedding;

/// Why a single provider could not produce a vector.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
    #[error("expected {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// A single embedding backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short identifier used in logs and in [`EmbeddingSource::Provider`].
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Where an [`Embedding`] came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum EmbeddingSource {
    Provider(String),
    Fallback,
}

impl EmbeddingSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, EmbeddingSource::Fallback)
    }
}

impl std::fmt::Display for EmbeddingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingSource::Provider(name) => write!(f, "{}", name),
            EmbeddingSource::Fallback => f.write_str("fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub source: EmbeddingSource,
}

/// Turns text into a vector for ingestion and search.
///
/// Errors are allowed by the signature so that test doubles and strict
/// embedders can model failure; [`ChainedEmbedder`] never returns one.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Embedding>;
}

/// Ordered provider chain terminated by the local fallback.
pub struct ChainedEmbedder {
    providers: Vec<Box<dyn EmbeddingProvider>>,
}

impl ChainedEmbedder {
    pub fn new(providers: Vec<Box<dyn EmbeddingProvider>>) -> Self {
        Self { providers }
    }

    /// A chain with no providers; every call uses the local fallback.
    pub fn local() -> Self {
        Self::new(Vec::new())
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}

#[async_trait]
impl Embedder for ChainedEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Embedding> {
        for provider in &self.providers {
            match provider.embed(text).await {
                Ok(vector) if !vector.is_empty() => {
                    debug!(provider = provider.name(), dims = vector.len(), "embedded text");
                    return Ok(Embedding {
                        vector,
                        source: EmbeddingSource::Provider(provider.name().to_string()),
                    });
                }
                Ok(_) => {
                    warn!(provider = provider.name(), "provider returned an empty vector");
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "embedding provider failed");
                }
            }
        }

        if !self.providers.is_empty() {
            warn!("all embedding providers failed, using local fallback embedding");
        }
        Ok(Embedding {
            vector: generate_fallback_embedding(text),
            source: EmbeddingSource::Fallback,
        })
    }
}
