//! # docrag core
//!
//! Runtime-agnostic logic for docrag: data models, vector math, the
//! document chunker, the embedding chain with its local fallback, the
//! store abstraction, and the retrieval algorithm.
//!
//! This crate contains no tokio, sqlx, HTTP client, or filesystem I/O.
//! Concrete embedding providers and persistent stores live in the `docrag`
//! app crate and plug in through [`embedding::EmbeddingProvider`] and
//! [`store::DocumentStore`].

pub mod chunk;
pub mod document;
pub mod embedding;
pub mod ingest;
pub mod models;
pub mod prompt;
pub mod search;
pub mod store;
pub mod vector;
