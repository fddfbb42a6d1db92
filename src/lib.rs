//! # docrag
//!
//! Document retrieval for retrieval-augmented chat.
//!
//! Uploaded documents are split into overlapping chunks, each chunk is
//! embedded (remote provider chain with a deterministic local fallback), and
//! everything is kept in a [`docrag_core::store::DocumentStore`]. A query is
//! answered by cosine ranking over chunk embeddings, degrading to keyword
//! matching when the vector path fails.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────────┐
//! │  Upload  │──▶│ Chunk+Embed  │──▶│ Store          │
//! │ txt / md │   │ (core)       │   │ SQLite / JSON  │
//! └──────────┘   └──────────────┘   └───────┬────────┘
//!                                           │
//!                       ┌───────────────────┤
//!                       ▼                   ▼
//!                  ┌──────────┐       ┌──────────┐
//!                  │   CLI    │       │   HTTP   │
//!                  └──────────┘       └──────────┘
//! ```
//!
//! The pure parts (vector math, chunking, fallback embeddings, ranking,
//! prompt formatting) live in `docrag-core`. This crate adds configuration,
//! persistent stores, HTTP embedding providers, and the CLI and server
//! surfaces.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite document store |
//! | [`json_store`] | Single-file JSON document store |
//! | [`embedding`] | HTTP embedding providers |
//! | [`service`] | Store + embedder composition |
//! | [`documents`] | `add`, `list`, `delete` commands |
//! | [`search`] | `search` and `context` commands |
//! | [`embed_cmd`] | `embed` command |
//! | [`server`] | HTTP server |

pub mod config;
pub mod db;
pub mod documents;
pub mod embed_cmd;
pub mod embedding;
pub mod json_store;
pub mod migrate;
pub mod search;
pub mod server;
pub mod service;
pub mod sqlite_store;
