//! # docchat
//!
//! A retrieval-augmented document chat engine. Documents uploaded into a
//! conversation scope are segmented into section-tagged chunks, embedded
//! with a deterministic local feature-hashing scheme, and retrieved with
//! brute-force cosine similarity — no external embedding service and no
//! vector database. Answers come from an OpenAI-compatible chat-completions
//! endpoint behind a degradation-ladder retry policy, cited with
//! keyword-density snippets.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────┐   ┌───────────────┐
//! │ Uploads  │──▶│ Extract → Segment │──▶│  SQLite rows   │
//! │ txt/pdf/ │   │  → Embed (hash)   │   │ + VectorIndex  │
//! │ docx     │   └───────────────────┘   └───────┬───────┘
//! └──────────┘                                   │
//!                      ┌─────────────────────────┤
//!                      ▼                         ▼
//!                 ┌──────────┐             ┌──────────┐
//!                 │   CLI    │             │   HTTP   │
//!                 │(docchat) │             │  (axum)  │
//!                 └──────────┘             └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`segment`] | Section-aware word chunking |
//! | [`embedding`] | Deterministic feature-hash embeddings |
//! | [`index`] | Partitioned in-memory cosine index |
//! | [`snippet`] | Keyword-density snippet extraction |
//! | [`extract`] | Plain-text extraction (txt, md, PDF, DOCX) |
//! | [`generate`] | Completion client and generation outcomes |
//! | [`chat`] | Retrieval orchestration and the retry ladder |
//! | [`ingest`] | Document ingestion pipeline and cascades |
//! | [`store`] | SQLite persistence collaborators |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`server`] | HTTP JSON API |

pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod segment;
pub mod server;
pub mod snippet;
pub mod store;
