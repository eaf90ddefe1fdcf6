//! # askdocs: document Q&A over a local vector index
//!
//! Ingests PDF, CSV and spreadsheet files, splits them into overlapping
//! chunks, embeds them into a SQLite + sqlite-vec store and answers
//! questions with a language model grounded on the retrieved chunks.
//!
//! ## Architecture
//!
//! - **[`config`]**: JSON configuration, defaults, environment overrides
//! - **[`executor`]**: bounded CPU worker pool and blocking I/O offload
//! - **[`parser`]**: content-type dispatch to PDF, CSV and spreadsheet decoders
//! - **[`chunker`]**: fixed-size splitting with exact overlap
//! - **[`embedder`]**: embedding trait, offline hashing and OpenAI-compatible backends
//! - **[`db`]**: vector store schema, bulk writes and cosine search
//! - **[`index`]**: build, extend and reopen a persisted index
//! - **[`retriever`]**: top-k lookup with similarity scores
//! - **[`llm`]**: language model trait, OpenAI-compatible chat and a mock
//! - **[`orchestrator`]**: per-session ingest/ask state machine

pub mod chunker;
pub mod config;
pub mod db;
pub mod embedder;
pub mod executor;
pub mod index;
pub mod llm;
pub mod orchestrator;
pub mod parser;
pub mod retriever;
