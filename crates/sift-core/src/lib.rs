//! sift-core: matching engine for the sift fuzzy finder
//!
//! This crate implements everything between the byte source and the ranked
//! result list. Terminal rendering, key parsing and styling live in the
//! binary and are out of scope here.
//!
//! # Architecture
//!
//! ```text
//! stdin → Ingest → TextArena + CandidateStore ──snapshot──► MatchingEngine
//!                                                              │  workers × chunks
//! UI keystrokes → Pipeline (debounce/narrow/growth) ───────────┤  ChunkCache
//!                                                              ▼
//!                                                       TopK → MatchUpdate
//! ```
//!
//! # Modules
//!
//! - `arena`: append-only byte store for candidate text
//! - `store`: chunked candidate store, snapshots, façade
//! - `score`: byte-oriented fuzzy scorer and highlight pass
//! - `rank`: packed ordering keys and the bounded top-K merger
//! - `cache`: per-chunk, per-token result memo
//! - `engine`: parallel matching over snapshot partitions
//! - `pipeline`: query debouncing, incremental narrowing, growth reruns
//! - `ingest`: byte-chunk reader and line splitter
//! - `config`: sift.toml configuration
//! - `logging`: tracing setup
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod arena;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod rank;
pub mod score;
pub mod store;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
