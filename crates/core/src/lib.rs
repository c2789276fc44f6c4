//! hybridex-core — incremental codebase indexing and dense+sparse hybrid
//! search (spec.md §2).
//!
//! Data flow for indexing: `walker -> hash_cache diff -> chunker ->
//! embedding -> vector_store::insert -> verify -> hash_cache/project_metadata
//! persist` (`controller::IndexController::run`). Data flow for search: `query
//! string -> embedding::embed -> vector_store::hybrid_search_sub_request ->
//! RRF fuse -> results` (`search::HybridSearch::search`).

pub mod chunker;
#[cfg(feature = "treesitter")]
pub mod chunker_ast;
pub mod collection_namer;
pub mod config;
pub mod controller;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod git_identity;
pub mod hash_cache;
pub mod lock;
pub mod logger;
pub mod progress;
pub mod project_metadata;
pub mod retry;
pub mod search;
pub mod types;
pub mod vector_store;
pub mod walker;
