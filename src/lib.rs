//! # Scoped RAG
//!
//! Multi-context retrieval over a hosted chunk store.
//!
//! A query is embedded once, then answered from any mix of documents,
//! projects, and knowledge bases. Each context is searched with its own
//! similarity procedure; when that is denied or missing the search is
//! retried with elevated privilege, and as a last resort unranked chunks
//! are returned with a fixed placeholder score. Results from all contexts
//! are merged, deduplicated, and ranked.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │  Embedding   │──▶│  Multi-context   │──▶│   ChunkStore     │
//! │  (OpenAI)    │   │  aggregator      │   │ PostgREST / PG   │
//! └──────────────┘   └────────┬─────────┘   └──────────────────┘
//!                             ▼
//!                      ┌─────────────┐
//!                      │ CLI (srag)  │
//!                      └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! srag check
//! srag embed "hvac tune-up pricing"
//! srag search "hvac tune-up pricing" --context project:site --context kb:hvac
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding provider implementations |
//! | [`supabase`] | PostgREST chunk store |
//! | [`pg_store`] | Direct Postgres chunk store |
//! | [`db`] | Database connection |
//! | [`search`] | Retrieval entry points and `srag search` |
//! | [`embed_cmd`] | `srag embed` |
//! | [`status`] | `srag check` |
//! | [`logging`] | Tracing subscriber setup |

pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod logging;
pub mod pg_store;
pub mod search;
pub mod status;
pub mod supabase;
