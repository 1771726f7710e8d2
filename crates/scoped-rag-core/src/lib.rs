//! # Scoped RAG Core
//!
//! Runtime-agnostic retrieval logic for scoped-rag: data models, the
//! error taxonomy, the [`store::ChunkStore`] and
//! [`embedding::EmbeddingProvider`] traits, the three-tier
//! [`retriever::ScopedChunkRetriever`], and the
//! [`aggregate::MultiContextAggregator`].
//!
//! This crate contains no tokio, HTTP client, or SQL driver. Concrete
//! embedding providers and store backends live in the `scoped-rag` app
//! crate; [`store::memory::InMemoryStore`] is provided here for tests.
//!
//! ```text
//!  contexts ──▶ MultiContextAggregator ──▶ ScopedChunkRetriever (×N, concurrent)
//!                      │                        │ tier 1: match_* as caller
//!                      │                        │ tier 2: match_* elevated
//!                      │                        │ tier 3: member docs → unranked chunks
//!                      ▼                        ▼
//!               dedupe → sort → truncate    ChunkStore
//! ```

pub mod aggregate;
pub mod embedding;
pub mod error;
pub mod models;
pub mod privilege;
pub mod retriever;
pub mod scope;
pub mod store;

pub use aggregate::{per_context_limit, ContextOutcome, MultiContextAggregator};
pub use error::{RagError, StoreError};
pub use models::{ChunkResult, ContextRef, MatchedChunk, ScopeKind, StoredChunk};
pub use privilege::{
    AlwaysEscalate, EscalateOnPolicyRejection, NeverEscalate, Privilege,
    PrivilegeEscalationPolicy,
};
pub use retriever::{RetrievalParams, ScopedChunkRetriever};
pub use store::{ChunkStore, MatchCall};
