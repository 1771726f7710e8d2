//! Query-level retrieval entry points.
//!
//! A [`RagService`] bundles the embedding provider with the scoped retriever
//! and aggregator. The four `retrieve_*` functions embed the query once and
//! hand the vector to the core; an empty query or an empty context list
//! returns no chunks without calling the provider.
//!
//! Embedding failures are fatal to the whole query. Retrieval failures are
//! fatal for the single-scope entry points and isolated per context for
//! [`retrieve_multi_context`].

use anyhow::{Context, Result};
use tracing::debug;

use scoped_rag_core::aggregate::{ContextOutcome, MultiContextAggregator};
use scoped_rag_core::embedding::EmbeddingProvider;
use scoped_rag_core::error::RagError;
use scoped_rag_core::models::{ChunkResult, ContextRef};
use scoped_rag_core::privilege::{policy_from_name, PrivilegeEscalationPolicy};
use scoped_rag_core::retriever::{RetrievalParams, ScopedChunkRetriever};
use scoped_rag_core::store::ChunkStore;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::pg_store::PgStore;
use crate::supabase::SupabaseStore;

/// Embedding provider plus the aggregator over a boxed store.
pub struct RagService {
    provider: Box<dyn EmbeddingProvider>,
    aggregator: MultiContextAggregator<Box<dyn ChunkStore>>,
}

impl RagService {
    pub fn new(
        provider: Box<dyn EmbeddingProvider>,
        store: Box<dyn ChunkStore>,
        policy: Box<dyn PrivilegeEscalationPolicy>,
        params: RetrievalParams,
    ) -> Self {
        let retriever = ScopedChunkRetriever::new(store)
            .with_policy(policy)
            .with_params(params);
        Self {
            provider,
            aggregator: MultiContextAggregator::new(retriever),
        }
    }

    /// Build the provider, store backend, and escalation policy named in
    /// the config.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let provider = create_provider(&config.embedding)?;

        let store: Box<dyn ChunkStore> = match config.store.backend.as_str() {
            "supabase" => Box::new(SupabaseStore::from_config(&config.store)?),
            "postgres" => Box::new(
                PgStore::from_config(&config.store)
                    .await
                    .context("Failed to open postgres store")?,
            ),
            other => anyhow::bail!("Unknown store backend: {}", other),
        };

        let policy = policy_from_name(&config.retrieval.escalation).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown retrieval.escalation: {}",
                config.retrieval.escalation
            )
        })?;

        Ok(Self::new(provider, store, policy, config.retrieval.params()))
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    pub fn aggregator(&self) -> &MultiContextAggregator<Box<dyn ChunkStore>> {
        &self.aggregator
    }

    async fn embed_query(&self, query: &str) -> Result<Option<Vec<f32>>, RagError> {
        if query.trim().is_empty() {
            return Ok(None);
        }
        let vector = self.provider.embed(query).await?;
        debug!(dims = vector.len(), model = self.provider.model_name(), "query embedded");
        Ok(Some(vector))
    }

    async fn retrieve_scope(
        &self,
        query: &str,
        scope: ContextRef,
        limit: i64,
    ) -> Result<Vec<ChunkResult>, RagError> {
        let Some(embedding) = self.embed_query(query).await? else {
            return Ok(Vec::new());
        };
        self.aggregator
            .retriever()
            .retrieve(&scope, &embedding, limit)
            .await
    }
}

pub async fn retrieve_for_document(
    service: &RagService,
    query: &str,
    document_id: &str,
    limit: i64,
) -> Result<Vec<ChunkResult>, RagError> {
    service
        .retrieve_scope(query, ContextRef::document(document_id), limit)
        .await
}

pub async fn retrieve_for_project(
    service: &RagService,
    query: &str,
    project_id: &str,
    limit: i64,
) -> Result<Vec<ChunkResult>, RagError> {
    service
        .retrieve_scope(query, ContextRef::project(project_id), limit)
        .await
}

pub async fn retrieve_for_knowledge_base(
    service: &RagService,
    query: &str,
    knowledge_base_id: &str,
    limit: i64,
) -> Result<Vec<ChunkResult>, RagError> {
    service
        .retrieve_scope(query, ContextRef::knowledge_base(knowledge_base_id), limit)
        .await
}

/// Retrieve across every context and merge into at most `limit` unique
/// chunks, best first.
pub async fn retrieve_multi_context(
    service: &RagService,
    query: &str,
    contexts: &[ContextRef],
    limit: i64,
) -> Result<Vec<ChunkResult>, RagError> {
    retrieve_multi_context_with_report(service, query, contexts, limit)
        .await
        .map(|(chunks, _)| chunks)
}

/// [`retrieve_multi_context`] plus what each context contributed.
pub async fn retrieve_multi_context_with_report(
    service: &RagService,
    query: &str,
    contexts: &[ContextRef],
    limit: i64,
) -> Result<(Vec<ChunkResult>, Vec<ContextOutcome>), RagError> {
    if contexts.is_empty() || limit <= 0 {
        return Ok((Vec::new(), Vec::new()));
    }
    let Some(embedding) = service.embed_query(query).await? else {
        return Ok((Vec::new(), Vec::new()));
    };
    Ok(service
        .aggregator
        .retrieve_across_with_report(contexts, &embedding, limit)
        .await)
}

/// Render chunks as a numbered prompt context block.
///
/// ```text
/// [1] HVAC Pricing
/// Tune-ups start at $89.
///
/// [2] Untitled
/// ...
/// ```
pub fn format_context_block(chunks: &[ChunkResult]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[{}] {}\n{}",
                i + 1,
                chunk.document_title.as_deref().unwrap_or("Untitled"),
                chunk.content.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// `srag search`: retrieve across the given contexts and print the results.
pub async fn run_search(
    config: &Config,
    query: &str,
    contexts: &[String],
    limit: Option<i64>,
    json: bool,
    explain: bool,
) -> Result<()> {
    let contexts = contexts
        .iter()
        .map(|c| c.parse::<ContextRef>())
        .collect::<Result<Vec<_>, _>>()?;

    if query.trim().is_empty() || contexts.is_empty() {
        if json {
            println!("[]");
        } else {
            println!("No results.");
        }
        return Ok(());
    }

    let service = RagService::from_config(config).await?;
    let limit = limit.unwrap_or(config.retrieval.default_limit);
    let (results, outcomes) =
        retrieve_multi_context_with_report(&service, query, &contexts, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.is_empty() {
        println!("No results.");
    } else {
        for (i, result) in results.iter().enumerate() {
            println!(
                "{}. [{:.2}] {}",
                i + 1,
                result.similarity_score,
                result.document_title.as_deref().unwrap_or("(untitled)")
            );
            println!("    document: {}", result.document_id);
            println!(
                "    excerpt: \"{}\"",
                excerpt(&result.content, 240).replace('\n', " ").trim()
            );
            println!("    id: {}", result.id);
            println!();
        }
    }

    if explain {
        // stderr keeps --json output parseable
        eprintln!("contexts:");
        for outcome in &outcomes {
            match &outcome.error {
                None => eprintln!("  {:<32} {} chunks", outcome.context.to_string(), outcome.chunks),
                Some(e) => eprintln!("  {:<32} failed: {}", outcome.context.to_string(), e),
            }
        }
    }

    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
