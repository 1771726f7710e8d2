//! Supabase / PostgREST-backed [`ChunkStore`] implementation.
//!
//! Similarity procedures are invoked as `POST /rest/v1/rpc/{procedure}`;
//! fallback reads are plain `GET /rest/v1/{table}` requests with PostgREST
//! filters.
//!
//! # Privileges
//!
//! | Privilege | `apikey` header | `Authorization` |
//! |-----------|-----------------|-----------------|
//! | `Caller` | anon key | caller's access token, or the anon key |
//! | `Elevated` | service-role key | service-role key |
//!
//! # Error Mapping
//!
//! | Response | [`StoreError`] |
//! |----------|----------------|
//! | 401, 403, or Postgres code `42501` | `PolicyRejection` |
//! | any other RPC failure (404, `PGRST202`, 5xx, ...) | `ProcedureUnavailable` |
//! | any other table failure | `Query` |
//! | client timeout | `Timeout` |
//!
//! # Tables
//!
//! `documents (id, title, knowledge_base_id, deleted_at)`,
//! `document_chunks (id, document_id, content, embedding)`,
//! `projects (id, knowledge_base_id)`, `project_documents (project_id, document_id)`.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use scoped_rag_core::embedding::format_vector_literal;
use scoped_rag_core::error::StoreError;
use scoped_rag_core::models::{MatchedChunk, StoredChunk};
use scoped_rag_core::privilege::Privilege;
use scoped_rag_core::store::{ChunkStore, MatchCall};

use crate::config::StoreConfig;

/// Credentials for the two privilege levels.
#[derive(Debug, Clone, Default)]
pub struct SupabaseKeys {
    pub anon_key: Option<String>,
    pub service_key: Option<String>,
    pub access_token: Option<String>,
}

impl SupabaseKeys {
    /// Read keys from the environment variables named in `[store]`.
    pub fn from_env(config: &StoreConfig) -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            anon_key: var(&config.anon_key_env),
            service_key: var(&config.service_key_env),
            access_token: var(&config.access_token_env),
        }
    }
}

/// PostgREST implementation of the [`ChunkStore`] trait.
pub struct SupabaseStore {
    client: reqwest::Client,
    base_url: String,
    keys: SupabaseKeys,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct DocumentIdRow {
    document_id: String,
}

#[derive(Deserialize)]
struct IdRow {
    id: String,
}

#[derive(Deserialize)]
struct KnowledgeBaseRow {
    knowledge_base_id: Option<String>,
}

#[derive(Deserialize)]
struct ChunkRow {
    id: String,
    content: String,
    document_id: String,
    #[serde(default)]
    documents: Option<TitleRow>,
}

#[derive(Deserialize)]
struct TitleRow {
    title: Option<String>,
}

/// What kind of endpoint failed, for error classification.
#[derive(Clone, Copy)]
enum Endpoint<'a> {
    Procedure(&'a str),
    Table,
}

impl SupabaseStore {
    pub fn new(base_url: &str, keys: SupabaseKeys, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            keys,
            timeout,
        })
    }

    /// Build a store from `[store]` config, reading keys from the environment.
    pub fn from_config(config: &StoreConfig) -> anyhow::Result<Self> {
        let url = config
            .url
            .as_deref()
            .context("store.url required for supabase backend")?;
        Self::new(
            url,
            SupabaseKeys::from_env(config),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn authorize(&self, req: RequestBuilder, privilege: Privilege) -> Result<RequestBuilder, StoreError> {
        match privilege {
            Privilege::Caller => {
                let anon = self.keys.anon_key.as_deref().ok_or_else(|| {
                    StoreError::PolicyRejection("no anon key configured for caller access".to_string())
                })?;
                let bearer = self.keys.access_token.as_deref().unwrap_or(anon);
                Ok(req.header("apikey", anon).bearer_auth(bearer))
            }
            Privilege::Elevated => {
                let service = self.keys.service_key.as_deref().ok_or_else(|| {
                    StoreError::PolicyRejection("no service-role key configured".to_string())
                })?;
                Ok(req.header("apikey", service).bearer_auth(service))
            }
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        privilege: Privilege,
        endpoint: Endpoint<'_>,
    ) -> Result<T, StoreError> {
        let response = self
            .authorize(req, privilege)?
            .send()
            .await
            .map_err(|e| self.transport_error(e, endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, &body, endpoint));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| self.transport_error(e, endpoint))
    }

    fn transport_error(&self, e: reqwest::Error, endpoint: Endpoint<'_>) -> StoreError {
        if e.is_timeout() {
            return StoreError::Timeout(self.timeout);
        }
        match endpoint {
            Endpoint::Procedure(procedure) => StoreError::ProcedureUnavailable {
                procedure: procedure.to_string(),
                message: e.to_string(),
            },
            Endpoint::Table => StoreError::Query(e.to_string()),
        }
    }

    async fn get_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
        privilege: Privilege,
    ) -> Result<Vec<T>, StoreError> {
        let req = self
            .client
            .get(format!("{}/rest/v1/{}", self.base_url, table))
            .query(query);
        self.send(req, privilege, Endpoint::Table).await
    }
}

/// Map a failed PostgREST response to a [`StoreError`].
fn classify(status: StatusCode, body: &str, endpoint: Endpoint<'_>) -> StoreError {
    let parsed: Option<PostgrestError> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|p| p.code.clone()).unwrap_or_default();
    let message = parsed
        .and_then(|p| p.message)
        .unwrap_or_else(|| body.to_string());
    let detail = format!("{}: {}", status, message);

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN || code == "42501" {
        return StoreError::PolicyRejection(detail);
    }

    match endpoint {
        Endpoint::Procedure(procedure) => StoreError::ProcedureUnavailable {
            procedure: procedure.to_string(),
            message: if code.is_empty() {
                detail
            } else {
                format!("{} ({})", detail, code)
            },
        },
        Endpoint::Table => StoreError::Query(detail),
    }
}

/// Document ids per `in.(...)` filter; larger sets are read in several
/// requests so the query string stays short.
const IN_FILTER_BATCH: usize = 100;

/// PostgREST `in.(...)` filter value with each id double-quoted.
fn in_filter(ids: &[String]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

#[async_trait]
impl ChunkStore for SupabaseStore {
    async fn match_chunks(
        &self,
        call: &MatchCall<'_>,
        privilege: Privilege,
    ) -> Result<Vec<MatchedChunk>, StoreError> {
        let mut body = serde_json::Map::new();
        body.insert(call.scope_param.to_string(), call.scope_id.into());
        body.insert(
            "query_embedding".to_string(),
            format_vector_literal(call.embedding).into(),
        );
        body.insert("match_threshold".to_string(), call.threshold.into());
        body.insert("match_count".to_string(), call.limit.into());

        debug!(procedure = call.procedure, scope_id = call.scope_id, %privilege, "calling similarity procedure");

        let req = self
            .client
            .post(format!("{}/rest/v1/rpc/{}", self.base_url, call.procedure))
            .json(&body);
        self.send(req, privilege, Endpoint::Procedure(call.procedure))
            .await
    }

    async fn project_document_ids(
        &self,
        project_id: &str,
        privilege: Privilege,
    ) -> Result<Vec<String>, StoreError> {
        let rows: Vec<DocumentIdRow> = self
            .get_rows(
                "project_documents",
                &[
                    ("select", "document_id".to_string()),
                    ("project_id", format!("eq.{}", project_id)),
                ],
                privilege,
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.document_id).collect())
    }

    async fn project_knowledge_base(
        &self,
        project_id: &str,
        privilege: Privilege,
    ) -> Result<Option<String>, StoreError> {
        let rows: Vec<KnowledgeBaseRow> = self
            .get_rows(
                "projects",
                &[
                    ("select", "knowledge_base_id".to_string()),
                    ("id", format!("eq.{}", project_id)),
                    ("limit", "1".to_string()),
                ],
                privilege,
            )
            .await?;
        Ok(rows.into_iter().next().and_then(|r| r.knowledge_base_id))
    }

    async fn knowledge_base_document_ids(
        &self,
        knowledge_base_id: &str,
        privilege: Privilege,
    ) -> Result<Vec<String>, StoreError> {
        let rows: Vec<IdRow> = self
            .get_rows(
                "documents",
                &[
                    ("select", "id,document_chunks!inner(id)".to_string()),
                    ("knowledge_base_id", format!("eq.{}", knowledge_base_id)),
                    ("deleted_at", "is.null".to_string()),
                    ("document_chunks.embedding", "not.is.null".to_string()),
                    ("document_chunks.limit", "1".to_string()),
                ],
                privilege,
            )
            .await?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }

    async fn embedded_chunks(
        &self,
        document_ids: &[String],
        limit: i64,
        privilege: Privilege,
    ) -> Result<Vec<StoredChunk>, StoreError> {
        if document_ids.is_empty() || limit <= 0 {
            return Ok(Vec::new());
        }

        let mut chunks = Vec::new();
        for batch in document_ids.chunks(IN_FILTER_BATCH) {
            let remaining = limit - chunks.len() as i64;
            if remaining <= 0 {
                break;
            }
            let rows: Vec<ChunkRow> = self
                .get_rows(
                    "document_chunks",
                    &[
                        ("select", "id,content,document_id,documents(title)".to_string()),
                        ("document_id", in_filter(batch)),
                        ("embedding", "not.is.null".to_string()),
                        ("limit", remaining.to_string()),
                    ],
                    privilege,
                )
                .await?;

            chunks.extend(rows.into_iter().map(|r| StoredChunk {
                id: r.id,
                content: r.content,
                document_id: r.document_id,
                document_title: r.documents.and_then(|d| d.title),
            }));
        }

        Ok(chunks)
    }
}
