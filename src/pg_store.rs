//! Direct Postgres [`ChunkStore`] implementation.
//!
//! Holds two pools: one connected as the caller's role (row-level security
//! applies) and an optional one connected as a role that bypasses it. The
//! similarity procedures are called as set-returning functions and each
//! row is decoded through `to_jsonb`, so procedures may return extra
//! columns or omit `document_title`.
//!
//! | SQLSTATE | [`StoreError`] |
//! |----------|----------------|
//! | `42501` (insufficient privilege) | `PolicyRejection` |
//! | anything else from a procedure | `ProcedureUnavailable` |
//! | anything else from a table read | `Query` |
//!
//! Every statement runs under `store.timeout_secs`.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::debug;

use scoped_rag_core::embedding::format_vector_literal;
use scoped_rag_core::error::StoreError;
use scoped_rag_core::models::{MatchedChunk, StoredChunk};
use scoped_rag_core::privilege::Privilege;
use scoped_rag_core::store::{ChunkStore, MatchCall};

use crate::config::StoreConfig;
use crate::db;

pub struct PgStore {
    caller: PgPool,
    elevated: Option<PgPool>,
    timeout: Duration,
}

#[derive(Clone, Copy)]
enum Endpoint<'a> {
    Procedure(&'a str),
    Table,
}

impl PgStore {
    pub fn new(caller: PgPool, elevated: Option<PgPool>, timeout: Duration) -> Self {
        Self {
            caller,
            elevated,
            timeout,
        }
    }

    /// Connect both pools from the environment variables named in `[store]`.
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        let caller = db::connect(config, &config.caller_database_url_env)
            .await?
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "{} must be set for the postgres backend",
                    config.caller_database_url_env
                )
            })?;
        let elevated = db::connect(config, &config.elevated_database_url_env).await?;
        if elevated.is_none() {
            debug!(
                env = %config.elevated_database_url_env,
                "no elevated connection configured; escalation will be rejected"
            );
        }

        Ok(Self::new(
            caller,
            elevated,
            Duration::from_secs(config.timeout_secs),
        ))
    }

    fn pool(&self, privilege: Privilege) -> Result<&PgPool, StoreError> {
        match privilege {
            Privilege::Caller => Ok(&self.caller),
            Privilege::Elevated => self.elevated.as_ref().ok_or_else(|| {
                StoreError::PolicyRejection("no elevated connection configured".to_string())
            }),
        }
    }

    async fn timed<T, F>(&self, endpoint: Endpoint<'_>, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| classify(&e, endpoint)),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}

fn classify(err: &sqlx::Error, endpoint: Endpoint<'_>) -> StoreError {
    let code = match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    };

    if code.as_deref() == Some("42501") {
        return StoreError::PolicyRejection(err.to_string());
    }
    if matches!(err, sqlx::Error::PoolTimedOut) {
        return StoreError::Query(format!("connection pool timed out: {}", err));
    }

    match endpoint {
        Endpoint::Procedure(procedure) => StoreError::ProcedureUnavailable {
            procedure: procedure.to_string(),
            message: match code {
                Some(code) => format!("{} ({})", err, code),
                None => err.to_string(),
            },
        },
        Endpoint::Table => StoreError::Query(err.to_string()),
    }
}

/// Procedure and parameter names come from a fixed set; anything else is
/// refused before it reaches SQL text.
fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Similarity call in named notation, matching the argument names the
/// PostgREST backend sends.
fn procedure_sql(call: &MatchCall<'_>) -> Result<String, StoreError> {
    for name in [call.procedure, call.scope_param] {
        if !is_identifier(name) {
            return Err(StoreError::ProcedureUnavailable {
                procedure: call.procedure.to_string(),
                message: format!("invalid identifier: {}", name),
            });
        }
    }
    Ok(format!(
        "SELECT to_jsonb(m) AS row FROM {}({} => $1, query_embedding => $2::vector, \
         match_threshold => $3, match_count => $4) m",
        call.procedure, call.scope_param
    ))
}

/// `match_count` is an `int` argument; larger budgets saturate.
fn match_count(limit: i64) -> i32 {
    i32::try_from(limit.max(0)).unwrap_or(i32::MAX)
}

#[async_trait]
impl ChunkStore for PgStore {
    async fn match_chunks(
        &self,
        call: &MatchCall<'_>,
        privilege: Privilege,
    ) -> Result<Vec<MatchedChunk>, StoreError> {
        let sql = procedure_sql(call)?;
        let pool = self.pool(privilege)?;
        let endpoint = Endpoint::Procedure(call.procedure);

        debug!(procedure = call.procedure, scope_id = call.scope_id, %privilege, "calling similarity procedure");

        let rows = self
            .timed(
                endpoint,
                sqlx::query(&sql)
                    .bind(call.scope_id)
                    .bind(format_vector_literal(call.embedding))
                    .bind(call.threshold)
                    .bind(match_count(call.limit))
                    .fetch_all(pool),
            )
            .await?;

        rows.iter()
            .map(|row| {
                let value: serde_json::Value =
                    row.try_get("row").map_err(|e| classify(&e, endpoint))?;
                serde_json::from_value(value).map_err(|e| StoreError::ProcedureUnavailable {
                    procedure: call.procedure.to_string(),
                    message: format!("unexpected row shape: {}", e),
                })
            })
            .collect()
    }

    async fn project_document_ids(
        &self,
        project_id: &str,
        privilege: Privilege,
    ) -> Result<Vec<String>, StoreError> {
        let pool = self.pool(privilege)?;
        self.timed(
            Endpoint::Table,
            sqlx::query_scalar::<_, String>(
                "SELECT document_id::text FROM project_documents WHERE project_id::text = $1",
            )
            .bind(project_id)
            .fetch_all(pool),
        )
        .await
    }

    async fn project_knowledge_base(
        &self,
        project_id: &str,
        privilege: Privilege,
    ) -> Result<Option<String>, StoreError> {
        let pool = self.pool(privilege)?;
        let row = self
            .timed(
                Endpoint::Table,
                sqlx::query_scalar::<_, Option<String>>(
                    "SELECT knowledge_base_id::text FROM projects WHERE id::text = $1 LIMIT 1",
                )
                .bind(project_id)
                .fetch_optional(pool),
            )
            .await?;
        Ok(row.flatten())
    }

    async fn knowledge_base_document_ids(
        &self,
        knowledge_base_id: &str,
        privilege: Privilege,
    ) -> Result<Vec<String>, StoreError> {
        let pool = self.pool(privilege)?;
        self.timed(
            Endpoint::Table,
            sqlx::query_scalar::<_, String>(
                r#"
                SELECT d.id::text
                FROM documents d
                WHERE d.knowledge_base_id::text = $1
                  AND d.deleted_at IS NULL
                  AND EXISTS (
                      SELECT 1 FROM document_chunks c
                      WHERE c.document_id = d.id AND c.embedding IS NOT NULL
                  )
                "#,
            )
            .bind(knowledge_base_id)
            .fetch_all(pool),
        )
        .await
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
        let pool = self.pool(privilege)?;
        let rows = self
            .timed(
                Endpoint::Table,
                sqlx::query(
                    r#"
                    SELECT c.id::text AS id, c.content, c.document_id::text AS document_id,
                           d.title AS document_title
                    FROM document_chunks c
                    LEFT JOIN documents d ON d.id = c.document_id
                    WHERE c.document_id::text = ANY($1) AND c.embedding IS NOT NULL
                    LIMIT $2
                    "#,
                )
                .bind(document_ids)
                .bind(limit)
                .fetch_all(pool),
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(StoredChunk {
                    id: row.try_get("id")?,
                    content: row.try_get("content")?,
                    document_id: row.try_get("document_id")?,
                    document_title: row.try_get("document_title")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| classify(&e, Endpoint::Table))
    }
}
