//! Error types for retrieval.
//!
//! [`StoreError`] describes why a single store call failed and is what the
//! fallback engine inspects to pick the next tier. [`RagError`] is what
//! callers of the public entry points see.

use std::time::Duration;

use thiserror::Error;

/// Failure of one call against a [`ChunkStore`](crate::store::ChunkStore).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// The store's row-level access rules rejected the caller's identity.
    #[error("rejected by access policy: {0}")]
    PolicyRejection(String),

    /// A similarity procedure is missing or errored for reasons other than policy.
    #[error("procedure {procedure} unavailable: {message}")]
    ProcedureUnavailable { procedure: String, message: String },

    /// A plain table read failed.
    #[error("query failed: {0}")]
    Query(String),

    /// The call did not complete within the configured deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors surfaced by embedding and retrieval operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// A required credential or setting is missing. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The embedding provider answered with a non-success status, or could
    /// not be reached at all (`status` is `None`).
    #[error("embedding provider error{}: {body}", status_suffix(.status))]
    Provider { status: Option<u16>, body: String },

    /// Caller-supplied input is unusable (empty text, malformed context).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The final, non-ranked fallback tier failed for one scope.
    #[error("retrieval failed for {scope}: {source}")]
    Retrieval {
        scope: String,
        #[source]
        source: StoreError,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_includes_status_when_known() {
        let err = RagError::Provider {
            status: Some(401),
            body: "{\"error\":\"bad key\"}".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "embedding provider error (401): {\"error\":\"bad key\"}"
        );
    }

    #[test]
    fn provider_error_without_status() {
        let err = RagError::Provider {
            status: None,
            body: "connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "embedding provider error: connection refused");
    }

    #[test]
    fn retrieval_error_names_scope_and_cause() {
        let err = RagError::Retrieval {
            scope: "knowledgeBase:kb-1".to_string(),
            source: StoreError::Query("relation does not exist".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "retrieval failed for knowledgeBase:kb-1: query failed: relation does not exist"
        );
    }
}
