use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::StoreConfig;

/// Open a Postgres pool for the connection string held in `url_env`.
///
/// Returns `Ok(None)` when the variable is unset so callers can decide
/// whether the missing role is fatal.
pub async fn connect(config: &StoreConfig, url_env: &str) -> Result<Option<PgPool>> {
    let url = match std::env::var(url_env) {
        Ok(url) if !url.trim().is_empty() => url,
        _ => return Ok(None),
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.timeout_secs))
        .connect(&url)
        .await
        .with_context(|| format!("Failed to connect to database from ${}", url_env))?;

    Ok(Some(pool))
}
