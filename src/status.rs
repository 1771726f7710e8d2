use anyhow::Result;

use crate::config::Config;

fn env_state(name: &str) -> &'static str {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => "SET",
        _ => "MISSING",
    }
}

/// `srag check`: print the effective configuration and which credentials
/// are present. Never prints secret values.
pub fn run_check(config: &Config) -> Result<()> {
    println!("config OK");
    println!();

    println!("{:<12} {:<10} DETAIL", "COMPONENT", "SETTING");
    let model = config.embedding.model.as_deref().unwrap_or("-");
    println!(
        "{:<12} {:<10} model={} dims={}",
        "embedding",
        config.embedding.provider,
        model,
        config.embedding.dims.unwrap_or(0)
    );
    println!(
        "{:<12} {:<10} url={}",
        "store",
        config.store.backend,
        config.store.url.as_deref().unwrap_or("-")
    );
    println!(
        "{:<12} {:<10} threshold={} fallback_score={} min_per_context={}",
        "retrieval",
        config.retrieval.escalation,
        config.retrieval.similarity_threshold,
        config.retrieval.fallback_score,
        config.retrieval.min_per_context
    );
    println!();

    let mut vars: Vec<&str> = Vec::new();
    if config.embedding.is_enabled() {
        vars.push(&config.embedding.api_key_env);
    }
    match config.store.backend.as_str() {
        "postgres" => {
            vars.push(&config.store.caller_database_url_env);
            vars.push(&config.store.elevated_database_url_env);
        }
        _ => {
            vars.push(&config.store.anon_key_env);
            vars.push(&config.store.service_key_env);
            vars.push(&config.store.access_token_env);
        }
    }

    println!("{:<32} STATUS", "ENVIRONMENT");
    for var in vars {
        println!("{:<32} {}", var, env_state(var));
    }

    Ok(())
}
