use anyhow::{bail, Result};

use crate::config::Config;
use crate::embedding;

/// `srag embed`: embed one text and print the vector.
pub async fn run_embed(config: &Config, text: &str, json: bool) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let vector = provider.embed(text).await?;

    if json {
        println!("{}", serde_json::to_string(&vector)?);
        return Ok(());
    }

    println!("embed");
    println!("  model: {}", provider.model_name());
    println!("  dims: {}", vector.len());
    if vector.len() != provider.dims() {
        println!("  warning: configured dims is {}", provider.dims());
    }
    println!("  preview: {}", preview(&vector, 8));
    Ok(())
}

fn preview(vector: &[f32], n: usize) -> String {
    let head: Vec<String> = vector.iter().take(n).map(|v| format!("{:.4}", v)).collect();
    if vector.len() > n {
        format!("[{}, ...]", head.join(", "))
    } else {
        format!("[{}]", head.join(", "))
    }
}
