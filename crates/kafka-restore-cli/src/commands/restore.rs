use anyhow::{bail, Result};
use kafka_restore_core::{Config, RestoreEngine};
use std::path::Path;
use tracing::info;

pub async fn run(config_path: Option<&Path>, format: &str) -> Result<()> {
    let format = format.to_lowercase();
    if format != "text" && format != "json" {
        bail!("Unknown output format '{}', expected text or json", format);
    }

    match config_path {
        Some(path) => info!("Loading configuration from: {}", path.display()),
        None => info!("Loading configuration from environment"),
    }
    let config = Config::load(config_path).await?;

    let engine = RestoreEngine::new(config)?;
    let report = engine.run().await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }

    Ok(())
}
