// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Environment variables with this prefix override file settings,
/// e.g. `HEALTH__TIMEOUT_MS=2000` or `HEALTH__SERVER__PATH=/ready`.
pub const ENV_PREFIX: &str = "HEALTH";

/// Load settings from a file (YAML or JSON), then apply environment overrides.
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let settings = parse_config(path, &contents)?;
    let settings = apply_env_overrides(settings)?;

    settings.validate()?;
    Ok(settings)
}

fn parse_config(path: &Path, contents: &str) -> Result<Settings> {
    let extension = path.extension().and_then(|s| s.to_str());
    if matches!(extension, Some("yaml") | Some("yml")) {
        serde_yaml::from_str(contents).context("Failed to parse YAML config")
    } else {
        serde_json::from_str(contents).context("Failed to parse JSON config")
    }
}

fn apply_env_overrides(settings: Settings) -> Result<Settings> {
    ::config::Config::builder()
        .add_source(::config::Config::try_from(&settings).context("Failed to layer config")?)
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to apply environment overrides")?
        .try_deserialize()
        .context("Invalid configuration after environment overrides")
}
