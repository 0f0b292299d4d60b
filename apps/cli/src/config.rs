//! Configuration layering for the command line.
//!
//! A JSON file (optional) is read first, then `VARLENS_*` environment
//! variables, then command-line flags. Each layer only touches what it names.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use varlens_integration::PipelineConfig;

pub const ENV_CACHE_DIR: &str = "VARLENS_CACHE_DIR";
pub const ENV_CACHE_ENABLED: &str = "VARLENS_CACHE_ENABLED";
pub const ENV_OUTPUT_DIR: &str = "VARLENS_OUTPUT_DIR";
pub const ENV_RUN_TIMEOUT_SECS: &str = "VARLENS_RUN_TIMEOUT_SECS";
pub const ENV_WORKERS: &str = "VARLENS_WORKERS";

pub fn load(file: Option<&Path>) -> Result<PipelineConfig> {
    let config = match file {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    apply_env(config, |key| std::env::var(key).ok())
}

/// Apply environment overrides read through `var`.
pub fn apply_env(
    mut config: PipelineConfig,
    var: impl Fn(&str) -> Option<String>,
) -> Result<PipelineConfig> {
    if let Some(dir) = var(ENV_CACHE_DIR) {
        config.acquisition.cache.directory = PathBuf::from(dir);
    }
    if let Some(enabled) = parse(&var, ENV_CACHE_ENABLED)? {
        config.acquisition.cache.enabled = enabled;
    }
    if let Some(dir) = var(ENV_OUTPUT_DIR) {
        config.output_dir = PathBuf::from(dir);
    }
    if let Some(secs) = parse(&var, ENV_RUN_TIMEOUT_SECS)? {
        config.run_timeout_secs = Some(secs);
    }
    if let Some(workers) = parse(&var, ENV_WORKERS)? {
        config.worker_pool_size = workers;
    }
    Ok(config)
}

fn parse<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(key)
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{} has an invalid value '{}'", key, raw))
        })
        .transpose()
}
