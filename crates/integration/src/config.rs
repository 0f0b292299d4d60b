//! Run configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use varlens_variant_data::provider::gtex::GTEX_TISSUES;
use varlens_variant_data::provider::{gnomad, KNOWN_SOURCES};
use varlens_variant_data::{AcquisitionConfig, Assembly};

use crate::errors::{IntegrationError, Result};
use crate::integration::{AuthorityRanks, ClassificationThresholds};

const DEFAULT_WORKER_POOL_SIZE: usize = 4;
const DEFAULT_RESOLVER_CONCURRENCY: usize = 8;

/// Everything one pipeline run needs to know.
///
/// Every field has a default, so a configuration file only has to name what
/// it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Provider limits, retries, circuit breakers and cache.
    pub acquisition: AcquisitionConfig,
    pub thresholds: ClassificationThresholds,
    pub authority_ranks: AuthorityRanks,
    /// Adapters running at the same time.
    pub worker_pool_size: usize,
    /// Descriptors resolved at the same time.
    pub resolver_concurrency: usize,
    /// Cancel outstanding work after this long. `None` never times out.
    pub run_timeout_secs: Option<u64>,
    pub assembly: Assembly,
    pub enabled_sources: Vec<String>,
    pub gtex_tissues: Vec<String>,
    pub gnomad_dataset: String,
    pub output_dir: PathBuf,
    /// Refetch every request and overwrite cached responses.
    pub refresh: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            acquisition: AcquisitionConfig::default(),
            thresholds: ClassificationThresholds::default(),
            authority_ranks: AuthorityRanks::default(),
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            resolver_concurrency: DEFAULT_RESOLVER_CONCURRENCY,
            run_timeout_secs: None,
            assembly: Assembly::GRCh38,
            enabled_sources: KNOWN_SOURCES.iter().map(|s| s.to_string()).collect(),
            gtex_tissues: GTEX_TISSUES.iter().map(|t| t.to_string()).collect(),
            gnomad_dataset: gnomad::DEFAULT_DATASET.to_string(),
            output_dir: PathBuf::from("outputs"),
            refresh: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    pub fn is_enabled(&self, source: &str) -> bool {
        self.enabled_sources
            .iter()
            .any(|s| s.eq_ignore_ascii_case(source))
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(IntegrationError::Config(
                "worker_pool_size must be at least 1".to_string(),
            ));
        }
        if self.resolver_concurrency == 0 {
            return Err(IntegrationError::Config(
                "resolver_concurrency must be at least 1".to_string(),
            ));
        }
        if let Some(unknown) = self
            .enabled_sources
            .iter()
            .find(|s| !KNOWN_SOURCES.iter().any(|k| k.eq_ignore_ascii_case(s)))
        {
            return Err(IntegrationError::Config(format!(
                "unknown source '{}' (known: {})",
                unknown,
                KNOWN_SOURCES.join(", ")
            )));
        }
        let t = &self.thresholds;
        if !(t.very_rare_below < t.rare_below && t.rare_below < t.low_frequency_below) {
            return Err(IntegrationError::Config(
                "rarity thresholds must be strictly increasing".to_string(),
            ));
        }
        Ok(())
    }
}
