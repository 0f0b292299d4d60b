//! Acquisition-layer configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provider::{ProviderOverrides, ProviderSettings};

/// Response cache settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub directory: PathBuf,
    /// Entries older than this are treated as misses. `None` keeps entries forever.
    pub max_age_secs: Option<u64>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from(".varlens/cache"),
            max_age_secs: None,
        }
    }
}

impl CacheSettings {
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Per-provider overrides keyed by provider id.
    pub providers: BTreeMap<String, ProviderOverrides>,
    pub cache: CacheSettings,
    pub user_agent: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            providers: BTreeMap::new(),
            cache: CacheSettings::default(),
            user_agent: format!("varlens/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl AcquisitionConfig {
    /// Effective settings: published defaults with configured overrides applied.
    pub fn settings_for(&self, provider: &str) -> ProviderSettings {
        let defaults = ProviderSettings::for_provider(provider);
        let key = provider.to_ascii_uppercase();
        match self
            .providers
            .iter()
            .find(|(id, _)| id.to_ascii_uppercase() == key)
        {
            Some((_, overrides)) => defaults.with_overrides(overrides),
            None => defaults,
        }
    }

    /// Point a provider at a different base URL (test servers, mirrors).
    pub fn with_base_url(mut self, provider: &str, base_url: impl Into<String>) -> Self {
        self.providers
            .entry(provider.to_ascii_uppercase())
            .or_default()
            .base_url = Some(base_url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_for_applies_case_insensitive_overrides() {
        let config: AcquisitionConfig = serde_json::from_str(
            r#"{"providers": {"gtex": {"requests_per_second": 2.5}}, "cache": {"enabled": false}}"#,
        )
        .expect("valid config");

        let gtex = config.settings_for("GTEX");
        assert_eq!(gtex.requests_per_second, 2.5);
        assert_eq!(gtex.base_url, "https://gtexportal.org/api/v2");
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.directory, PathBuf::from(".varlens/cache"));
    }

    #[test]
    fn test_with_base_url() {
        let config = AcquisitionConfig::default().with_base_url("ensembl", "http://localhost:1234/");
        assert_eq!(config.settings_for("ENSEMBL").base_url, "http://localhost:1234");
        assert_eq!(
            config.settings_for("UNIPROT").base_url,
            "https://rest.uniprot.org"
        );
    }
}
