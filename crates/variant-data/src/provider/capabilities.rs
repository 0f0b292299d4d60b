//! Provider identities and per-provider acquisition settings.
//!
//! This module defines which upstream services exist, how hard each may be
//! called, and how failures against each are retried and circuit-broken.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registry::{CircuitBreakerConfig, RateLimitConfig, RetryPolicy};

pub const ENSEMBL: &str = "ENSEMBL";
pub const GNOMAD: &str = "GNOMAD";
pub const MYVARIANT: &str = "MYVARIANT";
pub const GTEX: &str = "GTEX";
pub const EQTL_CATALOGUE: &str = "EQTL_CATALOGUE";
pub const GWAS_CATALOG: &str = "GWAS_CATALOG";
pub const UNIPROT: &str = "UNIPROT";

/// Every provider the adapters know how to call.
pub const KNOWN_PROVIDERS: [&str; 7] = [
    ENSEMBL,
    GNOMAD,
    MYVARIANT,
    GTEX,
    EQTL_CATALOGUE,
    GWAS_CATALOG,
    UNIPROT,
];

pub const SOURCE_ENSEMBL_VARIATION: &str = "ENSEMBL_VARIATION";
pub const SOURCE_GNOMAD: &str = "GNOMAD";
pub const SOURCE_MYVARIANT: &str = "MYVARIANT";
pub const SOURCE_GTEX: &str = "GTEX";
pub const SOURCE_EQTL_CATALOGUE: &str = "EQTL_CATALOGUE";
pub const SOURCE_GWAS_CATALOG: &str = "GWAS_CATALOG";
pub const SOURCE_ENSEMBL_VEP: &str = "ENSEMBL_VEP";
pub const SOURCE_UNIPROT_DOMAINS: &str = "UNIPROT_DOMAINS";

/// Every source adapter, in default run order.
pub const KNOWN_SOURCES: [&str; 8] = [
    SOURCE_ENSEMBL_VARIATION,
    SOURCE_GNOMAD,
    SOURCE_MYVARIANT,
    SOURCE_GTEX,
    SOURCE_EQTL_CATALOGUE,
    SOURCE_GWAS_CATALOG,
    SOURCE_ENSEMBL_VEP,
    SOURCE_UNIPROT_DOMAINS,
];

/// Effective acquisition settings for one provider.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProviderSettings {
    pub base_url: String,
    /// Sustained request rate.
    pub requests_per_second: f64,
    /// Token bucket capacity.
    pub burst_capacity: f64,
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    /// Statuses retried with backoff in addition to 429.
    pub retryable_statuses: Vec<u16>,
    /// Consecutive exhausted requests before the circuit opens.
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub half_open_successes: u32,
    pub request_timeout: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            requests_per_second: 15.0,
            burst_capacity: 15.0,
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
            retryable_statuses: vec![500, 502, 503, 504],
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            half_open_successes: 1,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ProviderSettings {
    /// Published limits and endpoints for known providers.
    pub fn for_provider(provider: &str) -> Self {
        let (base_url, rps, burst) = match provider.to_ascii_uppercase().as_str() {
            ENSEMBL => ("https://rest.ensembl.org", 15.0, 15.0),
            GNOMAD => ("https://gnomad.broadinstitute.org/api", 2.0, 2.0),
            MYVARIANT => ("https://myvariant.info/v1", 5.0, 5.0),
            GTEX => ("https://gtexportal.org/api/v2", 10.0, 10.0),
            EQTL_CATALOGUE => ("https://www.ebi.ac.uk/eqtl/api/v2", 5.0, 5.0),
            GWAS_CATALOG => ("https://www.ebi.ac.uk/gwas/rest/api", 10.0, 10.0),
            UNIPROT => ("https://rest.uniprot.org", 10.0, 10.0),
            _ => ("", 15.0, 15.0),
        };
        Self {
            base_url: base_url.to_string(),
            requests_per_second: rps,
            burst_capacity: burst,
            ..Self::default()
        }
    }

    pub fn with_overrides(mut self, overrides: &ProviderOverrides) -> Self {
        if let Some(v) = &overrides.base_url {
            self.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = overrides.requests_per_second {
            self.requests_per_second = v;
        }
        if let Some(v) = overrides.burst_capacity {
            self.burst_capacity = v;
        }
        if let Some(v) = overrides.max_attempts {
            self.max_attempts = v.max(1);
        }
        if let Some(v) = overrides.base_delay_ms {
            self.base_delay = Duration::from_millis(v);
        }
        if let Some(v) = overrides.backoff_factor {
            self.backoff_factor = v;
        }
        if let Some(v) = overrides.max_delay_ms {
            self.max_delay = Duration::from_millis(v);
        }
        if let Some(v) = &overrides.retryable_statuses {
            self.retryable_statuses = v.clone();
        }
        if let Some(v) = overrides.failure_threshold {
            self.failure_threshold = v.max(1);
        }
        if let Some(v) = overrides.cooldown_secs {
            self.cooldown = Duration::from_secs(v);
        }
        if let Some(v) = overrides.half_open_successes {
            self.half_open_successes = v.max(1);
        }
        if let Some(v) = overrides.timeout_secs {
            self.request_timeout = Duration::from_secs(v);
        }
        self
    }

    /// 429 is always retryable; other statuses only when configured.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        status == 429 || self.retryable_statuses.contains(&status)
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second: self.requests_per_second,
            burst_capacity: self.burst_capacity,
        }
    }

    pub fn circuit(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: self.cooldown,
            half_open_success_threshold: self.half_open_successes,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            backoff_factor: self.backoff_factor,
            max_delay: self.max_delay,
        }
    }
}

/// Partial settings as written in a configuration file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOverrides {
    pub base_url: Option<String>,
    pub requests_per_second: Option<f64>,
    pub burst_capacity: Option<f64>,
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub max_delay_ms: Option<u64>,
    pub retryable_statuses: Option<Vec<u16>>,
    pub failure_threshold: Option<u32>,
    pub cooldown_secs: Option<u64>,
    pub half_open_successes: Option<u32>,
    pub timeout_secs: Option<u64>,
}
