use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use varlens_variant_data::{CircuitMetrics, Locus, ProviderFetchStats, SourceGap};

use crate::integration::{IntegrationResult, SourceReport};

/// Everything a run produced.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub gene_symbol: String,
    pub locus: Locus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// The run was cancelled (timeout or interrupt) before every adapter
    /// finished.
    pub cancelled: bool,
    pub integration: IntegrationResult,
    pub source_reports: Vec<SourceReport>,
    pub gaps: Vec<SourceGap>,
    pub fetch_stats: BTreeMap<String, ProviderFetchStats>,
    /// Identity lookups issued by the resolver (memo hits excluded).
    pub identity_lookups: u64,
    /// Distinct variant descriptors the resolver saw.
    pub distinct_descriptors: usize,
    /// Circuit state per provider when the run ended.
    pub circuits: Vec<CircuitMetrics>,
}

impl RunReport {
    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn total_network_calls(&self) -> u64 {
        self.fetch_stats.values().map(|s| s.network_calls).sum()
    }

    pub fn total_cache_hits(&self) -> u64 {
        self.fetch_stats.values().map(|s| s.cache_hits).sum()
    }
}
