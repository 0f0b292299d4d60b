use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use varlens_variant_data::{CircuitMetrics, ProviderFetchStats};

use crate::errors::Result;
use crate::integration::SummaryStats;
use crate::pipeline::RunReport;

/// `summary_stats.json`: the run's identity followed by its statistics.
#[derive(Serialize)]
struct SummaryDocument<'a> {
    run_id: Uuid,
    gene_symbol: &'a str,
    gene_id: &'a str,
    region: String,
    assembly: String,
    generated_at: DateTime<Utc>,
    elapsed_secs: f64,
    cancelled: bool,
    #[serde(flatten)]
    stats: &'a SummaryStats,
}

/// `fetch_stats.json`: per-provider counters plus run totals.
#[derive(Serialize)]
struct FetchStatsDocument<'a> {
    total_network_calls: u64,
    total_cache_hits: u64,
    identity_lookups: u64,
    distinct_descriptors: usize,
    providers: &'a BTreeMap<String, ProviderFetchStats>,
    circuits: &'a [CircuitMetrics],
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

pub fn write_summary(path: &Path, report: &RunReport) -> Result<()> {
    write_json(
        path,
        &SummaryDocument {
            run_id: report.run_id,
            gene_symbol: &report.locus.gene_symbol,
            gene_id: &report.locus.gene_id,
            region: report.locus.region(),
            assembly: report.locus.assembly.to_string(),
            generated_at: report.finished_at,
            elapsed_secs: report.elapsed_secs(),
            cancelled: report.cancelled,
            stats: &report.integration.stats,
        },
    )
}

pub fn write_fetch_stats(path: &Path, report: &RunReport) -> Result<()> {
    write_json(
        path,
        &FetchStatsDocument {
            total_network_calls: report.total_network_calls(),
            total_cache_hits: report.total_cache_hits(),
            identity_lookups: report.identity_lookups,
            distinct_descriptors: report.distinct_descriptors,
            providers: &report.fetch_stats,
            circuits: &report.circuits,
        },
    )
}
