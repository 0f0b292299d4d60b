//! Writers for a run's result directory.
//!
//! ```text
//! <dir>/
//!   master_integrated.csv
//!   tables/<kind>.csv        one per annotation kind, always present
//!   summary_stats.json
//!   gaps.json
//!   fetch_stats.json
//!   summary_report.txt
//! ```

mod csv_writer;
mod json_writer;
mod report_writer;

use std::path::{Path, PathBuf};

use log::debug;
use varlens_variant_data::AnnotationKind;

use crate::errors::Result;
use crate::pipeline::RunReport;

pub use csv_writer::{write_master, write_source_table};
pub use json_writer::write_json;
pub use report_writer::render as render_summary_report;

pub const MASTER_FILE: &str = "master_integrated.csv";
pub const TABLES_DIR: &str = "tables";
pub const SUMMARY_FILE: &str = "summary_stats.json";
pub const GAPS_FILE: &str = "gaps.json";
pub const FETCH_STATS_FILE: &str = "fetch_stats.json";
pub const REPORT_FILE: &str = "summary_report.txt";

pub struct OutputWriter;

impl OutputWriter {
    /// Write every output file for `report` under `dir`, creating it if
    /// needed. Returns the written paths in write order.
    pub fn write(dir: &Path, report: &RunReport) -> Result<Vec<PathBuf>> {
        let tables_dir = dir.join(TABLES_DIR);
        std::fs::create_dir_all(&tables_dir)?;
        let mut written = Vec::new();

        let master = dir.join(MASTER_FILE);
        write_master(&master, &report.integration.records)?;
        written.push(master);

        for kind in AnnotationKind::ALL {
            let path = tables_dir.join(format!("{}.csv", kind.as_str()));
            let rows = report
                .integration
                .source_tables
                .get(&kind)
                .map(Vec::as_slice)
                .unwrap_or_default();
            write_source_table(&path, kind, rows)?;
            written.push(path);
        }

        let summary = dir.join(SUMMARY_FILE);
        json_writer::write_summary(&summary, report)?;
        written.push(summary);

        let gaps = dir.join(GAPS_FILE);
        write_json(&gaps, &report.gaps)?;
        written.push(gaps);

        let fetch_stats = dir.join(FETCH_STATS_FILE);
        json_writer::write_fetch_stats(&fetch_stats, report)?;
        written.push(fetch_stats);

        let summary_report = dir.join(REPORT_FILE);
        report_writer::write_report(&summary_report, report)?;
        written.push(summary_report);

        for path in &written {
            debug!("wrote {}", path.display());
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use uuid::Uuid;
    use varlens_variant_data::{Assembly, Locus, Strand};

    use super::*;
    use crate::integration::{IntegrationResult, SummaryStats};

    fn empty_report() -> RunReport {
        let now = Utc::now();
        RunReport {
            run_id: Uuid::new_v4(),
            gene_symbol: "SESN2".to_string(),
            locus: Locus {
                gene_symbol: "SESN2".to_string(),
                gene_id: "ENSG00000130766".to_string(),
                chromosome: "1".to_string(),
                start: 28_259_473,
                end: 28_282_491,
                strand: Strand::Forward,
                assembly: Assembly::GRCh38,
                biotype: None,
                canonical_transcript: None,
                protein_accession: None,
                protein_length: None,
            },
            started_at: now,
            finished_at: now,
            cancelled: true,
            integration: IntegrationResult {
                records: Vec::new(),
                source_tables: BTreeMap::new(),
                stats: SummaryStats::default(),
            },
            source_reports: Vec::new(),
            gaps: Vec::new(),
            fetch_stats: BTreeMap::new(),
            identity_lookups: 0,
            distinct_descriptors: 0,
            circuits: Vec::new(),
        }
    }

    #[test]
    fn test_writes_every_file_even_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("run");
        let written = OutputWriter::write(&out, &empty_report()).unwrap();

        assert_eq!(written.len(), 5 + AnnotationKind::ALL.len());
        for path in &written {
            assert!(path.exists(), "{} missing", path.display());
        }
        assert!(out.join("tables").join("domain_mapping.csv").exists());

        let master = std::fs::read_to_string(out.join(MASTER_FILE)).unwrap();
        assert!(master.starts_with("variant_key,unresolved,"));

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join(SUMMARY_FILE)).unwrap())
                .unwrap();
        assert_eq!(summary["gene_symbol"], "SESN2");
        assert_eq!(summary["region"], "1:28259473-28282491");
        assert_eq!(summary["cancelled"], true);
        assert_eq!(summary["total_variants"], 0);

        let fetch_stats: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join(FETCH_STATS_FILE)).unwrap())
                .unwrap();
        assert_eq!(fetch_stats["distinct_descriptors"], 0);
        assert_eq!(fetch_stats["circuits"], serde_json::json!([]));

        let report = std::fs::read_to_string(out.join(REPORT_FILE)).unwrap();
        assert!(report.contains("CANCELLED"));
    }
}
