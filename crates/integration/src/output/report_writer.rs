//! Plain-text run summary for people skimming a results directory.

use std::fmt::Write as _;
use std::path::Path;

use crate::errors::Result;
use crate::pipeline::RunReport;

const RULE: &str = "============================================================";

pub fn render(report: &RunReport) -> String {
    let stats = &report.integration.stats;
    let locus = &report.locus;
    let mut out = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "VARIANT INTEGRATION SUMMARY: {}", locus.gene_symbol);
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "Run:                        {}", report.run_id);
    let _ = writeln!(out, "Gene id:                    {}", locus.gene_id);
    let _ = writeln!(out, "Region:                     {} ({})", locus.region(), locus.assembly);
    let _ = writeln!(out, "Finished:                   {}", report.finished_at.to_rfc3339());
    if report.cancelled {
        let _ = writeln!(out, "Status:                     CANCELLED (partial results)");
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Total variants:             {}", stats.total_variants);
    let _ = writeln!(out, "  resolved:                 {}", stats.resolved_variants);
    let _ = writeln!(out, "  unresolved:               {}", stats.unresolved_variants);
    let _ = writeln!(out, "Coding variants:            {}", stats.coding_variants);
    let _ = writeln!(out, "With clinical significance: {}", stats.with_clinical_significance);
    let _ = writeln!(out, "Rows with conflicts:        {}", stats.rows_with_conflicts);
    let _ = writeln!(out, "eQTL + GWAS evidence:       {}", stats.eqtl_and_gwas);
    let _ = writeln!(out);

    section(&mut out, "Rarity", stats.rarity.iter());
    section(&mut out, "eQTL significance", stats.eqtl_significance.iter());
    section(&mut out, "pQTL significance", stats.pqtl_significance.iter());
    section(&mut out, "GWAS significance", stats.gwas_significance.iter());
    section(&mut out, "SIFT", stats.sift.iter());
    section(&mut out, "PolyPhen", stats.polyphen.iter());

    let _ = writeln!(out, "Top consequences:");
    for consequence in &stats.top_consequences {
        let _ = writeln!(out, "  {:<40} {}", consequence.term, consequence.count);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Sources (records / gaps):");
    for source in &report.source_reports {
        let _ = writeln!(
            out,
            "  {:<20} {:>6} / {}{}",
            source.source,
            source.records,
            source.gaps,
            if source.cancelled { " (cancelled)" } else { "" }
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Network calls: {}, cache hits: {}, identity lookups: {}",
        report.total_network_calls(),
        report.total_cache_hits(),
        report.identity_lookups
    );
    out
}

fn section<'a>(out: &mut String, title: &str, counts: impl Iterator<Item = (&'a String, &'a usize)>) {
    let _ = writeln!(out, "{}:", title);
    for (label, count) in counts {
        let _ = writeln!(out, "  {:<20} {}", label, count);
    }
    let _ = writeln!(out);
}

pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    std::fs::write(path, render(report))?;
    Ok(())
}
