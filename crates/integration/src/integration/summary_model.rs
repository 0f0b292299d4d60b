use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use varlens_variant_data::provider::ensembl::is_coding_consequence;

use super::integration_model::{IntegratedVariantRecord, SourceReport};

const TOP_CONSEQUENCES: usize = 10;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ConsequenceCount {
    pub term: String,
    pub count: usize,
}

/// Aggregate view of one integration.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_variants: usize,
    pub resolved_variants: usize,
    pub unresolved_variants: usize,
    pub coding_variants: usize,
    pub with_clinical_significance: usize,
    pub rarity: BTreeMap<String, usize>,
    pub eqtl_significance: BTreeMap<String, usize>,
    pub pqtl_significance: BTreeMap<String, usize>,
    pub gwas_significance: BTreeMap<String, usize>,
    pub sift: BTreeMap<String, usize>,
    pub polyphen: BTreeMap<String, usize>,
    /// Rows per set of contributing sources.
    pub coverage_combinations: BTreeMap<String, usize>,
    pub records_per_source: BTreeMap<String, usize>,
    pub gaps_per_source: BTreeMap<String, usize>,
    pub rows_with_conflicts: usize,
    /// Rows with both a significant eQTL and a significant GWAS hit.
    pub eqtl_and_gwas: usize,
    pub top_consequences: Vec<ConsequenceCount>,
}

impl SummaryStats {
    pub fn build(records: &[IntegratedVariantRecord], reports: &[SourceReport]) -> Self {
        let mut stats = SummaryStats {
            total_variants: records.len(),
            ..Default::default()
        };
        let mut consequences: HashMap<&str, usize> = HashMap::new();

        for report in reports {
            *stats
                .records_per_source
                .entry(report.source.clone())
                .or_default() += report.records;
            *stats
                .gaps_per_source
                .entry(report.source.clone())
                .or_default() += report.gaps;
        }

        for record in records {
            if record.identity.unresolved {
                stats.unresolved_variants += 1;
            } else {
                stats.resolved_variants += 1;
            }
            if record
                .consequence_terms
                .iter()
                .any(|t| is_coding_consequence(t))
            {
                stats.coding_variants += 1;
            }
            if !record.clinical_significance.is_empty() {
                stats.with_clinical_significance += 1;
            }
            if record.has_conflict() {
                stats.rows_with_conflicts += 1;
            }

            let class = &record.classification;
            bump(&mut stats.rarity, class.rarity.as_str());
            bump(&mut stats.eqtl_significance, class.eqtl.as_str());
            bump(&mut stats.pqtl_significance, class.pqtl.as_str());
            bump(&mut stats.gwas_significance, class.gwas.as_str());
            bump(&mut stats.sift, class.sift.as_str());
            bump(&mut stats.polyphen, class.polyphen.as_str());
            bump(
                &mut stats.coverage_combinations,
                &record.coverage_combination(),
            );
            if class.eqtl.is_significant() && class.gwas.is_significant() {
                stats.eqtl_and_gwas += 1;
            }

            for term in &record.consequence_terms {
                *consequences.entry(term.as_str()).or_default() += 1;
            }
        }

        let mut ranked: Vec<ConsequenceCount> = consequences
            .into_iter()
            .map(|(term, count)| ConsequenceCount {
                term: term.to_string(),
                count,
            })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.term.cmp(&b.term)));
        ranked.truncate(TOP_CONSEQUENCES);
        stats.top_consequences = ranked;

        stats
    }
}

fn bump(counts: &mut BTreeMap<String, usize>, key: &str) {
    *counts.entry(key.to_string()).or_default() += 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_build() {
        let reports = vec![SourceReport {
            source: "GTEX".to_string(),
            kind: varlens_variant_data::AnnotationKind::Eqtl,
            records: 0,
            gaps: 2,
            cancelled: false,
        }];
        let stats = SummaryStats::build(&[], &reports);
        assert_eq!(stats.total_variants, 0);
        assert_eq!(stats.gaps_per_source["GTEX"], 2);
        assert_eq!(stats.records_per_source["GTEX"], 0);
        assert!(stats.top_consequences.is_empty());
    }
}
