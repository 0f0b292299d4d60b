use std::collections::{BTreeMap, BTreeSet};

use log::warn;
use serde::Serialize;
use tracing::{debug, info};
use varlens_variant_data::{
    Annotation, AnnotationKind, CanonicalVariantKey, DomainSpan, GwasAssociation,
    NormalizedVariantRecord, QtlAssociation, RawIdentity, Resolution, ResolvedRecord,
};

use super::classification::ClassificationThresholds;
use super::field_resolution::{AuthorityRanks, FieldCandidates, Sourced};
use super::integration_model::{
    Classification, IntegratedVariantRecord, IntegrationResult, SourceCoverage, SourceReport,
    SourceTableRow, VariantIdentity,
};
use super::summary_model::SummaryStats;
use crate::errors::{IntegrationError, Result};

/// Rows are keyed by canonical key; unresolved records never join across
/// sources.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
enum GroupKey {
    Resolved(CanonicalVariantKey),
    Unresolved {
        source: String,
        provisional_key: String,
    },
}

impl GroupKey {
    fn of(record: &ResolvedRecord) -> Self {
        match &record.resolution {
            Resolution::Resolved { key } => Self::Resolved(key.clone()),
            Resolution::Unresolved {
                provisional_key, ..
            } => Self::Unresolved {
                source: record.record.source.to_string(),
                provisional_key: provisional_key.clone(),
            },
        }
    }
}

/// Joins resolved per-source records into one row per variant identity.
pub struct IntegrationEngine {
    thresholds: ClassificationThresholds,
    authority: AuthorityRanks,
}

impl IntegrationEngine {
    pub fn new(thresholds: ClassificationThresholds, authority: AuthorityRanks) -> Self {
        Self {
            thresholds,
            authority,
        }
    }

    /// Integrate every resolved record.
    ///
    /// The output depends only on the set of input records, never on their
    /// order. Fails only when no source produced anything.
    pub fn integrate(
        &self,
        records: &[ResolvedRecord],
        reports: &[SourceReport],
    ) -> Result<IntegrationResult> {
        if records.is_empty() {
            warn!("No records to integrate from {} sources", reports.len());
            return Err(IntegrationError::IntegrationEmptyInput);
        }

        let mut groups: BTreeMap<GroupKey, Vec<&ResolvedRecord>> = BTreeMap::new();
        for record in records {
            groups.entry(GroupKey::of(record)).or_default().push(record);
        }

        let mut integrated = Vec::with_capacity(groups.len());
        let mut source_tables: BTreeMap<AnnotationKind, Vec<SourceTableRow>> = AnnotationKind::ALL
            .iter()
            .map(|kind| (*kind, Vec::new()))
            .collect();

        for (key, members) in &groups {
            let row = self.integrate_group(key, members, reports);

            let mut table_rows: Vec<(String, SourceTableRow)> = members
                .iter()
                .map(|member| {
                    let record = &member.record;
                    (
                        record.sort_key(),
                        SourceTableRow {
                            variant: row.identity.label.clone(),
                            unresolved: row.identity.unresolved,
                            source: record.source.to_string(),
                            descriptor: record.identity.to_string(),
                            annotation: record.annotation.clone(),
                        },
                    )
                })
                .collect();
            table_rows.sort_by(|a, b| a.0.cmp(&b.0));
            table_rows.dedup_by(|a, b| a.0 == b.0);
            for (_, table_row) in table_rows {
                source_tables
                    .entry(table_row.annotation.kind())
                    .or_default()
                    .push(table_row);
            }

            integrated.push(row);
        }

        let stats = SummaryStats::build(&integrated, reports);
        info!(
            input_records = records.len(),
            variants = stats.total_variants,
            unresolved = stats.unresolved_variants,
            conflicts = stats.rows_with_conflicts,
            "integration complete"
        );

        Ok(IntegrationResult {
            records: integrated,
            source_tables,
            stats,
        })
    }

    fn integrate_group(
        &self,
        key: &GroupKey,
        members: &[&ResolvedRecord],
        reports: &[SourceReport],
    ) -> IntegratedVariantRecord {
        let mut union = FieldUnion::default();
        for member in members {
            let rank = self.authority.rank(&member.record.source);
            union.absorb(&member.record, rank);
        }

        let identity = match key {
            GroupKey::Resolved(key) => VariantIdentity {
                key: Some(key.clone()),
                label: key.to_string(),
                unresolved: false,
                unresolved_reason: None,
            },
            GroupKey::Unresolved {
                provisional_key, ..
            } => VariantIdentity {
                key: None,
                label: provisional_key.clone(),
                unresolved: true,
                unresolved_reason: members.iter().find_map(|m| match &m.resolution {
                    Resolution::Unresolved { reason, .. } => Some(reason.to_string()),
                    Resolution::Resolved { .. } => None,
                }),
            },
        };
        debug!(variant = %identity.label, records = members.len(), "integrating group");

        union.finish(identity, &self.thresholds, reports)
    }
}

/// Accumulates every field contributed to one identity.
#[derive(Default)]
struct FieldUnion {
    descriptors: BTreeSet<String>,
    sources: BTreeSet<String>,
    accession: FieldCandidates<String>,
    genome_af: FieldCandidates<f64>,
    exome_af: FieldCandidates<f64>,
    minor_allele_frequency: FieldCandidates<f64>,
    most_severe_consequence: FieldCandidates<String>,
    sift_score: FieldCandidates<f64>,
    polyphen_score: FieldCandidates<f64>,
    protein_position: FieldCandidates<u32>,
    consequence_terms: BTreeSet<String>,
    clinical_significance: BTreeSet<String>,
    transcripts: BTreeSet<String>,
    sift_predictions: BTreeSet<String>,
    polyphen_predictions: BTreeSet<String>,
    amino_acids: BTreeSet<String>,
    eqtls: Vec<Sourced<QtlAssociation>>,
    pqtls: Vec<Sourced<QtlAssociation>>,
    gwas: Vec<Sourced<GwasAssociation>>,
    domains: BTreeSet<DomainSpan>,
}

impl FieldUnion {
    fn absorb(&mut self, record: &NormalizedVariantRecord, rank: u32) {
        let source: &str = &record.source;
        self.descriptors.insert(record.identity.to_string());
        self.sources.insert(source.to_string());

        if let RawIdentity::Accession { id, .. } = &record.identity {
            self.accession.offer(source, rank, Some(id.clone()));
        }

        match &record.annotation {
            Annotation::Listing(listing) => {
                self.accession.offer(source, rank, listing.accession.clone());
                self.minor_allele_frequency
                    .offer(source, rank, listing.minor_allele_frequency);
                self.consequence_terms.extend(listing.consequence.clone());
                self.clinical_significance
                    .extend(listing.clinical_significance.iter().cloned());
            }
            Annotation::Frequency(frequency) => {
                self.genome_af
                    .offer(source, rank, frequency.genome_frequency());
                self.exome_af
                    .offer(source, rank, frequency.exome_frequency());
            }
            Annotation::Eqtl(association) => self.eqtls.push(sourced(source, association)),
            Annotation::Pqtl(association) => self.pqtls.push(sourced(source, association)),
            Annotation::Gwas(association) => self.gwas.push(sourced(source, association)),
            Annotation::Functional(functional) => {
                self.most_severe_consequence.offer(
                    source,
                    rank,
                    functional.most_severe_consequence.clone(),
                );
                self.consequence_terms
                    .extend(functional.most_severe_consequence.clone());
                self.consequence_terms
                    .extend(functional.consequence_terms.iter().cloned());
                self.transcripts.extend(functional.transcript_id.clone());
                self.sift_score.offer(source, rank, functional.sift_score);
                self.sift_predictions
                    .extend(functional.sift_prediction.clone());
                self.polyphen_score
                    .offer(source, rank, functional.polyphen_score);
                self.polyphen_predictions
                    .extend(functional.polyphen_prediction.clone());
                self.amino_acids.extend(functional.amino_acids.clone());
                self.protein_position
                    .offer(source, rank, functional.protein_start);
            }
            Annotation::Domain(domain) => {
                self.protein_position
                    .offer(source, rank, Some(domain.protein_start));
                self.domains.extend(domain.domains.iter().cloned());
            }
        }
    }

    fn finish(
        self,
        identity: VariantIdentity,
        thresholds: &ClassificationThresholds,
        reports: &[SourceReport],
    ) -> IntegratedVariantRecord {
        let genome_af = self.genome_af.resolve();
        let exome_af = self.exome_af.resolve();
        let minor_allele_frequency = self.minor_allele_frequency.resolve();
        let sift_score = self.sift_score.resolve();
        let polyphen_score = self.polyphen_score.resolve();
        let sift_predictions: Vec<String> = self.sift_predictions.into_iter().collect();
        let polyphen_predictions: Vec<String> = self.polyphen_predictions.into_iter().collect();
        let eqtls = sorted_union(self.eqtls);
        let pqtls = sorted_union(self.pqtls);
        let gwas = sorted_union(self.gwas);

        let classification = Classification {
            rarity: thresholds.rarity(&genome_af, &exome_af, &minor_allele_frequency),
            eqtl: thresholds.significance(
                eqtls.iter().filter_map(|a| a.value.p_value),
                thresholds.eqtl_p_value,
            ),
            pqtl: thresholds.significance(
                pqtls.iter().filter_map(|a| a.value.p_value),
                thresholds.pqtl_p_value,
            ),
            gwas: thresholds.significance(
                gwas.iter().filter_map(|a| a.value.p_value),
                thresholds.gwas_p_value,
            ),
            sift: thresholds.sift(&sift_score, &sift_predictions),
            polyphen: thresholds.polyphen(&polyphen_score, &polyphen_predictions),
        };

        let mut coverage: BTreeMap<String, SourceCoverage> = self
            .sources
            .iter()
            .map(|source| (source.clone(), SourceCoverage::Contributed))
            .collect();
        for report in reports {
            coverage.entry(report.source.clone()).or_insert_with(|| {
                if report.is_complete() && !identity.unresolved {
                    SourceCoverage::EvaluatedAbsent
                } else {
                    SourceCoverage::Unavailable
                }
            });
        }

        IntegratedVariantRecord {
            identity,
            descriptors: self.descriptors.into_iter().collect(),
            sources: self.sources.into_iter().collect(),
            accession: self.accession.resolve(),
            genome_af,
            exome_af,
            minor_allele_frequency,
            most_severe_consequence: self.most_severe_consequence.resolve(),
            sift_score,
            polyphen_score,
            protein_position: self.protein_position.resolve(),
            consequence_terms: self.consequence_terms.into_iter().collect(),
            clinical_significance: self.clinical_significance.into_iter().collect(),
            transcripts: self.transcripts.into_iter().collect(),
            sift_predictions,
            polyphen_predictions,
            amino_acids: self.amino_acids.into_iter().collect(),
            eqtls,
            pqtls,
            gwas,
            domains: self.domains.into_iter().collect(),
            classification,
            coverage,
        }
    }
}

fn sourced<T: Clone>(source: &str, value: &T) -> Sourced<T> {
    Sourced {
        source: source.to_string(),
        value: value.clone(),
    }
}

/// De-duplicate and order by serialized form; float fields rule out `Ord`.
fn sorted_union<T: Serialize + PartialEq>(mut values: Vec<T>) -> Vec<T> {
    values.sort_by_cached_key(|v| serde_json::to_string(v).unwrap_or_default());
    values.dedup();
    values
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use varlens_variant_data::{
        Assembly, Chromosome, FrequencyAnnotation, GenePlacement, GenomicPosition,
        ListingAnnotation, PopulationCounts, UnresolvedReason,
    };

    use super::*;
    use crate::integration::classification::{RarityClass, Significance};
    use crate::integration::field_resolution::ResolvedField;

    fn key(position: u64, reference: &str, alternate: &str) -> CanonicalVariantKey {
        CanonicalVariantKey {
            chromosome: Chromosome::normalize("1"),
            position,
            reference: reference.to_string(),
            alternate: alternate.to_string(),
            assembly: Assembly::GRCh38,
        }
    }

    fn resolved(
        source: &'static str,
        identity: RawIdentity,
        annotation: Annotation,
        key: CanonicalVariantKey,
    ) -> ResolvedRecord {
        ResolvedRecord {
            record: NormalizedVariantRecord::new(Cow::Borrowed(source), identity, annotation),
            resolution: Resolution::Resolved { key },
        }
    }

    fn frequency(af: f64) -> Annotation {
        Annotation::Frequency(FrequencyAnnotation {
            genome: Some(PopulationCounts {
                allele_frequency: Some(af),
                ..Default::default()
            }),
            exome: None,
        })
    }

    fn eqtl(tissue: &str, p_value: f64) -> Annotation {
        Annotation::Eqtl(QtlAssociation {
            context: tissue.to_string(),
            p_value: Some(p_value),
            ..Default::default()
        })
    }

    fn report(source: &str, kind: AnnotationKind, records: usize, gaps: usize) -> SourceReport {
        SourceReport {
            source: source.to_string(),
            kind,
            records,
            gaps,
            cancelled: false,
        }
    }

    fn engine() -> IntegrationEngine {
        IntegrationEngine::new(ClassificationThresholds::default(), AuthorityRanks::default())
    }

    fn scenario() -> Vec<ResolvedRecord> {
        vec![
            resolved(
                "A",
                RawIdentity::Position(GenomicPosition::grch38("chr1", 100, "G", "A")),
                frequency(0.002),
                key(100, "G", "A"),
            ),
            resolved(
                "B",
                RawIdentity::accession("rs123"),
                eqtl("Liver", 1e-6),
                key(100, "G", "A"),
            ),
            resolved(
                "B",
                RawIdentity::accession("rs777"),
                eqtl("Lung", 0.3),
                key(200, "C", "T"),
            ),
            ResolvedRecord {
                record: NormalizedVariantRecord::new(
                    Cow::Borrowed("A"),
                    RawIdentity::accession("rs404"),
                    frequency(0.2),
                ),
                resolution: Resolution::Unresolved {
                    provisional_key: "accession:rs404".to_string(),
                    reason: UnresolvedReason::NotFound,
                },
            },
            ResolvedRecord {
                record: NormalizedVariantRecord::new(
                    Cow::Borrowed("B"),
                    RawIdentity::accession("rs404"),
                    eqtl("Liver", 0.01),
                ),
                resolution: Resolution::Unresolved {
                    provisional_key: "accession:rs404".to_string(),
                    reason: UnresolvedReason::NotFound,
                },
            },
        ]
    }

    #[test]
    fn test_frequency_and_eqtl_join_on_canonical_key() {
        let reports = vec![
            report("A", AnnotationKind::Frequency, 2, 0),
            report("B", AnnotationKind::Eqtl, 3, 0),
        ];
        let result = engine().integrate(&scenario(), &reports).unwrap();

        let row = result.find("1-100-G-A").unwrap();
        assert_eq!(row.sources, vec!["A", "B"]);
        assert_eq!(row.classification.rarity, RarityClass::Rare);
        assert_eq!(row.classification.eqtl, Significance::Significant);
        assert_eq!(row.classification.gwas, Significance::NotEvaluated);
        assert_eq!(row.accession.value().map(String::as_str), Some("rs123"));
        assert_eq!(row.genome_af.value(), Some(&0.002));
        assert_eq!(row.coverage["A"], SourceCoverage::Contributed);
        assert_eq!(row.coverage["B"], SourceCoverage::Contributed);

        let other = result.find("1-200-C-T").unwrap();
        assert_eq!(other.coverage["A"], SourceCoverage::EvaluatedAbsent);
        assert_eq!(other.classification.eqtl, Significance::NotSignificant);
        assert_eq!(other.classification.rarity, RarityClass::NotEvaluated);
    }

    #[test]
    fn test_unresolved_records_never_join_across_sources() {
        let reports = vec![
            report("A", AnnotationKind::Frequency, 2, 0),
            report("B", AnnotationKind::Eqtl, 3, 0),
        ];
        let result = engine().integrate(&scenario(), &reports).unwrap();

        let unresolved: Vec<&IntegratedVariantRecord> = result
            .records
            .iter()
            .filter(|r| r.identity.unresolved)
            .collect();
        assert_eq!(unresolved.len(), 2);
        assert_eq!(unresolved[0].sources, vec!["A"]);
        assert_eq!(unresolved[1].sources, vec!["B"]);
        assert_eq!(
            unresolved[0].identity.unresolved_reason.as_deref(),
            Some("not_found")
        );
        assert_eq!(unresolved[0].coverage["B"], SourceCoverage::Unavailable);

        assert_eq!(result.records.len(), 4);
        assert_eq!(result.stats.resolved_variants, 2);
        assert_eq!(result.stats.unresolved_variants, 2);
    }

    #[test]
    fn test_join_is_commutative() {
        let reports = vec![
            report("A", AnnotationKind::Frequency, 2, 0),
            report("B", AnnotationKind::Eqtl, 3, 0),
        ];
        let records = scenario();
        let expected = engine().integrate(&records, &reports).unwrap();

        let mut reversed = records.clone();
        reversed.reverse();
        assert_eq!(engine().integrate(&reversed, &reports).unwrap(), expected);

        for shift in 1..records.len() {
            let mut rotated = records.clone();
            rotated.rotate_left(shift);
            assert_eq!(engine().integrate(&rotated, &reports).unwrap(), expected);
        }
    }

    #[test]
    fn test_gap_source_is_unavailable_and_not_evaluated() {
        let records = vec![resolved(
            "ENSEMBL_VARIATION",
            RawIdentity::Position(GenomicPosition::grch38("1", 100, "G", "A")),
            Annotation::Listing(ListingAnnotation {
                accession: Some("rs123".to_string()),
                consequence: Some("missense_variant".to_string()),
                clinical_significance: vec![],
                minor_allele_frequency: None,
            }),
            key(100, "G", "A"),
        )];
        let reports = vec![
            report("ENSEMBL_VARIATION", AnnotationKind::Listing, 1, 0),
            report("GTEX", AnnotationKind::Eqtl, 0, 49),
        ];
        let result = engine().integrate(&records, &reports).unwrap();
        let row = &result.records[0];

        assert_eq!(row.coverage["GTEX"], SourceCoverage::Unavailable);
        assert_eq!(row.classification.eqtl, Significance::NotEvaluated);
        assert_eq!(row.classification.rarity, RarityClass::NotEvaluated);
        assert_eq!(result.stats.coding_variants, 1);
        assert_eq!(result.stats.gaps_per_source["GTEX"], 49);
    }

    #[test]
    fn test_conflicting_frequencies_are_tagged() {
        let records = vec![
            resolved(
                "GNOMAD",
                RawIdentity::Position(GenomicPosition::grch38("1", 100, "G", "A")),
                frequency(0.002),
                key(100, "G", "A"),
            ),
            resolved(
                "MYVARIANT",
                RawIdentity::Nomenclature("chr1:g.100G>A".to_string()),
                frequency(0.0005),
                key(100, "G", "A"),
            ),
        ];
        let result = engine().integrate(&records, &[]).unwrap();
        let row = &result.records[0];
        assert_eq!(
            row.genome_af,
            ResolvedField::Conflict {
                values: vec![
                    Sourced {
                        source: "GNOMAD".to_string(),
                        value: 0.002
                    },
                    Sourced {
                        source: "MYVARIANT".to_string(),
                        value: 0.0005
                    },
                ]
            }
        );
        assert_eq!(row.classification.rarity, RarityClass::Discordant);
        assert_eq!(result.stats.rows_with_conflicts, 1);

        let ranked = IntegrationEngine::new(
            ClassificationThresholds::default(),
            AuthorityRanks::default().with_rank("GNOMAD", 1),
        );
        let row = &ranked.integrate(&records, &[]).unwrap().records[0];
        assert_eq!(row.genome_af.value(), Some(&0.002));
        assert_eq!(row.classification.rarity, RarityClass::Rare);
    }

    #[test]
    fn test_multi_valued_fields_are_deduplicated() {
        let gwas = |trait_name: &str| {
            Annotation::Gwas(GwasAssociation {
                trait_name: Some(trait_name.to_string()),
                p_value: Some(1e-9),
                study: Some("GCST000001".to_string()),
                placement: GenePlacement::WithinGene,
            })
        };
        let records = vec![
            resolved("GWAS_CATALOG", RawIdentity::accession("rs1"), gwas("LDL"), key(5, "A", "G")),
            resolved("GWAS_CATALOG", RawIdentity::accession("rs1"), gwas("LDL"), key(5, "A", "G")),
            resolved("GWAS_CATALOG", RawIdentity::accession("rs1"), gwas("HDL"), key(5, "A", "G")),
            resolved("GTEX", RawIdentity::accession("rs1"), eqtl("Liver", 1e-8), key(5, "A", "G")),
        ];
        let result = engine().integrate(&records, &[]).unwrap();
        let row = &result.records[0];

        let traits: Vec<&str> = row
            .gwas
            .iter()
            .filter_map(|g| g.value.trait_name.as_deref())
            .collect();
        assert_eq!(traits, vec!["HDL", "LDL"]);
        assert_eq!(row.descriptors, vec!["accession:rs1"]);
        assert_eq!(row.classification.gwas, Significance::Significant);
        assert_eq!(result.stats.eqtl_and_gwas, 1);
        assert_eq!(result.source_tables[&AnnotationKind::Gwas].len(), 2);
        assert_eq!(result.source_tables[&AnnotationKind::Eqtl].len(), 1);
        assert!(result.source_tables[&AnnotationKind::Domain].is_empty());
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let reports = vec![report("GTEX", AnnotationKind::Eqtl, 0, 3)];
        assert!(matches!(
            engine().integrate(&[], &reports),
            Err(IntegrationError::IntegrationEmptyInput)
        ));
    }
}
