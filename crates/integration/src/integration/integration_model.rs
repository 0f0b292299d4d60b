use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use varlens_variant_data::{
    AdapterOutput, Annotation, AnnotationKind, CanonicalVariantKey, DomainSpan, GwasAssociation,
    QtlAssociation,
};

use super::classification::{Deleteriousness, RarityClass, Significance};
use super::field_resolution::{ResolvedField, Sourced};
use super::summary_model::SummaryStats;

/// What one adapter run amounted to, as far as coverage is concerned.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub kind: AnnotationKind,
    pub records: usize,
    pub gaps: usize,
    pub cancelled: bool,
}

impl SourceReport {
    pub fn from_output(output: &AdapterOutput, kind: AnnotationKind) -> Self {
        Self {
            source: output.source.to_string(),
            kind,
            records: output.records.len(),
            gaps: output.gaps.len(),
            cancelled: output.cancelled,
        }
    }

    /// The source ran to completion, so its silence about a variant is
    /// evidence of absence.
    pub fn is_complete(&self) -> bool {
        self.gaps == 0 && !self.cancelled
    }
}

/// How a source relates to one integrated variant.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCoverage {
    Contributed,
    /// The source ran without gaps and reported nothing for the variant.
    EvaluatedAbsent,
    /// The source recorded gaps or was cancelled; absence is not evidence.
    Unavailable,
}

impl SourceCoverage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contributed => "contributed",
            Self::EvaluatedAbsent => "evaluated_absent",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for SourceCoverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Classification {
    pub rarity: RarityClass,
    pub eqtl: Significance,
    pub pqtl: Significance,
    pub gwas: Significance,
    pub sift: Deleteriousness,
    pub polyphen: Deleteriousness,
}

/// Identity of an integrated row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VariantIdentity {
    /// Canonical key; absent for unresolved rows.
    pub key: Option<CanonicalVariantKey>,
    /// Canonical key text, or the provisional key of an unresolved row.
    pub label: String,
    pub unresolved: bool,
    pub unresolved_reason: Option<String>,
}

/// Everything known about one variant identity after integration.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IntegratedVariantRecord {
    pub identity: VariantIdentity,
    /// Raw descriptors that resolved to this identity.
    pub descriptors: Vec<String>,
    pub sources: Vec<String>,

    pub accession: ResolvedField<String>,
    pub genome_af: ResolvedField<f64>,
    pub exome_af: ResolvedField<f64>,
    pub minor_allele_frequency: ResolvedField<f64>,
    pub most_severe_consequence: ResolvedField<String>,
    pub sift_score: ResolvedField<f64>,
    pub polyphen_score: ResolvedField<f64>,
    pub protein_position: ResolvedField<u32>,

    pub consequence_terms: Vec<String>,
    pub clinical_significance: Vec<String>,
    pub transcripts: Vec<String>,
    pub sift_predictions: Vec<String>,
    pub polyphen_predictions: Vec<String>,
    pub amino_acids: Vec<String>,
    pub eqtls: Vec<Sourced<QtlAssociation>>,
    pub pqtls: Vec<Sourced<QtlAssociation>>,
    pub gwas: Vec<Sourced<GwasAssociation>>,
    pub domains: Vec<DomainSpan>,

    pub classification: Classification,
    pub coverage: BTreeMap<String, SourceCoverage>,
}

impl IntegratedVariantRecord {
    pub fn has_conflict(&self) -> bool {
        self.accession.is_conflict()
            || self.genome_af.is_conflict()
            || self.exome_af.is_conflict()
            || self.minor_allele_frequency.is_conflict()
            || self.most_severe_consequence.is_conflict()
            || self.sift_score.is_conflict()
            || self.polyphen_score.is_conflict()
            || self.protein_position.is_conflict()
    }

    /// Sources with `Contributed` coverage joined by `+`, e.g. `GNOMAD+GTEX`.
    pub fn coverage_combination(&self) -> String {
        self.coverage
            .iter()
            .filter(|(_, c)| **c == SourceCoverage::Contributed)
            .map(|(source, _)| source.as_str())
            .collect::<Vec<_>>()
            .join("+")
    }
}

/// One per-source record as it appears in its kind's intermediate table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SourceTableRow {
    pub variant: String,
    pub unresolved: bool,
    pub source: String,
    pub descriptor: String,
    pub annotation: Annotation,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IntegrationResult {
    pub records: Vec<IntegratedVariantRecord>,
    pub source_tables: BTreeMap<AnnotationKind, Vec<SourceTableRow>>,
    pub stats: SummaryStats,
}

impl IntegrationResult {
    pub fn find(&self, label: &str) -> Option<&IntegratedVariantRecord> {
        self.records.iter().find(|r| r.identity.label == label)
    }
}
