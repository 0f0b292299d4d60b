//! Normalized per-source variant records.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::SourceId;
use super::variant::RawIdentity;

/// One annotation contributed by one source about one raw variant descriptor.
///
/// Produced by a source adapter and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedVariantRecord {
    pub source: SourceId,
    pub identity: RawIdentity,
    pub annotation: Annotation,
}

impl NormalizedVariantRecord {
    pub fn new(source: SourceId, identity: RawIdentity, annotation: Annotation) -> Self {
        Self {
            source,
            identity,
            annotation,
        }
    }

    /// Stable text used to order records independently of arrival order.
    pub fn sort_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.source,
            self.identity,
            serde_json::to_string(&self.annotation).unwrap_or_default()
        )
    }
}

/// Kind of annotation, also the name of its per-source output table.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    Listing,
    Frequency,
    Eqtl,
    Pqtl,
    Gwas,
    Functional,
    Domain,
}

impl AnnotationKind {
    pub const ALL: [AnnotationKind; 7] = [
        Self::Listing,
        Self::Frequency,
        Self::Eqtl,
        Self::Pqtl,
        Self::Gwas,
        Self::Functional,
        Self::Domain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Frequency => "frequency",
            Self::Eqtl => "eqtl",
            Self::Pqtl => "pqtl",
            Self::Gwas => "gwas",
            Self::Functional => "functional",
            Self::Domain => "domain_mapping",
        }
    }
}

impl fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Annotation {
    Listing(ListingAnnotation),
    Frequency(FrequencyAnnotation),
    Eqtl(QtlAssociation),
    Pqtl(QtlAssociation),
    Gwas(GwasAssociation),
    Functional(FunctionalAnnotation),
    Domain(DomainAnnotation),
}

impl Annotation {
    pub fn kind(&self) -> AnnotationKind {
        match self {
            Self::Listing(_) => AnnotationKind::Listing,
            Self::Frequency(_) => AnnotationKind::Frequency,
            Self::Eqtl(_) => AnnotationKind::Eqtl,
            Self::Pqtl(_) => AnnotationKind::Pqtl,
            Self::Gwas(_) => AnnotationKind::Gwas,
            Self::Functional(_) => AnnotationKind::Functional,
            Self::Domain(_) => AnnotationKind::Domain,
        }
    }
}

/// A variant reported by the locus listing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingAnnotation {
    pub accession: Option<String>,
    pub consequence: Option<String>,
    #[serde(default)]
    pub clinical_significance: Vec<String>,
    pub minor_allele_frequency: Option<f64>,
}

/// Population allele counts for one cohort.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationCounts {
    pub allele_frequency: Option<f64>,
    pub allele_count: Option<u64>,
    pub allele_number: Option<u64>,
    pub homozygote_count: Option<u64>,
}

impl PopulationCounts {
    /// Frequency, derived from counts when not reported directly.
    pub fn frequency(&self) -> Option<f64> {
        self.allele_frequency.or_else(|| match (self.allele_count, self.allele_number) {
            (Some(ac), Some(an)) if an > 0 => Some(ac as f64 / an as f64),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.allele_frequency.is_none()
            && self.allele_count.is_none()
            && self.allele_number.is_none()
            && self.homozygote_count.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrequencyAnnotation {
    pub genome: Option<PopulationCounts>,
    pub exome: Option<PopulationCounts>,
}

impl FrequencyAnnotation {
    pub fn genome_frequency(&self) -> Option<f64> {
        self.genome.as_ref().and_then(PopulationCounts::frequency)
    }

    pub fn exome_frequency(&self) -> Option<f64> {
        self.exome.as_ref().and_then(PopulationCounts::frequency)
    }
}

/// Quantitative-trait association (expression or protein level).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QtlAssociation {
    /// Tissue for eQTLs, study or dataset for pQTLs.
    pub context: String,
    pub p_value: Option<f64>,
    pub effect_size: Option<f64>,
    pub molecular_trait: Option<String>,
}

/// Where a GWAS hit was found relative to the gene.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenePlacement {
    WithinGene,
    NearGene,
}

impl fmt::Display for GenePlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WithinGene => write!(f, "within_gene"),
            Self::NearGene => write!(f, "near_gene"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GwasAssociation {
    pub trait_name: Option<String>,
    pub p_value: Option<f64>,
    pub study: Option<String>,
    pub placement: GenePlacement,
}

/// Predicted functional impact on a transcript.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionalAnnotation {
    pub most_severe_consequence: Option<String>,
    pub transcript_id: Option<String>,
    #[serde(default)]
    pub consequence_terms: Vec<String>,
    pub sift_score: Option<f64>,
    pub sift_prediction: Option<String>,
    pub polyphen_score: Option<f64>,
    pub polyphen_prediction: Option<String>,
    pub amino_acids: Option<String>,
    pub codons: Option<String>,
    pub protein_start: Option<u32>,
    pub protein_end: Option<u32>,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DomainSpan {
    pub description: String,
    pub start: u32,
    pub end: u32,
}

impl DomainSpan {
    /// Inclusive overlap with a protein span.
    pub fn overlaps(&self, start: u32, end: u32) -> bool {
        start <= self.end && end >= self.start
    }
}

/// Protein domains hit by a coding variant; empty when none overlap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainAnnotation {
    pub protein_accession: String,
    pub protein_start: u32,
    pub protein_end: u32,
    pub domains: Vec<DomainSpan>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_from_counts() {
        let counts = PopulationCounts {
            allele_frequency: None,
            allele_count: Some(3),
            allele_number: Some(1500),
            homozygote_count: Some(0),
        };
        assert_eq!(counts.frequency(), Some(0.002));

        let empty = PopulationCounts {
            allele_number: Some(0),
            allele_count: Some(0),
            ..Default::default()
        };
        assert_eq!(empty.frequency(), None);
        assert!(PopulationCounts::default().is_empty());
    }

    #[test]
    fn test_domain_overlap_is_inclusive() {
        let domain = DomainSpan {
            description: "Apolipoprotein".to_string(),
            start: 80,
            end: 255,
        };
        assert!(domain.overlaps(80, 80));
        assert!(domain.overlaps(255, 260));
        assert!(domain.overlaps(10, 90));
        assert!(!domain.overlaps(256, 300));
        assert!(!domain.overlaps(1, 79));
    }

    #[test]
    fn test_annotation_kind_table_names() {
        let annotation = Annotation::Domain(DomainAnnotation {
            protein_accession: "P02649".to_string(),
            protein_start: 130,
            protein_end: 130,
            domains: vec![],
        });
        assert_eq!(annotation.kind(), AnnotationKind::Domain);
        assert_eq!(annotation.kind().as_str(), "domain_mapping");
        assert_eq!(AnnotationKind::ALL.len(), 7);
    }
}
