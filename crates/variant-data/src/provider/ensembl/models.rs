//! Ensembl REST response models.
//!
//! Only the fields the adapters read are modelled; everything else in the
//! payload is ignored.

use serde::Deserialize;

use crate::models::{Assembly, GenomicPosition, Strand};
use crate::provider::payload::OneOrMany;

/// One feature from `/overlap/region/...?feature=variation`.
#[derive(Clone, Debug, Deserialize)]
pub struct EnsemblVariation {
    pub id: String,
    pub seq_region_name: String,
    pub start: u64,
    pub end: u64,
    #[serde(default = "forward_strand")]
    pub strand: i64,
    /// Reference first, then alternates.
    #[serde(default)]
    pub alleles: Vec<String>,
    #[serde(default)]
    pub consequence_type: Option<OneOrMany<String>>,
    #[serde(default)]
    pub clinical_significance: Vec<String>,
    pub minor_allele: Option<String>,
    pub minor_allele_freq: Option<f64>,
    pub assembly_name: Option<String>,
}

fn forward_strand() -> i64 {
    1
}

impl EnsemblVariation {
    pub fn is_accession(&self) -> bool {
        self.id.starts_with("rs")
    }

    pub fn reference(&self) -> Option<&str> {
        self.alleles.first().map(String::as_str)
    }

    pub fn alternates(&self) -> &[String] {
        self.alleles.get(1..).unwrap_or(&[])
    }

    pub fn consequences(&self) -> Vec<String> {
        self.consequence_type
            .clone()
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
    }

    pub fn assembly(&self) -> Assembly {
        self.assembly_name
            .as_deref()
            .and_then(Assembly::parse)
            .unwrap_or_default()
    }

    /// Position tuple for one of this feature's alternate alleles.
    pub fn position_for(&self, alternate: &str) -> Option<GenomicPosition> {
        Some(GenomicPosition {
            chromosome: self.seq_region_name.clone(),
            position: self.start,
            reference: self.reference()?.to_string(),
            alternate: alternate.to_string(),
            assembly: self.assembly(),
            strand: Strand::from_ensembl(self.strand),
        })
    }
}

/// `/lookup/symbol/homo_sapiens/{symbol}?expand=1`.
#[derive(Clone, Debug, Deserialize)]
pub struct EnsemblGene {
    pub id: String,
    pub display_name: Option<String>,
    pub seq_region_name: String,
    pub start: u64,
    pub end: u64,
    #[serde(default = "forward_strand")]
    pub strand: i64,
    pub assembly_name: Option<String>,
    pub biotype: Option<String>,
    pub canonical_transcript: Option<String>,
    #[serde(rename = "Transcript", default)]
    pub transcripts: Vec<EnsemblTranscript>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EnsemblTranscript {
    pub id: String,
    #[serde(default)]
    pub is_canonical: u8,
    pub biotype: Option<String>,
    pub start: u64,
    pub end: u64,
    #[serde(rename = "Translation")]
    pub translation: Option<EnsemblTranslation>,
}

impl EnsemblTranscript {
    pub fn is_protein_coding(&self) -> bool {
        self.biotype.as_deref() == Some("protein_coding")
    }

    /// Protein length when translated, genomic span otherwise.
    pub fn size(&self) -> u64 {
        match &self.translation {
            Some(translation) => translation.length,
            None => self.end.saturating_sub(self.start) + 1,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct EnsemblTranslation {
    pub id: String,
    #[serde(default)]
    pub length: u64,
}

/// One entry of a `/vep/human/region` response.
#[derive(Clone, Debug, Deserialize)]
pub struct VepResult {
    pub input: Option<String>,
    pub seq_region_name: String,
    pub start: u64,
    pub allele_string: String,
    pub most_severe_consequence: Option<String>,
    #[serde(default)]
    pub transcript_consequences: Vec<VepTranscriptConsequence>,
}

impl VepResult {
    pub fn reference(&self) -> &str {
        self.allele_string.split('/').next().unwrap_or("")
    }

    pub fn alternates(&self) -> Vec<&str> {
        self.allele_string.split('/').skip(1).collect()
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct VepTranscriptConsequence {
    pub transcript_id: String,
    pub variant_allele: Option<String>,
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
    #[serde(default)]
    pub canonical: u8,
}
