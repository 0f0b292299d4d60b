//! Functional consequence prediction through Ensembl VEP.

use std::collections::BTreeSet;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::json;
use tracing::{debug, info};

use super::fetch_listing;
use super::models::{EnsemblVariation, VepResult, VepTranscriptConsequence};
use crate::models::{
    Annotation, AnnotationKind, FunctionalAnnotation, GenomicPosition, Locus, RawIdentity, Strand,
};
use crate::provider::payload::is_sequence_allele;
use crate::provider::{AdapterOutput, SourceAdapter, ENSEMBL, SOURCE_ENSEMBL_VEP};
use crate::registry::{FetchClient, FetchRequest};

/// VEP accepts at most 200 region strings per POST.
const VEP_BATCH_SIZE: usize = 200;

lazy_static! {
    /// Listing consequences worth a protein-level prediction.
    static ref CODING_CONSEQUENCE: Regex =
        Regex::new(r"missense|nonsense|frameshift|splice|stop_gained|stop_lost|start_lost|inframe")
            .expect("Invalid regex pattern");
}

/// One predicted consequence for one alternate allele.
#[derive(Clone, Debug, PartialEq)]
pub struct VepAnnotation {
    pub position: GenomicPosition,
    pub functional: FunctionalAnnotation,
}

/// Whether a consequence term alters the protein product.
pub fn is_coding_consequence(term: &str) -> bool {
    CODING_CONSEQUENCE.is_match(term)
}

fn is_coding(variation: &EnsemblVariation) -> bool {
    variation
        .consequences()
        .iter()
        .any(|c| is_coding_consequence(c))
}

/// Region-format input line, e.g. `1 100 100 G/A +`.
fn region_input(variation: &EnsemblVariation) -> Option<String> {
    if variation.alleles.len() < 2 || !variation.alleles.iter().all(|a| is_sequence_allele(a)) {
        return None;
    }
    let strand = if variation.strand < 0 { "-" } else { "+" };
    Some(format!(
        "{} {} {} {} {}",
        variation.seq_region_name,
        variation.start,
        variation.end,
        variation.alleles.join("/"),
        strand
    ))
}

/// Pick the transcript consequence reported for `alternate`, preferring the
/// locus' canonical transcript, then any transcript flagged canonical.
fn pick_transcript<'a>(
    result: &'a VepResult,
    alternate: &str,
    canonical: Option<&str>,
) -> Option<&'a VepTranscriptConsequence> {
    let candidates: Vec<&VepTranscriptConsequence> = result
        .transcript_consequences
        .iter()
        .filter(|tc| {
            tc.variant_allele
                .as_deref()
                .map(|a| a.eq_ignore_ascii_case(alternate))
                .unwrap_or(true)
        })
        .collect();

    candidates
        .iter()
        .find(|tc| {
            canonical
                .map(|id| tc.transcript_id.split('.').next() == Some(id))
                .unwrap_or(false)
        })
        .or_else(|| candidates.iter().find(|tc| tc.canonical == 1))
        .or_else(|| candidates.first())
        .copied()
}

fn functional(result: &VepResult, transcript: Option<&VepTranscriptConsequence>) -> FunctionalAnnotation {
    let mut annotation = FunctionalAnnotation {
        most_severe_consequence: result.most_severe_consequence.clone(),
        ..Default::default()
    };
    if let Some(tc) = transcript {
        annotation.transcript_id = Some(tc.transcript_id.clone());
        annotation.consequence_terms = tc.consequence_terms.clone();
        annotation.sift_score = tc.sift_score;
        annotation.sift_prediction = tc.sift_prediction.clone();
        annotation.polyphen_score = tc.polyphen_score;
        annotation.polyphen_prediction = tc.polyphen_prediction.clone();
        annotation.amino_acids = tc.amino_acids.clone();
        annotation.codons = tc.codons.clone();
        annotation.protein_start = tc.protein_start;
        annotation.protein_end = tc.protein_end.or(tc.protein_start);
    }
    annotation
}

fn map_result(result: &VepResult, locus: &Locus) -> Vec<VepAnnotation> {
    let canonical = locus.canonical_transcript.as_deref();
    result
        .alternates()
        .into_iter()
        .map(|alternate| VepAnnotation {
            position: GenomicPosition {
                chromosome: result.seq_region_name.clone(),
                position: result.start,
                reference: result.reference().to_string(),
                alternate: alternate.to_string(),
                assembly: locus.assembly,
                strand: Strand::Forward,
            },
            functional: functional(result, pick_transcript(result, alternate, canonical)),
        })
        .collect()
}

/// Predict consequences for the coding variants of a locus.
///
/// Shared by the VEP and domain-mapping adapters; gaps are recorded on the
/// caller's `output`.
pub async fn annotate_coding(
    client: &FetchClient,
    locus: &Locus,
    output: &mut AdapterOutput,
) -> Vec<VepAnnotation> {
    let Some(variations) = fetch_listing(client, locus, output).await else {
        return Vec::new();
    };

    let inputs: Vec<String> = variations
        .iter()
        .filter(|v| is_coding(v))
        .filter_map(region_input)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    debug!(gene = %locus.gene_symbol, inputs = inputs.len(), "coding variants selected for VEP");

    let mut annotations = Vec::new();
    for (index, batch) in inputs.chunks(VEP_BATCH_SIZE).enumerate() {
        if client.is_cancelled() {
            output.cancelled = true;
            break;
        }
        let request = FetchRequest::post(ENSEMBL, "/vep/human/region", json!({ "variants": batch }))
            .param("canonical", 1)
            .param("protein", 1);
        let outcome = client.fetch(request).await;
        let label = format!("vep batch {}", index + 1);
        let Some(results) = output.decode::<Vec<VepResult>>(ENSEMBL, &label, &outcome) else {
            continue;
        };
        annotations.extend(results.iter().flat_map(|r| map_result(r, locus)));
    }
    annotations
}

/// Functional predictions for coding variants.
pub struct VepAdapter;

impl VepAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for VepAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for VepAdapter {
    fn id(&self) -> &'static str {
        SOURCE_ENSEMBL_VEP
    }

    fn provider(&self) -> &'static str {
        ENSEMBL
    }

    fn kind(&self) -> AnnotationKind {
        AnnotationKind::Functional
    }

    async fn fetch_for_locus(&self, client: &FetchClient, locus: &Locus) -> AdapterOutput {
        let mut output = AdapterOutput::new(self.id());
        for annotation in annotate_coding(client, locus, &mut output).await {
            output.push(
                RawIdentity::Position(annotation.position),
                Annotation::Functional(annotation.functional),
            );
        }
        info!(gene = %locus.gene_symbol, records = output.records.len(), "vep annotations mapped");
        output
    }
}
