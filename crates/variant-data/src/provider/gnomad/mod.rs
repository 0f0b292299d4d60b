//! gnomAD population frequencies.
//!
//! Queries the gnomAD GraphQL API for every variant of a gene in one request.
//!
//! # Response Format
//!
//! ```text
//! {"data": {"gene": {"variants": [
//!     {"variant_id": "1-100-G-A", "genome": {"ac": 3, "an": 152000, "af": 1.9e-5, "homozygote_count": 0},
//!      "exome": null}
//! ]}}, "errors": [...]}
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::models::{
    Annotation, AnnotationKind, FrequencyAnnotation, GapReason, GenomicPosition, Locus,
    PopulationCounts, RawIdentity,
};
use crate::provider::{AdapterOutput, SourceAdapter, GNOMAD, SOURCE_GNOMAD};
use crate::registry::{FetchClient, FetchRequest};

pub const DEFAULT_DATASET: &str = "gnomad_r4";

const GENE_VARIANTS_QUERY: &str = "query GeneVariants($geneId: String!, $datasetId: DatasetId!, $referenceGenome: ReferenceGenomeId!) {
  gene(gene_id: $geneId, reference_genome: $referenceGenome) {
    variants(dataset: $datasetId) {
      variant_id
      pos
      ref
      alt
      genome { ac an af homozygote_count }
      exome { ac an af homozygote_count }
    }
  }
}";

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<GeneData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GeneData {
    gene: Option<GeneVariants>,
}

#[derive(Debug, Deserialize)]
struct GeneVariants {
    #[serde(default)]
    variants: Vec<GnomadVariant>,
}

#[derive(Debug, Deserialize)]
struct GnomadVariant {
    variant_id: String,
    genome: Option<GnomadCounts>,
    exome: Option<GnomadCounts>,
}

#[derive(Debug, Deserialize)]
struct GnomadCounts {
    ac: Option<u64>,
    an: Option<u64>,
    af: Option<f64>,
    homozygote_count: Option<u64>,
}

impl From<GnomadCounts> for PopulationCounts {
    fn from(counts: GnomadCounts) -> Self {
        Self {
            allele_frequency: counts.af,
            allele_count: counts.ac,
            allele_number: counts.an,
            homozygote_count: counts.homozygote_count,
        }
    }
}

fn non_empty(counts: Option<GnomadCounts>) -> Option<PopulationCounts> {
    counts.map(PopulationCounts::from).filter(|c| !c.is_empty())
}

/// gnomAD genome and exome allele counts for a gene.
pub struct GnomadAdapter {
    dataset: String,
}

impl GnomadAdapter {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
        }
    }

    fn request(&self, locus: &Locus) -> FetchRequest {
        FetchRequest::post(
            GNOMAD,
            "/",
            json!({
                "query": GENE_VARIANTS_QUERY,
                "variables": {
                    "geneId": locus.unversioned_gene_id(),
                    "datasetId": self.dataset,
                    "referenceGenome": locus.assembly.to_string(),
                }
            }),
        )
    }
}

impl Default for GnomadAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_DATASET)
    }
}

#[async_trait]
impl SourceAdapter for GnomadAdapter {
    fn id(&self) -> &'static str {
        SOURCE_GNOMAD
    }

    fn provider(&self) -> &'static str {
        GNOMAD
    }

    fn kind(&self) -> AnnotationKind {
        AnnotationKind::Frequency
    }

    async fn fetch_for_locus(&self, client: &FetchClient, locus: &Locus) -> AdapterOutput {
        let mut output = AdapterOutput::new(self.id());
        let label = format!("gene variants {}", self.dataset);
        let outcome = client.fetch(self.request(locus)).await;
        let Some(response) = output.decode::<GraphQlResponse>(GNOMAD, &label, &outcome) else {
            return output;
        };

        if !response.errors.is_empty() {
            let cause = response
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            warn!(gene = %locus.gene_symbol, %cause, "gnomAD returned GraphQL errors");
            output.reject(&outcome);
            if response.data.is_none() {
                output.gap(GNOMAD, label, GapReason::Unparseable { cause });
                return output;
            }
            // Keep what came back, but the variant list may be short.
            output.gap(GNOMAD, label, GapReason::PartialResponse { cause });
        }

        let variants = response
            .data
            .and_then(|d| d.gene)
            .map(|g| g.variants)
            .unwrap_or_default();

        for variant in variants {
            let Some(position) = GenomicPosition::parse_delimited(&variant.variant_id, locus.assembly)
            else {
                continue;
            };
            let frequency = FrequencyAnnotation {
                genome: non_empty(variant.genome),
                exome: non_empty(variant.exome),
            };
            if frequency.genome.is_none() && frequency.exome.is_none() {
                continue;
            }
            output.push(RawIdentity::Position(position), Annotation::Frequency(frequency));
        }

        info!(gene = %locus.gene_symbol, records = output.records.len(), "gnomAD frequencies mapped");
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_with_partial_errors_still_parses() {
        let response: GraphQlResponse = serde_json::from_str(
            r#"{"data":{"gene":{"variants":[
                 {"variant_id":"1-100-G-A","genome":{"ac":3,"an":1000,"af":null,"homozygote_count":0},"exome":null}
               ]}},"errors":[{"message":"exome data unavailable"}]}"#,
        )
        .unwrap();
        assert_eq!(response.errors.len(), 1);
        let variant = &response.data.unwrap().gene.unwrap().variants[0];
        assert_eq!(variant.variant_id, "1-100-G-A");
    }

    #[test]
    fn test_counts_conversion_derives_frequency() {
        let counts = non_empty(Some(GnomadCounts {
            ac: Some(2),
            an: Some(1000),
            af: None,
            homozygote_count: None,
        }))
        .unwrap();
        assert_eq!(counts.frequency(), Some(0.002));

        let empty = non_empty(Some(GnomadCounts {
            ac: None,
            an: None,
            af: None,
            homozygote_count: None,
        }));
        assert!(empty.is_none());
    }

    #[test]
    fn test_request_uses_unversioned_gene_id() {
        let locus = Locus {
            gene_symbol: "SESN2".to_string(),
            gene_id: "ENSG00000130766.4".to_string(),
            chromosome: "1".to_string(),
            start: 1,
            end: 2,
            strand: Default::default(),
            assembly: Default::default(),
            biotype: None,
            canonical_transcript: None,
            protein_accession: None,
            protein_length: None,
        };
        let request = GnomadAdapter::default().request(&locus);
        let body = request.body.unwrap();
        assert_eq!(body["variables"]["geneId"], "ENSG00000130766");
        assert_eq!(body["variables"]["datasetId"], "gnomad_r4");
        assert_eq!(body["variables"]["referenceGenome"], "GRCh38");
    }
}
