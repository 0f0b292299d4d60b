//! Ensembl REST adapters.
//!
//! Ensembl plays three roles: it lists the variants in a locus, it resolves
//! gene symbols to loci, and its VEP service predicts functional impact.
//!
//! # API Endpoints
//!
//! - Variant listing: `GET /overlap/region/human/{chr}:{start}-{end}?feature=variation`
//! - Gene lookup: `GET /lookup/symbol/homo_sapiens/{symbol}?expand=1`
//! - VEP: `POST /vep/human/region` with `{"variants": ["1 100 100 G/A +", ...]}`

mod locus;
mod models;
mod vep;

pub use locus::LocusResolver;
pub use models::{
    EnsemblGene, EnsemblTranscript, EnsemblTranslation, EnsemblVariation, VepResult,
    VepTranscriptConsequence,
};
pub use vep::{annotate_coding, is_coding_consequence, VepAdapter, VepAnnotation};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::models::{Annotation, AnnotationKind, ListingAnnotation, Locus, RawIdentity};
use crate::provider::payload::is_sequence_allele;
use crate::provider::{AdapterOutput, SourceAdapter, ENSEMBL, SOURCE_ENSEMBL_VARIATION};
use crate::registry::{FetchClient, FetchRequest};

/// Request for every variation feature overlapping the locus.
pub fn listing_request(locus: &Locus) -> FetchRequest {
    FetchRequest::get(
        ENSEMBL,
        format!("/overlap/region/human/{}", locus.region()),
    )
    .param("feature", "variation")
}

/// Fetch the locus listing, recording a gap on `output` when it is unavailable.
///
/// Several adapters call this; the fetch client serves all but the first
/// from the cache or the in-flight request.
pub async fn fetch_listing(
    client: &FetchClient,
    locus: &Locus,
    output: &mut AdapterOutput,
) -> Option<Vec<EnsemblVariation>> {
    let outcome = client.fetch(listing_request(locus)).await;
    let variations: Vec<EnsemblVariation> =
        output.decode(ENSEMBL, "variant listing", &outcome)?;
    Some(
        variations
            .into_iter()
            .filter(EnsemblVariation::is_accession)
            .collect(),
    )
}

/// Lists the accessioned variants of a locus.
pub struct EnsemblVariationAdapter;

impl EnsemblVariationAdapter {
    pub fn new() -> Self {
        Self
    }

    fn map(variation: &EnsemblVariation, output: &mut AdapterOutput) {
        let consequences = variation.consequences();
        for alternate in variation.alternates() {
            if !is_sequence_allele(alternate) {
                continue;
            }
            let Some(position) = variation.position_for(alternate) else {
                continue;
            };
            let minor_allele_frequency = match &variation.minor_allele {
                Some(minor) if minor != alternate => None,
                _ => variation.minor_allele_freq,
            };
            output.push(
                RawIdentity::Position(position),
                Annotation::Listing(ListingAnnotation {
                    accession: Some(variation.id.clone()),
                    consequence: consequences.first().cloned(),
                    clinical_significance: variation.clinical_significance.clone(),
                    minor_allele_frequency,
                }),
            );
        }
    }
}

impl Default for EnsemblVariationAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for EnsemblVariationAdapter {
    fn id(&self) -> &'static str {
        SOURCE_ENSEMBL_VARIATION
    }

    fn provider(&self) -> &'static str {
        ENSEMBL
    }

    fn kind(&self) -> AnnotationKind {
        AnnotationKind::Listing
    }

    async fn fetch_for_locus(&self, client: &FetchClient, locus: &Locus) -> AdapterOutput {
        let mut output = AdapterOutput::new(self.id());
        let Some(variations) = fetch_listing(client, locus, &mut output).await else {
            return output;
        };

        debug!(gene = %locus.gene_symbol, features = variations.len(), "ensembl listing received");
        for variation in &variations {
            Self::map(variation, &mut output);
        }
        info!(
            gene = %locus.gene_symbol,
            records = output.records.len(),
            "ensembl variation listing mapped"
        );
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variation(json: &str) -> EnsemblVariation {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_multi_allelic_feature_yields_one_record_per_alternate() {
        let mut output = AdapterOutput::new(SOURCE_ENSEMBL_VARIATION);
        let v = variation(
            r#"{"id":"rs1","seq_region_name":"1","start":100,"end":100,"strand":1,
                "alleles":["G","A","T"],"consequence_type":"intron_variant",
                "minor_allele":"A","minor_allele_freq":0.2}"#,
        );
        EnsemblVariationAdapter::map(&v, &mut output);

        assert_eq!(output.records.len(), 2);
        let frequencies: Vec<Option<f64>> = output
            .records
            .iter()
            .map(|r| match &r.annotation {
                Annotation::Listing(listing) => listing.minor_allele_frequency,
                _ => None,
            })
            .collect();
        assert_eq!(frequencies, vec![Some(0.2), None]);
    }

    #[test]
    fn test_non_sequence_alleles_are_skipped() {
        let mut output = AdapterOutput::new(SOURCE_ENSEMBL_VARIATION);
        let v = variation(
            r#"{"id":"rs2","seq_region_name":"1","start":100,"end":100,
                "alleles":["G","HGMD_MUTATION"]}"#,
        );
        EnsemblVariationAdapter::map(&v, &mut output);
        assert!(output.records.is_empty());
    }

    #[test]
    fn test_listing_request_signature() {
        let locus = Locus {
            gene_symbol: "SESN2".to_string(),
            gene_id: "ENSG00000130766".to_string(),
            chromosome: "1".to_string(),
            start: 28259473,
            end: 28282491,
            strand: Default::default(),
            assembly: Default::default(),
            biotype: None,
            canonical_transcript: None,
            protein_accession: None,
            protein_length: None,
        };
        let request = listing_request(&locus);
        assert_eq!(request.endpoint, "/overlap/region/human/1:28259473-28282491");
        assert_eq!(request.params, vec![("feature".to_string(), "variation".to_string())]);
    }
}
