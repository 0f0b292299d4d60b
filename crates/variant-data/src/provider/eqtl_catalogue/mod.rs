//! Protein QTLs from the eQTL Catalogue.
//!
//! The catalogue hosts aptamer-based proteomics datasets next to its
//! expression datasets. This adapter lists the aptamer datasets, then asks each
//! one for associations with the locus' gene.
//!
//! # API Endpoints
//!
//! - Datasets: `GET /datasets?quant_method=aptamer`
//! - Associations: `GET /datasets/{dataset_id}/associations?gene_id={id}&start=N&size=M`
//!
//! A dataset without associations for the gene answers 404; that is an empty
//! result, not a gap.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use crate::models::{
    Annotation, AnnotationKind, FetchOutcome, GenomicPosition, Locus, QtlAssociation, RawIdentity,
};
use crate::provider::{AdapterOutput, SourceAdapter, EQTL_CATALOGUE, SOURCE_EQTL_CATALOGUE};
use crate::registry::{FetchClient, FetchRequest};

const QUANT_METHOD: &str = "aptamer";
const PAGE_SIZE: usize = 1000;
const MAX_PAGES: usize = 20;
const DATASET_CONCURRENCY: usize = 4;

#[derive(Clone, Debug, Deserialize)]
struct Dataset {
    dataset_id: String,
    study_label: Option<String>,
    sample_group: Option<String>,
}

impl Dataset {
    fn context(&self) -> String {
        match (&self.study_label, &self.sample_group) {
            (Some(study), Some(group)) => format!("{} {}", study, group),
            (Some(study), None) => study.clone(),
            _ => self.dataset_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Association {
    molecular_trait_id: Option<String>,
    chromosome: Option<String>,
    position: Option<u64>,
    #[serde(rename = "ref")]
    reference: Option<String>,
    alt: Option<String>,
    variant: Option<String>,
    rsid: Option<String>,
    pvalue: Option<f64>,
    beta: Option<f64>,
}

impl Association {
    fn identity(&self, locus: &Locus) -> Option<RawIdentity> {
        if let (Some(chromosome), Some(position), Some(reference), Some(alt)) =
            (&self.chromosome, self.position, &self.reference, &self.alt)
        {
            let mut tuple = GenomicPosition::grch38(chromosome, position, reference, alt);
            tuple.assembly = locus.assembly;
            return Some(RawIdentity::Position(tuple));
        }
        self.variant
            .as_deref()
            .and_then(|v| GenomicPosition::parse_delimited(v, locus.assembly))
            .map(RawIdentity::Position)
            .or_else(|| {
                self.rsid
                    .as_deref()
                    .filter(|id| id.starts_with("rs"))
                    .map(RawIdentity::accession)
            })
    }
}

/// Protein-level QTLs from aptamer datasets.
pub struct EqtlCatalogueAdapter;

impl EqtlCatalogueAdapter {
    pub fn new() -> Self {
        Self
    }

    async fn fetch_dataset(
        &self,
        client: &FetchClient,
        locus: &Locus,
        dataset: &Dataset,
    ) -> AdapterOutput {
        let mut output = AdapterOutput::new(SOURCE_EQTL_CATALOGUE);
        let context = dataset.context();

        for page in 0..MAX_PAGES {
            let request = FetchRequest::get(
                EQTL_CATALOGUE,
                format!("/datasets/{}/associations", dataset.dataset_id),
            )
            .param("gene_id", locus.unversioned_gene_id())
            .param("start", page * PAGE_SIZE)
            .param("size", PAGE_SIZE);
            let outcome = client.fetch(request).await;

            if let FetchOutcome::PermanentFailure {
                status: Some(404), ..
            } = outcome
            {
                break;
            }
            let label = format!("pqtl {} page {}", dataset.dataset_id, page);
            let Some(associations) =
                output.decode::<Vec<Association>>(EQTL_CATALOGUE, &label, &outcome)
            else {
                break;
            };

            let received = associations.len();
            for association in associations {
                let Some(identity) = association.identity(locus) else {
                    continue;
                };
                output.push(
                    identity,
                    Annotation::Pqtl(QtlAssociation {
                        context: context.clone(),
                        p_value: association.pvalue,
                        effect_size: association.beta,
                        molecular_trait: association.molecular_trait_id,
                    }),
                );
            }
            if received < PAGE_SIZE {
                break;
            }
        }
        debug!(dataset = %dataset.dataset_id, records = output.records.len(), "pqtl dataset done");
        output
    }
}

impl Default for EqtlCatalogueAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for EqtlCatalogueAdapter {
    fn id(&self) -> &'static str {
        SOURCE_EQTL_CATALOGUE
    }

    fn provider(&self) -> &'static str {
        EQTL_CATALOGUE
    }

    fn kind(&self) -> AnnotationKind {
        AnnotationKind::Pqtl
    }

    async fn fetch_for_locus(&self, client: &FetchClient, locus: &Locus) -> AdapterOutput {
        let mut output = AdapterOutput::new(self.id());
        let request = FetchRequest::get(EQTL_CATALOGUE, "/datasets")
            .param("quant_method", QUANT_METHOD)
            .param("size", PAGE_SIZE);
        let outcome = client.fetch(request).await;
        let Some(mut datasets) =
            output.decode::<Vec<Dataset>>(EQTL_CATALOGUE, "aptamer datasets", &outcome)
        else {
            return output;
        };
        datasets.sort_by(|a, b| a.dataset_id.cmp(&b.dataset_id));

        let requests: Vec<_> = datasets
            .iter()
            .map(|dataset| async move {
                (
                    dataset.dataset_id.as_str(),
                    self.fetch_dataset(client, locus, dataset).await,
                )
            })
            .collect();
        let mut results: Vec<(&str, AdapterOutput)> = stream::iter(requests)
            .buffer_unordered(DATASET_CONCURRENCY)
            .collect()
            .await;
        results.sort_by(|a, b| a.0.cmp(b.0));
        for (_, result) in results {
            output.merge(result);
        }

        info!(
            gene = %locus.gene_symbol,
            datasets = datasets.len(),
            records = output.records.len(),
            "pqtl associations mapped"
        );
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locus() -> Locus {
        Locus {
            gene_symbol: "SESN2".to_string(),
            gene_id: "ENSG00000130766".to_string(),
            chromosome: "1".to_string(),
            start: 1,
            end: 2,
            strand: Default::default(),
            assembly: Default::default(),
            biotype: None,
            canonical_transcript: None,
            protein_accession: None,
            protein_length: None,
        }
    }

    #[test]
    fn test_association_identity_forms() {
        let full: Association = serde_json::from_str(
            r#"{"chromosome":"1","position":100,"ref":"G","alt":"A","rsid":"rs1","pvalue":1e-7}"#,
        )
        .unwrap();
        assert!(matches!(full.identity(&locus()), Some(RawIdentity::Position(_))));

        let variant_only: Association =
            serde_json::from_str(r#"{"variant":"chr1_100_G_A","rsid":"rs1"}"#).unwrap();
        match variant_only.identity(&locus()) {
            Some(RawIdentity::Position(p)) => assert_eq!(p.alternate, "A"),
            other => panic!("unexpected identity {:?}", other),
        }

        let rsid_only: Association = serde_json::from_str(r#"{"rsid":"rs1"}"#).unwrap();
        assert_eq!(rsid_only.identity(&locus()), Some(RawIdentity::accession("rs1")));
    }

    #[test]
    fn test_dataset_context() {
        let dataset: Dataset = serde_json::from_str(
            r#"{"dataset_id":"QTD000584","study_label":"Sun_2018","sample_group":"plasma"}"#,
        )
        .unwrap();
        assert_eq!(dataset.context(), "Sun_2018 plasma");

        let bare: Dataset = serde_json::from_str(r#"{"dataset_id":"QTD1"}"#).unwrap();
        assert_eq!(bare.context(), "QTD1");
    }
}
