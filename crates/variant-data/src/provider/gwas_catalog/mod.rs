//! GWAS Catalog associations.
//!
//! SNPs are found two ways: by gene name, which also returns SNPs mapped
//! near the gene, and by the locus' coordinate range. A SNP found by both
//! is placed within the gene.
//!
//! # API Endpoints
//!
//! - `GET /singleNucleotidePolymorphisms/search/findByGene?geneName={symbol}`
//! - `GET /singleNucleotidePolymorphisms/search/findByChromBpLocationRange?chrom=..&bpStart=..&bpEnd=..`
//! - `GET /singleNucleotidePolymorphisms/{rsId}/associations?projection=associationBySnp`
//!
//! All responses are HAL documents with the payload under `_embedded`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use crate::models::{
    Annotation, AnnotationKind, GenePlacement, GwasAssociation, Locus, RawIdentity,
};
use crate::provider::{AdapterOutput, SourceAdapter, GWAS_CATALOG, SOURCE_GWAS_CATALOG};
use crate::registry::{FetchClient, FetchRequest};

const PAGE_SIZE: u32 = 500;
const MAX_PAGES: u32 = 20;
const SNP_CONCURRENCY: usize = 8;
const STUDY_TITLE_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
struct HalPage<T> {
    #[serde(rename = "_embedded")]
    embedded: Option<T>,
    page: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    total_pages: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnpList {
    #[serde(default)]
    single_nucleotide_polymorphisms: Vec<Snp>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snp {
    rs_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AssociationList {
    #[serde(default)]
    associations: Vec<Association>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Association {
    pvalue: Option<f64>,
    #[serde(default)]
    efo_traits: Vec<EfoTrait>,
    beta_unit: Option<String>,
    description: Option<String>,
    study: Option<Study>,
    #[serde(default)]
    loci: Vec<AssociationLocus>,
}

#[derive(Debug, Deserialize)]
struct EfoTrait {
    #[serde(rename = "trait")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Study {
    accession_id: Option<String>,
    title: Option<String>,
    publication_info: Option<PublicationInfo>,
}

#[derive(Debug, Deserialize)]
struct PublicationInfo {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssociationLocus {
    #[serde(default)]
    strongest_risk_alleles: Vec<RiskAllele>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RiskAllele {
    risk_allele_name: Option<String>,
}

impl Association {
    fn trait_name(&self) -> Option<String> {
        if let Some(name) = self.efo_traits.first().and_then(|t| t.name.clone()) {
            return Some(name);
        }
        if let Some(unit) = self.beta_unit.as_deref().filter(|u| !u.is_empty()) {
            return Some(format!("Quantitative trait ({})", unit));
        }
        self.description.clone().filter(|d| !d.is_empty())
    }

    fn study(&self) -> Option<String> {
        let study = self.study.as_ref()?;
        let title = study
            .publication_info
            .as_ref()
            .and_then(|p| p.title.as_ref())
            .or(study.title.as_ref())
            .map(|t| t.chars().take(STUDY_TITLE_LIMIT).collect::<String>());
        study.accession_id.clone().or(title)
    }

    /// Risk allele this association reports for `rs_id`, when it is a plain
    /// nucleotide sequence (`rs123-A`, not `rs123-?`).
    fn risk_allele(&self, rs_id: &str) -> Option<String> {
        self.loci
            .iter()
            .flat_map(|l| l.strongest_risk_alleles.iter())
            .filter_map(|a| a.risk_allele_name.as_deref())
            .find_map(|name| {
                let (id, allele) = name.rsplit_once('-')?;
                let allele = allele.trim().to_ascii_uppercase();
                let nucleotides = !allele.is_empty()
                    && allele.chars().all(|c| matches!(c, 'A' | 'C' | 'G' | 'T'));
                (id.trim().eq_ignore_ascii_case(rs_id) && nucleotides).then_some(allele)
            })
    }
}

/// Trait associations for SNPs in and around the gene.
pub struct GwasCatalogAdapter;

impl GwasCatalogAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Page through a SNP search, collecting rs ids.
    async fn search(
        &self,
        client: &FetchClient,
        endpoint: &str,
        params: &[(&str, String)],
        label: &str,
        output: &mut AdapterOutput,
    ) -> Vec<String> {
        let mut ids = Vec::new();
        let mut page = 0;
        loop {
            let mut request = FetchRequest::get(GWAS_CATALOG, endpoint)
                .param("page", page)
                .param("size", PAGE_SIZE);
            for (key, value) in params {
                request = request.param(*key, value);
            }
            let outcome = client.fetch(request).await;
            let request_label = format!("{} page {}", label, page);
            let Some(response) =
                output.decode::<HalPage<SnpList>>(GWAS_CATALOG, &request_label, &outcome)
            else {
                break;
            };

            ids.extend(
                response
                    .embedded
                    .unwrap_or_default()
                    .single_nucleotide_polymorphisms
                    .into_iter()
                    .filter_map(|snp| snp.rs_id)
                    .filter(|id| id.starts_with("rs")),
            );

            let pages = response
                .page
                .map(|p| p.total_pages)
                .unwrap_or(1)
                .min(MAX_PAGES);
            page += 1;
            if page >= pages {
                break;
            }
        }
        ids
    }

    async fn fetch_snp(
        &self,
        client: &FetchClient,
        rs_id: &str,
        placement: GenePlacement,
    ) -> AdapterOutput {
        let mut output = AdapterOutput::new(SOURCE_GWAS_CATALOG);
        let request = FetchRequest::get(
            GWAS_CATALOG,
            format!("/singleNucleotidePolymorphisms/{}/associations", rs_id),
        )
        .param("projection", "associationBySnp");
        let outcome = client.fetch(request).await;
        let label = format!("associations {}", rs_id);
        let Some(response) =
            output.decode::<HalPage<AssociationList>>(GWAS_CATALOG, &label, &outcome)
        else {
            return output;
        };

        Self::map_associations(
            rs_id,
            placement,
            response.embedded.unwrap_or_default().associations,
            &mut output,
        );
        output
    }

    fn map_associations(
        rs_id: &str,
        placement: GenePlacement,
        associations: Vec<Association>,
        output: &mut AdapterOutput,
    ) {
        // A catalogued SNP without association details still marks a hit.
        if associations.is_empty() {
            output.push(
                RawIdentity::accession(rs_id),
                Annotation::Gwas(GwasAssociation {
                    trait_name: None,
                    p_value: None,
                    study: None,
                    placement,
                }),
            );
            return;
        }
        for association in associations {
            let identity = match association.risk_allele(rs_id) {
                Some(allele) => RawIdentity::accession_with_allele(rs_id, allele),
                None => RawIdentity::accession(rs_id),
            };
            output.push(
                identity,
                Annotation::Gwas(GwasAssociation {
                    trait_name: association.trait_name(),
                    p_value: association.pvalue,
                    study: association.study(),
                    placement,
                }),
            );
        }
    }
}

impl Default for GwasCatalogAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for GwasCatalogAdapter {
    fn id(&self) -> &'static str {
        SOURCE_GWAS_CATALOG
    }

    fn provider(&self) -> &'static str {
        GWAS_CATALOG
    }

    fn kind(&self) -> AnnotationKind {
        AnnotationKind::Gwas
    }

    async fn fetch_for_locus(&self, client: &FetchClient, locus: &Locus) -> AdapterOutput {
        let mut output = AdapterOutput::new(self.id());

        let near = self
            .search(
                client,
                "/singleNucleotidePolymorphisms/search/findByGene",
                &[("geneName", locus.gene_symbol.clone())],
                "snps by gene",
                &mut output,
            )
            .await;
        let within = self
            .search(
                client,
                "/singleNucleotidePolymorphisms/search/findByChromBpLocationRange",
                &[
                    ("chrom", locus.chromosome.clone()),
                    ("bpStart", locus.start.to_string()),
                    ("bpEnd", locus.end.to_string()),
                ],
                "snps by region",
                &mut output,
            )
            .await;

        let mut placements: BTreeMap<String, GenePlacement> = BTreeMap::new();
        for id in near {
            placements.insert(id, GenePlacement::NearGene);
        }
        for id in within {
            placements.insert(id, GenePlacement::WithinGene);
        }
        debug!(gene = %locus.gene_symbol, snps = placements.len(), "gwas snps found");

        let requests: Vec<_> = placements
            .iter()
            .map(|(rs_id, placement)| async move {
                (rs_id, self.fetch_snp(client, rs_id, *placement).await)
            })
            .collect();
        let mut results: Vec<(&String, AdapterOutput)> = stream::iter(requests)
            .buffer_unordered(SNP_CONCURRENCY)
            .collect()
            .await;
        results.sort_by(|a, b| a.0.cmp(b.0));
        for (_, result) in results {
            output.merge(result);
        }

        info!(
            gene = %locus.gene_symbol,
            snps = placements.len(),
            records = output.records.len(),
            "gwas associations mapped"
        );
        output
    }
}
