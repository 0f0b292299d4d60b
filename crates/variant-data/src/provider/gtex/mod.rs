//! GTEx single-tissue eQTLs.
//!
//! # API Endpoints
//!
//! - Versioned gene id: `GET /reference/gene?geneId={id}&gencodeVersion=v26`
//! - eQTLs: `GET /association/singleTissueEqtl?gencodeId=..&tissueSiteDetailId=..&page=N`
//!
//! Tissues are queried concurrently; every tissue is paged until the
//! reported page count or the page limit is reached.

mod tissues;

pub use tissues::GTEX_TISSUES;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::models::{
    Annotation, AnnotationKind, GapReason, GenomicPosition, Locus, QtlAssociation, RawIdentity,
};
use crate::provider::{AdapterOutput, SourceAdapter, GTEX, SOURCE_GTEX};
use crate::registry::{FetchClient, FetchRequest};

pub const DEFAULT_DATASET: &str = "gtex_v8";
const GENCODE_VERSION: &str = "v26";
const PAGE_SIZE: u32 = 250;
/// Default upper bound on pages per tissue.
const MAX_PAGES: u32 = 40;
/// Tissues in flight at once; the rate limiter is the real throttle.
const TISSUE_CONCURRENCY: usize = 4;

#[derive(Debug, Deserialize)]
struct GtexPage<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    paging_info: Option<PagingInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PagingInfo {
    number_of_pages: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GtexGene {
    gencode_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GtexEqtl {
    variant_id: Option<String>,
    snp_id: Option<String>,
    p_value: Option<f64>,
    nes: Option<f64>,
    gene_symbol: Option<String>,
    gencode_id: Option<String>,
}

impl GtexEqtl {
    fn identity(&self, locus: &Locus) -> Option<RawIdentity> {
        self.variant_id
            .as_deref()
            .and_then(|id| GenomicPosition::parse_delimited(id, locus.assembly))
            .map(RawIdentity::Position)
            .or_else(|| {
                self.snp_id
                    .as_deref()
                    .filter(|id| id.starts_with("rs"))
                    .map(RawIdentity::accession)
            })
    }
}

/// Expression QTLs across GTEx tissues.
pub struct GtexAdapter {
    tissues: Vec<String>,
    dataset: String,
    max_pages: u32,
}

impl GtexAdapter {
    pub fn new(tissues: Vec<String>) -> Self {
        Self {
            tissues,
            dataset: DEFAULT_DATASET.to_string(),
            max_pages: MAX_PAGES,
        }
    }

    /// Stop paging a tissue after `max_pages`; the rest is reported as a gap.
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    async fn gencode_id(
        &self,
        client: &FetchClient,
        locus: &Locus,
        output: &mut AdapterOutput,
    ) -> Option<String> {
        let request = FetchRequest::get(GTEX, "/reference/gene")
            .param("geneId", locus.unversioned_gene_id())
            .param("gencodeVersion", GENCODE_VERSION)
            .param("genomeBuild", "GRCh38/hg38");
        let outcome = client.fetch(request).await;
        let page: GtexPage<GtexGene> = output.decode(GTEX, "reference gene", &outcome)?;
        let gencode = page.data.into_iter().next().map(|g| g.gencode_id);
        if gencode.is_none() {
            output.gap(
                GTEX,
                "reference gene",
                GapReason::MissingInput {
                    what: format!("gencode id for {}", locus.unversioned_gene_id()),
                },
            );
        }
        gencode
    }

    async fn fetch_tissue(
        &self,
        client: &FetchClient,
        locus: &Locus,
        gencode_id: &str,
        tissue: &str,
    ) -> AdapterOutput {
        let mut output = AdapterOutput::new(SOURCE_GTEX);
        let mut page = 0;
        loop {
            let request = FetchRequest::get(GTEX, "/association/singleTissueEqtl")
                .param("gencodeId", gencode_id)
                .param("tissueSiteDetailId", tissue)
                .param("datasetId", &self.dataset)
                .param("page", page)
                .param("itemsPerPage", PAGE_SIZE);
            let outcome = client.fetch(request).await;
            let label = format!("eqtl {} page {}", tissue, page);
            let Some(response) = output.decode::<GtexPage<GtexEqtl>>(GTEX, &label, &outcome) else {
                break;
            };

            for eqtl in &response.data {
                let Some(identity) = eqtl.identity(locus) else {
                    continue;
                };
                output.push(
                    identity,
                    Annotation::Eqtl(QtlAssociation {
                        context: tissue.to_string(),
                        p_value: eqtl.p_value,
                        effect_size: eqtl.nes,
                        molecular_trait: eqtl.gene_symbol.clone().or_else(|| eqtl.gencode_id.clone()),
                    }),
                );
            }

            let total = response
                .paging_info
                .map(|p| p.number_of_pages)
                .unwrap_or(1);
            page += 1;
            if page >= total {
                break;
            }
            if page >= self.max_pages {
                warn!(tissue, total, limit = self.max_pages, "gtex paging truncated");
                output.gap(
                    GTEX,
                    format!("eqtl {}", tissue),
                    GapReason::Truncated {
                        limit: self.max_pages,
                        total,
                    },
                );
                break;
            }
        }
        debug!(tissue, records = output.records.len(), "gtex tissue done");
        output
    }
}

impl Default for GtexAdapter {
    fn default() -> Self {
        Self::new(GTEX_TISSUES.iter().map(|t| t.to_string()).collect())
    }
}

#[async_trait]
impl SourceAdapter for GtexAdapter {
    fn id(&self) -> &'static str {
        SOURCE_GTEX
    }

    fn provider(&self) -> &'static str {
        GTEX
    }

    fn kind(&self) -> AnnotationKind {
        AnnotationKind::Eqtl
    }

    async fn fetch_for_locus(&self, client: &FetchClient, locus: &Locus) -> AdapterOutput {
        let mut output = AdapterOutput::new(self.id());
        let Some(gencode_id) = self.gencode_id(client, locus, &mut output).await else {
            return output;
        };

        let gencode_id = gencode_id.as_str();
        let requests: Vec<_> = self
            .tissues
            .iter()
            .map(|tissue| async move {
                (tissue, self.fetch_tissue(client, locus, gencode_id, tissue).await)
            })
            .collect();
        let mut tissues: Vec<(&String, AdapterOutput)> = stream::iter(requests)
            .buffer_unordered(TISSUE_CONCURRENCY)
            .collect()
            .await;
        tissues.sort_by(|a, b| a.0.cmp(b.0));

        let mut with_eqtls = 0;
        for (_, tissue) in tissues {
            if !tissue.records.is_empty() {
                with_eqtls += 1;
            }
            output.merge(tissue);
        }

        info!(
            gene = %locus.gene_symbol,
            tissues = self.tissues.len(),
            with_eqtls,
            records = output.records.len(),
            "gtex eqtls mapped"
        );
        output
    }
}
