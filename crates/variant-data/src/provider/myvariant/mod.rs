//! MyVariant.info population frequencies.
//!
//! MyVariant is queried by accession, so this adapter first reads the Ensembl
//! listing for the locus and then posts the accessions in batches. Hits are
//! keyed by their genomic HGVS id (`chr1:g.100G>A`), which is precise about
//! the allele even when an accession is multi-allelic.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::models::{
    Annotation, AnnotationKind, FrequencyAnnotation, Locus, PopulationCounts, RawIdentity,
};
use crate::provider::ensembl::fetch_listing;
use crate::provider::{AdapterOutput, SourceAdapter, MYVARIANT, SOURCE_MYVARIANT};
use crate::registry::{FetchClient, FetchRequest};

/// MyVariant accepts up to 1000 ids per POST; 500 keeps responses small.
const BATCH_SIZE: usize = 500;

const FIELDS: &str = "gnomad_exome,gnomad_genome";

#[derive(Debug, Deserialize)]
struct MyVariantHit {
    query: Option<String>,
    #[serde(rename = "_id")]
    id: Option<String>,
    #[serde(default)]
    notfound: bool,
    gnomad_genome: Option<GnomadSection>,
    gnomad_exome: Option<GnomadSection>,
}

/// MyVariant nests each gnomAD count one level deeper: `{"af": {"af": 0.1}}`.
#[derive(Debug, Default, Deserialize)]
struct GnomadSection {
    af: Option<Nested>,
    ac: Option<Nested>,
    an: Option<Nested>,
    hom: Option<Nested>,
}

#[derive(Debug, Default, Deserialize)]
struct Nested {
    af: Option<f64>,
    ac: Option<f64>,
    an: Option<f64>,
    hom: Option<f64>,
}

impl GnomadSection {
    fn counts(&self) -> PopulationCounts {
        let count = |value: Option<f64>| value.filter(|v| *v >= 0.0).map(|v| v as u64);
        PopulationCounts {
            allele_frequency: self.af.as_ref().and_then(|n| n.af),
            allele_count: count(self.ac.as_ref().and_then(|n| n.ac)),
            allele_number: count(self.an.as_ref().and_then(|n| n.an)),
            homozygote_count: count(self.hom.as_ref().and_then(|n| n.hom)),
        }
    }
}

fn section(section: Option<&GnomadSection>) -> Option<PopulationCounts> {
    section.map(GnomadSection::counts).filter(|c| !c.is_empty())
}

/// Batch frequency lookup through MyVariant.info.
pub struct MyVariantAdapter;

impl MyVariantAdapter {
    pub fn new() -> Self {
        Self
    }

    fn map_rows(rows: Vec<Value>, output: &mut AdapterOutput) {
        for row in rows {
            let hit: MyVariantHit = match serde_json::from_value(row) {
                Ok(hit) => hit,
                Err(e) => {
                    debug!(error = %e, "skipping malformed MyVariant row");
                    continue;
                }
            };
            if hit.notfound {
                continue;
            }
            let Some(id) = hit.id else {
                continue;
            };
            let frequency = FrequencyAnnotation {
                genome: section(hit.gnomad_genome.as_ref()),
                exome: section(hit.gnomad_exome.as_ref()),
            };
            if frequency.genome.is_none() && frequency.exome.is_none() {
                debug!(query = ?hit.query, "MyVariant hit without gnomAD counts");
                continue;
            }
            output.push(RawIdentity::Nomenclature(id), Annotation::Frequency(frequency));
        }
    }
}

impl Default for MyVariantAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for MyVariantAdapter {
    fn id(&self) -> &'static str {
        SOURCE_MYVARIANT
    }

    fn provider(&self) -> &'static str {
        MYVARIANT
    }

    fn kind(&self) -> AnnotationKind {
        AnnotationKind::Frequency
    }

    async fn fetch_for_locus(&self, client: &FetchClient, locus: &Locus) -> AdapterOutput {
        let mut output = AdapterOutput::new(self.id());
        let Some(variations) = fetch_listing(client, locus, &mut output).await else {
            return output;
        };

        let accessions: Vec<String> = variations
            .into_iter()
            .map(|v| v.id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        for (index, batch) in accessions.chunks(BATCH_SIZE).enumerate() {
            if client.is_cancelled() {
                output.cancelled = true;
                break;
            }
            let request = FetchRequest::post(
                MYVARIANT,
                "/variant",
                json!({ "ids": batch.join(","), "fields": FIELDS }),
            )
            .param("assembly", "hg38");
            let outcome = client.fetch(request).await;
            let label = format!("variant batch {}", index + 1);
            if let Some(rows) = output.decode::<Vec<Value>>(MYVARIANT, &label, &outcome) {
                Self::map_rows(rows, &mut output);
            }
        }

        info!(gene = %locus.gene_symbol, records = output.records.len(), "MyVariant frequencies mapped");
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_map_to_nomenclature_records() {
        let rows: Vec<Value> = serde_json::from_str(
            r#"[
              {"query":"rs1","_id":"chr1:g.100G>A",
               "gnomad_genome":{"af":{"af":0.002},"ac":{"ac":30},"an":{"an":15000},"hom":{"hom":0}}},
              {"query":"rs1","_id":"chr1:g.100G>T","gnomad_exome":{"af":{"af":0.0001}}},
              {"query":"rs2","notfound":true},
              {"query":"rs3","_id":"chr1:g.300C>T"}
            ]"#,
        )
        .unwrap();
        let mut output = AdapterOutput::new(SOURCE_MYVARIANT);
        MyVariantAdapter::map_rows(rows, &mut output);

        assert_eq!(output.records.len(), 2);
        assert_eq!(
            output.records[0].identity,
            RawIdentity::Nomenclature("chr1:g.100G>A".to_string())
        );
        match &output.records[0].annotation {
            Annotation::Frequency(f) => {
                assert_eq!(f.genome_frequency(), Some(0.002));
                assert_eq!(f.genome.as_ref().unwrap().allele_count, Some(30));
                assert!(f.exome.is_none());
            }
            other => panic!("unexpected annotation {:?}", other),
        }
    }
}
