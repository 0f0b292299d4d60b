//! Protein domain mapping through UniProt.
//!
//! Coding variants get their protein positions from VEP; this adapter reads
//! the domain and region features of the locus' protein and reports which of
//! them each variant falls in.
//!
//! # API Endpoints
//!
//! - Entry: `GET /uniprotkb/{accession}.json`

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::models::{
    Annotation, AnnotationKind, DomainAnnotation, DomainSpan, GapReason, Locus, RawIdentity,
};
use crate::provider::ensembl::annotate_coding;
use crate::provider::{AdapterOutput, SourceAdapter, UNIPROT, SOURCE_UNIPROT_DOMAINS};
use crate::registry::{FetchClient, FetchRequest};

/// Feature types treated as domains.
const DOMAIN_FEATURES: [&str; 2] = ["Domain", "Region"];

#[derive(Debug, Deserialize)]
struct UniprotEntry {
    #[serde(default)]
    features: Vec<UniprotFeature>,
}

#[derive(Debug, Deserialize)]
struct UniprotFeature {
    #[serde(rename = "type")]
    feature_type: String,
    description: Option<String>,
    location: Option<FeatureLocation>,
}

#[derive(Debug, Deserialize)]
struct FeatureLocation {
    start: Option<FeaturePosition>,
    end: Option<FeaturePosition>,
}

#[derive(Debug, Deserialize)]
struct FeaturePosition {
    value: Option<u32>,
}

impl UniprotEntry {
    /// Domain spans with known bounds, sorted by start.
    fn domains(&self) -> Vec<DomainSpan> {
        let mut spans: Vec<DomainSpan> = self
            .features
            .iter()
            .filter(|f| DOMAIN_FEATURES.contains(&f.feature_type.as_str()))
            .filter_map(|f| {
                let location = f.location.as_ref()?;
                let start = location.start.as_ref()?.value?;
                let end = location.end.as_ref()?.value?;
                Some(DomainSpan {
                    description: f.description.clone().unwrap_or_else(|| "Unknown".to_string()),
                    start,
                    end,
                })
            })
            .collect();
        spans.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.end.cmp(&b.end)));
        spans
    }
}

fn affected(domains: &[DomainSpan], start: u32, end: u32) -> Vec<DomainSpan> {
    domains
        .iter()
        .filter(|d| d.overlaps(start, end))
        .cloned()
        .collect()
}

/// Maps coding variants onto protein domains.
pub struct UniprotDomainAdapter;

impl UniprotDomainAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UniprotDomainAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for UniprotDomainAdapter {
    fn id(&self) -> &'static str {
        SOURCE_UNIPROT_DOMAINS
    }

    fn provider(&self) -> &'static str {
        UNIPROT
    }

    fn kind(&self) -> AnnotationKind {
        AnnotationKind::Domain
    }

    async fn fetch_for_locus(&self, client: &FetchClient, locus: &Locus) -> AdapterOutput {
        let mut output = AdapterOutput::new(self.id());
        let Some(accession) = locus.protein_accession.clone() else {
            output.gap(
                UNIPROT,
                "protein entry",
                GapReason::MissingInput {
                    what: format!("protein accession for {}", locus.gene_symbol),
                },
            );
            return output;
        };

        let request = FetchRequest::get(UNIPROT, format!("/uniprotkb/{}.json", accession));
        let outcome = client.fetch(request).await;
        let Some(entry) = output.decode::<UniprotEntry>(UNIPROT, "protein entry", &outcome) else {
            return output;
        };
        let domains = entry.domains();

        for annotation in annotate_coding(client, locus, &mut output).await {
            let Some(start) = annotation.functional.protein_start else {
                continue;
            };
            let end = annotation.functional.protein_end.unwrap_or(start);
            output.push(
                RawIdentity::Position(annotation.position),
                Annotation::Domain(DomainAnnotation {
                    protein_accession: accession.clone(),
                    protein_start: start,
                    protein_end: end,
                    domains: affected(&domains, start, end),
                }),
            );
        }

        info!(
            gene = %locus.gene_symbol,
            protein = %accession,
            domains = domains.len(),
            records = output.records.len(),
            "protein domains mapped"
        );
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> UniprotEntry {
        serde_json::from_str(
            r#"{"primaryAccession":"P58004","features":[
                {"type":"Region","description":"Disordered","location":{"start":{"value":200},"end":{"value":260}}},
                {"type":"Domain","description":"Sestrin","location":{"start":{"value":10},"end":{"value":120}}},
                {"type":"Chain","description":"Sestrin-2","location":{"start":{"value":1},"end":{"value":480}}},
                {"type":"Domain","description":"Fuzzy","location":{"start":{"value":null},"end":{"value":30}}}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_domains_filtered_and_sorted() {
        let domains = entry().domains();
        assert_eq!(domains.len(), 2);
        assert_eq!(domains[0].description, "Sestrin");
        assert_eq!(domains[1].description, "Disordered");
    }

    #[test]
    fn test_affected_domains() {
        let domains = entry().domains();
        assert_eq!(affected(&domains, 120, 120).len(), 1);
        assert_eq!(affected(&domains, 119, 201).len(), 2);
        assert!(affected(&domains, 150, 160).is_empty());
    }
}
