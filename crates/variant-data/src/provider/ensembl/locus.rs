//! Gene symbol to locus resolution.

use serde::Deserialize;
use tracing::{info, warn};

use super::models::{EnsemblGene, EnsemblTranscript};
use crate::errors::VariantDataError;
use crate::models::{Assembly, FetchOutcome, GapReason, Locus, Strand};
use crate::provider::{ENSEMBL, UNIPROT};
use crate::registry::{FetchClient, FetchRequest};

const HUMAN_TAXON: u32 = 9606;

#[derive(Debug, Deserialize)]
struct UniprotSearch {
    #[serde(default)]
    results: Vec<UniprotSearchHit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UniprotSearchHit {
    primary_accession: String,
    entry_type: Option<String>,
    sequence: Option<UniprotSequence>,
}

#[derive(Debug, Deserialize)]
struct UniprotSequence {
    length: u32,
}

impl UniprotSearchHit {
    fn is_reviewed(&self) -> bool {
        self.entry_type
            .as_deref()
            .map(|t| t.contains("Swiss-Prot") && !t.contains("Inactive"))
            .unwrap_or(false)
    }
}

/// Turns a gene symbol into a [`Locus`].
///
/// The gene lookup is required; the protein lookup is best effort and leaves
/// `protein_accession` empty when UniProt is unavailable.
pub struct LocusResolver {
    assembly: Assembly,
}

impl LocusResolver {
    pub fn new(assembly: Assembly) -> Self {
        Self { assembly }
    }

    pub async fn resolve(
        &self,
        client: &FetchClient,
        symbol: &str,
    ) -> Result<Locus, VariantDataError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(VariantDataError::LocusResolutionFailed {
                symbol: symbol.to_string(),
                message: "empty gene symbol".to_string(),
            });
        }

        let gene = self.lookup_gene(client, symbol).await?;
        let transcript = canonical_transcript(&gene.transcripts);

        let mut locus = Locus {
            gene_symbol: gene.display_name.clone().unwrap_or_else(|| symbol.to_string()),
            gene_id: gene.id.clone(),
            chromosome: gene.seq_region_name.clone(),
            start: gene.start,
            end: gene.end,
            strand: Strand::from_ensembl(gene.strand),
            assembly: gene
                .assembly_name
                .as_deref()
                .and_then(Assembly::parse)
                .unwrap_or(self.assembly),
            biotype: gene.biotype.clone(),
            canonical_transcript: transcript
                .map(|t| t.id.clone())
                .or_else(|| gene.canonical_transcript.as_deref().map(strip_version)),
            protein_accession: None,
            protein_length: None,
        };

        if locus.assembly != self.assembly {
            return Err(VariantDataError::LocusResolutionFailed {
                symbol: symbol.to_string(),
                message: format!(
                    "gene reported on {} but the run targets {}",
                    locus.assembly, self.assembly
                ),
            });
        }

        match self.lookup_protein(client, symbol).await {
            Ok(Some((accession, length))) => {
                locus.protein_accession = Some(accession);
                locus.protein_length = length;
            }
            Ok(None) => warn!(gene = symbol, "no UniProt entry found for gene"),
            Err(reason) => warn!(gene = symbol, ?reason, "UniProt lookup failed"),
        }
        if locus.protein_length.is_none() {
            locus.protein_length = transcript
                .and_then(|t| t.translation.as_ref())
                .map(|p| p.length as u32);
        }

        info!(
            gene = %locus.gene_symbol,
            region = %locus.region(),
            protein = ?locus.protein_accession,
            "locus resolved"
        );
        Ok(locus)
    }

    async fn lookup_gene(
        &self,
        client: &FetchClient,
        symbol: &str,
    ) -> Result<EnsemblGene, VariantDataError> {
        let request = FetchRequest::get(
            ENSEMBL,
            format!("/lookup/symbol/homo_sapiens/{}", symbol),
        )
        .param("expand", 1);

        let outcome = client.fetch(request).await;
        let failed = |message: String| VariantDataError::LocusResolutionFailed {
            symbol: symbol.to_string(),
            message,
        };
        match &outcome {
            FetchOutcome::Success(entry) | FetchOutcome::CacheHit(entry) => entry
                .json::<EnsemblGene>()
                .map_err(|e| failed(e.to_string())),
            FetchOutcome::Cancelled => Err(VariantDataError::Cancelled {
                provider: ENSEMBL.to_string(),
            }),
            other => Err(failed(format!("gene lookup {}", other.label()))),
        }
    }

    async fn lookup_protein(
        &self,
        client: &FetchClient,
        symbol: &str,
    ) -> Result<Option<(String, Option<u32>)>, GapReason> {
        let request = FetchRequest::get(UNIPROT, "/uniprotkb/search")
            .param(
                "query",
                format!("gene:{} AND organism_id:{}", symbol, HUMAN_TAXON),
            )
            .param("fields", "accession,length")
            .param("format", "json");

        let outcome = client.fetch(request).await;
        if let Some(reason) = GapReason::from_outcome(&outcome) {
            return Err(reason);
        }
        let Some(entry) = outcome.entry() else {
            return Ok(None);
        };
        let search: UniprotSearch = entry.json().map_err(|e| GapReason::Unparseable {
            cause: e.to_string(),
        })?;

        let best = search
            .results
            .iter()
            .find(|hit| hit.is_reviewed())
            .or_else(|| search.results.first());
        Ok(best.map(|hit| {
            (
                hit.primary_accession.clone(),
                hit.sequence.as_ref().map(|s| s.length),
            )
        }))
    }
}

fn strip_version(id: &str) -> String {
    id.split('.').next().unwrap_or(id).to_string()
}

/// Flagged canonical transcript, else the longest protein-coding one, else the first.
pub(crate) fn canonical_transcript(transcripts: &[EnsemblTranscript]) -> Option<&EnsemblTranscript> {
    transcripts
        .iter()
        .find(|t| t.is_canonical == 1)
        .or_else(|| {
            transcripts
                .iter()
                .filter(|t| t.is_protein_coding())
                .max_by_key(|t| t.size())
        })
        .or_else(|| transcripts.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcripts(json: &str) -> Vec<EnsemblTranscript> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_flagged_canonical_wins() {
        let list = transcripts(
            r#"[{"id":"T1","biotype":"protein_coding","start":1,"end":900},
                {"id":"T2","is_canonical":1,"biotype":"retained_intron","start":1,"end":10}]"#,
        );
        assert_eq!(canonical_transcript(&list).unwrap().id, "T2");
    }

    #[test]
    fn test_longest_protein_coding_fallback() {
        let list = transcripts(
            r#"[{"id":"T1","biotype":"nonsense_mediated_decay","start":1,"end":5000},
                {"id":"T2","biotype":"protein_coding","start":1,"end":10,"Translation":{"id":"P2","length":120}},
                {"id":"T3","biotype":"protein_coding","start":1,"end":10,"Translation":{"id":"P3","length":480}}]"#,
        );
        assert_eq!(canonical_transcript(&list).unwrap().id, "T3");
    }

    #[test]
    fn test_first_transcript_fallback() {
        let list = transcripts(r#"[{"id":"T9","biotype":"lncRNA","start":1,"end":10}]"#);
        assert_eq!(canonical_transcript(&list).unwrap().id, "T9");
        assert!(canonical_transcript(&[]).is_none());
    }

    #[test]
    fn test_reviewed_hit_detection() {
        let hit: UniprotSearchHit = serde_json::from_str(
            r#"{"primaryAccession":"P58004","entryType":"UniProtKB reviewed (Swiss-Prot)"}"#,
        )
        .unwrap();
        assert!(hit.is_reviewed());
        assert_eq!(strip_version("ENST00000253063.4"), "ENST00000253063");
    }
}
