//! Accession lookup through the Ensembl Variant Recoder.
//!
//! `GET /variant_recoder/human/{id}?fields=vcf_string` answers with one object
//! per input, keyed by alternate allele:
//!
//! ```json
//! [{"A": {"input": "rs123", "vcf_string": ["1-100-G-A"]},
//!   "T": {"input": "rs123", "vcf_string": "1-100-G-T"}}]
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::IdentityLookup;
use crate::errors::VariantDataError;
use crate::models::{Assembly, Chromosome, FetchOutcome, GenomicPosition};
use crate::provider::payload::OneOrMany;
use crate::provider::ENSEMBL;
use crate::registry::{FetchClient, FetchRequest};

#[derive(Debug, Deserialize)]
struct RecodedAllele {
    vcf_string: Option<OneOrMany<String>>,
}

/// Identity lookup backed by Ensembl's Variant Recoder.
pub struct EnsemblVariantRecoder;

impl EnsemblVariantRecoder {
    pub fn new() -> Self {
        Self
    }

    fn parse(payload: Vec<BTreeMap<String, Value>>, assembly: Assembly) -> Vec<GenomicPosition> {
        payload
            .into_iter()
            .flat_map(|by_allele| by_allele.into_values())
            .filter_map(|value| serde_json::from_value::<RecodedAllele>(value).ok())
            .filter_map(|allele| allele.vcf_string)
            .flat_map(|strings| strings.into_vec())
            .filter_map(|vcf| GenomicPosition::parse_delimited(&vcf, assembly))
            .filter(|p| Chromosome::normalize(&p.chromosome).is_primary())
            .collect()
    }
}

impl Default for EnsemblVariantRecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityLookup for EnsemblVariantRecoder {
    async fn candidates(
        &self,
        client: &FetchClient,
        descriptor: &str,
        assembly: Assembly,
    ) -> Result<Vec<GenomicPosition>, VariantDataError> {
        let request = FetchRequest::get(
            ENSEMBL,
            format!("/variant_recoder/human/{}", urlencoding::encode(descriptor)),
        )
        .param("fields", "vcf_string");

        match client.fetch(request).await {
            FetchOutcome::Success(entry) | FetchOutcome::CacheHit(entry) => {
                let payload: Vec<BTreeMap<String, Value>> = entry.json()?;
                Ok(Self::parse(payload, assembly))
            }
            // The recoder answers 400 for identifiers it does not know.
            FetchOutcome::PermanentFailure {
                status: Some(400 | 404),
                ..
            } => Ok(Vec::new()),
            FetchOutcome::PermanentFailure { status, cause } => {
                Err(VariantDataError::PermanentProvider {
                    provider: ENSEMBL.to_string(),
                    status: status.unwrap_or_default(),
                    message: cause,
                })
            }
            FetchOutcome::RateLimited { retry_after } => Err(VariantDataError::RateLimited {
                provider: ENSEMBL.to_string(),
                retry_after,
            }),
            FetchOutcome::TransientFailure { cause, .. } => Err(VariantDataError::Transport {
                provider: ENSEMBL.to_string(),
                message: cause,
            }),
            FetchOutcome::CircuitOpen => Err(VariantDataError::CircuitOpen {
                provider: ENSEMBL.to_string(),
            }),
            FetchOutcome::Cancelled => Err(VariantDataError::Cancelled {
                provider: ENSEMBL.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_allele_keyed_payload() {
        let payload: Vec<BTreeMap<String, Value>> = serde_json::from_str(
            r#"[{
                "A": {"input": "rs123", "vcf_string": ["1-100-G-A"]},
                "T": {"input": "rs123", "vcf_string": "1-100-G-T"},
                "warnings": ["Could not map to patch"],
                "C": {"input": "rs123", "vcf_string": ["HG1_PATCH-5-G-C"]}
            }]"#,
        )
        .unwrap();
        let candidates = EnsemblVariantRecoder::parse(payload, Assembly::GRCh38);
        let alts: Vec<&str> = candidates.iter().map(|p| p.alternate.as_str()).collect();
        assert_eq!(alts, vec!["A", "T"]);
    }

    #[test]
    fn test_parse_empty_payload() {
        assert!(EnsemblVariantRecoder::parse(Vec::new(), Assembly::GRCh38).is_empty());
    }
}
