use serde::{Deserialize, Serialize};

use super::variant::{Assembly, Strand};

/// Genomic region and protein product of a gene.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Locus {
    pub gene_symbol: String,
    pub gene_id: String,
    pub chromosome: String,
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
    pub assembly: Assembly,
    pub biotype: Option<String>,
    pub canonical_transcript: Option<String>,
    pub protein_accession: Option<String>,
    pub protein_length: Option<u32>,
}

impl Locus {
    /// Region string in Ensembl notation, e.g. `19:44905796-44909393`.
    pub fn region(&self) -> String {
        format!("{}:{}-{}", self.chromosome, self.start, self.end)
    }

    /// Region widened by `flank` bases on both sides.
    pub fn flanked(&self, flank: u64) -> (u64, u64) {
        (self.start.saturating_sub(flank).max(1), self.end + flank)
    }

    pub fn contains(&self, chromosome: &str, position: u64) -> bool {
        chromosome.trim_start_matches("chr") == self.chromosome
            && position >= self.start
            && position <= self.end
    }

    /// Gene id without its version suffix.
    pub fn unversioned_gene_id(&self) -> &str {
        self.gene_id.split('.').next().unwrap_or(&self.gene_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apoe() -> Locus {
        Locus {
            gene_symbol: "APOE".to_string(),
            gene_id: "ENSG00000130203.10".to_string(),
            chromosome: "19".to_string(),
            start: 44905796,
            end: 44909393,
            strand: Strand::Forward,
            assembly: Assembly::GRCh38,
            biotype: Some("protein_coding".to_string()),
            canonical_transcript: Some("ENST00000252486".to_string()),
            protein_accession: Some("P02649".to_string()),
            protein_length: Some(317),
        }
    }

    #[test]
    fn test_region_and_flank() {
        let locus = apoe();
        assert_eq!(locus.region(), "19:44905796-44909393");
        assert_eq!(locus.flanked(1000), (44904796, 44910393));
        assert_eq!(locus.unversioned_gene_id(), "ENSG00000130203");
    }

    #[test]
    fn test_contains() {
        let locus = apoe();
        assert!(locus.contains("chr19", 44908684));
        assert!(!locus.contains("19", 44909394));
        assert!(!locus.contains("1", 44908684));
    }
}
