//! Variant identity types: raw descriptors as providers report them and the
//! canonical key they resolve to.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Reference genome assembly.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Assembly {
    #[default]
    GRCh38,
    GRCh37,
}

impl Assembly {
    /// Parse the assembly spellings used across providers.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "grch38" | "hg38" | "b38" | "38" => Some(Self::GRCh38),
            "grch37" | "hg19" | "b37" | "37" => Some(Self::GRCh37),
            _ => None,
        }
    }
}

impl fmt::Display for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GRCh38 => write!(f, "GRCh38"),
            Self::GRCh37 => write!(f, "GRCh37"),
        }
    }
}

/// Strand the alleles of a descriptor are reported on.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Strand {
    #[default]
    Forward,
    Reverse,
}

impl Strand {
    /// Ensembl encodes strand as 1 / -1.
    pub fn from_ensembl(value: i64) -> Self {
        if value < 0 {
            Self::Reverse
        } else {
            Self::Forward
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "+"),
            Self::Reverse => write!(f, "-"),
        }
    }
}

/// Position + allele tuple as reported by a provider, before normalization.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct GenomicPosition {
    pub chromosome: String,
    pub position: u64,
    pub reference: String,
    pub alternate: String,
    pub assembly: Assembly,
    pub strand: Strand,
}

impl GenomicPosition {
    /// Forward-strand GRCh38 tuple.
    pub fn grch38(chromosome: &str, position: u64, reference: &str, alternate: &str) -> Self {
        Self {
            chromosome: chromosome.to_string(),
            position,
            reference: reference.to_string(),
            alternate: alternate.to_string(),
            assembly: Assembly::GRCh38,
            strand: Strand::Forward,
        }
    }

    /// Parse underscore or dash separated forms such as `chr1_100_G_A_b38`
    /// (GTEx) and `1-100-G-A` (gnomAD, VCF strings).
    pub fn parse_delimited(value: &str, default_assembly: Assembly) -> Option<Self> {
        let separator = if value.contains('_') { '_' } else { '-' };
        let parts: Vec<&str> = value.trim().split(separator).collect();
        if parts.len() < 4 || parts.len() > 5 {
            return None;
        }
        let position = parts[1].parse::<u64>().ok()?;
        let assembly = match parts.get(4) {
            Some(tag) => Assembly::parse(tag)?,
            None => default_assembly,
        };
        Some(Self {
            chromosome: parts[0].to_string(),
            position,
            reference: parts[2].to_string(),
            alternate: parts[3].to_string(),
            assembly,
            strand: Strand::Forward,
        })
    }
}

/// A provider's native way of naming a variant.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum RawIdentity {
    /// Stable accession such as `rs123`, optionally with the allele the
    /// provider is talking about.
    Accession {
        id: String,
        allele_hint: Option<String>,
    },
    /// Genomic coordinate and alleles.
    Position(GenomicPosition),
    /// HGVS-like nomenclature string.
    Nomenclature(String),
}

impl RawIdentity {
    pub fn accession(id: impl Into<String>) -> Self {
        Self::Accession {
            id: id.into(),
            allele_hint: None,
        }
    }

    pub fn accession_with_allele(id: impl Into<String>, allele: impl Into<String>) -> Self {
        Self::Accession {
            id: id.into(),
            allele_hint: Some(allele.into()),
        }
    }
}

impl fmt::Display for RawIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accession {
                id,
                allele_hint: Some(allele),
            } => write!(f, "accession:{}-{}", id, allele),
            Self::Accession { id, .. } => write!(f, "accession:{}", id),
            Self::Position(p) => write!(
                f,
                "position:{}:{}:{}:{}:{}:{}",
                p.chromosome, p.position, p.reference, p.alternate, p.assembly, p.strand
            ),
            Self::Nomenclature(text) => write!(f, "nomenclature:{}", text),
        }
    }
}

/// Chromosome name with natural ordering (1..22, X, Y, MT, then others).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Chromosome(String);

impl Chromosome {
    /// Drop any `chr` prefix, upper-case, and spell mitochondria `MT`.
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();
        let stripped = match (trimmed.get(..3), trimmed.get(3..)) {
            (Some(prefix), Some(rest)) if !rest.is_empty() && prefix.eq_ignore_ascii_case("chr") => {
                rest
            }
            _ => trimmed,
        };
        let upper = stripped.to_ascii_uppercase();
        if upper == "M" {
            Self("MT".to_string())
        } else {
            Self(upper)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Autosomes, sex chromosomes and MT; false for patches and scaffolds.
    pub fn is_primary(&self) -> bool {
        self.rank() < 100
    }

    fn rank(&self) -> u32 {
        match self.0.as_str() {
            "X" => 23,
            "Y" => 24,
            "MT" => 25,
            other => match other.parse::<u32>() {
                Ok(n) if (1..=22).contains(&n) => n,
                _ => 100,
            },
        }
    }
}

impl Ord for Chromosome {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Chromosome {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The single identity every descriptor is resolved into.
///
/// Alleles are forward-strand, upper-case and parsimoniously trimmed; an
/// empty allele is spelled `-`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CanonicalVariantKey {
    pub chromosome: Chromosome,
    pub position: u64,
    pub reference: String,
    pub alternate: String,
    pub assembly: Assembly,
}

impl fmt::Display for CanonicalVariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.chromosome, self.position, self.reference, self.alternate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chromosome_normalization() {
        assert_eq!(Chromosome::normalize("chr1").as_str(), "1");
        assert_eq!(Chromosome::normalize("CHRX").as_str(), "X");
        assert_eq!(Chromosome::normalize("chrM").as_str(), "MT");
        assert_eq!(Chromosome::normalize(" 19 ").as_str(), "19");
    }

    #[test]
    fn test_chromosome_natural_order() {
        let mut chroms: Vec<Chromosome> = ["X", "10", "2", "MT", "1", "Y", "KI270728.1"]
            .iter()
            .map(|c| Chromosome::normalize(c))
            .collect();
        chroms.sort();
        let names: Vec<&str> = chroms.iter().map(|c| c.as_str()).collect();
        assert_eq!(names, vec!["1", "2", "10", "X", "Y", "MT", "KI270728.1"]);
    }

    #[test]
    fn test_parse_gtex_variant_id() {
        let pos = GenomicPosition::parse_delimited("chr19_44908822_C_T_b38", Assembly::GRCh37)
            .expect("valid gtex id");
        assert_eq!(pos.chromosome, "chr19");
        assert_eq!(pos.position, 44908822);
        assert_eq!(pos.reference, "C");
        assert_eq!(pos.alternate, "T");
        assert_eq!(pos.assembly, Assembly::GRCh38);
    }

    #[test]
    fn test_parse_vcf_string() {
        let pos = GenomicPosition::parse_delimited("19-44908684-T-C", Assembly::GRCh38)
            .expect("valid vcf string");
        assert_eq!(pos, GenomicPosition::grch38("19", 44908684, "T", "C"));
        assert!(GenomicPosition::parse_delimited("19-abc-T-C", Assembly::GRCh38).is_none());
        assert!(GenomicPosition::parse_delimited("rs429358", Assembly::GRCh38).is_none());
    }

    #[test]
    fn test_raw_identity_display_is_distinct_per_form() {
        let a = RawIdentity::accession("rs123");
        let b = RawIdentity::accession_with_allele("rs123", "A");
        let c = RawIdentity::Nomenclature("chr1:g.100G>A".to_string());
        assert_eq!(a.to_string(), "accession:rs123");
        assert_eq!(b.to_string(), "accession:rs123-A");
        assert_eq!(c.to_string(), "nomenclature:chr1:g.100G>A");
    }

    #[test]
    fn test_canonical_key_ordering() {
        let key = |chrom: &str, pos: u64| CanonicalVariantKey {
            chromosome: Chromosome::normalize(chrom),
            position: pos,
            reference: "G".to_string(),
            alternate: "A".to_string(),
            assembly: Assembly::GRCh38,
        };
        assert!(key("2", 10) < key("10", 5));
        assert!(key("1", 100) < key("1", 101));
        assert_eq!(key("1", 100).to_string(), "1-100-G-A");
    }
}
