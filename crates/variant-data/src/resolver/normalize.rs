//! Local normalization of position tuples and simple genomic HGVS.

use lazy_static::lazy_static;
use regex::Regex;

use super::UnresolvedReason;
use crate::models::{Assembly, CanonicalVariantKey, Chromosome, GenomicPosition, Strand};

lazy_static! {
    /// `chr1:g.100G>A`, `1:g.100G>A`, `X:g.5C>T`
    static ref GENOMIC_SUBSTITUTION: Regex =
        Regex::new(r"^(?i:chr)?([0-9]{1,2}|[XYM]|MT):g\.([0-9]+)([ACGTN])>([ACGTN])$")
            .expect("Invalid regex pattern");
}

fn complement(base: char) -> char {
    match base {
        'A' => 'T',
        'T' => 'A',
        'C' => 'G',
        'G' => 'C',
        other => other,
    }
}

fn reverse_complement(allele: &str) -> String {
    allele.chars().rev().map(complement).collect()
}

/// Upper-case an allele; `-` becomes the empty allele.
fn clean_allele(raw: &str) -> Result<String, UnresolvedReason> {
    let allele = raw.trim().to_ascii_uppercase();
    if allele == "-" {
        return Ok(String::new());
    }
    if !allele
        .chars()
        .all(|c| matches!(c, 'A' | 'C' | 'G' | 'T' | 'N'))
    {
        return Err(UnresolvedReason::InvalidDescriptor {
            cause: format!("allele '{}' is not a nucleotide sequence", raw),
        });
    }
    Ok(allele)
}

/// Canonical key for a position tuple on the `target` assembly.
///
/// Alleles are flipped to the forward strand, upper-cased, and trimmed of
/// shared suffix then shared prefix; each leading base trimmed moves the
/// position right by one.
pub fn canonicalize(
    position: &GenomicPosition,
    target: Assembly,
) -> Result<CanonicalVariantKey, UnresolvedReason> {
    if position.assembly != target {
        return Err(UnresolvedReason::AssemblyMismatch {
            found: position.assembly,
        });
    }
    let chromosome = Chromosome::normalize(&position.chromosome);
    if chromosome.as_str().is_empty() || position.position == 0 {
        return Err(UnresolvedReason::InvalidDescriptor {
            cause: "missing chromosome or position".to_string(),
        });
    }

    let mut reference = clean_allele(&position.reference)?;
    let mut alternate = clean_allele(&position.alternate)?;
    if position.strand == Strand::Reverse {
        reference = reverse_complement(&reference);
        alternate = reverse_complement(&alternate);
    }
    if reference == alternate {
        return Err(UnresolvedReason::InvalidDescriptor {
            cause: format!("reference and alternate are both '{}'", reference),
        });
    }

    let mut ref_bytes = reference.into_bytes();
    let mut alt_bytes = alternate.into_bytes();
    while ref_bytes.len() > 1 || alt_bytes.len() > 1 {
        match (ref_bytes.last(), alt_bytes.last()) {
            (Some(r), Some(a)) if r == a => {
                ref_bytes.pop();
                alt_bytes.pop();
            }
            _ => break,
        }
    }

    let shared_prefix = ref_bytes
        .iter()
        .zip(alt_bytes.iter())
        .take_while(|(r, a)| r == a)
        .count();
    let reference = String::from_utf8_lossy(&ref_bytes[shared_prefix..]).into_owned();
    let alternate = String::from_utf8_lossy(&alt_bytes[shared_prefix..]).into_owned();
    let spell = |allele: String| if allele.is_empty() { "-".to_string() } else { allele };

    Ok(CanonicalVariantKey {
        chromosome,
        position: position.position + shared_prefix as u64,
        reference: spell(reference),
        alternate: spell(alternate),
        assembly: target,
    })
}

/// Parse a simple genomic substitution; `None` for every other HGVS form.
pub fn parse_genomic_substitution(text: &str, assembly: Assembly) -> Option<GenomicPosition> {
    let captures = GENOMIC_SUBSTITUTION.captures(text.trim())?;
    let position = captures.get(2)?.as_str().parse::<u64>().ok()?;
    Some(GenomicPosition {
        chromosome: captures.get(1)?.as_str().to_string(),
        position,
        reference: captures.get(3)?.as_str().to_string(),
        alternate: captures.get(4)?.as_str().to_string(),
        assembly,
        strand: Strand::Forward,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(chrom: &str, pos: u64, reference: &str, alternate: &str) -> GenomicPosition {
        GenomicPosition::grch38(chrom, pos, reference, alternate)
    }

    fn key(p: &GenomicPosition) -> String {
        canonicalize(p, Assembly::GRCh38).unwrap().to_string()
    }

    #[test]
    fn test_snv_is_cleaned() {
        assert_eq!(key(&tuple("chr1", 100, "g", "a")), "1-100-G-A");
        assert_eq!(key(&tuple("1", 100, "G", "A")), "1-100-G-A");
    }

    #[test]
    fn test_reverse_strand_is_complemented() {
        let mut p = tuple("1", 100, "C", "T");
        p.strand = Strand::Reverse;
        assert_eq!(key(&p), "1-100-G-A");

        let mut indel = tuple("1", 100, "AC", "A");
        indel.strand = Strand::Reverse;
        // GT/T on the forward strand: drop the shared T suffix.
        assert_eq!(key(&indel), "1-100-G--");
    }

    #[test]
    fn test_anchored_indels_are_trimmed() {
        // VCF-style deletion anchored on the preceding base.
        assert_eq!(key(&tuple("1", 100, "GA", "G")), "1-101-A--");
        // Insertion.
        assert_eq!(key(&tuple("1", 100, "G", "GTT")), "1-101---TT");
        // Listing-style spelling of the same deletion.
        assert_eq!(key(&tuple("1", 101, "A", "-")), "1-101-A--");
    }

    #[test]
    fn test_shared_suffix_trimmed_before_prefix() {
        assert_eq!(key(&tuple("2", 50, "CAGT", "CGGT")), "2-51-A-G");
    }

    #[test]
    fn test_rejections() {
        let mut p = tuple("1", 100, "G", "A");
        p.assembly = Assembly::GRCh37;
        assert_eq!(
            canonicalize(&p, Assembly::GRCh38),
            Err(UnresolvedReason::AssemblyMismatch {
                found: Assembly::GRCh37
            })
        );

        assert!(matches!(
            canonicalize(&tuple("1", 100, "G", "<DEL>"), Assembly::GRCh38),
            Err(UnresolvedReason::InvalidDescriptor { .. })
        ));
        assert!(matches!(
            canonicalize(&tuple("1", 100, "G", "g"), Assembly::GRCh38),
            Err(UnresolvedReason::InvalidDescriptor { .. })
        ));
        assert!(matches!(
            canonicalize(&tuple("1", 0, "G", "A"), Assembly::GRCh38),
            Err(UnresolvedReason::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_genomic_substitution_parse() {
        let p = parse_genomic_substitution("chr1:g.100G>A", Assembly::GRCh38).unwrap();
        assert_eq!(key(&p), "1-100-G-A");
        assert!(parse_genomic_substitution("CHRX:g.5C>T", Assembly::GRCh38).is_some());
        assert!(parse_genomic_substitution("chr1:g.100_101del", Assembly::GRCh38).is_none());
        assert!(parse_genomic_substitution("ENST1:c.5C>T", Assembly::GRCh38).is_none());
    }
}
