//! Small helpers shared by adapter payload models.

use serde::Deserialize;

/// A field providers report either as a scalar or as a list.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(value) => vec![value],
            Self::Many(values) => values,
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

/// Alleles made of nucleotides only; `-` spells an empty allele.
pub(crate) fn is_sequence_allele(allele: &str) -> bool {
    !allele.is_empty()
        && (allele == "-"
            || allele
                .chars()
                .all(|c| matches!(c.to_ascii_uppercase(), 'A' | 'C' | 'G' | 'T' | 'N')))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_or_many() {
        let one: OneOrMany<String> = serde_json::from_str(r#""missense_variant""#).unwrap();
        assert_eq!(one.into_vec(), vec!["missense_variant"]);

        let many: OneOrMany<String> = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(many.into_vec().len(), 2);
    }

    #[test]
    fn test_is_sequence_allele() {
        assert!(is_sequence_allele("ACGT"));
        assert!(is_sequence_allele("-"));
        assert!(is_sequence_allele("n"));
        assert!(!is_sequence_allele(""));
        assert!(!is_sequence_allele("HGMD_MUTATION"));
    }
}
