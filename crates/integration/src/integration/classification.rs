//! Derived classifications: rarity, association significance and predicted
//! deleteriousness.
//!
//! Every classification is computed only from fields that are present. A
//! missing input yields `NotEvaluated`, never a default bucket.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::field_resolution::ResolvedField;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RarityClass {
    VeryRare,
    Rare,
    LowFrequency,
    Common,
    /// Conflicting frequencies fall into different buckets.
    Discordant,
    NotEvaluated,
}

impl RarityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryRare => "very_rare",
            Self::Rare => "rare",
            Self::LowFrequency => "low_frequency",
            Self::Common => "common",
            Self::Discordant => "discordant",
            Self::NotEvaluated => "not_evaluated",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    Significant,
    NotSignificant,
    NotEvaluated,
}

impl Significance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Significant => "significant",
            Self::NotSignificant => "not_significant",
            Self::NotEvaluated => "not_evaluated",
        }
    }

    pub fn is_significant(&self) -> bool {
        matches!(self, Self::Significant)
    }
}

/// Predicted impact of a coding change (SIFT "deleterious", PolyPhen
/// "damaging").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deleteriousness {
    Deleterious,
    Tolerated,
    Discordant,
    NotEvaluated,
}

impl Deleteriousness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deleterious => "deleterious",
            Self::Tolerated => "tolerated",
            Self::Discordant => "discordant",
            Self::NotEvaluated => "not_evaluated",
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(RarityClass, Significance, Deleteriousness);

/// Cut-offs used by the derived classifications.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationThresholds {
    /// Frequencies below this are very rare.
    pub very_rare_below: f64,
    pub rare_below: f64,
    pub low_frequency_below: f64,
    pub eqtl_p_value: f64,
    pub pqtl_p_value: f64,
    /// Genome-wide significance.
    pub gwas_p_value: f64,
    pub sift_deleterious_below: f64,
    pub polyphen_damaging_above: f64,
}

impl Default for ClassificationThresholds {
    fn default() -> Self {
        Self {
            very_rare_below: 0.001,
            rare_below: 0.01,
            low_frequency_below: 0.05,
            eqtl_p_value: 1e-5,
            pqtl_p_value: 1e-5,
            gwas_p_value: 5e-8,
            sift_deleterious_below: 0.05,
            polyphen_damaging_above: 0.446,
        }
    }
}

impl ClassificationThresholds {
    pub fn rarity_bucket(&self, frequency: f64) -> RarityClass {
        if frequency < self.very_rare_below {
            RarityClass::VeryRare
        } else if frequency < self.rare_below {
            RarityClass::Rare
        } else if frequency < self.low_frequency_below {
            RarityClass::LowFrequency
        } else {
            RarityClass::Common
        }
    }

    /// Rarity from the first evaluated of genome AF, exome AF and minor
    /// allele frequency.
    pub fn rarity(
        &self,
        genome: &ResolvedField<f64>,
        exome: &ResolvedField<f64>,
        minor_allele: &ResolvedField<f64>,
    ) -> RarityClass {
        let Some(field) = [genome, exome, minor_allele]
            .into_iter()
            .find(|f| f.is_evaluated())
        else {
            return RarityClass::NotEvaluated;
        };

        let buckets: BTreeSet<RarityClass> = field
            .values()
            .into_iter()
            .map(|af| self.rarity_bucket(*af))
            .collect();
        match buckets.len() {
            1 => buckets.into_iter().next().unwrap_or(RarityClass::NotEvaluated),
            _ => RarityClass::Discordant,
        }
    }

    pub fn significance(
        &self,
        p_values: impl IntoIterator<Item = f64>,
        threshold: f64,
    ) -> Significance {
        match p_values.into_iter().min_by(f64::total_cmp) {
            Some(p) if p < threshold => Significance::Significant,
            Some(_) => Significance::NotSignificant,
            None => Significance::NotEvaluated,
        }
    }

    pub fn sift(&self, score: &ResolvedField<f64>, predictions: &[String]) -> Deleteriousness {
        impact(
            score,
            predictions,
            |s| s < self.sift_deleterious_below,
            "deleterious",
        )
    }

    pub fn polyphen(&self, score: &ResolvedField<f64>, predictions: &[String]) -> Deleteriousness {
        impact(
            score,
            predictions,
            |s| s > self.polyphen_damaging_above,
            "damaging",
        )
    }
}

fn impact(
    score: &ResolvedField<f64>,
    predictions: &[String],
    is_damaging: impl Fn(f64) -> bool,
    keyword: &str,
) -> Deleteriousness {
    let votes: BTreeSet<bool> = score.values().into_iter().map(|s| is_damaging(*s)).collect();
    if votes.len() > 1 {
        return Deleteriousness::Discordant;
    }
    let predicted = predictions
        .iter()
        .any(|p| p.to_ascii_lowercase().contains(keyword));

    match votes.into_iter().next() {
        Some(true) => Deleteriousness::Deleterious,
        _ if predicted => Deleteriousness::Deleterious,
        Some(false) => Deleteriousness::Tolerated,
        None if !predictions.is_empty() => Deleteriousness::Tolerated,
        None => Deleteriousness::NotEvaluated,
    }
}
