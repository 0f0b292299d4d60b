//! Resolution of single-valued fields contributed by several sources.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A value tagged with the source that contributed it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sourced<T> {
    pub source: String,
    pub value: T,
}

/// A single-valued field after all contributing sources were considered.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolvedField<T> {
    /// No source reported the field.
    NotEvaluated,
    /// The most authoritative sources agree.
    Value { value: T, sources: Vec<String> },
    /// The most authoritative sources disagree; every value is kept.
    Conflict { values: Vec<Sourced<T>> },
}

impl<T> Default for ResolvedField<T> {
    fn default() -> Self {
        Self::NotEvaluated
    }
}

impl<T> ResolvedField<T> {
    /// The agreed value, if there is one.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Every retained value: one when agreed, all of them on conflict.
    pub fn values(&self) -> Vec<&T> {
        match self {
            Self::NotEvaluated => Vec::new(),
            Self::Value { value, .. } => vec![value],
            Self::Conflict { values } => values.iter().map(|v| &v.value).collect(),
        }
    }

    pub fn is_evaluated(&self) -> bool {
        !matches!(self, Self::NotEvaluated)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl<T: fmt::Display> ResolvedField<T> {
    /// Flat text for tabular output: the value, `SOURCE=value|...` on
    /// conflict, empty when not evaluated.
    pub fn display(&self) -> String {
        match self {
            Self::NotEvaluated => String::new(),
            Self::Value { value, .. } => value.to_string(),
            Self::Conflict { values } => values
                .iter()
                .map(|v| format!("{}={}", v.source, v.value))
                .collect::<Vec<_>>()
                .join("|"),
        }
    }
}

/// Authority rank per source. Higher ranks win; unlisted sources rank 0.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorityRanks(BTreeMap<String, u32>);

impl AuthorityRanks {
    pub fn new(ranks: BTreeMap<String, u32>) -> Self {
        Self(ranks)
    }

    pub fn with_rank(mut self, source: &str, rank: u32) -> Self {
        self.0.insert(source.to_ascii_uppercase(), rank);
        self
    }

    pub fn rank(&self, source: &str) -> u32 {
        self.0
            .iter()
            .find(|(id, _)| id.eq_ignore_ascii_case(source))
            .map(|(_, rank)| *rank)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Values offered for one field, resolved once every source has reported.
#[derive(Clone, Debug)]
pub struct FieldCandidates<T> {
    offered: Vec<(u32, Sourced<T>)>,
}

impl<T> Default for FieldCandidates<T> {
    fn default() -> Self {
        Self {
            offered: Vec::new(),
        }
    }
}

impl<T: Clone + PartialEq + PartialOrd> FieldCandidates<T> {
    pub fn offer(&mut self, source: &str, rank: u32, value: Option<T>) {
        if let Some(value) = value {
            self.offered.push((
                rank,
                Sourced {
                    source: source.to_string(),
                    value,
                },
            ));
        }
    }

    /// Keep the top-ranked values; agreement yields one value, disagreement a
    /// conflict. The result does not depend on the order values were offered.
    pub fn resolve(self) -> ResolvedField<T> {
        let Some(top) = self.offered.iter().map(|(rank, _)| *rank).max() else {
            return ResolvedField::NotEvaluated;
        };

        let mut values: Vec<Sourced<T>> = self
            .offered
            .into_iter()
            .filter(|(rank, _)| *rank == top)
            .map(|(_, sourced)| sourced)
            .collect();
        values.sort_by(|a, b| {
            a.source
                .cmp(&b.source)
                .then_with(|| a.value.partial_cmp(&b.value).unwrap_or(Ordering::Equal))
        });
        values.dedup();

        let first = values[0].value.clone();
        if values.iter().all(|v| v.value == first) {
            let mut sources: Vec<String> = values.into_iter().map(|v| v.source).collect();
            sources.dedup();
            ResolvedField::Value {
                value: first,
                sources,
            }
        } else {
            ResolvedField::Conflict { values }
        }
    }
}
