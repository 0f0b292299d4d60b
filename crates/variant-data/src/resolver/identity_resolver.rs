//! Resolution of raw identity descriptors into canonical variant keys.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::normalize::{canonicalize, parse_genomic_substitution};
use super::recoder::EnsemblVariantRecoder;
use super::IdentityLookup;
use crate::errors::VariantDataError;
use crate::models::{Assembly, CanonicalVariantKey, NormalizedVariantRecord, RawIdentity};
use crate::registry::FetchClient;

/// Why a descriptor has no canonical key.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnresolvedReason {
    NotFound,
    /// The descriptor maps to several distinct variants.
    Ambiguous { candidates: usize },
    LookupFailed { cause: String },
    AssemblyMismatch { found: Assembly },
    InvalidDescriptor { cause: String },
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Ambiguous { candidates } => write!(f, "ambiguous({})", candidates),
            Self::LookupFailed { .. } => write!(f, "lookup_failed"),
            Self::AssemblyMismatch { found } => write!(f, "assembly_mismatch({})", found),
            Self::InvalidDescriptor { .. } => write!(f, "invalid_descriptor"),
        }
    }
}

/// Outcome of resolving one descriptor.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    Resolved { key: CanonicalVariantKey },
    Unresolved {
        /// Derived from the raw descriptor; stable within and across runs.
        provisional_key: String,
        #[serde(flatten)]
        reason: UnresolvedReason,
    },
}

impl Resolution {
    fn unresolved(identity: &RawIdentity, reason: UnresolvedReason) -> Self {
        Self::Unresolved {
            provisional_key: identity.to_string(),
            reason,
        }
    }

    pub fn key(&self) -> Option<&CanonicalVariantKey> {
        match self {
            Self::Resolved { key } => Some(key),
            Self::Unresolved { .. } => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    /// Canonical key text, or the provisional key when unresolved.
    pub fn label(&self) -> String {
        match self {
            Self::Resolved { key } => key.to_string(),
            Self::Unresolved {
                provisional_key, ..
            } => provisional_key.clone(),
        }
    }
}

/// A normalized record together with the resolution of its identity.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedRecord {
    pub record: NormalizedVariantRecord,
    pub resolution: Resolution,
}

/// Canonicalizes descriptors for one run.
///
/// Results are memoized per descriptor. Concurrent callers resolving the same
/// descriptor wait on one shared lookup.
pub struct VariantIdentityResolver {
    assembly: Assembly,
    lookup: Arc<dyn IdentityLookup>,
    memo: DashMap<RawIdentity, Arc<OnceCell<Resolution>>>,
    lookups: AtomicU64,
}

impl VariantIdentityResolver {
    pub fn new(assembly: Assembly, lookup: Arc<dyn IdentityLookup>) -> Self {
        Self {
            assembly,
            lookup,
            memo: DashMap::new(),
            lookups: AtomicU64::new(0),
        }
    }

    /// Resolver backed by the Ensembl Variant Recoder.
    pub fn ensembl(assembly: Assembly) -> Self {
        Self::new(assembly, Arc::new(EnsemblVariantRecoder::new()))
    }

    pub fn assembly(&self) -> Assembly {
        self.assembly
    }

    /// Lookups issued so far (memo hits excluded).
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Distinct descriptors seen so far.
    pub fn memoized(&self) -> usize {
        self.memo.len()
    }

    pub async fn resolve(&self, client: &FetchClient, identity: &RawIdentity) -> Resolution {
        let cell = self
            .memo
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        cell.get_or_init(|| self.resolve_uncached(client, identity))
            .await
            .clone()
    }

    /// Resolve every record's identity, `concurrency` descriptors at a time.
    ///
    /// Records keep their input order.
    pub async fn resolve_records(
        &self,
        client: &FetchClient,
        records: Vec<NormalizedVariantRecord>,
        concurrency: usize,
    ) -> Vec<ResolvedRecord> {
        let mut seen = HashSet::new();
        let distinct: Vec<&RawIdentity> = records
            .iter()
            .map(|r| &r.identity)
            .filter(|identity| seen.insert(*identity))
            .collect();

        let resolutions: HashMap<&RawIdentity, Resolution> = stream::iter(distinct)
            .map(|identity| async move { (identity, self.resolve(client, identity).await) })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let unresolved = resolutions.values().filter(|r| !r.is_resolved()).count();
        info!(
            descriptors = resolutions.len(),
            unresolved,
            lookups = self.lookups(),
            "identities resolved"
        );

        let mut resolved = Vec::with_capacity(records.len());
        for record in &records {
            let resolution = resolutions
                .get(&record.identity)
                .cloned()
                .unwrap_or_else(|| {
                    Resolution::unresolved(
                        &record.identity,
                        UnresolvedReason::LookupFailed {
                            cause: "descriptor skipped".to_string(),
                        },
                    )
                });
            resolved.push(ResolvedRecord {
                record: record.clone(),
                resolution,
            });
        }
        resolved
    }

    async fn resolve_uncached(&self, client: &FetchClient, identity: &RawIdentity) -> Resolution {
        let resolution = match identity {
            RawIdentity::Position(position) => canonicalize(position, self.assembly),
            RawIdentity::Nomenclature(text) => {
                match parse_genomic_substitution(text, self.assembly) {
                    Some(position) => canonicalize(&position, self.assembly),
                    None => self.resolve_by_lookup(client, text, None).await,
                }
            }
            RawIdentity::Accession { id, allele_hint } => {
                self.resolve_by_lookup(client, id, allele_hint.as_deref())
                    .await
            }
        };
        match resolution {
            Ok(key) => Resolution::Resolved { key },
            Err(reason) => {
                debug!(descriptor = %identity, %reason, "descriptor unresolved");
                Resolution::unresolved(identity, reason)
            }
        }
    }

    async fn resolve_by_lookup(
        &self,
        client: &FetchClient,
        descriptor: &str,
        allele_hint: Option<&str>,
    ) -> Result<CanonicalVariantKey, UnresolvedReason> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let selected = match self
            .lookup
            .candidates(client, descriptor, self.assembly)
            .await
        {
            Ok(candidates) => {
                let keys: BTreeSet<CanonicalVariantKey> = candidates
                    .iter()
                    .filter_map(|c| canonicalize(c, self.assembly).ok())
                    .collect();
                select(descriptor, keys, allele_hint)
            }
            Err(e) => Err(e),
        };

        match selected {
            Ok(Some(key)) => Ok(key),
            Ok(None) => Err(UnresolvedReason::NotFound),
            Err(VariantDataError::IdentityResolutionAmbiguous { candidates, .. }) => {
                Err(UnresolvedReason::Ambiguous { candidates })
            }
            Err(e) => Err(UnresolvedReason::LookupFailed {
                cause: e.to_string(),
            }),
        }
    }
}

/// Pick the single key a descriptor denotes.
///
/// An allele hint keeps the candidates with that alternate allele. A hint
/// that names the shared reference allele does not narrow anything.
fn select(
    descriptor: &str,
    keys: BTreeSet<CanonicalVariantKey>,
    allele_hint: Option<&str>,
) -> Result<Option<CanonicalVariantKey>, VariantDataError> {
    let mut keys: Vec<CanonicalVariantKey> = keys.into_iter().collect();
    if let Some(hint) = allele_hint.map(|h| h.trim().to_ascii_uppercase()) {
        let names_reference = !keys.is_empty() && keys.iter().all(|k| k.reference == hint);
        if !names_reference {
            keys.retain(|k| k.alternate == hint);
        }
    }
    match keys.len() {
        0 => Ok(None),
        1 => Ok(keys.pop()),
        candidates => Err(VariantDataError::IdentityResolutionAmbiguous {
            descriptor: descriptor.to_string(),
            candidates,
        }),
    }
}
