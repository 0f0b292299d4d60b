//! Source adapter trait definitions.
//!
//! This module defines the `SourceAdapter` trait that every provider role
//! implements, and the `AdapterOutput` it hands back to the pipeline.

use std::borrow::Cow;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::models::{
    Annotation, AnnotationKind, FetchOutcome, GapReason, Locus, NormalizedVariantRecord,
    RawIdentity, SourceGap, SourceId,
};
use crate::registry::FetchClient;

/// Trait for source adapters.
///
/// An adapter turns one provider's payloads for a locus into normalized
/// records. Adapters never fail: a request that does not yield a payload is
/// recorded as a gap and the adapter returns whatever it collected.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use varlens_variant_data::provider::{AdapterOutput, SourceAdapter};
///
/// struct MySource;
///
/// #[async_trait]
/// impl SourceAdapter for MySource {
///     fn id(&self) -> &'static str {
///         "MY_SOURCE"
///     }
///
///     fn provider(&self) -> &'static str {
///         "MY_PROVIDER"
///     }
///
///     fn kind(&self) -> AnnotationKind {
///         AnnotationKind::Frequency
///     }
///
///     async fn fetch_for_locus(&self, client: &FetchClient, locus: &Locus) -> AdapterOutput {
///         let mut output = AdapterOutput::new(self.id());
///         // ... fetch, decode, push records
///         output
///     }
/// }
/// ```
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Unique source identifier such as "GNOMAD" or "ENSEMBL_VEP".
    ///
    /// Used for record provenance, coverage and gap reporting.
    fn id(&self) -> &'static str;

    /// Provider this adapter primarily calls.
    fn provider(&self) -> &'static str;

    /// Kind of annotation this adapter produces.
    fn kind(&self) -> AnnotationKind;

    /// Fetch and normalize everything this source knows about a locus.
    async fn fetch_for_locus(&self, client: &FetchClient, locus: &Locus) -> AdapterOutput;
}

/// Records and gaps produced by one adapter run.
#[derive(Clone, Debug, PartialEq)]
pub struct AdapterOutput {
    pub source: SourceId,
    pub records: Vec<NormalizedVariantRecord>,
    pub gaps: Vec<SourceGap>,
    /// The run was cancelled before the adapter finished.
    pub cancelled: bool,
    /// Digests of cached payloads that arrived but could not be used.
    pub unusable: Vec<String>,
}

impl AdapterOutput {
    pub fn new(source: &'static str) -> Self {
        Self {
            source: Cow::Borrowed(source),
            records: Vec::new(),
            gaps: Vec::new(),
            cancelled: false,
            unusable: Vec::new(),
        }
    }

    pub fn push(&mut self, identity: RawIdentity, annotation: Annotation) {
        self.records.push(NormalizedVariantRecord::new(
            self.source.clone(),
            identity,
            annotation,
        ));
    }

    pub fn gap(&mut self, provider: &str, request: impl Into<String>, reason: GapReason) {
        if reason == GapReason::Cancelled {
            self.cancelled = true;
        }
        self.gaps.push(SourceGap {
            source: self.source.clone(),
            provider: Cow::Owned(provider.to_string()),
            request: request.into(),
            reason,
        });
    }

    /// Decode the payload of a successful outcome, recording a gap otherwise.
    pub fn decode<T: DeserializeOwned>(
        &mut self,
        provider: &str,
        request: &str,
        outcome: &FetchOutcome,
    ) -> Option<T> {
        if let Some(reason) = GapReason::from_outcome(outcome) {
            debug!(source = %self.source, request, outcome = outcome.label(), "request produced no payload");
            self.gap(provider, request, reason);
            return None;
        }
        let entry = outcome.entry()?;
        match entry.json::<T>() {
            Ok(value) => Some(value),
            Err(e) => {
                self.reject(outcome);
                self.gap(
                    provider,
                    request,
                    GapReason::Unparseable {
                        cause: e.to_string(),
                    },
                );
                None
            }
        }
    }

    /// Mark the payload behind an outcome as unusable.
    pub fn reject(&mut self, outcome: &FetchOutcome) {
        if let Some(entry) = outcome.entry() {
            self.unusable.push(entry.digest.clone());
        }
    }

    /// Fold the output of a sub-request (one tissue, one dataset) into this one.
    pub fn merge(&mut self, other: AdapterOutput) {
        self.records.extend(other.records);
        self.gaps.extend(other.gaps);
        self.cancelled |= other.cancelled;
        self.unusable.extend(other.unusable);
    }

    /// True when every request the adapter needed succeeded.
    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty() && !self.cancelled
    }
}
