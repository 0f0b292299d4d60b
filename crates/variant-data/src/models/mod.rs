//! Variant data models
//!
//! This module contains the core data types shared by acquisition and resolution:
//! - `types` - Type aliases for identifiers (ProviderId, SourceId)
//! - `signature` - Normalized request identity (RequestSignature, HttpMethod)
//! - `outcome` - Fetch results and cached payloads (FetchOutcome, CacheEntry)
//! - `variant` - Raw descriptors and canonical identity (RawIdentity, CanonicalVariantKey)
//! - `record` - Normalized per-source records and their annotations
//! - `locus` - Gene locus (Locus)
//! - `gap` - Gap recording (SourceGap, GapReason)

mod gap;
mod locus;
mod outcome;
mod record;
mod signature;
mod types;
mod variant;

pub use gap::{GapReason, SourceGap};
pub use locus::Locus;
pub use outcome::{CacheEntry, FetchOutcome};
pub use record::{
    Annotation, AnnotationKind, DomainAnnotation, DomainSpan, FrequencyAnnotation,
    FunctionalAnnotation, GenePlacement, GwasAssociation, ListingAnnotation,
    NormalizedVariantRecord, PopulationCounts, QtlAssociation,
};
pub use signature::{HttpMethod, RequestSignature};
pub use types::{ProviderId, SourceId};
pub use variant::{Assembly, CanonicalVariantKey, Chromosome, GenomicPosition, RawIdentity, Strand};
