//! Variant identity resolution.
//!
//! Providers name the same variant in different ways. This module maps every
//! raw descriptor onto one canonical key space.
//!
//! # Resolution Precedence
//!
//! Given a [`RawIdentity`](crate::models::RawIdentity):
//!
//! 1. **Position tuple** -> normalized locally (strand flip, case, trimming)
//! 2. **Simple genomic HGVS** (`chr1:g.100G>A`) -> parsed, then normalized locally
//! 3. **Accession or other nomenclature** -> candidates from an [`IdentityLookup`],
//!    normalized and de-duplicated, narrowed by the allele hint
//!
//! Exactly one candidate resolves. No candidate is `NotFound`; several are
//! `Ambiguous` and the descriptor stays unresolved under a provisional key.

mod identity_resolver;
mod normalize;
mod recoder;
mod traits;

pub use identity_resolver::{
    ResolvedRecord, Resolution, UnresolvedReason, VariantIdentityResolver,
};
pub use normalize::{canonicalize, parse_genomic_substitution};
pub use recoder::EnsemblVariantRecoder;
pub use traits::IdentityLookup;
