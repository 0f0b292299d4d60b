//! Cross-source integration of resolved variant records.
//!
//! Records are grouped by canonical key, their annotation fields unioned, and
//! single-valued fields settled by source authority. Derived classifications
//! and per-source coverage are computed once every record of a group is in.

mod classification;
mod field_resolution;
mod integration_model;
mod integration_service;
mod summary_model;

pub use classification::{ClassificationThresholds, Deleteriousness, RarityClass, Significance};
pub use field_resolution::{AuthorityRanks, FieldCandidates, ResolvedField, Sourced};
pub use integration_model::{
    Classification, IntegratedVariantRecord, IntegrationResult, SourceCoverage, SourceReport,
    SourceTableRow, VariantIdentity,
};
pub use integration_service::IntegrationEngine;
pub use summary_model::{ConsequenceCount, SummaryStats};
