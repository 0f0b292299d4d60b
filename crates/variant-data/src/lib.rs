//! Varlens Variant Data Crate
//!
//! Rate-limited, cached acquisition of per-variant annotations for one gene
//! locus, and resolution of the variants' many identities into one key space.
//!
//! # Overview
//!
//! The variant data crate supports:
//! - A content-addressed response cache that survives restarts
//! - Per-provider token-bucket rate limiting and circuit breaking
//! - Retries with exponential backoff and `Retry-After` handling
//! - Source adapters for Ensembl, gnomAD, MyVariant, GTEx, eQTL Catalogue,
//!   GWAS Catalog and UniProt
//! - Canonicalization of accessions, coordinates and HGVS strings
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +------------------+
//! |  SourceAdapter   | --> |   FetchRequest   |  (provider, endpoint, params)
//! +------------------+     +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |   FetchClient    |  cache -> single flight ->
//!                          +------------------+  circuit -> limiter -> retry
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |  HttpTransport   |  (reqwest)
//!                          +------------------+
//!                                  |
//!                                  v
//!                    +---------------------------+
//!                    | NormalizedVariantRecord   |  (raw identity + annotation)
//!                    +---------------------------+
//!                                  |
//!                                  v
//!                     +-------------------------+
//!                     | VariantIdentityResolver |  -> CanonicalVariantKey
//!                     +-------------------------+
//! ```
//!
//! # Core Types
//!
//! - [`FetchClient`] - Shared acquisition substrate for one run
//! - [`FetchOutcome`] - Result of one fetch, never an `Err`
//! - [`SourceAdapter`] - One provider role mapped to normalized records
//! - [`Locus`] - Gene coordinates every adapter is queried with
//! - [`RawIdentity`] / [`CanonicalVariantKey`] - Identity before and after resolution

pub mod cache;
pub mod config;
pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;
pub mod resolver;
pub mod transport;

pub use cache::{CacheStore, SqliteCacheStore};
pub use config::{AcquisitionConfig, CacheSettings};
pub use errors::{CacheError, RetryClass, VariantDataError};

// Re-export all public types from models
pub use models::{
    Annotation, AnnotationKind, Assembly, CacheEntry, CanonicalVariantKey, Chromosome,
    DomainAnnotation, DomainSpan, FetchOutcome, FrequencyAnnotation, FunctionalAnnotation,
    GapReason, GenePlacement, GenomicPosition, GwasAssociation, ListingAnnotation, Locus,
    NormalizedVariantRecord, PopulationCounts, ProviderId, QtlAssociation, RawIdentity,
    RequestSignature, SourceGap, SourceId, Strand,
};

// Re-export provider types
pub use provider::ensembl::{EnsemblVariationAdapter, LocusResolver, VepAdapter};
pub use provider::eqtl_catalogue::EqtlCatalogueAdapter;
pub use provider::gnomad::GnomadAdapter;
pub use provider::gtex::GtexAdapter;
pub use provider::gwas_catalog::GwasCatalogAdapter;
pub use provider::myvariant::MyVariantAdapter;
pub use provider::uniprot::UniprotDomainAdapter;
pub use provider::{AdapterOutput, ProviderOverrides, ProviderSettings, SourceAdapter};

// Re-export registry types
pub use registry::{
    CircuitBreaker, CircuitMetrics, CircuitState, FetchClient, FetchRequest, FetchStats,
    ProviderFetchStats, RateLimiter,
};

// Re-export resolver types
pub use resolver::{
    IdentityLookup, ResolvedRecord, Resolution, UnresolvedReason, VariantIdentityResolver,
};

pub use transport::{HttpTransport, ReqwestTransport};
