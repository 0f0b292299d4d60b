//! Source adapter abstractions and implementations.
//!
//! This module contains:
//! - The `SourceAdapter` trait that all adapters implement
//! - Provider identities and per-provider acquisition settings
//! - Concrete adapters, one per provider role (Ensembl, gnomAD, GTEx, etc.)
//!
//! # Architecture
//!
//! Adapters only know how to address their provider and how to map its
//! payloads. Everything about *how* a request is made (cache, rate limit,
//! retry, circuit breaking) lives in the [`FetchClient`](crate::registry::FetchClient)
//! they are handed. Several adapters consume the same upstream listing; the
//! fetch client de-duplicates those requests, so adapters never call each
//! other.

mod capabilities;
pub(crate) mod payload;
mod traits;

pub mod ensembl;
pub mod eqtl_catalogue;
pub mod gnomad;
pub mod gtex;
pub mod gwas_catalog;
pub mod myvariant;
pub mod uniprot;

pub use capabilities::{
    ProviderOverrides, ProviderSettings, EQTL_CATALOGUE, ENSEMBL, GNOMAD, GTEX, GWAS_CATALOG,
    KNOWN_PROVIDERS, KNOWN_SOURCES, MYVARIANT, SOURCE_ENSEMBL_VARIATION, SOURCE_ENSEMBL_VEP,
    SOURCE_EQTL_CATALOGUE, SOURCE_GNOMAD, SOURCE_GTEX, SOURCE_GWAS_CATALOG, SOURCE_MYVARIANT,
    SOURCE_UNIPROT_DOMAINS, UNIPROT,
};
pub use traits::{AdapterOutput, SourceAdapter};
