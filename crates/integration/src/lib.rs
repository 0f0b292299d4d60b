//! Varlens Integration - per-gene pipeline, integration engine and outputs.
//!
//! This crate turns the normalized, identity-resolved records produced by
//! `varlens-variant-data` into one row per variant. Fields are merged with
//! explicit provenance and conflict tagging, and per-source coverage is kept
//! on every row. The pipeline drives one gene from symbol to result
//! directory.

pub mod config;
pub mod errors;
pub mod integration;
pub mod output;
pub mod pipeline;

pub use config::PipelineConfig;
pub use integration::{
    ClassificationThresholds, IntegratedVariantRecord, IntegrationEngine, IntegrationResult,
    SourceCoverage, SourceReport, SummaryStats,
};
pub use output::OutputWriter;
pub use pipeline::{Pipeline, RunReport};

// Re-export error types
pub use errors::IntegrationError;
pub use errors::Result;
