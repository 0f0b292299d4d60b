//! Error types for the integration crate.
//!
//! Per-request and per-adapter failures never reach this type: they are
//! recorded as gaps or unresolved identities. What remains is the small set of
//! conditions that stop a run.

use thiserror::Error;
use varlens_variant_data::VariantDataError;

/// Type alias for Result using the integration error type.
pub type Result<T> = std::result::Result<T, IntegrationError>;

#[derive(Error, Debug)]
pub enum IntegrationError {
    /// No source produced a single record.
    #[error("Integration input is empty: no source produced any record")]
    IntegrationEmptyInput,

    #[error("Acquisition failed: {0}")]
    Acquisition(#[from] VariantDataError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl IntegrationError {
    /// Whether a retry of the whole run could succeed without changes.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Acquisition(e) => e.retry_class() != varlens_variant_data::RetryClass::Never,
            Self::Io(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_message() {
        let err = IntegrationError::IntegrationEmptyInput;
        assert!(err.to_string().contains("no source produced any record"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_acquisition_error_classification() {
        let err: IntegrationError = VariantDataError::CircuitOpen {
            provider: "ENSEMBL".to_string(),
        }
        .into();
        assert!(err.is_transient());

        let err: IntegrationError = VariantDataError::LocusResolutionFailed {
            symbol: "NOPE".to_string(),
            message: "not found".to_string(),
        }
        .into();
        assert!(!err.is_transient());
    }
}
