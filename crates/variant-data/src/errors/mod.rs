//! Error types and retry classification for the variant data crate.
//!
//! This module provides:
//! - [`VariantDataError`]: The main error enum for acquisition and resolution
//! - [`CacheError`]: Failures of the response cache (always non-fatal)
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the response cache.
///
/// The fetch client never propagates these; a broken cache degrades to
/// direct fetching.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The underlying database rejected an operation.
    #[error("Cache database error: {0}")]
    Database(String),

    /// A stored entry could not be decoded.
    #[error("Corrupt cache entry {digest}: {message}")]
    Corrupt {
        /// Content address of the entry
        digest: String,
        /// What was wrong with it
        message: String,
    },

    /// The cache directory could not be prepared.
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Errors that can occur while acquiring or resolving variant data.
///
/// Each variant is classified into a [`RetryClass`] via the
/// [`retry_class`](Self::retry_class) method, which the fetch client uses to
/// drive its retry state machine.
#[derive(Error, Debug)]
pub enum VariantDataError {
    /// The response cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The provider rate limited the request (HTTP 429).
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
        /// Wait hint from the `Retry-After` header, if any
        retry_after: Option<Duration>,
    },

    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// The connection to the provider failed before a response arrived.
    #[error("Transport error: {provider} - {message}")]
    Transport {
        /// The provider that could not be reached
        provider: String,
        /// The underlying transport message
        message: String,
    },

    /// The provider answered with a status that is worth retrying.
    #[error("Transient provider error: {provider} returned {status}")]
    TransientProvider {
        /// The provider that returned the error
        provider: String,
        /// HTTP status code
        status: u16,
    },

    /// The provider rejected the request in a way retrying won't fix.
    #[error("Permanent provider error: {provider} returned {status} - {message}")]
    PermanentProvider {
        /// The provider that returned the error
        provider: String,
        /// HTTP status code
        status: u16,
        /// Response body excerpt
        message: String,
    },

    /// The circuit breaker is open for this provider.
    #[error("Circuit open: {provider}")]
    CircuitOpen {
        /// The provider with an open circuit
        provider: String,
    },

    /// The run was cancelled while the request was pending.
    #[error("Request cancelled: {provider}")]
    Cancelled {
        /// The provider the request was addressed to
        provider: String,
    },

    /// A provider payload did not match the expected shape.
    #[error("Failed to parse {provider} response: {message}")]
    Parse {
        /// The provider whose payload was malformed
        provider: String,
        /// Decoder message
        message: String,
    },

    /// A raw identity descriptor mapped to more than one canonical key.
    #[error("Identity resolution ambiguous for {descriptor}: {candidates} candidates")]
    IdentityResolutionAmbiguous {
        /// The descriptor being resolved
        descriptor: String,
        /// Number of distinct canonical candidates
        candidates: usize,
    },

    /// The gene symbol could not be turned into a locus.
    #[error("Locus resolution failed for {symbol}: {message}")]
    LocusResolutionFailed {
        /// Gene symbol requested by the caller
        symbol: String,
        /// What went wrong
        message: String,
    },

    /// Configuration was rejected.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl VariantDataError {
    /// Returns the retry classification for this error.
    ///
    /// - [`RetryClass::Never`]: Don't retry, the error is terminal
    /// - [`RetryClass::WithBackoff`]: Retry with exponential backoff
    /// - [`RetryClass::CircuitOpen`]: Provider circuit is open, fail fast
    ///
    /// # Examples
    ///
    /// ```
    /// use varlens_variant_data::errors::{RetryClass, VariantDataError};
    ///
    /// let error = VariantDataError::RateLimited { provider: "ENSEMBL".to_string(), retry_after: None };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = VariantDataError::PermanentProvider {
    ///     provider: "GTEX".to_string(),
    ///     status: 404,
    ///     message: "not found".to_string(),
    /// };
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::RateLimited { .. }
            | Self::Timeout { .. }
            | Self::Transport { .. }
            | Self::TransientProvider { .. } => RetryClass::WithBackoff,

            Self::CircuitOpen { .. } => RetryClass::CircuitOpen,

            Self::Cache(_)
            | Self::PermanentProvider { .. }
            | Self::Cancelled { .. }
            | Self::Parse { .. }
            | Self::IdentityResolutionAmbiguous { .. }
            | Self::LocusResolutionFailed { .. }
            | Self::Config(_) => RetryClass::Never,
        }
    }

    /// Wait hint carried by a rate-limit rejection.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_retries_with_backoff() {
        let error = VariantDataError::RateLimited {
            provider: "ENSEMBL".to_string(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(error.retry_class(), RetryClass::WithBackoff);
        assert_eq!(error.retry_after(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_transport_failures_retry_with_backoff() {
        let timeout = VariantDataError::Timeout {
            provider: "GTEX".to_string(),
        };
        let refused = VariantDataError::Transport {
            provider: "GTEX".to_string(),
            message: "connection refused".to_string(),
        };
        let unavailable = VariantDataError::TransientProvider {
            provider: "GTEX".to_string(),
            status: 503,
        };
        assert_eq!(timeout.retry_class(), RetryClass::WithBackoff);
        assert_eq!(refused.retry_class(), RetryClass::WithBackoff);
        assert_eq!(unavailable.retry_class(), RetryClass::WithBackoff);
        assert_eq!(unavailable.retry_after(), None);
    }

    #[test]
    fn test_permanent_errors_never_retry() {
        let error = VariantDataError::PermanentProvider {
            provider: "UNIPROT".to_string(),
            status: 400,
            message: "bad query".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Never);

        let error = VariantDataError::Parse {
            provider: "UNIPROT".to_string(),
            message: "expected value".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Never);
    }

    #[test]
    fn test_circuit_open_classification() {
        let error = VariantDataError::CircuitOpen {
            provider: "GWAS_CATALOG".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::CircuitOpen);
    }

    #[test]
    fn test_cache_error_is_terminal() {
        let error = VariantDataError::from(CacheError::Database("disk I/O error".to_string()));
        assert_eq!(error.retry_class(), RetryClass::Never);
        assert!(error.to_string().contains("disk I/O error"));
    }
}
