//! Results of a single fetch-client call.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::VariantDataError;

/// Raw provider response as stored in the cache.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CacheEntry {
    /// Content address (SHA-256 of the canonical request signature).
    pub digest: String,
    pub provider: String,
    pub endpoint: String,
    /// Canonical request signature text.
    pub signature: String,
    pub payload: String,
    pub status: u16,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Decode the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, VariantDataError> {
        serde_json::from_str(&self.payload).map_err(|e| VariantDataError::Parse {
            provider: self.provider.clone(),
            message: format!("{} ({})", e, self.endpoint),
        })
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Tagged result of one fetch-client call.
///
/// Every adapter branches on this uniformly: a payload means proceed,
/// anything else becomes a recorded gap.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    /// Fetched live and persisted.
    Success(CacheEntry),
    /// Served from the cache without touching the provider.
    CacheHit(CacheEntry),
    /// Retries exhausted while the provider kept answering 429.
    RateLimited { retry_after: Option<Duration> },
    /// Retries exhausted on server errors, timeouts or connection failures.
    TransientFailure { cause: String, attempts: u32 },
    /// The provider rejected the request; not retried, not cached.
    PermanentFailure { status: Option<u16>, cause: String },
    /// The provider's circuit is open; no network call was made.
    CircuitOpen,
    /// The run was cancelled before the request completed.
    Cancelled,
}

impl FetchOutcome {
    pub fn entry(&self) -> Option<&CacheEntry> {
        match self {
            Self::Success(entry) | Self::CacheHit(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.entry().is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::CacheHit(_) => "cache_hit",
            Self::RateLimited { .. } => "rate_limited",
            Self::TransientFailure { .. } => "transient_failure",
            Self::PermanentFailure { .. } => "permanent_failure",
            Self::CircuitOpen => "circuit_open",
            Self::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn entry(payload: &str) -> CacheEntry {
        CacheEntry {
            digest: "abc".to_string(),
            provider: "ENSEMBL".to_string(),
            endpoint: "/lookup".to_string(),
            signature: "ENSEMBL GET /lookup".to_string(),
            payload: payload.to_string(),
            status: 200,
            fetched_at: Utc::now(),
        }
    }

    #[derive(Deserialize)]
    struct Payload {
        id: String,
    }

    #[test]
    fn test_entry_json_decodes_payload() {
        let parsed: Payload = entry(r#"{"id": "ENSG00000130203"}"#).json().expect("valid json");
        assert_eq!(parsed.id, "ENSG00000130203");
    }

    #[test]
    fn test_entry_json_reports_parse_error() {
        let result: Result<Payload, _> = entry("<html>").json();
        match result {
            Err(VariantDataError::Parse { provider, .. }) => assert_eq!(provider, "ENSEMBL"),
            _ => panic!("expected parse error"),
        }
    }

    #[test]
    fn test_outcome_entry_access() {
        assert!(FetchOutcome::CacheHit(entry("{}")).is_success());
        assert!(FetchOutcome::Success(entry("{}")).entry().is_some());
        assert!(!FetchOutcome::CircuitOpen.is_success());
        assert!(FetchOutcome::Cancelled.is_cancelled());
        assert_eq!(
            FetchOutcome::TransientFailure {
                cause: "503".to_string(),
                attempts: 3
            }
            .label(),
            "transient_failure"
        );
    }
}
