//! Gap recording: what a source could not fetch, and why.

use std::time::Duration;

use serde::Serialize;

use super::outcome::FetchOutcome;
use super::types::{ProviderId, SourceId};

/// Why a request contributed nothing.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum GapReason {
    RateLimited { retry_after_secs: Option<f64> },
    TransientFailure { cause: String, attempts: u32 },
    PermanentFailure { status: Option<u16>, cause: String },
    CircuitOpen,
    Cancelled,
    /// The payload arrived but could not be decoded.
    Unparseable { cause: String },
    /// The payload decoded but the provider reported errors alongside it, so
    /// what it returned may be incomplete.
    PartialResponse { cause: String },
    /// Paging stopped at `limit` of `total` pages.
    Truncated { limit: u32, total: u32 },
    /// A prerequisite (for example a versioned gene id) was unavailable.
    MissingInput { what: String },
}

impl GapReason {
    /// Reason for a non-success outcome; `None` for payload-bearing outcomes.
    pub fn from_outcome(outcome: &FetchOutcome) -> Option<Self> {
        match outcome {
            FetchOutcome::Success(_) | FetchOutcome::CacheHit(_) => None,
            FetchOutcome::RateLimited { retry_after } => Some(Self::RateLimited {
                retry_after_secs: retry_after.map(|d: Duration| d.as_secs_f64()),
            }),
            FetchOutcome::TransientFailure { cause, attempts } => Some(Self::TransientFailure {
                cause: cause.clone(),
                attempts: *attempts,
            }),
            FetchOutcome::PermanentFailure { status, cause } => Some(Self::PermanentFailure {
                status: *status,
                cause: cause.clone(),
            }),
            FetchOutcome::CircuitOpen => Some(Self::CircuitOpen),
            FetchOutcome::Cancelled => Some(Self::Cancelled),
        }
    }
}

/// A request a source needed but could not complete.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SourceGap {
    pub source: SourceId,
    pub provider: ProviderId,
    /// Human-readable request label, e.g. `eqtl Liver`.
    pub request: String,
    #[serde(flatten)]
    pub reason: GapReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_reason_from_outcome() {
        assert_eq!(
            GapReason::from_outcome(&FetchOutcome::CircuitOpen),
            Some(GapReason::CircuitOpen)
        );
        assert_eq!(
            GapReason::from_outcome(&FetchOutcome::RateLimited {
                retry_after: Some(Duration::from_millis(1500))
            }),
            Some(GapReason::RateLimited {
                retry_after_secs: Some(1.5)
            })
        );
        assert_eq!(
            GapReason::from_outcome(&FetchOutcome::PermanentFailure {
                status: Some(404),
                cause: "not found".to_string()
            }),
            Some(GapReason::PermanentFailure {
                status: Some(404),
                cause: "not found".to_string()
            })
        );
    }

    #[test]
    fn test_gap_serializes_flat() {
        let gap = SourceGap {
            source: "GTEX".into(),
            provider: "GTEX".into(),
            request: "eqtl Liver".to_string(),
            reason: GapReason::CircuitOpen,
        };
        let json = serde_json::to_value(&gap).expect("serializable");
        assert_eq!(json["reason"], "circuit_open");
        assert_eq!(json["request"], "eqtl Liver");
    }
}
