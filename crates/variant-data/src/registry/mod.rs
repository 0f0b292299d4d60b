//! Acquisition registry module.
//!
//! This module provides the shared machinery every outbound call goes through:
//! - Rate limiting per provider
//! - Circuit breaking for fault tolerance
//! - Retry/backoff as an explicit per-request state machine
//! - The resilient fetch client that ties them to the response cache

mod circuit_breaker;
mod fetch_client;
mod rate_limiter;
mod retry;
mod stats;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitState};
pub use fetch_client::{FetchClient, FetchRequest};
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use retry::{AttemptClass, RequestState, RetryMachine, RetryPolicy, Step};
pub use stats::{FetchStats, ProviderFetchStats};
