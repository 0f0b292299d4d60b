//! Per-provider circuit breaker for fault tolerance.
//!
//! Implements the circuit breaker pattern so a provider that keeps failing
//! is skipped instead of hammered. The circuit has three states:
//!
//! - **Closed**: Normal operation, requests are allowed through.
//! - **Open**: Provider is failing, requests fail fast.
//! - **HalfOpen**: Cool-down elapsed; a single probe request is let through.
//!
//! State is in-memory and scoped to one fetch client (one run).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::time::Instant;

use crate::models::ProviderId;

/// Default number of consecutive failures before opening the circuit.
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time to wait before transitioning from Open to HalfOpen.
const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Number of successful probes needed to close the circuit from HalfOpen.
const HALF_OPEN_SUCCESS_THRESHOLD: u32 = 1;

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - requests are allowed.
    Closed,
    /// Provider is failing - requests are blocked.
    Open,
    /// Testing recovery - one probe at a time.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Internal circuit state for a single provider.
#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    /// Number of consecutive failures.
    failure_count: u32,
    /// Number of consecutive successes in HalfOpen state.
    half_open_successes: u32,
    /// Whether the HalfOpen probe is currently outstanding.
    probe_in_flight: bool,
    /// When the circuit last opened.
    opened_at: Option<Instant>,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            half_open_successes: 0,
            probe_in_flight: false,
            opened_at: None,
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.half_open_successes = 0;
        self.probe_in_flight = false;
        self.opened_at = Some(Instant::now());
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.half_open_successes = 0;
        self.probe_in_flight = false;
        self.opened_at = None;
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Time to wait before probing recovery.
    pub recovery_timeout: Duration,
    /// Number of successful probes needed to close from HalfOpen.
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            half_open_success_threshold: HALF_OPEN_SUCCESS_THRESHOLD,
        }
    }
}

/// Per-provider circuit breaker.
pub struct CircuitBreaker {
    circuits: Mutex<HashMap<String, Circuit>>,
    /// Per-provider configuration overrides.
    configs: Mutex<HashMap<String, CircuitBreakerConfig>>,
    /// Configuration for providers without an override.
    default_config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a circuit breaker with a custom default configuration.
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: Mutex::new(HashMap::new()),
            configs: Mutex::new(HashMap::new()),
            default_config: config,
        }
    }

    /// Lock the circuits mutex, recovering from poison if necessary.
    fn lock_circuits(&self) -> MutexGuard<'_, HashMap<String, Circuit>> {
        self.circuits.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_configs(&self) -> MutexGuard<'_, HashMap<String, CircuitBreakerConfig>> {
        self.configs.lock().unwrap_or_else(|poisoned| {
            warn!("Circuit breaker configs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Override the configuration for one provider.
    pub fn configure(&self, provider: &ProviderId, config: CircuitBreakerConfig) {
        self.lock_configs().insert(provider.to_string(), config);
    }

    fn config_for(&self, provider: &ProviderId) -> CircuitBreakerConfig {
        self.lock_configs()
            .get(provider.as_ref())
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }

    /// Check if a request may go out to a provider.
    ///
    /// Returns true if the circuit is Closed, or if it is HalfOpen and no
    /// probe is outstanding (the caller becomes the probe). Returns false
    /// while Open.
    ///
    /// Handles the Open -> HalfOpen transition once the recovery timeout
    /// has elapsed.
    pub fn is_allowed(&self, provider: &ProviderId) -> bool {
        let config = self.config_for(provider);
        let mut circuits = self.lock_circuits();

        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        match circuit.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if circuit.probe_in_flight {
                    false
                } else {
                    circuit.probe_in_flight = true;
                    true
                }
            }
            CircuitState::Open => {
                let elapsed = circuit
                    .opened_at
                    .map(|at| at.elapsed() >= config.recovery_timeout)
                    .unwrap_or(true);
                if elapsed {
                    info!(
                        "Circuit breaker: transitioning '{}' from Open to HalfOpen",
                        provider
                    );
                    circuit.state = CircuitState::HalfOpen;
                    circuit.half_open_successes = 0;
                    circuit.probe_in_flight = true;
                    return true;
                }
                false
            }
        }
    }

    /// Record a request the provider answered.
    ///
    /// In Closed state: resets the failure count.
    /// In HalfOpen state: counts the probe, may close the circuit.
    pub fn record_success(&self, provider: &ProviderId) {
        let config = self.config_for(provider);
        let mut circuits = self.lock_circuits();

        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        match circuit.state {
            CircuitState::Closed => {
                if circuit.failure_count > 0 {
                    debug!(
                        "Circuit breaker: success for '{}', failure count reset",
                        provider
                    );
                }
                circuit.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                circuit.half_open_successes += 1;
                circuit.probe_in_flight = false;
                debug!(
                    "Circuit breaker: probe succeeded for '{}' ({}/{})",
                    provider, circuit.half_open_successes, config.half_open_success_threshold
                );

                if circuit.half_open_successes >= config.half_open_success_threshold {
                    info!(
                        "Circuit breaker: closing circuit for '{}' after {} successful probes",
                        provider, circuit.half_open_successes
                    );
                    circuit.close();
                }
            }
            CircuitState::Open => {
                // A request admitted before the circuit opened finished late.
                debug!(
                    "Circuit breaker: late success for '{}' in Open state",
                    provider
                );
            }
        }
    }

    /// Record a request that exhausted its retries.
    ///
    /// Increments the consecutive failure count and may open the circuit.
    /// In HalfOpen state, a failed probe immediately reopens it.
    pub fn record_failure(&self, provider: &ProviderId) {
        let config = self.config_for(provider);
        let mut circuits = self.lock_circuits();

        let circuit = circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        circuit.failure_count += 1;

        match circuit.state {
            CircuitState::Closed => {
                if circuit.failure_count >= config.failure_threshold {
                    info!(
                        "Circuit breaker: opening circuit for '{}' after {} failures",
                        provider, circuit.failure_count
                    );
                    circuit.open();
                } else {
                    debug!(
                        "Circuit breaker: failure for '{}' ({}/{})",
                        provider, circuit.failure_count, config.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                info!(
                    "Circuit breaker: reopening circuit for '{}' after failed probe",
                    provider
                );
                circuit.open();
            }
            CircuitState::Open => {
                debug!(
                    "Circuit breaker: additional failure for '{}' (already open)",
                    provider
                );
            }
        }
    }

    /// Give up an outstanding probe without a verdict (e.g. on cancellation).
    pub fn release_probe(&self, provider: &ProviderId) {
        let mut circuits = self.lock_circuits();
        if let Some(circuit) = circuits.get_mut(provider.as_ref()) {
            if circuit.state == CircuitState::HalfOpen {
                circuit.probe_in_flight = false;
            }
        }
    }

    /// Get the current state for a provider.
    pub fn state(&self, provider: &ProviderId) -> CircuitState {
        let circuits = self.lock_circuits();

        circuits
            .get(provider.as_ref())
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Get the consecutive failure count for a provider.
    pub fn failure_count(&self, provider: &ProviderId) -> u32 {
        let circuits = self.lock_circuits();

        circuits
            .get(provider.as_ref())
            .map(|c| c.failure_count)
            .unwrap_or(0)
    }

    /// Reset the circuit for a provider to Closed state.
    pub fn reset(&self, provider: &ProviderId) {
        let mut circuits = self.lock_circuits();

        if let Some(circuit) = circuits.get_mut(provider.as_ref()) {
            info!(
                "Circuit breaker: manually resetting circuit for '{}'",
                provider
            );
            circuit.close();
        }
    }

    /// Get metrics for all tracked providers, sorted by provider.
    pub fn metrics(&self) -> Vec<CircuitMetrics> {
        let circuits = self.lock_circuits();

        let mut metrics: Vec<CircuitMetrics> = circuits
            .iter()
            .map(|(provider, circuit)| CircuitMetrics {
                provider: provider.clone(),
                state: circuit.state,
                failure_count: circuit.failure_count,
            })
            .collect();
        metrics.sort_by(|a, b| a.provider.cmp(&b.provider));
        metrics
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics for a single circuit.
#[derive(Clone, Debug, Serialize)]
pub struct CircuitMetrics {
    pub provider: String,
    pub state: CircuitState,
    pub failure_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    fn breaker(threshold: u32, timeout: Duration, successes: u32) -> CircuitBreaker {
        CircuitBreaker::with_config(CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: timeout,
            half_open_success_threshold: successes,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_starts_closed() {
        let cb = CircuitBreaker::new();
        let provider: ProviderId = Cow::Borrowed("ENSEMBL");

        assert!(cb.is_allowed(&provider));
        assert_eq!(cb.state(&provider), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_opens_after_threshold() {
        let cb = breaker(3, Duration::from_secs(60), 1);
        let provider: ProviderId = Cow::Borrowed("GTEX");

        cb.record_failure(&provider);
        cb.record_failure(&provider);
        assert!(cb.is_allowed(&provider));
        assert_eq!(cb.state(&provider), CircuitState::Closed);

        cb.record_failure(&provider);
        assert!(!cb.is_allowed(&provider));
        assert_eq!(cb.state(&provider), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let cb = breaker(3, Duration::from_secs(60), 1);
        let provider: ProviderId = Cow::Borrowed("UNIPROT");

        cb.record_failure(&provider);
        cb.record_failure(&provider);
        assert_eq!(cb.failure_count(&provider), 2);

        cb.record_success(&provider);
        assert_eq!(cb.failure_count(&provider), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_probe() {
        let cb = breaker(1, Duration::from_secs(30), 1);
        let provider: ProviderId = Cow::Borrowed("GWAS_CATALOG");

        cb.record_failure(&provider);
        assert!(!cb.is_allowed(&provider));

        tokio::time::advance(Duration::from_secs(31)).await;

        assert!(cb.is_allowed(&provider));
        assert_eq!(cb.state(&provider), CircuitState::HalfOpen);
        // Second caller waits for the probe's verdict.
        assert!(!cb.is_allowed(&provider));

        cb.record_success(&provider);
        assert_eq!(cb.state(&provider), CircuitState::Closed);
        assert!(cb.is_allowed(&provider));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_reopens() {
        let cb = breaker(1, Duration::from_secs(10), 1);
        let provider: ProviderId = Cow::Borrowed("MYVARIANT");

        cb.record_failure(&provider);
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cb.is_allowed(&provider));

        cb.record_failure(&provider);
        assert_eq!(cb.state(&provider), CircuitState::Open);
        assert!(!cb.is_allowed(&provider));

        // The cool-down restarts from the failed probe.
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!cb.is_allowed(&provider));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cb.is_allowed(&provider));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_probe_lets_next_caller_probe() {
        let cb = breaker(1, Duration::from_secs(1), 2);
        let provider: ProviderId = Cow::Borrowed("EQTL_CATALOGUE");

        cb.record_failure(&provider);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cb.is_allowed(&provider));
        assert!(!cb.is_allowed(&provider));

        cb.release_probe(&provider);
        assert!(cb.is_allowed(&provider));
        cb.record_success(&provider);
        assert_eq!(cb.state(&provider), CircuitState::HalfOpen);

        assert!(cb.is_allowed(&provider));
        cb.record_success(&provider);
        assert_eq!(cb.state(&provider), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_provider_config_override() {
        let cb = breaker(5, Duration::from_secs(60), 1);
        let strict: ProviderId = Cow::Borrowed("GTEX");
        let lenient: ProviderId = Cow::Borrowed("ENSEMBL");
        cb.configure(
            &strict,
            CircuitBreakerConfig {
                failure_threshold: 1,
                ..Default::default()
            },
        );

        cb.record_failure(&strict);
        cb.record_failure(&lenient);
        assert_eq!(cb.state(&strict), CircuitState::Open);
        assert_eq!(cb.state(&lenient), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_and_metrics() {
        let cb = breaker(1, Duration::from_secs(60), 1);
        let a: ProviderId = Cow::Borrowed("A");
        let b: ProviderId = Cow::Borrowed("B");

        cb.record_failure(&b);
        cb.record_success(&a);
        let metrics = cb.metrics();
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].provider, "A");
        assert_eq!(metrics[1].state, CircuitState::Open);

        cb.reset(&b);
        assert_eq!(cb.state(&b), CircuitState::Closed);
        assert_eq!(cb.failure_count(&b), 0);
    }
}
