//! Resilient fetch client.
//!
//! Every outbound call made by a source adapter or the identity resolver goes
//! through [`FetchClient::fetch`]:
//!
//! ```text
//! request -> signature -> cache hit? --yes--> CacheHit
//!                              | no
//!                              v
//!                     join in-flight call for the same signature
//!                              |
//!                              v
//!              circuit allowed? --no--> CircuitOpen
//!                              | yes
//!                              v
//!         +--> rate limiter acquire -> HTTP -> classify
//!         |                                    |
//!         +------ backoff <---- retryable -----+----> Success (persisted)
//!                                              +----> PermanentFailure
//!                                              +----> RateLimited / TransientFailure
//! ```
//!
//! The client never returns an error: every path ends in a [`FetchOutcome`].

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::circuit_breaker::CircuitBreaker;
use super::rate_limiter::RateLimiter;
use super::retry::{AttemptClass, RequestState, RetryMachine, Step};
use super::stats::{FetchStats, ProviderFetchStats};
use crate::cache::CacheStore;
use crate::config::AcquisitionConfig;
use crate::errors::{RetryClass, VariantDataError};
use crate::models::{CacheEntry, FetchOutcome, HttpMethod, ProviderId, RequestSignature};
use crate::provider::{ProviderSettings, KNOWN_PROVIDERS};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Longest response body excerpt kept in a permanent-failure cause.
const MAX_CAUSE_LEN: usize = 200;

/// One logical request against a provider.
#[derive(Clone, Debug)]
pub struct FetchRequest {
    pub provider: ProviderId,
    pub method: HttpMethod,
    /// Path relative to the provider's base URL.
    pub endpoint: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
    pub idempotent: bool,
    /// Bypass the cache and overwrite the stored entry.
    pub refresh: bool,
}

impl FetchRequest {
    pub fn get(provider: impl Into<ProviderId>, endpoint: impl Into<String>) -> Self {
        Self {
            provider: normalize_provider(provider.into()),
            method: HttpMethod::Get,
            endpoint: endpoint.into(),
            params: Vec::new(),
            body: None,
            idempotent: true,
            refresh: false,
        }
    }

    pub fn post(provider: impl Into<ProviderId>, endpoint: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            body: Some(body),
            ..Self::get(provider, endpoint)
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn non_idempotent(mut self) -> Self {
        self.idempotent = false;
        self
    }

    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn signature(&self) -> RequestSignature {
        RequestSignature::new(
            &self.provider,
            self.method,
            &self.endpoint,
            &self.params,
            self.body.as_ref(),
        )
    }
}

fn normalize_provider(provider: ProviderId) -> ProviderId {
    if provider.chars().any(|c| c.is_ascii_lowercase()) {
        Cow::Owned(provider.to_ascii_uppercase())
    } else {
        provider
    }
}

/// Shared acquisition substrate for one run.
///
/// Owns the per-provider rate limiters and circuit breakers, so every caller
/// holding the same client shares one budget per provider.
pub struct FetchClient {
    config: AcquisitionConfig,
    transport: Arc<dyn HttpTransport>,
    cache: Option<Arc<dyn CacheStore>>,
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    /// Outstanding live fetches keyed by signature digest.
    inflight: Mutex<HashMap<String, Arc<OnceCell<FetchOutcome>>>>,
    stats: FetchStats,
    cancel: CancellationToken,
    refresh_all: bool,
}

impl FetchClient {
    pub fn new(config: AcquisitionConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let rate_limiter = RateLimiter::new();
        let circuit_breaker = CircuitBreaker::new();

        let configured = config.providers.keys().map(|p| p.to_ascii_uppercase());
        let mut providers: Vec<String> = KNOWN_PROVIDERS
            .iter()
            .map(|p| p.to_string())
            .chain(configured)
            .collect();
        providers.sort();
        providers.dedup();

        for provider in providers {
            let settings = config.settings_for(&provider);
            let id: ProviderId = Cow::Owned(provider);
            rate_limiter.configure(&id, settings.rate_limit());
            circuit_breaker.configure(&id, settings.circuit());
        }

        Self {
            config,
            transport,
            cache: None,
            rate_limiter,
            circuit_breaker,
            inflight: Mutex::new(HashMap::new()),
            stats: FetchStats::default(),
            cancel: CancellationToken::new(),
            refresh_all: false,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Treat every request as a forced refresh.
    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh_all = refresh;
        self
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn settings_for(&self, provider: &str) -> ProviderSettings {
        self.config.settings_for(provider)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    pub fn stats(&self) -> BTreeMap<String, ProviderFetchStats> {
        self.stats.snapshot()
    }

    pub fn provider_stats(&self, provider: &str) -> ProviderFetchStats {
        self.stats.provider(provider)
    }

    pub fn total_network_calls(&self) -> u64 {
        self.stats.total_network_calls()
    }

    /// Fetch a request, consulting the cache first.
    pub async fn fetch(&self, request: FetchRequest) -> FetchOutcome {
        let signature = request.signature();
        let refresh = request.refresh || self.refresh_all;

        if !refresh {
            if let Some(entry) = self.cached(&signature) {
                debug!("Fetch client: cache hit for {}", signature);
                self.stats.record(&request.provider, |s| s.cache_hits += 1);
                return FetchOutcome::CacheHit(entry);
            }
        }

        if self.cancel.is_cancelled() {
            self.stats.record(&request.provider, |s| s.cancelled += 1);
            return FetchOutcome::Cancelled;
        }

        let digest = signature.digest();
        let cell = self.join_flight(&digest);
        let mut led = false;
        let outcome = cell
            .get_or_init(|| {
                led = true;
                self.fetch_live(&request, &signature, refresh)
            })
            .await
            .clone();
        self.leave_flight(&digest, &cell);

        if !led {
            debug!("Fetch client: shared in-flight result for {}", signature);
            self.stats
                .record(&request.provider, |s| s.shared_in_flight += 1);
        }
        outcome
    }

    fn lock_inflight(&self) -> MutexGuard<'_, HashMap<String, Arc<OnceCell<FetchOutcome>>>> {
        self.inflight.lock().unwrap_or_else(|poisoned| {
            warn!("Fetch client in-flight mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn join_flight(&self, digest: &str) -> Arc<OnceCell<FetchOutcome>> {
        let mut inflight = self.lock_inflight();
        inflight
            .entry(digest.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    fn leave_flight(&self, digest: &str, cell: &Arc<OnceCell<FetchOutcome>>) {
        let mut inflight = self.lock_inflight();
        if inflight
            .get(digest)
            .map(|current| Arc::ptr_eq(current, cell))
            .unwrap_or(false)
        {
            inflight.remove(digest);
        }
    }

    fn cached(&self, signature: &RequestSignature) -> Option<CacheEntry> {
        let cache = self.cache.as_ref()?;
        match cache.get(signature) {
            Ok(Some(entry)) => match self.config.cache.max_age() {
                Some(max_age) if entry.age(Utc::now()) > max_age => {
                    debug!("Fetch client: cached entry for {} is stale", signature);
                    None
                }
                _ => Some(entry),
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Fetch client: cache read failed for {}: {}", signature, e);
                None
            }
        }
    }

    async fn fetch_live(
        &self,
        request: &FetchRequest,
        signature: &RequestSignature,
        refresh: bool,
    ) -> FetchOutcome {
        // A caller that queued behind a finished flight finds the entry persisted.
        if !refresh {
            if let Some(entry) = self.cached(signature) {
                self.stats.record(&request.provider, |s| s.cache_hits += 1);
                return FetchOutcome::CacheHit(entry);
            }
        }

        let provider = &request.provider;
        let settings = self.config.settings_for(provider);
        let mut machine = RetryMachine::new(settings.retry_policy(), request.idempotent);
        let mut step = machine.begin();
        let mut attempts = 0;
        let mut response: Option<HttpResponse> = None;
        let mut last_error: Option<VariantDataError> = None;

        loop {
            step = match step {
                Step::Attempt(n) => {
                    // Admission is decided once; retries of an admitted request proceed.
                    if n == 1 && !self.circuit_breaker.is_allowed(provider) {
                        machine.observe(AttemptClass::CircuitOpen)
                    } else {
                        attempts = n;
                        let result = tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => None,
                            result = self.attempt(request, signature, &settings) => Some(result),
                        };
                        let Some(result) = result else {
                            return self.cancelled(provider);
                        };
                        let class = self.classify(
                            provider,
                            &settings,
                            result,
                            &mut response,
                            &mut last_error,
                        );
                        machine.observe(class)
                    }
                }
                Step::Wait(delay) => {
                    debug!(
                        "Fetch client: backing off {:?} before retrying {}",
                        delay, signature
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return self.cancelled(provider),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    machine.resume()
                }
                Step::Finish(state) => {
                    return self.finish(state, provider, signature, attempts, response, last_error)
                }
            };
        }
    }

    async fn attempt(
        &self,
        request: &FetchRequest,
        signature: &RequestSignature,
        settings: &ProviderSettings,
    ) -> Result<HttpResponse, VariantDataError> {
        self.rate_limiter.acquire(&request.provider).await;
        self.stats
            .record(&request.provider, |s| s.network_calls += 1);

        let base = settings.base_url.trim_end_matches('/');
        let url = match signature.endpoint() {
            "/" => base.to_string(),
            endpoint => format!("{}{}", base, endpoint),
        };
        let http = HttpRequest {
            method: request.method,
            url,
            query: request.params.clone(),
            body: request.body.clone(),
            timeout: settings.request_timeout,
        };
        self.transport.execute(&request.provider, http).await
    }

    fn classify(
        &self,
        provider: &ProviderId,
        settings: &ProviderSettings,
        result: Result<HttpResponse, VariantDataError>,
        response: &mut Option<HttpResponse>,
        last_error: &mut Option<VariantDataError>,
    ) -> AttemptClass {
        let error = match result {
            Ok(ok) if (200..300).contains(&ok.status) => {
                *response = Some(ok);
                return AttemptClass::Success;
            }
            Ok(rejected) if rejected.status == 429 => VariantDataError::RateLimited {
                provider: provider.to_string(),
                retry_after: rejected.retry_after,
            },
            Ok(failed) if settings.is_retryable_status(failed.status) => {
                VariantDataError::TransientProvider {
                    provider: provider.to_string(),
                    status: failed.status,
                }
            }
            Ok(failed) => VariantDataError::PermanentProvider {
                provider: provider.to_string(),
                status: failed.status,
                message: excerpt(&failed.body),
            },
            Err(e) => e,
        };

        debug!("Fetch client: attempt against '{}' failed: {}", provider, error);

        let class = match error.retry_class() {
            RetryClass::WithBackoff => AttemptClass::Retryable {
                retry_after: error.retry_after(),
                rate_limited: matches!(error, VariantDataError::RateLimited { .. }),
            },
            RetryClass::CircuitOpen => AttemptClass::CircuitOpen,
            RetryClass::Never => AttemptClass::Permanent,
        };
        *last_error = Some(error);
        class
    }

    fn finish(
        &self,
        state: RequestState,
        provider: &ProviderId,
        signature: &RequestSignature,
        attempts: u32,
        response: Option<HttpResponse>,
        last_error: Option<VariantDataError>,
    ) -> FetchOutcome {
        match (state, response) {
            (RequestState::Succeeded, Some(response)) => {
                self.circuit_breaker.record_success(provider);
                self.stats.record(provider, |s| s.successes += 1);
                FetchOutcome::Success(self.persist(signature, response))
            }
            (RequestState::FailedPermanent, _) => {
                let status = match &last_error {
                    Some(VariantDataError::PermanentProvider { status, .. }) => {
                        // The provider answered; it is reachable.
                        self.circuit_breaker.record_success(provider);
                        Some(*status)
                    }
                    _ => {
                        self.circuit_breaker.release_probe(provider);
                        None
                    }
                };
                self.stats.record(provider, |s| s.permanent_failures += 1);
                let cause = last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "permanent failure".to_string());
                warn!("Fetch client: {} failed permanently: {}", signature, cause);
                FetchOutcome::PermanentFailure { status, cause }
            }
            (RequestState::CircuitBlocked, _) => {
                debug!("Fetch client: circuit open for '{}', skipping {}", provider, signature);
                self.stats.record(provider, |s| s.circuit_rejections += 1);
                FetchOutcome::CircuitOpen
            }
            (state, _) => {
                // FailedExhausted, or a machine that stopped without a payload.
                if state != RequestState::FailedExhausted {
                    debug!("Fetch client: request ended in unexpected state {:?}", state);
                }
                self.circuit_breaker.record_failure(provider);
                match last_error {
                    Some(VariantDataError::RateLimited { retry_after, .. }) => {
                        info!(
                            "Fetch client: {} still rate limited after {} attempts",
                            signature, attempts
                        );
                        self.stats.record(provider, |s| s.rate_limited += 1);
                        FetchOutcome::RateLimited { retry_after }
                    }
                    other => {
                        let cause = other
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| "request did not complete".to_string());
                        info!(
                            "Fetch client: {} failed after {} attempts: {}",
                            signature, attempts, cause
                        );
                        self.stats.record(provider, |s| s.transient_failures += 1);
                        FetchOutcome::TransientFailure { cause, attempts }
                    }
                }
            }
        }
    }

    fn cancelled(&self, provider: &ProviderId) -> FetchOutcome {
        self.circuit_breaker.release_probe(provider);
        self.stats.record(provider, |s| s.cancelled += 1);
        FetchOutcome::Cancelled
    }

    /// Drop cached payloads an adapter could not use, so the next run
    /// refetches them instead of replaying the same bad body.
    pub fn discard(&self, digests: &[String]) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        for digest in digests {
            match cache.remove(digest) {
                Ok(true) => debug!("Fetch client: discarded unusable cache entry {}", digest),
                Ok(false) => {}
                Err(e) => warn!("Fetch client: failed to discard {}: {}", digest, e),
            }
        }
    }

    /// Persist a successful response. Cache failures degrade to an
    /// unpersisted entry.
    fn persist(&self, signature: &RequestSignature, response: HttpResponse) -> CacheEntry {
        if let Some(cache) = self.cache.as_ref() {
            match cache.put(signature, &response.body, response.status) {
                Ok(entry) => return entry,
                Err(e) => warn!("Fetch client: failed to cache {}: {}", signature, e),
            }
        }

        CacheEntry {
            digest: signature.digest(),
            provider: signature.provider().to_string(),
            endpoint: signature.endpoint().to_string(),
            signature: signature.canonical(),
            payload: response.body,
            status: response.status,
            fetched_at: Utc::now(),
        }
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_CAUSE_LEN) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
