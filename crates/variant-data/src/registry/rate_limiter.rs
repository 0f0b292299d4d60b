//! Token bucket rate limiter for variant data providers.
//!
//! Implements per-provider rate limiting using the token bucket algorithm.
//! Each provider gets its own bucket with configurable capacity and refill
//! rate. On top of the bucket, a rolling log of recent acquisitions caps the
//! number of calls in any one-second window at the configured rate, so a
//! full bucket can never push a provider past its published limit.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use crate::models::ProviderId;

/// Default rate limit: 15 requests per second (Ensembl's public ceiling).
const DEFAULT_REQUESTS_PER_SECOND: f64 = 15.0;

/// Default bucket capacity (allows bursting).
const DEFAULT_BUCKET_CAPACITY: f64 = 15.0;

const WINDOW: Duration = Duration::from_secs(1);

/// Token bucket for a single provider.
#[derive(Debug)]
struct TokenBucket {
    /// Current number of available tokens.
    tokens: f64,
    /// Last time the bucket was updated.
    last_update: Instant,
    /// Token refill rate (tokens per second).
    rate: f64,
    /// Maximum bucket capacity.
    capacity: f64,
    /// Acquisitions within the last second, oldest first.
    recent: VecDeque<Instant>,
    /// Maximum acquisitions allowed per rolling second.
    window_limit: usize,
}

impl TokenBucket {
    fn with_config(config: &RateLimitConfig) -> Self {
        let rate = if config.requests_per_second > 0.0 {
            config.requests_per_second
        } else {
            DEFAULT_REQUESTS_PER_SECOND
        };
        let capacity = config.burst_capacity.max(1.0);
        Self {
            tokens: capacity,
            last_update: Instant::now(),
            rate,
            capacity,
            recent: VecDeque::new(),
            window_limit: (rate.floor() as usize).max(1),
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_update = now;
    }

    /// Forget acquisitions that fell out of the rolling window.
    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.recent.front() {
            if *oldest + WINDOW <= now {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }

    /// Try to acquire a token immediately.
    fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        self.refill(now);
        self.prune(now);

        if self.tokens >= 1.0 && self.recent.len() < self.window_limit {
            self.tokens -= 1.0;
            self.recent.push_back(now);
            true
        } else {
            false
        }
    }

    /// Calculate the wait time until a token becomes available.
    fn time_until_available(&mut self) -> Duration {
        let now = Instant::now();
        self.refill(now);
        self.prune(now);

        let bucket_wait = if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.rate)
        };
        let window_wait = match self.recent.front() {
            Some(oldest) if self.recent.len() >= self.window_limit => {
                (*oldest + WINDOW).saturating_duration_since(now)
            }
            _ => Duration::ZERO,
        };

        bucket_wait.max(window_wait)
    }
}

/// Rate limiter configuration for a provider.
#[derive(Clone, Debug, PartialEq)]
pub struct RateLimitConfig {
    /// Sustained refill rate.
    pub requests_per_second: f64,
    /// Maximum burst capacity.
    pub burst_capacity: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            burst_capacity: DEFAULT_BUCKET_CAPACITY,
        }
    }
}

/// Token bucket rate limiter for multiple providers.
///
/// Thread-safe rate limiter that maintains per-provider token buckets.
/// Buckets are created on-demand with default settings, or can be
/// pre-configured with custom limits. Callers are never dropped; they wait.
pub struct RateLimiter {
    /// Per-provider token buckets.
    buckets: Mutex<HashMap<String, TokenBucket>>,
    /// Per-provider configuration overrides.
    configs: Mutex<HashMap<String, RateLimitConfig>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            configs: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the buckets mutex, recovering from poison if necessary.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter buckets mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Lock the configs mutex, recovering from poison if necessary.
    fn lock_configs(&self) -> MutexGuard<'_, HashMap<String, RateLimitConfig>> {
        self.configs.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter configs mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure rate limits for a specific provider.
    pub fn configure(&self, provider: &ProviderId, config: RateLimitConfig) {
        let mut configs = self.lock_configs();
        configs.insert(provider.to_string(), config);
        drop(configs);

        let mut buckets = self.lock_buckets();
        buckets.remove(provider.as_ref());
    }

    /// Acquire a token for the given provider.
    ///
    /// Waits (asynchronously) until both the bucket and the rolling window
    /// allow another call.
    pub async fn acquire(&self, provider: &ProviderId) {
        loop {
            let wait_time = {
                let mut buckets = self.lock_buckets();

                let bucket = buckets
                    .entry(provider.to_string())
                    .or_insert_with(|| self.create_bucket(provider));

                if bucket.try_acquire() {
                    debug!("Rate limiter: acquired token for '{}'", provider);
                    return;
                }

                bucket.time_until_available()
            };

            if wait_time > Duration::ZERO {
                debug!(
                    "Rate limiter: waiting {:?} for provider '{}'",
                    wait_time, provider
                );
                tokio::time::sleep(wait_time).await;
            } else {
                tokio::task::yield_now().await;
            }
        }
    }

    /// Try to acquire a token without waiting.
    pub fn try_acquire(&self, provider: &ProviderId) -> bool {
        let mut buckets = self.lock_buckets();

        let bucket = buckets
            .entry(provider.to_string())
            .or_insert_with(|| self.create_bucket(provider));

        bucket.try_acquire()
    }

    /// Get the remaining tokens for a provider.
    pub fn remaining_tokens(&self, provider: &ProviderId) -> f64 {
        let mut buckets = self.lock_buckets();

        if let Some(bucket) = buckets.get_mut(provider.as_ref()) {
            bucket.refill(Instant::now());
            bucket.tokens
        } else {
            self.lock_configs()
                .get(provider.as_ref())
                .map(|c| c.burst_capacity.max(1.0))
                .unwrap_or(DEFAULT_BUCKET_CAPACITY)
        }
    }

    /// Reset the rate limiter for a provider.
    pub fn reset(&self, provider: &ProviderId) {
        let mut buckets = self.lock_buckets();
        buckets.remove(provider.as_ref());
    }

    /// Create a bucket for a provider, using custom config if available.
    fn create_bucket(&self, provider: &ProviderId) -> TokenBucket {
        let configs = self.lock_configs();
        let config = configs.get(provider.as_ref()).cloned().unwrap_or_default();
        TokenBucket::with_config(&config)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
