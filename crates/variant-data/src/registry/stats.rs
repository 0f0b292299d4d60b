//! Per-provider fetch counters.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use log::warn;
use serde::Serialize;

/// Counters for one provider over the lifetime of a fetch client.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ProviderFetchStats {
    /// Requests actually put on the wire (retries included).
    pub network_calls: u64,
    pub cache_hits: u64,
    /// Callers that received another caller's in-flight result.
    pub shared_in_flight: u64,
    pub successes: u64,
    pub rate_limited: u64,
    pub transient_failures: u64,
    pub permanent_failures: u64,
    pub circuit_rejections: u64,
    pub cancelled: u64,
}

#[derive(Default)]
pub struct FetchStats {
    providers: Mutex<HashMap<String, ProviderFetchStats>>,
}

impl FetchStats {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ProviderFetchStats>> {
        self.providers.lock().unwrap_or_else(|poisoned| {
            warn!("Fetch stats mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn record(&self, provider: &str, update: impl FnOnce(&mut ProviderFetchStats)) {
        let mut providers = self.lock();
        update(providers.entry(provider.to_string()).or_default());
    }

    pub fn snapshot(&self) -> BTreeMap<String, ProviderFetchStats> {
        self.lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn provider(&self, provider: &str) -> ProviderFetchStats {
        self.lock().get(provider).cloned().unwrap_or_default()
    }

    pub fn total_network_calls(&self) -> u64 {
        self.lock().values().map(|s| s.network_calls).sum()
    }
}
