//! Content-addressed response cache.
//!
//! Raw provider payloads are stored under the SHA-256 digest of their
//! normalized [`RequestSignature`], so a restarted run reuses every response
//! an earlier run already paid for. Entries never expire on their own; the
//! fetch client may be configured to treat old entries as misses.

mod sqlite_store;

pub use sqlite_store::SqliteCacheStore;

use std::collections::BTreeMap;

use crate::errors::CacheError;
use crate::models::{CacheEntry, RequestSignature};

/// Durable storage for raw provider responses.
///
/// Implementations must give read-your-writes within a process and must
/// never expose a partially written entry. Concurrent writers to the same
/// signature are serialized; the last one wins.
pub trait CacheStore: Send + Sync {
    fn get(&self, signature: &RequestSignature) -> Result<Option<CacheEntry>, CacheError>;

    /// Store a payload, replacing any existing entry for the signature.
    fn put(
        &self,
        signature: &RequestSignature,
        payload: &str,
        status: u16,
    ) -> Result<CacheEntry, CacheError>;

    /// Remove the entry stored under a digest. Returns whether one existed.
    fn remove(&self, digest: &str) -> Result<bool, CacheError>;

    /// Remove the entry for a signature. Returns whether one existed.
    fn invalidate(&self, signature: &RequestSignature) -> Result<bool, CacheError> {
        self.remove(&signature.digest())
    }

    /// Number of entries per provider.
    fn stats(&self) -> Result<BTreeMap<String, u64>, CacheError>;

    /// Drop every entry belonging to a provider. Returns the count removed.
    fn clear_provider(&self, provider: &str) -> Result<u64, CacheError>;
}
