//! Rendered report cache
//!
//! Keyed by endpoint plus an MD5 fingerprint of the normalized query, so
//! requests that differ only in defaulted or reordered parameters share an
//! entry. Entries are the exact bytes sent to the client.
//!
//! The cache is split into independently locked shards sharing one byte
//! budget. Any cache failure (poisoned lock, unserializable key, payload
//! larger than a shard) is treated as a miss; it never fails a request.

mod lru;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{debug, warn};

pub use lru::LruShard;

/// Default byte budget for the whole cache.
pub const DEFAULT_CAPACITY_BYTES: usize = 700_000_000;

/// Cache key: endpoint name plus query fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub endpoint: String,
    pub digest: String,
}

impl CacheKey {
    fn charge(&self) -> usize {
        self.endpoint.len() + self.digest.len()
    }
}

/// Fingerprint a normalized query for `endpoint`.
///
/// Returns `None` when the query cannot be serialized; callers then skip
/// the cache for that request.
pub fn fingerprint<Q: Serialize>(endpoint: &str, query: &Q) -> Option<CacheKey> {
    match serde_json::to_vec(query) {
        Ok(bytes) => Some(CacheKey {
            endpoint: endpoint.to_string(),
            digest: format!("{:x}", md5::compute(&bytes)),
        }),
        Err(e) => {
            warn!(endpoint, "Cannot fingerprint query: {}", e);
            None
        }
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
    pub rejected: u64,
    pub entries: usize,
    pub bytes: usize,
    pub capacity_bytes: usize,
}

pub struct ResultCache {
    shards: Vec<Mutex<LruShard<CacheKey, Arc<[u8]>>>>,
    capacity_bytes: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    evictions: AtomicU64,
    rejected: AtomicU64,
}

impl ResultCache {
    /// Create a cache holding at most `capacity_bytes` across `shards`
    /// shards (at least one).
    pub fn new(capacity_bytes: usize, shards: usize) -> Self {
        let shards = shards.max(1);
        let per_shard = capacity_bytes / shards;
        Self {
            shards: (0..shards).map(|_| Mutex::new(LruShard::new(per_shard))).collect(),
            capacity_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stores: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    fn shard(&self, key: &CacheKey) -> &Mutex<LruShard<CacheKey, Arc<[u8]>>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    /// Look up a rendered payload.
    pub fn lookup(&self, key: &CacheKey) -> Option<Arc<[u8]>> {
        let found = match self.shard(key).lock() {
            Ok(mut shard) => shard.get(key),
            Err(e) => {
                warn!("Cache shard unavailable: {}", e);
                None
            }
        };
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(endpoint = %key.endpoint, digest = %key.digest, "Cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Store a rendered payload; returns whether it was kept.
    pub fn store(&self, key: CacheKey, payload: Arc<[u8]>) -> bool {
        let size = payload.len() + key.charge();
        let outcome = match self.shard(&key).lock() {
            Ok(mut shard) => shard.put(key, payload, size),
            Err(e) => {
                warn!("Cache shard unavailable: {}", e);
                None
            }
        };
        match outcome {
            Some(evicted) => {
                self.stores.fetch_add(1, Ordering::Relaxed);
                self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
                true
            }
            None => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                debug!(size, "Payload not cached");
                false
            }
        }
    }

    /// Drop every entry; counters are kept.
    pub fn clear(&self) {
        for shard in &self.shards {
            if let Ok(mut shard) = shard.lock() {
                shard.clear();
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, bytes) = self
            .shards
            .iter()
            .filter_map(|s| s.lock().ok().map(|s| (s.len(), s.used())))
            .fold((0, 0), |(n, b), (sn, sb)| (n + sn, b + sb));
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            entries,
            bytes,
            capacity_bytes: self.capacity_bytes,
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY_BYTES, 16)
    }
}
