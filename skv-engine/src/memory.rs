//! # In-Memory Engine
//!
//! Provide the in-memory backend with sharded locking and TTL-aware lookups.
//!
//! ## Usage
//!
//! - Use `MemoryEngine::new()` for a default sharded engine on the wall clock.
//! - Use `MemoryEngine::with_clock` to inject a `ManualClock` in tests.
//! - Call `purge_expired` periodically to reclaim expired entries eagerly;
//!   reads already hide them.
//!
//! ## Design Principles
//!
//! 1. **Sharded Locks**: Per-shard locks reduce contention under concurrency.
//! 2. **Arc-backed Buffers**: Values are `Arc<[u8]>` to avoid extra copies.
//! 3. **TTL Fast Path**: Expiration is checked on access for O(1) reads.
//! 4. **Strategy Pattern**: Implements `KVEngine` to keep callers decoupled.
//!
//! ## Structure Overview
//!
//! ```text
//! MemoryEngine
//!   ├── clock: Arc<dyn Clock>
//!   └── shards: Vec<Shard>
//!         └── Shard
//!               └── inner: RwLock<HashMap<Arc<[u8]>, Entry>>
//!                     └── Entry { value, expires_at }
//! ```

use std::hash::{BuildHasher, Hasher};
use std::sync::Arc;

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::RwLock;

use skv_common::{SkvError, SkvResult, Ttl};

use crate::clock::{Clock, SystemClock};
use crate::engine::{KVEngine, TtlStatus};

/// Default shards = CPU count * multiplier to reduce lock contention.
const DEFAULT_SHARD_MULTIPLIER: usize = 4;

/// Internal representation of a single key/value entry.
#[derive(Debug, Clone)]
struct Entry {
    // Shared value buffer for zero-copy reads across callers.
    value: Arc<[u8]>,
    // Absolute expiration in clock seconds.
    expires_at: Option<u64>,
}

impl Entry {
    /// Returns true when the entry has expired at `now`.
    fn is_expired(&self, now: u64) -> bool {
        match self.expires_at {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

type ShardMap = HashMap<Arc<[u8]>, Entry, RandomState>;

/// Per-shard lock wrapper.
#[derive(Debug)]
struct Shard {
    inner: RwLock<ShardMap>,
}

/// Sharded in-memory implementation of `KVEngine`.
#[derive(Debug)]
pub struct MemoryEngine {
    /// Per-shard storage.
    shards: Vec<Shard>,
    /// Bitmask for fast shard selection (power-of-two shard count).
    shard_mask: usize,
    /// Hash state used to pick shards deterministically.
    hash_state: RandomState,
    /// Time source for expiry decisions.
    clock: Arc<dyn Clock>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Creates a new engine with a default shard count based on CPU parallelism.
    pub fn new() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1);
        let shard_count = threads.saturating_mul(DEFAULT_SHARD_MULTIPLIER);
        Self::with_shards_and_clock(shard_count, Arc::new(SystemClock))
    }

    /// Creates a single-shard engine driven by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_shards_and_clock(1, clock)
    }

    /// Creates a new engine with a caller-provided shard count and clock.
    ///
    /// The count is normalized to the next power of two to enable fast masking.
    pub fn with_shards_and_clock(shards: usize, clock: Arc<dyn Clock>) -> Self {
        let shard_count = normalize_shard_count(shards);
        let hash_state = RandomState::new();
        let mut shard_vec = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            shard_vec.push(Shard {
                inner: RwLock::new(HashMap::with_hasher(hash_state.clone())),
            });
        }

        MemoryEngine {
            shards: shard_vec,
            shard_mask: shard_count - 1,
            hash_state,
            clock,
        }
    }

    /// Returns the engine's current time in seconds.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Removes expired entries across all shards.
    ///
    /// This is an O(n) scan and is intended for a periodic background sweep.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        for shard in &self.shards {
            let mut inner = shard.inner.write();
            let before = inner.len();
            inner.retain(|_, entry| !entry.is_expired(now));
            removed += before - inner.len();
        }
        removed
    }

    /// Counts live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .inner
                    .read()
                    .values()
                    .filter(|entry| !entry.is_expired(now))
                    .count()
            })
            .sum()
    }

    /// Returns true when no live key is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the absolute expiry of a stored key, expired or not.
    ///
    /// `None` when the key was never stored or was removed; `Some(None)` when
    /// it has no expiry.
    pub fn expires_at(&self, key: &[u8]) -> Option<Option<u64>> {
        let inner = self.shard_for(key).inner.read();
        inner.get(key).map(|entry| entry.expires_at)
    }

    /// Hashes a key to its owning shard index.
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = self.hash_state.build_hasher();
        hasher.write(key);
        (hasher.finish() as usize) & self.shard_mask
    }

    /// Returns the shard responsible for a given key.
    fn shard_for(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Runs `op` on the shard owning `key` under its write lock.
    ///
    /// An expired entry for `key` is removed first, so `op` only ever sees a
    /// live entry or none at all.
    fn with_live_shard<R>(&self, key: &[u8], op: impl FnOnce(&mut ShardMap, u64) -> R) -> R {
        let now = self.clock.now();
        let mut inner = self.shard_for(key).inner.write();

        let expired = inner
            .get(key)
            .map(|entry| entry.is_expired(now))
            .unwrap_or(false);
        if expired {
            inner.remove(key);
        }

        op(&mut *inner, now)
    }
}

impl KVEngine for MemoryEngine {
    /// Looks up a key and returns its value if present.
    ///
    /// Expired entries are removed on access to keep memory usage stable.
    fn get(&self, key: &[u8]) -> SkvResult<Option<Arc<[u8]>>> {
        let now = self.clock.now();
        {
            let inner = self.shard_for(key).inner.read();
            match inner.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(Arc::clone(&entry.value))),
                Some(_) => {}
            }
        }

        // Re-check under the write lock; a writer may have raced us.
        let mut inner = self.shard_for(key).inner.write();
        let live = inner
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| Arc::clone(&entry.value));
        if live.is_none() {
            inner.remove(key);
        }
        Ok(live)
    }

    /// Inserts or replaces a key/value pair.
    fn set(&self, key: Vec<u8>, value: Vec<u8>, ttl: Ttl) -> SkvResult<()> {
        let now = self.clock.now();
        let entry = Entry {
            value: Arc::from(value),
            expires_at: ttl.deadline_from(now),
        };
        let mut inner = self.shard_for(&key).inner.write();
        inner.insert(Arc::from(key), entry);
        Ok(())
    }

    /// Deletes a key and returns whether a live entry was removed.
    ///
    /// Expired entries are treated as missing.
    fn delete(&self, key: &[u8]) -> SkvResult<bool> {
        let now = self.clock.now();
        let mut inner = self.shard_for(key).inner.write();
        match inner.remove(key) {
            Some(entry) => Ok(!entry.is_expired(now)),
            None => Ok(false),
        }
    }

    fn exists(&self, key: &[u8]) -> SkvResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Sets a TTL for an existing key; `Ttl::NONE` clears it.
    ///
    /// Missing or expired keys return `SkvError::NotFound`.
    fn expire(&self, key: &[u8], ttl: Ttl) -> SkvResult<()> {
        self.with_live_shard(key, |map, now| match map.get_mut(key) {
            Some(entry) => {
                entry.expires_at = ttl.deadline_from(now);
                Ok(())
            }
            None => Err(SkvError::NotFound),
        })
    }

    fn persist(&self, key: &[u8]) -> SkvResult<bool> {
        self.with_live_shard(key, |map, _| match map.get_mut(key) {
            Some(entry) => Ok(entry.expires_at.take().is_some()),
            None => Err(SkvError::NotFound),
        })
    }

    /// Returns TTL state for a key (missing, no-expiry, or remaining seconds).
    fn ttl(&self, key: &[u8]) -> SkvResult<TtlStatus> {
        self.with_live_shard(key, |map, now| match map.get(key) {
            None => Ok(TtlStatus::Missing),
            Some(Entry { expires_at: None, .. }) => Ok(TtlStatus::NoExpiry),
            Some(Entry {
                expires_at: Some(deadline),
                ..
            }) => Ok(TtlStatus::ExpiresIn(deadline.saturating_sub(now))),
        })
    }

    fn incr_by(&self, key: &[u8], delta: i64) -> SkvResult<i64> {
        self.with_live_shard(key, |map, _| match map.get_mut(key) {
            Some(entry) => {
                let current = parse_counter(&entry.value)?;
                let next = current.checked_add(delta).ok_or(SkvError::Overflow)?;
                entry.value = Arc::from(next.to_string().into_bytes());
                Ok(next)
            }
            None => {
                map.insert(
                    Arc::from(key),
                    Entry {
                        value: Arc::from(delta.to_string().into_bytes()),
                        expires_at: None,
                    },
                );
                Ok(delta)
            }
        })
    }
}

/// Parses a stored value as a decimal `i64`.
fn parse_counter(value: &[u8]) -> SkvResult<i64> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .ok_or(SkvError::NotAnInteger)
}

/// Normalizes shard counts to a power of two for fast masking.
fn normalize_shard_count(count: usize) -> usize {
    let count = count.max(1);
    count.next_power_of_two()
}
