//! # Storage Engine Interface
//!
//! ## Design Principles
//!
//! 1. **Strategy Pattern**: Abstract the engine behind a trait so different
//!    implementations can be swapped without touching the dispatcher.
//! 2. **Binary-Safe API**: Keys/values are byte buffers to match store semantics.
//! 3. **Explicit TTL**: Expiration is a whole-second `Ttl`; `Ttl::NONE` means
//!    the entry never expires.
//! 4. **Counters Are Strings**: Integers are stored as their decimal text, so
//!    `GET` of a counter and `INCRBY` of a written integer both work.

use std::sync::Arc;

use skv_common::{SkvResult, Ttl};

/// TTL query result for store-style semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    /// Key does not exist or is already expired.
    Missing,
    /// Key exists but has no expiration set.
    NoExpiry,
    /// Key expires after the given number of seconds.
    ExpiresIn(u64),
}

/// Strategy pattern: defines the engine behavior surface for the dispatcher.
pub trait KVEngine: Send + Sync {
    /// Returns the value for a key, or `None` if missing or expired.
    fn get(&self, key: &[u8]) -> SkvResult<Option<Arc<[u8]>>>;

    /// Inserts or replaces a key. A non-zero `ttl` sets a fresh expiry, a zero
    /// `ttl` clears any previous one.
    fn set(&self, key: Vec<u8>, value: Vec<u8>, ttl: Ttl) -> SkvResult<()>;

    /// Removes a key. Returns true if a live key was removed.
    fn delete(&self, key: &[u8]) -> SkvResult<bool>;

    /// Returns true if a live key exists.
    fn exists(&self, key: &[u8]) -> SkvResult<bool>;

    /// Sets an expiration on a key. Returns `NotFound` if the key is missing.
    fn expire(&self, key: &[u8], ttl: Ttl) -> SkvResult<()>;

    /// Clears the expiration of a key. Returns true when an expiry was removed
    /// and `NotFound` if the key is missing.
    fn persist(&self, key: &[u8]) -> SkvResult<bool>;

    /// Returns the TTL state for a key.
    fn ttl(&self, key: &[u8]) -> SkvResult<TtlStatus>;

    /// Adds `delta` to the integer stored at `key`, treating a missing key as
    /// zero. The existing expiry, if any, is kept.
    fn incr_by(&self, key: &[u8], delta: i64) -> SkvResult<i64>;
}
