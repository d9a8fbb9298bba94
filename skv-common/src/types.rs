//! # Key/Value Type Definitions
//!
//! Small value types shared by the client and the store.
//!
//! ## Design Principles
//!
//! 1. **Whole Seconds**: TTLs travel as integer seconds, matching the store's
//!    `EX`/`EXPIRE`/`TTL` arguments bit-for-bit.
//! 2. **Zero Means Forever**: `Ttl::NONE` is the absence of an expiry, never
//!    an instant expiry.
//! 3. **Flat Key Naming**: composed keys join identifier and field name with a
//!    literal `.`; no escaping is applied.

use std::fmt;
use std::time::Duration;

/// Separator between an entity identifier and a field name.
pub const KEY_SEPARATOR: char = '.';

/// Time-to-live in whole seconds.
///
/// A zero TTL means the key never expires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ttl(u64);

impl Ttl {
    /// No expiration.
    pub const NONE: Ttl = Ttl(0);

    /// Creates a TTL from seconds.
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Ttl(secs)
    }

    /// Returns the TTL in seconds.
    #[inline]
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// Returns true if this TTL represents no expiration.
    #[inline]
    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// Returns the absolute expiry for a write happening at `now`.
    #[inline]
    pub fn deadline_from(&self, now: u64) -> Option<u64> {
        if self.is_none() {
            None
        } else {
            Some(now.saturating_add(self.0))
        }
    }
}

impl From<Duration> for Ttl {
    // Sub-second remainders are dropped; the wire only carries seconds.
    fn from(duration: Duration) -> Self {
        Ttl(duration.as_secs())
    }
}

impl From<Ttl> for Duration {
    fn from(ttl: Ttl) -> Self {
        Duration::from_secs(ttl.0)
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}s", self.0)
        }
    }
}

/// Builds the store key for a field of an identified entity.
///
/// The format is `<id>.<name>` and must stay stable for existing data.
pub fn compose_key(id: &str, name: &str) -> String {
    let mut key = String::with_capacity(id.len() + name.len() + 1);
    key.push_str(id);
    key.push(KEY_SEPARATOR);
    key.push_str(name);
    key
}
