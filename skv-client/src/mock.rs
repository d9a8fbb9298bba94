//! # In-Memory Test Double
//!
//! `MockStore` stands in for a real store in tests. Its connections run the
//! regular `Pipeline` code over a transport that evaluates each flushed
//! request with the same `Store` dispatcher the loopback server uses, so wire
//! encoding and decoding are exercised too.
//!
//! On top of the store it offers:
//! - an injected clock (`set_now`, `advance`) for deterministic expiry,
//! - seeding (`with_int`, `with_string`),
//! - fault injection per key (`fail_on_get`, `fail_on_set`, `fail_on_del`),
//! - inspection (`num_keys`, `expire_time`, `stored`, `opened_connections`).

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hashbrown::HashSet;
use parking_lot::Mutex;
use skv_common::{RespValue, Ttl};
use skv_engine::{KVEngine, ManualClock, Store};
use tracing::warn;

use crate::connection::{Connection, ConnectionFactory};
use crate::error::{ClientError, ClientResult};
use crate::pipeline::Pipeline;
use crate::pubsub::Subscription;
use crate::transport::Transport;

#[derive(Debug, Default)]
struct Faults {
    get: HashSet<Vec<u8>>,
    set: HashSet<Vec<u8>>,
    del: HashSet<Vec<u8>>,
}

#[derive(Debug)]
struct MockInner {
    store: Store,
    clock: Arc<ManualClock>,
    faults: Mutex<Faults>,
    opened: AtomicUsize,
}

/// Shared in-memory store; clones observe the same data.
#[derive(Debug, Clone)]
pub struct MockStore {
    inner: Arc<MockInner>,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    /// Creates an empty store with its clock at zero.
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(0));
        MockStore {
            inner: Arc::new(MockInner {
                store: Store::with_clock(clock.clone()),
                clock,
                faults: Mutex::new(Faults::default()),
                opened: AtomicUsize::new(0),
            }),
        }
    }

    /// Opens a connection.
    pub fn connection(&self) -> MockConnection {
        self.inner.opened.fetch_add(1, Ordering::AcqRel);
        MockConnection {
            transport: MockTransport {
                inner: self.inner.clone(),
                pending: Vec::new(),
                replies: VecDeque::new(),
            },
        }
    }

    /// Seeds an integer value.
    pub fn with_int(&self, key: &str, value: i64, ttl: Ttl) -> &Self {
        self.seed(key, value.to_string().into_bytes(), ttl)
    }

    /// Seeds a string value.
    pub fn with_string(&self, key: &str, value: &str, ttl: Ttl) -> &Self {
        self.seed(key, value.as_bytes().to_vec(), ttl)
    }

    /// Sets the current time in seconds.
    pub fn set_now(&self, now: u64) -> &Self {
        self.inner.clock.set(now);
        self
    }

    /// Moves the current time forward.
    pub fn advance(&self, secs: u64) -> &Self {
        self.inner.clock.advance(secs);
        self
    }

    pub fn now(&self) -> u64 {
        self.inner.store.engine().now()
    }

    /// Makes reads of `key` (and read-modify-writes) reply with an error.
    pub fn fail_on_get(&self, key: &str, fails: bool) -> &Self {
        toggle(&mut self.inner.faults.lock().get, key, fails);
        self
    }

    /// Makes writes of `key` reply with an error.
    pub fn fail_on_set(&self, key: &str, fails: bool) -> &Self {
        toggle(&mut self.inner.faults.lock().set, key, fails);
        self
    }

    /// Makes deletes touching `key` reply with an error.
    pub fn fail_on_del(&self, key: &str, fails: bool) -> &Self {
        toggle(&mut self.inner.faults.lock().del, key, fails);
        self
    }

    /// Number of live keys at the current time.
    pub fn num_keys(&self) -> usize {
        self.inner.store.engine().len()
    }

    /// Absolute expiry of a stored key, 0 when it has none.
    pub fn expire_time(&self, key: &str) -> Option<u64> {
        self.inner
            .store
            .engine()
            .expires_at(key.as_bytes())
            .map(|deadline| deadline.unwrap_or(0))
    }

    /// Raw stored text of a live key.
    pub fn stored(&self, key: &str) -> Option<String> {
        match self.inner.store.engine().get(key.as_bytes()) {
            Ok(Some(value)) => Some(String::from_utf8_lossy(&value).into_owned()),
            _ => None,
        }
    }

    /// Connections opened and not yet closed.
    pub fn opened_connections(&self) -> usize {
        self.inner.opened.load(Ordering::Acquire)
    }

    fn seed(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> &Self {
        if let Err(err) = self.inner.store.engine().set(key.as_bytes().to_vec(), value, ttl) {
            warn!(key, error = %err, "failed to seed mock store");
        }
        self
    }
}

impl ConnectionFactory for MockStore {
    type Connection = MockConnection;

    fn connection(&self) -> ClientResult<MockConnection> {
        Ok(MockStore::connection(self))
    }
}

impl MockInner {
    fn execute(&self, args: &[Vec<u8>]) -> RespValue {
        match self.fault_for(args) {
            Some(reply) => reply,
            None => self.store.execute(args),
        }
    }

    fn fault_for(&self, args: &[Vec<u8>]) -> Option<RespValue> {
        let (name, keys) = args.split_first()?;
        let faults = self.faults.lock();

        if name.eq_ignore_ascii_case(b"DEL") {
            return keys
                .iter()
                .any(|key| faults.del.contains(key))
                .then(|| RespValue::error("fails on del"));
        }

        let key = keys.first()?;
        if is_read(name) && faults.get.contains(key) {
            return Some(RespValue::error("fails on get"));
        }
        if is_write(name) && faults.set.contains(key) {
            return Some(RespValue::error("fails on set"));
        }
        None
    }
}

const READS: [&[u8]; 6] = [b"GET", b"EXISTS", b"TTL", b"INCRBY", b"EXPIRE", b"PERSIST"];
const WRITES: [&[u8]; 4] = [b"SET", b"INCRBY", b"EXPIRE", b"PERSIST"];

fn is_read(name: &[u8]) -> bool {
    READS
        .iter()
        .any(|candidate| name.eq_ignore_ascii_case(candidate))
}

fn is_write(name: &[u8]) -> bool {
    WRITES
        .iter()
        .any(|candidate| name.eq_ignore_ascii_case(candidate))
}

fn toggle(set: &mut HashSet<Vec<u8>>, key: &str, enabled: bool) {
    if enabled {
        set.insert(key.as_bytes().to_vec());
    } else {
        set.remove(key.as_bytes());
    }
}

/// Transport that evaluates flushed requests against the shared store.
struct MockTransport {
    inner: Arc<MockInner>,
    pending: Vec<Vec<Vec<u8>>>,
    replies: VecDeque<RespValue>,
}

impl Transport for MockTransport {
    fn send(&mut self, args: &[&[u8]]) -> ClientResult<()> {
        self.pending.push(args.iter().map(|arg| arg.to_vec()).collect());
        Ok(())
    }

    fn flush(&mut self) -> ClientResult<()> {
        for args in self.pending.drain(..) {
            self.replies.push_back(self.inner.execute(&args));
        }
        Ok(())
    }

    fn receive(&mut self) -> ClientResult<RespValue> {
        self.replies
            .pop_front()
            .ok_or_else(|| ClientError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "no reply pending")))
    }

    fn abandon(&mut self) {
        self.pending.clear();
        self.replies.clear();
    }
}

/// Connection to a `MockStore`.
pub struct MockConnection {
    transport: MockTransport,
}

impl Connection for MockConnection {
    fn pipeline(&mut self) -> Pipeline<'_> {
        Pipeline::new(&mut self.transport)
    }

    fn subscribe(&mut self, channel: &str) -> ClientResult<Subscription> {
        let receiver = self.transport.inner.store.broker().subscribe(channel.as_bytes());
        Ok(Subscription::from_receiver(channel, receiver))
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.transport.inner.opened.fetch_sub(1, Ordering::AcqRel);
    }
}
