//! # Client Facade
//!
//! Purpose: Hand out pooled connections to a RESP2 store.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KvClient` hides pooling and protocol details.
//! 2. **Cheap Handles**: Clones share one pool.
//! 3. **Fail Fast**: Bad addresses are rejected when the client is built.

use crate::config::ClientConfig;
use crate::connection::KvConnection;
use crate::error::ClientResult;
use crate::pool::ConnectionPool;

/// Pooled client for a RESP2 store.
#[derive(Clone)]
pub struct KvClient {
    pool: ConnectionPool,
}

impl KvClient {
    /// Creates a client with default configuration.
    pub fn connect(addr: impl Into<String>) -> ClientResult<Self> {
        Self::with_config(ClientConfig::new(addr))
    }

    /// Creates a client with a custom configuration.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        let pool = ConnectionPool::new(config)?;
        Ok(KvClient { pool })
    }

    /// Returns the configuration the pool was built with.
    pub fn config(&self) -> &ClientConfig {
        self.pool.config()
    }

    /// Takes a connection from the pool, dialing a new one if none is idle.
    pub fn acquire(&self) -> ClientResult<KvConnection> {
        Ok(KvConnection::new(self.pool.acquire()?))
    }

    /// Number of idle pooled connections.
    pub fn idle_connections(&self) -> usize {
        self.pool.stats().0
    }

    /// Number of open pooled connections, idle or in use.
    pub fn open_connections(&self) -> usize {
        self.pool.stats().1
    }
}
