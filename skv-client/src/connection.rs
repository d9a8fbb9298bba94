//! # Connection Contract
//!
//! `Connection` is what callers and the mapper program against. Implementors
//! supply a pipeline over their transport and a subscription mechanism; every
//! single-shot operation is a one-command pipeline, so it costs one full
//! round trip and reports the underlying failure without pipeline wrapping.

use skv_common::Ttl;

use crate::client::KvClient;
use crate::error::{ClientError, ClientResult};
use crate::pipeline::Pipeline;
use crate::pool::{PooledConnection, TcpConnection};
use crate::pubsub::Subscription;

/// Source of connections.
pub trait ConnectionFactory {
    type Connection: Connection;

    /// Hands out a connection for exclusive use by the caller.
    fn connection(&self) -> ClientResult<Self::Connection>;
}

/// A single-owner session with the store.
pub trait Connection {
    /// Starts an empty pipeline bound to this connection.
    fn pipeline(&mut self) -> Pipeline<'_>;

    /// Subscribes to `channel`.
    fn subscribe(&mut self, channel: &str) -> ClientResult<Subscription>;

    fn exists(&mut self, key: &str) -> ClientResult<bool> {
        let mut pipeline = self.pipeline();
        let reply = pipeline.exists(key);
        run(pipeline)?;
        Ok(reply.value())
    }

    /// Reads an integer; `None` when the key is absent.
    fn get_int(&mut self, key: &str) -> ClientResult<Option<i64>> {
        let mut pipeline = self.pipeline();
        let reply = pipeline.get_int(key);
        run(pipeline)?;
        Ok(reply.value().into_option())
    }

    /// Reads a string; `None` when the key is absent.
    fn get_string(&mut self, key: &str) -> ClientResult<Option<String>> {
        let mut pipeline = self.pipeline();
        let reply = pipeline.get_string(key);
        run(pipeline)?;
        Ok(reply.value().into_option())
    }

    fn set_int(&mut self, key: &str, value: i64, ttl: Ttl) -> ClientResult<()> {
        let mut pipeline = self.pipeline();
        pipeline.set_int(key, value, ttl);
        run(pipeline)
    }

    fn set_string(&mut self, key: &str, value: &str, ttl: Ttl) -> ClientResult<()> {
        let mut pipeline = self.pipeline();
        pipeline.set_string(key, value, ttl);
        run(pipeline)
    }

    /// Adds `delta` and returns the new value.
    fn incr_by(&mut self, key: &str, delta: i64) -> ClientResult<i64> {
        let mut pipeline = self.pipeline();
        let reply = pipeline.incr_by(key, delta);
        run(pipeline)?;
        Ok(reply.value())
    }

    /// Sets or, with `Ttl::NONE`, clears the expiry of an existing key.
    fn set_expire(&mut self, key: &str, ttl: Ttl) -> ClientResult<()> {
        let mut pipeline = self.pipeline();
        pipeline.set_expire(key, ttl);
        run(pipeline)
    }

    /// Remaining lifetime in seconds; 0 for no expiry or no key.
    fn get_expire(&mut self, key: &str) -> ClientResult<u64> {
        let mut pipeline = self.pipeline();
        let reply = pipeline.get_expire(key);
        run(pipeline)?;
        Ok(reply.value())
    }

    /// Removes `keys` and returns how many existed.
    fn delete(&mut self, keys: &[&str]) -> ClientResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut pipeline = self.pipeline();
        let reply = pipeline.delete_keys(keys);
        run(pipeline)?;
        Ok(reply.value())
    }

    /// Publishes `payload` on `channel` and returns the receiver count.
    fn publish(&mut self, channel: &str, payload: &[u8]) -> ClientResult<u64> {
        let mut pipeline = self.pipeline();
        let reply = pipeline.publish(channel, payload);
        run(pipeline)?;
        Ok(reply.value())
    }

    /// Releases the connection.
    fn close(self)
    where
        Self: Sized,
    {
        drop(self);
    }
}

fn run(pipeline: Pipeline<'_>) -> ClientResult<()> {
    pipeline.execute().map_err(ClientError::into_root)
}

/// Pooled TCP connection to a store.
///
/// Dropping or closing it hands the socket back to the pool, unless a failed
/// pipeline left it out of sync.
pub struct KvConnection {
    conn: PooledConnection,
}

impl KvConnection {
    pub(crate) fn new(conn: PooledConnection) -> Self {
        KvConnection { conn }
    }
}

impl Connection for KvConnection {
    fn pipeline(&mut self) -> Pipeline<'_> {
        Pipeline::new(&mut self.conn)
    }

    fn subscribe(&mut self, channel: &str) -> ClientResult<Subscription> {
        let conn = TcpConnection::connect(self.conn.config())?;
        Subscription::over_tcp(channel, conn)
    }
}

impl ConnectionFactory for KvClient {
    type Connection = KvConnection;

    fn connection(&self) -> ClientResult<KvConnection> {
        self.acquire()
    }
}
