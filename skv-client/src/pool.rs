//! # Connection Pool
//!
//! Purpose: Reuse TCP connections to the store to avoid a handshake per
//! pipeline.
//!
//! ## Design Principles
//! 1. **Bounded**: At most `max_total` sockets exist; at most `max_idle` are
//!    parked between pipelines.
//! 2. **Short Critical Sections**: The mutex guards counters and the idle
//!    queue, never socket IO.
//! 3. **No Waiting**: Acquiring past the limit is `PoolExhausted`, not a block.
//! 4. **Never Reuse Out Of Sync**: A connection that failed or abandoned
//!    unread replies is closed instead of returned.

use std::collections::VecDeque;
use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};

use skv_common::{encode_command, read_response, RespValue};
use tracing::{debug, trace};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::transport::Transport;

struct PoolState {
    idle: VecDeque<TcpConnection>,
    total: usize,
}

struct PoolInner {
    config: ClientConfig,
    state: Mutex<PoolState>,
}

/// Shared handle to the bounded socket set.
#[derive(Clone)]
pub(crate) struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Builds an empty pool; sockets are opened lazily by `acquire`.
    pub(crate) fn new(config: ClientConfig) -> ClientResult<Self> {
        // Reject bad addresses up front rather than on first use.
        parse_addr(&config.addr)?;
        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_idle),
            total: 0,
        };
        Ok(ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(state),
            }),
        })
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Hands out an idle socket, or opens one while under `max_total`.
    pub(crate) fn acquire(&self) -> ClientResult<PooledConnection> {
        if let Some(conn) = self.pop_idle() {
            trace!("reusing idle connection");
            return Ok(PooledConnection::new(self.inner.clone(), conn));
        }

        if !self.try_reserve() {
            return Err(ClientError::PoolExhausted);
        }

        match TcpConnection::connect(&self.inner.config) {
            Ok(conn) => {
                debug!(addr = %self.inner.config.addr, "opened connection");
                Ok(PooledConnection::new(self.inner.clone(), conn))
            }
            Err(err) => {
                self.release_slot();
                Err(err)
            }
        }
    }

    /// Returns (idle, total) connection counts.
    pub(crate) fn stats(&self) -> (usize, usize) {
        let state = self.inner.state.lock().expect("pool mutex poisoned");
        (state.idle.len(), state.total)
    }

    fn pop_idle(&self) -> Option<TcpConnection> {
        let mut state = self.inner.state.lock().expect("pool mutex poisoned");
        state.idle.pop_front()
    }

    fn try_reserve(&self) -> bool {
        let mut state = self.inner.state.lock().expect("pool mutex poisoned");
        if state.total >= self.inner.config.max_total {
            return false;
        }
        state.total += 1;
        true
    }

    fn release_slot(&self) {
        let mut state = self.inner.state.lock().expect("pool mutex poisoned");
        state.total = state.total.saturating_sub(1);
    }

    fn return_connection(&self, conn: TcpConnection) {
        let mut state = self.inner.state.lock().expect("pool mutex poisoned");
        if state.idle.len() < self.inner.config.max_idle {
            state.idle.push_back(conn);
        } else {
            state.total = state.total.saturating_sub(1);
        }
    }
}

/// Socket on loan from the pool. Dropping it parks the socket again unless
/// it was invalidated.
pub(crate) struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<TcpConnection>,
    valid: bool,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: TcpConnection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.pool.config
    }

    fn conn_mut(&mut self) -> ClientResult<&mut TcpConnection> {
        self.conn.as_mut().ok_or(ClientError::Closed)
    }

    fn track<T>(&mut self, result: ClientResult<T>) -> ClientResult<T> {
        if result.is_err() {
            // Unknown stream position; never park it.
            self.valid = false;
        }
        result
    }
}

impl Transport for PooledConnection {
    fn send(&mut self, args: &[&[u8]]) -> ClientResult<()> {
        let result = self.conn_mut().and_then(|conn| conn.send(args));
        self.track(result)
    }

    fn flush(&mut self) -> ClientResult<()> {
        let result = self.conn_mut().and_then(|conn| conn.flush());
        self.track(result)
    }

    fn receive(&mut self) -> ClientResult<RespValue> {
        let result = self.conn_mut().and_then(|conn| conn.receive());
        self.track(result)
    }

    fn abandon(&mut self) {
        self.valid = false;
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        let pool = ConnectionPool {
            inner: self.pool.clone(),
        };

        if self.valid {
            pool.return_connection(conn);
        } else {
            debug!("discarding connection");
            pool.release_slot();
        }
    }
}

/// One RESP socket.
///
/// Requests accumulate in `write_buf` until `flush`, so a whole pipeline goes
/// out in one write.
pub(crate) struct TcpConnection {
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl TcpConnection {
    pub(crate) fn connect(config: &ClientConfig) -> ClientResult<Self> {
        let stream = connect_stream(config)?;
        if let Some(timeout) = config.read_timeout {
            stream.set_read_timeout(Some(timeout))?;
        }
        if let Some(timeout) = config.write_timeout {
            stream.set_write_timeout(Some(timeout))?;
        }
        stream.set_nodelay(true)?;

        Ok(TcpConnection {
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
        })
    }

    pub(crate) fn send(&mut self, args: &[&[u8]]) -> ClientResult<()> {
        encode_command(args, &mut self.write_buf);
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> ClientResult<()> {
        let stream = self.reader.get_mut();
        let written = stream.write_all(&self.write_buf).and_then(|()| stream.flush());
        self.write_buf.clear();
        Ok(written?)
    }

    pub(crate) fn receive(&mut self) -> ClientResult<RespValue> {
        Ok(read_response(&mut self.reader, &mut self.line_buf)?)
    }
}

fn parse_addr(addr: &str) -> ClientResult<SocketAddr> {
    addr.parse().map_err(|_| ClientError::InvalidAddress)
}

fn connect_stream(config: &ClientConfig) -> ClientResult<TcpStream> {
    let addr = parse_addr(&config.addr)?;
    let stream = match config.connect_timeout {
        Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
        None => TcpStream::connect(addr)?,
    };
    Ok(stream)
}
