//! Channel subscriptions.
//!
//! A subscription owns its source exclusively: a dedicated TCP connection
//! (never a pooled one, since a subscribed connection cannot run commands) or
//! an in-memory receiver for the test double.

use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError};
use skv_common::RespValue;
use tracing::trace;

use crate::error::{ClientError, ClientResult};
use crate::pool::TcpConnection;

enum Source {
    Stream(TcpConnection),
    Channel(Receiver<Vec<u8>>),
}

/// Stream of messages published to one channel.
pub struct Subscription {
    channel: String,
    source: Source,
}

impl Subscription {
    /// Subscribes `conn` to `channel` and waits for the confirmation.
    pub(crate) fn over_tcp(channel: &str, mut conn: TcpConnection) -> ClientResult<Self> {
        conn.send(&[b"SUBSCRIBE", channel.as_bytes()])?;
        conn.flush()?;
        match conn.receive()? {
            RespValue::Array(items) if is_kind(&items, b"subscribe") => {}
            RespValue::Error(message) => {
                return Err(ClientError::Server {
                    message: String::from_utf8_lossy(&message).into_owned(),
                })
            }
            other => {
                return Err(ClientError::decode(
                    "SUBSCRIBE",
                    format!("unexpected {} reply", other.kind()),
                ))
            }
        }

        trace!(channel, "subscribed");
        Ok(Subscription {
            channel: channel.to_string(),
            source: Source::Stream(conn),
        })
    }

    pub(crate) fn from_receiver(channel: &str, receiver: Receiver<Vec<u8>>) -> Self {
        Subscription {
            channel: channel.to_string(),
            source: Source::Channel(receiver),
        }
    }

    /// Channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Blocks until the next message payload arrives.
    pub fn recv(&mut self) -> ClientResult<Vec<u8>> {
        match &mut self.source {
            Source::Channel(receiver) => receiver.recv().map_err(|_| ClientError::Closed),
            Source::Stream(conn) => loop {
                match conn.receive()? {
                    RespValue::Array(items) => {
                        if let Some(payload) = message_payload(items) {
                            return Ok(payload);
                        }
                    }
                    other => {
                        return Err(ClientError::decode(
                            "SUBSCRIBE",
                            format!("unexpected {} push", other.kind()),
                        ))
                    }
                }
            },
        }
    }

    /// Waits at most `timeout` for the next message of an in-memory
    /// subscription. TCP subscriptions rely on the configured read timeout
    /// and block in `recv` instead.
    pub fn recv_timeout(&mut self, timeout: Duration) -> ClientResult<Option<Vec<u8>>> {
        if let Source::Channel(receiver) = &self.source {
            return match receiver.recv_timeout(timeout) {
                Ok(payload) => Ok(Some(payload)),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => Err(ClientError::Closed),
            };
        }
        self.recv().map(Some)
    }
}

fn is_kind(items: &[RespValue], kind: &[u8]) -> bool {
    matches!(items.first(), Some(RespValue::Bulk(Some(name))) if name.as_slice() == kind)
}

// Pushes look like ["message", channel, payload]; anything else is skipped.
fn message_payload(items: Vec<RespValue>) -> Option<Vec<u8>> {
    if items.len() != 3 || !is_kind(&items, b"message") {
        return None;
    }
    match items.into_iter().nth(2) {
        Some(RespValue::Bulk(Some(payload))) => Some(payload),
        _ => None,
    }
}
