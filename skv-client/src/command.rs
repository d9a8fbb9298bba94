//! # Command Model
//!
//! Every store operation is one `Command` variant. Encoding and decoding are
//! exhaustive matches over the variants, so adding a kind forces both arms
//! to be written.
//!
//! Read-style commands own a `Reply` cell shared with the caller. The cell is
//! empty until the pipeline decodes the matching reply and is never written
//! twice.
//!
//! | Command | Request | Reply |
//! |---|---|---|
//! | `GetInt` / `GetString` | `GET key` | bulk or nil |
//! | `SetInt` / `SetString` | `SET key value [EX ttl]` | `+OK` |
//! | `IncrBy` | `INCRBY key delta` | integer |
//! | `SetExpire` | `EXPIRE key ttl` or `EXISTS key` + `PERSIST key` | integer (two for `PERSIST`) |
//! | `GetExpire` | `TTL key` | integer |
//! | `Delete` | `DEL key...` | integer |
//! | `Exists` | `EXISTS key` | integer |
//! | `Publish` | `PUBLISH channel payload` | integer |

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use skv_common::{encode_i64, encode_u64, parse_i64, RespValue, Ttl};

use crate::error::{ClientError, ClientResult};
use crate::transport::Transport;

/// Result of a lookup that may miss.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lookup<T> {
    /// Stored value, or the zero value when the key is absent.
    pub value: T,
    /// Whether the key existed.
    pub found: bool,
}

impl<T> Lookup<T> {
    /// A successful lookup.
    pub fn found(value: T) -> Self {
        Lookup { value, found: true }
    }

    /// Converts into an `Option`, dropping the zero value of a miss.
    pub fn into_option(self) -> Option<T> {
        if self.found {
            Some(self.value)
        } else {
            None
        }
    }
}

impl<T: Default> Lookup<T> {
    /// A lookup that found nothing.
    pub fn missing() -> Self {
        Lookup {
            value: T::default(),
            found: false,
        }
    }
}

/// Single-assignment handle to a command result.
///
/// Handles are cheap to clone and all clones observe the same cell.
pub struct Reply<T>(Rc<OnceCell<T>>);

impl<T> Reply<T> {
    pub(crate) fn new() -> Self {
        Reply(Rc::new(OnceCell::new()))
    }

    /// Stores the decoded result. A second assignment is ignored.
    pub(crate) fn fill(&self, value: T) {
        let _ = self.0.set(value);
    }

    /// Returns the result, or `None` while the command has not completed.
    pub fn get(&self) -> Option<&T> {
        self.0.get()
    }

    /// Returns true once the result has been decoded.
    pub fn is_ready(&self) -> bool {
        self.0.get().is_some()
    }
}

impl<T: Clone + Default> Reply<T> {
    /// Returns the result, or the zero value if the command never completed.
    pub fn value(&self) -> T {
        self.0.get().cloned().unwrap_or_default()
    }
}

impl<T> Clone for Reply<T> {
    fn clone(&self) -> Self {
        Reply(Rc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for Reply<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get() {
            Some(value) => f.debug_tuple("Reply").field(value).finish(),
            None => f.write_str("Reply(<pending>)"),
        }
    }
}

/// One queued store operation.
#[derive(Debug)]
pub enum Command {
    /// Integer read.
    GetInt { key: String, reply: Reply<Lookup<i64>> },
    /// Integer write with an optional ttl.
    SetInt { key: String, value: i64, ttl: Ttl },
    /// String read.
    GetString { key: String, reply: Reply<Lookup<String>> },
    /// String write with an optional ttl.
    SetString { key: String, value: String, ttl: Ttl },
    /// Atomic add; an absent key counts as zero.
    IncrBy { key: String, delta: i64, reply: Reply<i64> },
    /// Expiry update; `Ttl::NONE` removes the expiry.
    SetExpire { key: String, ttl: Ttl },
    /// Remaining lifetime in seconds, 0 when none.
    GetExpire { key: String, reply: Reply<u64> },
    /// Removal, counting the keys that existed.
    Delete { keys: Vec<String>, reply: Reply<u64> },
    /// Existence check.
    Exists { key: String, reply: Reply<bool> },
    /// Message to channel subscribers, counting receivers.
    Publish { channel: String, payload: Vec<u8>, reply: Reply<u64> },
}

impl Command {
    /// Store command name, used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Command::GetInt { .. } | Command::GetString { .. } => "GET",
            Command::SetInt { .. } | Command::SetString { .. } => "SET",
            Command::IncrBy { .. } => "INCRBY",
            Command::SetExpire { ttl, .. } if ttl.is_none() => "PERSIST",
            Command::SetExpire { .. } => "EXPIRE",
            Command::GetExpire { .. } => "TTL",
            Command::Delete { .. } => "DEL",
            Command::Exists { .. } => "EXISTS",
            Command::Publish { .. } => "PUBLISH",
        }
    }

    /// Writes the request frame for this command into `transport`.
    pub(crate) fn send<T: Transport + ?Sized>(&self, transport: &mut T) -> ClientResult<()> {
        match self {
            Command::GetInt { key, .. } | Command::GetString { key, .. } => {
                transport.send(&[b"GET", key.as_bytes()])
            }
            Command::SetInt { key, value, ttl } => {
                let (digits, len) = encode_i64(*value);
                send_set(transport, key, &digits[..len], *ttl)
            }
            Command::SetString { key, value, ttl } => send_set(transport, key, value.as_bytes(), *ttl),
            Command::IncrBy { key, delta, .. } => {
                let (digits, len) = encode_i64(*delta);
                transport.send(&[b"INCRBY", key.as_bytes(), &digits[..len]])
            }
            Command::SetExpire { key, ttl } if ttl.is_none() => {
                transport.send(&[b"EXISTS", key.as_bytes()])?;
                transport.send(&[b"PERSIST", key.as_bytes()])
            }
            Command::SetExpire { key, ttl } => {
                let (digits, len) = encode_u64(ttl.as_secs());
                transport.send(&[b"EXPIRE", key.as_bytes(), &digits[..len]])
            }
            Command::GetExpire { key, .. } => transport.send(&[b"TTL", key.as_bytes()]),
            Command::Delete { keys, .. } => {
                let mut args: Vec<&[u8]> = Vec::with_capacity(keys.len() + 1);
                args.push(b"DEL");
                args.extend(keys.iter().map(|key| key.as_bytes()));
                transport.send(&args)
            }
            Command::Exists { key, .. } => transport.send(&[b"EXISTS", key.as_bytes()]),
            Command::Publish { channel, payload, .. } => {
                transport.send(&[b"PUBLISH", channel.as_bytes(), payload.as_slice()])
            }
        }
    }

    /// Reads every reply this command produced and decodes it.
    ///
    /// Clearing an expiry sends `EXISTS` ahead of `PERSIST`, because a `0`
    /// from `PERSIST` does not tell a missing key from one without expiry.
    /// Both replies are consumed before a miss is reported.
    pub(crate) fn receive<T: Transport + ?Sized>(&self, transport: &mut T) -> ClientResult<()> {
        match self {
            Command::SetExpire { key, ttl } if ttl.is_none() => {
                let exists = transport.receive()?;
                let persist = transport.receive()?;
                if self.integer(server_reply(exists)?)? == 0 {
                    return Err(ClientError::MissingKey { key: key.clone() });
                }
                self.decode(persist)
            }
            _ => {
                let reply = transport.receive()?;
                self.decode(reply)
            }
        }
    }

    /// Interprets the reply to this command and fills its result cell.
    ///
    /// For a cleared expiry this is the `PERSIST` reply only.
    pub(crate) fn decode(&self, reply: RespValue) -> ClientResult<()> {
        let reply = server_reply(reply)?;

        match self {
            Command::GetInt { reply: out, .. } => match reply {
                RespValue::Bulk(None) => out.fill(Lookup::missing()),
                RespValue::Bulk(Some(data)) => {
                    let value = parse_i64(&data).map_err(|_| ClientError::decode(self.name(), "value is not an integer"))?;
                    out.fill(Lookup::found(value));
                }
                other => return Err(self.unexpected(&other)),
            },
            Command::GetString { reply: out, .. } => match reply {
                RespValue::Bulk(None) => out.fill(Lookup::missing()),
                RespValue::Bulk(Some(data)) => {
                    let value = String::from_utf8(data).map_err(|_| ClientError::decode(self.name(), "value is not valid UTF-8"))?;
                    out.fill(Lookup::found(value));
                }
                other => return Err(self.unexpected(&other)),
            },
            Command::SetInt { .. } | Command::SetString { .. } => match reply {
                RespValue::Simple(_) => {}
                other => return Err(self.unexpected(&other)),
            },
            Command::IncrBy { reply: out, .. } => out.fill(self.integer(reply)?),
            Command::SetExpire { key, ttl } => {
                // PERSIST answers 0 for keys without expiry too; `receive` checks existence for it.
                if self.integer(reply)? == 0 && !ttl.is_none() {
                    return Err(ClientError::MissingKey { key: key.clone() });
                }
            }
            Command::GetExpire { reply: out, .. } => out.fill(non_negative(self.integer(reply)?)),
            Command::Delete { reply: out, .. } => out.fill(non_negative(self.integer(reply)?)),
            Command::Exists { reply: out, .. } => out.fill(self.integer(reply)? > 0),
            Command::Publish { reply: out, .. } => out.fill(non_negative(self.integer(reply)?)),
        }
        Ok(())
    }

    fn integer(&self, reply: RespValue) -> ClientResult<i64> {
        match reply {
            RespValue::Integer(value) => Ok(value),
            other => Err(self.unexpected(&other)),
        }
    }

    fn unexpected(&self, reply: &RespValue) -> ClientError {
        ClientError::decode(self.name(), format!("unexpected {} reply", reply.kind()))
    }
}

fn server_reply(reply: RespValue) -> ClientResult<RespValue> {
    match reply {
        RespValue::Error(message) => Err(ClientError::Server {
            message: String::from_utf8_lossy(&message).into_owned(),
        }),
        other => Ok(other),
    }
}

fn send_set<T: Transport + ?Sized>(transport: &mut T, key: &str, value: &[u8], ttl: Ttl) -> ClientResult<()> {
    if ttl.is_none() {
        return transport.send(&[b"SET", key.as_bytes(), value]);
    }
    let (digits, len) = encode_u64(ttl.as_secs());
    transport.send(&[b"SET", key.as_bytes(), value, b"EX", &digits[..len]])
}

// TTL answers -1/-2 for "no expiry"/"missing"; both read as zero.
fn non_negative(value: i64) -> u64 {
    value.max(0) as u64
}
