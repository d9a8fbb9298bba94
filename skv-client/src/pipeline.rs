//! # Pipeline
//!
//! Purpose: Batch any number of commands into one round trip.
//!
//! ## Design Principles
//! 1. **Two Phases**: Every request is sent and flushed before the first reply
//!    is read; replies are decoded strictly in enqueue order.
//! 2. **Run Once**: `execute` consumes the pipeline, so a pipeline can neither
//!    be re-run nor extended after its requests went out.
//! 3. **Fail Fast**: The first failing step stops the run; earlier results
//!    stay readable and the transport is abandoned.
//!
//! ```text
//! enqueue: c0 c1 c2 ──send──▶ buffer ──flush──▶ store
//! decode:  r0 r1 r2 ◀──receive──────────────── store
//! ```

use skv_common::Ttl;
use tracing::{debug, warn};

use crate::command::{Command, Lookup, Reply};
use crate::error::{ClientError, ClientResult, Stage};
use crate::transport::Transport;

/// Initial command capacity; pipelines grow past it as needed.
const DEFAULT_CAPACITY: usize = 32;

/// Ordered batch of commands bound to one transport.
pub struct Pipeline<'c> {
    transport: &'c mut dyn Transport,
    commands: Vec<Command>,
}

impl<'c> Pipeline<'c> {
    /// Creates an empty pipeline over `transport`.
    pub fn new(transport: &'c mut dyn Transport) -> Self {
        Self::with_capacity(transport, DEFAULT_CAPACITY)
    }

    /// Creates an empty pipeline with room for `capacity` commands.
    pub fn with_capacity(transport: &'c mut dyn Transport, capacity: usize) -> Self {
        Pipeline {
            transport,
            commands: Vec::with_capacity(capacity),
        }
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Queued commands in send order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn get_int(&mut self, key: impl Into<String>) -> Reply<Lookup<i64>> {
        let reply = Reply::new();
        self.commands.push(Command::GetInt {
            key: key.into(),
            reply: reply.clone(),
        });
        reply
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i64, ttl: Ttl) {
        self.commands.push(Command::SetInt {
            key: key.into(),
            value,
            ttl,
        });
    }

    pub fn get_string(&mut self, key: impl Into<String>) -> Reply<Lookup<String>> {
        let reply = Reply::new();
        self.commands.push(Command::GetString {
            key: key.into(),
            reply: reply.clone(),
        });
        reply
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>, ttl: Ttl) {
        self.commands.push(Command::SetString {
            key: key.into(),
            value: value.into(),
            ttl,
        });
    }

    /// Queues an atomic add; the reply carries the new value.
    pub fn incr_by(&mut self, key: impl Into<String>, delta: i64) -> Reply<i64> {
        let reply = Reply::new();
        self.commands.push(Command::IncrBy {
            key: key.into(),
            delta,
            reply: reply.clone(),
        });
        reply
    }

    /// Queues an expiry update. `Ttl::NONE` clears the expiry instead.
    pub fn set_expire(&mut self, key: impl Into<String>, ttl: Ttl) {
        self.commands.push(Command::SetExpire { key: key.into(), ttl });
    }

    /// Queues a remaining-lifetime query (0 for no expiry or no key).
    pub fn get_expire(&mut self, key: impl Into<String>) -> Reply<u64> {
        let reply = Reply::new();
        self.commands.push(Command::GetExpire {
            key: key.into(),
            reply: reply.clone(),
        });
        reply
    }

    /// Queues the removal of one key; the reply counts removed keys.
    pub fn delete(&mut self, key: impl Into<String>) -> Reply<u64> {
        self.delete_owned(vec![key.into()])
    }

    /// Queues one `DEL` for all `keys`. With no keys nothing is queued and
    /// the reply is already 0.
    pub fn delete_keys(&mut self, keys: &[&str]) -> Reply<u64> {
        self.delete_owned(keys.iter().map(|key| key.to_string()).collect())
    }

    fn delete_owned(&mut self, keys: Vec<String>) -> Reply<u64> {
        let reply = Reply::new();
        if keys.is_empty() {
            reply.fill(0);
            return reply;
        }
        self.commands.push(Command::Delete {
            keys,
            reply: reply.clone(),
        });
        reply
    }

    pub fn exists(&mut self, key: impl Into<String>) -> Reply<bool> {
        let reply = Reply::new();
        self.commands.push(Command::Exists {
            key: key.into(),
            reply: reply.clone(),
        });
        reply
    }

    /// Queues a channel message; the reply counts receivers.
    pub fn publish(&mut self, channel: impl Into<String>, payload: impl Into<Vec<u8>>) -> Reply<u64> {
        let reply = Reply::new();
        self.commands.push(Command::Publish {
            channel: channel.into(),
            payload: payload.into(),
            reply: reply.clone(),
        });
        reply
    }

    /// Sends every queued command, flushes once, then decodes the replies of
    /// each command in enqueue order.
    ///
    /// An empty pipeline returns immediately without touching the transport.
    pub fn execute(self) -> ClientResult<()> {
        let Pipeline { transport, commands } = self;
        if commands.is_empty() {
            return Ok(());
        }

        debug!(commands = commands.len(), "executing pipeline");

        for (step, command) in commands.iter().enumerate() {
            if let Err(err) = command.send(&mut *transport) {
                return Err(abort(transport, Stage::Send, step, command, err));
            }
        }

        if let Err(err) = transport.flush() {
            // Nothing was answered, so the run breaks at its first command.
            return Err(abort(transport, Stage::Flush, 0, &commands[0], err));
        }

        for (step, command) in commands.iter().enumerate() {
            let outcome = command.receive(&mut *transport);
            if let Err(err) = outcome {
                return Err(abort(transport, Stage::Receive, step, command, err));
            }
        }

        Ok(())
    }
}

fn abort(transport: &mut dyn Transport, stage: Stage, step: usize, command: &Command, err: ClientError) -> ClientError {
    transport.abandon();
    warn!(%stage, step, command = command.name(), error = %err, "pipeline aborted");
    ClientError::Pipeline {
        stage,
        step,
        command: command.name(),
        source: Box::new(err),
    }
}
