//! # Command Dispatch
//!
//! `Store` pairs an engine with a pub/sub broker and evaluates decoded request
//! frames into reply values. The loopback server encodes those replies onto
//! the socket; the client's test double hands them straight to the pipeline.

use std::sync::Arc;

use skv_common::{parse_i64, RespValue, SkvError, Ttl};

use crate::broker::Broker;
use crate::clock::Clock;
use crate::engine::{KVEngine, TtlStatus};
use crate::memory::MemoryEngine;

/// Command evaluator over an in-memory keyspace.
#[derive(Debug, Default)]
pub struct Store {
    engine: MemoryEngine,
    broker: Broker,
}

impl Store {
    /// Creates a store on the wall clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store around an existing engine.
    pub fn with_engine(engine: MemoryEngine) -> Self {
        Store {
            engine,
            broker: Broker::new(),
        }
    }

    /// Creates a store whose expiry is driven by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_engine(MemoryEngine::with_clock(clock))
    }

    /// Returns the underlying engine.
    pub fn engine(&self) -> &MemoryEngine {
        &self.engine
    }

    /// Returns the pub/sub broker.
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Evaluates one request frame and returns its reply.
    pub fn execute(&self, args: &[Vec<u8>]) -> RespValue {
        if args.is_empty() {
            return RespValue::error("empty command");
        }

        let cmd = &args[0];
        if cmd.eq_ignore_ascii_case(b"PING") {
            return self.handle_ping(args);
        }
        if cmd.eq_ignore_ascii_case(b"GET") {
            return self.handle_get(args);
        }
        if cmd.eq_ignore_ascii_case(b"SET") {
            return self.handle_set(args);
        }
        if cmd.eq_ignore_ascii_case(b"DEL") {
            return self.handle_del(args);
        }
        if cmd.eq_ignore_ascii_case(b"EXISTS") {
            return self.handle_exists(args);
        }
        if cmd.eq_ignore_ascii_case(b"EXPIRE") {
            return self.handle_expire(args);
        }
        if cmd.eq_ignore_ascii_case(b"PERSIST") {
            return self.handle_persist(args);
        }
        if cmd.eq_ignore_ascii_case(b"TTL") {
            return self.handle_ttl(args);
        }
        if cmd.eq_ignore_ascii_case(b"INCRBY") {
            return self.handle_incr_by(args);
        }
        if cmd.eq_ignore_ascii_case(b"PUBLISH") {
            return self.handle_publish(args);
        }

        RespValue::error("unknown command")
    }

    fn handle_ping(&self, args: &[Vec<u8>]) -> RespValue {
        match args.len() {
            1 => RespValue::simple("PONG"),
            2 => RespValue::bulk(&args[1]),
            _ => RespValue::error("wrong number of arguments for PING"),
        }
    }

    fn handle_get(&self, args: &[Vec<u8>]) -> RespValue {
        if args.len() != 2 {
            return RespValue::error("wrong number of arguments for GET");
        }
        match self.engine.get(&args[1]) {
            Ok(Some(value)) => RespValue::bulk(&value),
            Ok(None) => RespValue::null(),
            Err(err) => engine_error(err),
        }
    }

    fn handle_set(&self, args: &[Vec<u8>]) -> RespValue {
        let ttl = match args.len() {
            3 => Ttl::NONE,
            5 if args[3].eq_ignore_ascii_case(b"EX") => match parse_seconds(&args[4]) {
                Ok(seconds) => Ttl::from_secs(seconds),
                Err(reply) => return reply,
            },
            n if n < 3 => return RespValue::error("wrong number of arguments for SET"),
            _ => return RespValue::error("unsupported SET options"),
        };

        match self.engine.set(args[1].clone(), args[2].clone(), ttl) {
            Ok(()) => RespValue::simple("OK"),
            Err(err) => engine_error(err),
        }
    }

    fn handle_del(&self, args: &[Vec<u8>]) -> RespValue {
        if args.len() < 2 {
            return RespValue::error("wrong number of arguments for DEL");
        }

        let mut removed = 0i64;
        for key in &args[1..] {
            match self.engine.delete(key) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => return engine_error(err),
            }
        }

        RespValue::Integer(removed)
    }

    fn handle_exists(&self, args: &[Vec<u8>]) -> RespValue {
        if args.len() < 2 {
            return RespValue::error("wrong number of arguments for EXISTS");
        }

        let mut found = 0i64;
        for key in &args[1..] {
            match self.engine.exists(key) {
                Ok(true) => found += 1,
                Ok(false) => {}
                Err(err) => return engine_error(err),
            }
        }

        RespValue::Integer(found)
    }

    fn handle_expire(&self, args: &[Vec<u8>]) -> RespValue {
        if args.len() != 3 {
            return RespValue::error("wrong number of arguments for EXPIRE");
        }

        let seconds = match parse_seconds(&args[2]) {
            Ok(value) => value,
            Err(reply) => return reply,
        };

        // A zero timeout expires the key immediately.
        if seconds == 0 {
            return match self.engine.delete(&args[1]) {
                Ok(removed) => RespValue::Integer(removed as i64),
                Err(err) => engine_error(err),
            };
        }

        match self.engine.expire(&args[1], Ttl::from_secs(seconds)) {
            Ok(()) => RespValue::Integer(1),
            Err(SkvError::NotFound) => RespValue::Integer(0),
            Err(err) => engine_error(err),
        }
    }

    fn handle_persist(&self, args: &[Vec<u8>]) -> RespValue {
        if args.len() != 2 {
            return RespValue::error("wrong number of arguments for PERSIST");
        }

        match self.engine.persist(&args[1]) {
            Ok(true) => RespValue::Integer(1),
            Ok(false) | Err(SkvError::NotFound) => RespValue::Integer(0),
            Err(err) => engine_error(err),
        }
    }

    fn handle_ttl(&self, args: &[Vec<u8>]) -> RespValue {
        if args.len() != 2 {
            return RespValue::error("wrong number of arguments for TTL");
        }

        match self.engine.ttl(&args[1]) {
            Ok(TtlStatus::Missing) => RespValue::Integer(-2),
            Ok(TtlStatus::NoExpiry) => RespValue::Integer(-1),
            Ok(TtlStatus::ExpiresIn(remaining)) => RespValue::Integer(remaining as i64),
            Err(err) => engine_error(err),
        }
    }

    fn handle_incr_by(&self, args: &[Vec<u8>]) -> RespValue {
        if args.len() != 3 {
            return RespValue::error("wrong number of arguments for INCRBY");
        }

        let delta = match parse_i64(&args[2]) {
            Ok(value) => value,
            Err(_) => return RespValue::error("value is not an integer or out of range"),
        };

        match self.engine.incr_by(&args[1], delta) {
            Ok(value) => RespValue::Integer(value),
            Err(err) => engine_error(err),
        }
    }

    fn handle_publish(&self, args: &[Vec<u8>]) -> RespValue {
        if args.len() != 3 {
            return RespValue::error("wrong number of arguments for PUBLISH");
        }

        let delivered = self.broker.publish(&args[1], &args[2]);
        tracing::trace!(delivered, "published message");
        RespValue::Integer(delivered as i64)
    }
}

fn engine_error(err: SkvError) -> RespValue {
    RespValue::error(&err.to_string())
}

fn parse_seconds(arg: &[u8]) -> Result<u64, RespValue> {
    match parse_i64(arg) {
        Ok(value) if value >= 0 => Ok(value as u64),
        _ => Err(RespValue::error("invalid expire time")),
    }
}
