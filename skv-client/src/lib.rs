//! # SnapKV Client
//!
//! Purpose: Typed, pipelined access to a Redis-compatible TTL store, plus a
//! mapper that turns entity fields into store commands.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse TCP connections to avoid repeated connects.
//! 2. **One Round Trip**: Pipelines send everything before reading anything.
//! 3. **Descriptors Over Reflection**: Entities publish static field tables.
//! 4. **Swappable Store**: Code written against `Connection` runs unchanged
//!    on the in-memory `MockStore`.

mod client;
mod command;
mod config;
mod connection;
mod error;
pub mod mapper;
mod mock;
mod pipeline;
mod pool;
mod pubsub;
mod transport;

pub use client::KvClient;
pub use command::{Command, Lookup, Reply};
pub use config::ClientConfig;
pub use connection::{Connection, ConnectionFactory, KvConnection};
pub use error::{ClientError, ClientResult, Stage};
pub use mapper::{batch, snapshot, snapshot_with, Accessor, Batch, Entity, Field, Role, SnapshotOptions, WritePolicy};
pub use mock::{MockConnection, MockStore};
pub use pipeline::Pipeline;
pub use pubsub::Subscription;
pub use skv_common::Ttl;
pub use transport::Transport;
