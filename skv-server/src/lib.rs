//! # SnapKV Server
//!
//! Purpose: Serve an in-memory `Store` over RESP2 so the pooled client can be
//! exercised end-to-end.
//!
//! ## Design Principles
//! 1. **Task Per Connection**: Each client is served by its own tokio task.
//! 2. **Shared Dispatcher**: Commands go through `Store::execute`, the same
//!    evaluator the client's test double uses.
//! 3. **Lazy Plus Periodic Expiry**: Reads hide expired keys; a background
//!    sweep reclaims them.

pub mod config;
mod server;

pub use config::ServerConfig;
pub use server::{handle_connection, serve, spawn_purger};
