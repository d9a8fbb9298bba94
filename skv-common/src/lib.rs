// skv-common - Shared types and wire codec for SnapKV
//
// This crate defines the TTL type, the RESP2 value model and the error types
// shared by the engine, the client driver and the loopback server.

pub mod error;
pub mod resp;
pub mod types;

// Re-export for convenience
pub use error::*;
pub use resp::*;
pub use types::*;
