//! # SnapKV Store Engine
//!
//! In-memory, TTL-aware key-value storage that speaks the same command set as
//! the remote store the client targets. It backs both the loopback server and
//! the client's in-memory test double.

mod broker;
mod clock;
mod engine;
mod memory;
mod store;

pub use broker::Broker;
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{KVEngine, TtlStatus};
pub use memory::MemoryEngine;
pub use store::Store;
