//! Command-line configuration for the server binary.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use skv_engine::{MemoryEngine, Store, SystemClock};

/// SnapKV loopback server
#[derive(Parser, Debug, Clone)]
#[command(name = "skv-server")]
#[command(about = "RESP2 key-value store with per-key TTL")]
#[command(version)]
pub struct ServerConfig {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:6379")]
    pub addr: String,

    /// Number of engine shards (defaults to 4 per CPU)
    #[arg(short, long)]
    pub shards: Option<usize>,

    /// Interval between expired-key sweeps, in milliseconds
    #[arg(long, default_value = "1000")]
    pub purge_interval_ms: u64,
}

impl ServerConfig {
    /// Builds the store described by this configuration.
    pub fn build_store(&self) -> Store {
        let engine = match self.shards {
            Some(shards) => MemoryEngine::with_shards_and_clock(shards, Arc::new(SystemClock)),
            None => MemoryEngine::new(),
        };
        Store::with_engine(engine)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_millis(self.purge_interval_ms.max(1))
    }
}
