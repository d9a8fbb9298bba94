//! # Pub/Sub Broker
//!
//! Fan-out of published payloads to every live subscriber of a channel.
//! Subscribers hold the receiving end of an unbounded channel; a dropped
//! receiver is pruned on the next publish to its channel.

use crossbeam::channel::{self, Receiver, Sender};
use hashbrown::HashMap;
use parking_lot::Mutex;

/// Channel registry shared by all connections of a store.
#[derive(Debug, Default)]
pub struct Broker {
    channels: Mutex<HashMap<Vec<u8>, Vec<Sender<Vec<u8>>>>>,
}

impl Broker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber and returns its receiving end.
    pub fn subscribe(&self, channel: &[u8]) -> Receiver<Vec<u8>> {
        let (tx, rx) = channel::unbounded();
        self.channels
            .lock()
            .entry(channel.to_vec())
            .or_default()
            .push(tx);
        rx
    }

    /// Delivers `payload` to every live subscriber of `channel`.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, channel: &[u8], payload: &[u8]) -> usize {
        let mut channels = self.channels.lock();
        let Some(subscribers) = channels.get_mut(channel) else {
            return 0;
        };

        subscribers.retain(|tx| tx.send(payload.to_vec()).is_ok());
        let delivered = subscribers.len();
        if delivered == 0 {
            channels.remove(channel);
        }
        delivered
    }

    /// Returns the number of live subscribers of `channel` as of the last publish.
    pub fn subscribers(&self, channel: &[u8]) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}
