//! # Transport Seam
//!
//! The pipeline talks to a store through `Transport`: requests are buffered by
//! `send`, written together by `flush`, and replies are read one at a time in
//! request order by `receive`. Pooled TCP connections and the in-memory test
//! double both implement it.

use skv_common::RespValue;

use crate::error::ClientResult;

/// Ordered request/reply channel to a store.
pub trait Transport {
    /// Buffers one request frame.
    fn send(&mut self, args: &[&[u8]]) -> ClientResult<()>;

    /// Delivers every buffered request.
    fn flush(&mut self) -> ClientResult<()>;

    /// Reads the next reply in request order.
    fn receive(&mut self) -> ClientResult<RespValue>;

    /// Marks unread replies as lost after a failed run.
    ///
    /// A transport that cannot resynchronize must not be reused afterwards.
    fn abandon(&mut self);
}
