//! # Field-to-Command Mapper
//!
//! Derives store commands from the fields of an `Entity`, runs them in one
//! pipeline, and writes the results back into the same fields.
//!
//! - `Batch` / `batch`: read every described field of many entities.
//! - `snapshot` / `snapshot_with`: per-field read, write or increment driven
//!   by `Role`.
//!
//! Keys are `<id>.<name>`. Descriptor tables are validated before any
//! command is queued.

mod batch;
mod binding;
mod entity;
mod snapshot;

pub use batch::{batch, Batch};
pub use entity::{Accessor, Entity, Field, Role};
pub use snapshot::{snapshot, snapshot_with, SnapshotOptions, WritePolicy};
