//! Snapshot mode: synchronize one entity with the store according to the
//! role of each field.
//!
//! | Role | Non-zero field | Zero field |
//! |---|---|---|
//! | `Write` | `SET key value EX ttl` | per `WritePolicy` |
//! | `Read` | `GET key` | `GET key` |
//! | `Increment` | `INCRBY key value`, then expiry refresh | nothing |
//!
//! Read and increment results are copied back into their fields after the
//! pipeline completes. Written fields keep their value.

use tracing::debug;

use skv_common::{compose_key, Ttl};

use crate::connection::Connection;
use crate::error::ClientResult;
use crate::mapper::binding::{apply_all, Binding};
use crate::mapper::entity::{validate, Accessor, Entity, Role};

/// Handling of `Write` fields holding their zero value (0 or "").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WritePolicy {
    /// Load the stored value into the field instead of writing (v2).
    #[default]
    ReadIfUnset,
    /// Issue no command for the field (v1).
    SkipIfUnset,
}

/// Parameters of a snapshot run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotOptions {
    /// Expiry applied to written and incremented keys.
    pub ttl: Ttl,
    pub write_policy: WritePolicy,
}

impl SnapshotOptions {
    pub fn new(ttl: Ttl) -> Self {
        SnapshotOptions {
            ttl,
            write_policy: WritePolicy::default(),
        }
    }

    pub fn write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }
}

/// Snapshots `entity` under `id` with the default write policy.
pub fn snapshot<C, T>(conn: &mut C, id: &str, entity: &mut T, ttl: Ttl) -> ClientResult<()>
where
    C: Connection + ?Sized,
    T: Entity,
{
    snapshot_with(conn, id, entity, SnapshotOptions::new(ttl))
}

/// Snapshots `entity` under `id`.
pub fn snapshot_with<C, T>(conn: &mut C, id: &str, entity: &mut T, options: SnapshotOptions) -> ClientResult<()>
where
    C: Connection + ?Sized,
    T: Entity,
{
    validate::<T>()?;

    let SnapshotOptions { ttl, write_policy } = options;
    let mut pipeline = conn.pipeline();
    let mut bindings = Vec::new();

    for field in T::fields() {
        let Some(role) = field.role else {
            continue;
        };
        let key = compose_key(id, field.name);

        match (role, field.accessor) {
            (Role::Read, Accessor::Int { set, .. }) => bindings.push(Binding::Int {
                set,
                reply: pipeline.get_int(key),
            }),
            (Role::Read, Accessor::Str { set, .. }) => bindings.push(Binding::Str {
                set,
                reply: pipeline.get_string(key),
            }),
            (Role::Write, Accessor::Int { get, set }) => {
                let value = get(&*entity);
                if value != 0 {
                    pipeline.set_int(key, value, ttl);
                } else if write_policy == WritePolicy::ReadIfUnset {
                    bindings.push(Binding::Int {
                        set,
                        reply: pipeline.get_int(key),
                    });
                }
            }
            (Role::Write, Accessor::Str { get, set }) => {
                let value = get(&*entity);
                if !value.is_empty() {
                    pipeline.set_string(key, value, ttl);
                } else if write_policy == WritePolicy::ReadIfUnset {
                    bindings.push(Binding::Str {
                        set,
                        reply: pipeline.get_string(key),
                    });
                }
            }
            (Role::Increment, Accessor::Int { get, set }) => {
                let delta = get(&*entity);
                if delta != 0 {
                    let reply = pipeline.incr_by(key.clone(), delta);
                    pipeline.set_expire(key, ttl);
                    bindings.push(Binding::Counter { set, reply });
                }
            }
            // Rejected by validate().
            (Role::Increment, Accessor::Str { .. }) => {}
        }
    }

    debug!(entity = T::entity_name(), id, commands = pipeline.len(), "executing snapshot");
    pipeline.execute()?;
    apply_all(bindings, entity);
    Ok(())
}
