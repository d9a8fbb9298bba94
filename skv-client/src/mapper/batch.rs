//! Batch mode: load every described field of many entities in one round trip.

use tracing::debug;

use skv_common::compose_key;

use crate::connection::Connection;
use crate::error::ClientResult;
use crate::mapper::binding::{apply_all, Binding};
use crate::mapper::entity::{validate, Accessor, Entity};
use crate::pipeline::Pipeline;

/// Reads fields of any number of entities through a single pipeline.
///
/// Entities may be of different types. Nothing is written back unless the
/// whole pipeline succeeds.
pub struct Batch<'c, 'a> {
    pipeline: Pipeline<'c>,
    appliers: Vec<Box<dyn FnOnce() + 'a>>,
}

impl<'c, 'a> Batch<'c, 'a> {
    /// Starts a batch on `conn`.
    pub fn new<C: Connection + ?Sized>(conn: &'c mut C) -> Self {
        Batch {
            pipeline: conn.pipeline(),
            appliers: Vec::new(),
        }
    }

    /// Queues a read of every described field of `entity` under `id`.
    pub fn add<T: Entity + 'a>(&mut self, id: &str, entity: &'a mut T) -> ClientResult<&mut Self> {
        validate::<T>()?;

        let mut bindings = Vec::with_capacity(T::fields().len());
        for field in T::fields() {
            let key = compose_key(id, field.name);
            let binding = match field.accessor {
                Accessor::Int { set, .. } => Binding::Int {
                    set,
                    reply: self.pipeline.get_int(key),
                },
                Accessor::Str { set, .. } => Binding::Str {
                    set,
                    reply: self.pipeline.get_string(key),
                },
            };
            bindings.push(binding);
        }

        self.appliers.push(Box::new(move || apply_all(bindings, entity)));
        Ok(self)
    }

    /// Number of queued reads.
    pub fn len(&self) -> usize {
        self.pipeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipeline.is_empty()
    }

    /// Executes the pipeline and copies results into every added entity.
    pub fn execute(self) -> ClientResult<()> {
        debug!(entities = self.appliers.len(), commands = self.pipeline.len(), "executing batch");
        self.pipeline.execute()?;
        for apply in self.appliers {
            apply();
        }
        Ok(())
    }
}

/// Loads every `(id, entity)` pair of one entity type in a single round trip.
pub fn batch<'a, C, T, I, S>(conn: &mut C, entities: I) -> ClientResult<()>
where
    C: Connection + ?Sized,
    T: Entity + 'a,
    I: IntoIterator<Item = (S, &'a mut T)>,
    S: AsRef<str>,
{
    let mut batch = Batch::new(conn);
    for (id, entity) in entities {
        batch.add(id.as_ref(), entity)?;
    }
    batch.execute()
}
