//! Pending write-backs from command results into entity fields.

use crate::command::{Lookup, Reply};

pub(crate) enum Binding<T> {
    Int { set: fn(&mut T, i64), reply: Reply<Lookup<i64>> },
    Counter { set: fn(&mut T, i64), reply: Reply<i64> },
    Str { set: fn(&mut T, String), reply: Reply<Lookup<String>> },
}

impl<T> Binding<T> {
    /// Copies the decoded result into `entity`; a miss writes the zero value.
    pub(crate) fn apply(self, entity: &mut T) {
        match self {
            Binding::Int { set, reply } => set(entity, reply.value().value),
            Binding::Counter { set, reply } => set(entity, reply.value()),
            Binding::Str { set, reply } => set(entity, reply.value().value),
        }
    }
}

pub(crate) fn apply_all<T>(bindings: Vec<Binding<T>>, entity: &mut T) {
    for binding in bindings {
        binding.apply(entity);
    }
}
