//! Field descriptors.
//!
//! A type takes part in mapping by implementing `Entity` and returning a
//! static table with one `Field` per mapped member. Members missing from the
//! table are invisible to the mapper.
//!
//! ```
//! use skv_client::{Entity, Field, Role};
//!
//! #[derive(Default)]
//! struct Visit {
//!     page: String,
//!     hits: i64,
//! }
//!
//! impl Entity for Visit {
//!     fn fields() -> &'static [Field<Self>] {
//!         static FIELDS: [Field<Visit>; 2] = [
//!             Field::string("page", |v: &Visit| v.page.clone(), |v: &mut Visit, x: String| v.page = x)
//!                 .with_role(Role::Write),
//!             Field::int("hits", |v: &Visit| v.hits, |v: &mut Visit, x: i64| v.hits = x)
//!                 .with_role(Role::Increment),
//!         ];
//!         &FIELDS
//!     }
//! }
//! ```

use hashbrown::HashSet;

use crate::error::{ClientError, ClientResult};

/// What a snapshot does with a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Always load the stored value.
    Read,
    /// Store the field's value; see `WritePolicy` for zero values.
    Write,
    /// Add the field's value to the stored counter and load the result.
    Increment,
}

/// Typed access to one field.
pub enum Accessor<T> {
    Int {
        get: fn(&T) -> i64,
        set: fn(&mut T, i64),
    },
    Str {
        get: fn(&T) -> String,
        set: fn(&mut T, String),
    },
}

impl<T> Clone for Accessor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Accessor<T> {}

/// Descriptor of one mapped field.
pub struct Field<T> {
    /// Serialization name, the key suffix after `<id>.`.
    pub name: &'static str,
    pub accessor: Accessor<T>,
    /// Snapshot role; fields without one are skipped by snapshots.
    pub role: Option<Role>,
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Field<T> {}

impl<T> Field<T> {
    /// Describes an integer field.
    pub const fn int(name: &'static str, get: fn(&T) -> i64, set: fn(&mut T, i64)) -> Self {
        Field {
            name,
            accessor: Accessor::Int { get, set },
            role: None,
        }
    }

    /// Describes a string field.
    pub const fn string(name: &'static str, get: fn(&T) -> String, set: fn(&mut T, String)) -> Self {
        Field {
            name,
            accessor: Accessor::Str { get, set },
            role: None,
        }
    }

    /// Attaches a snapshot role.
    pub const fn with_role(self, role: Role) -> Self {
        Field {
            name: self.name,
            accessor: self.accessor,
            role: Some(role),
        }
    }
}

/// A type whose fields map onto store keys.
pub trait Entity: Sized + 'static {
    /// Descriptor table, in declaration order.
    fn fields() -> &'static [Field<Self>];

    /// Name used in errors and logs.
    fn entity_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Checks a descriptor table before it is used to build commands.
pub(crate) fn validate<T: Entity>() -> ClientResult<()> {
    let mut seen = HashSet::new();
    for field in T::fields() {
        if field.name.is_empty() {
            return Err(invalid::<T>("field name is empty".to_string()));
        }
        if !seen.insert(field.name) {
            return Err(invalid::<T>(format!("field name {:?} is used twice", field.name)));
        }
        if let (Some(Role::Increment), Accessor::Str { .. }) = (field.role, field.accessor) {
            return Err(invalid::<T>(format!("string field {:?} cannot be incremented", field.name)));
        }
    }
    Ok(())
}

fn invalid<T: Entity>(reason: String) -> ClientError {
    ClientError::InvalidEntity {
        entity: T::entity_name(),
        reason,
    }
}
