//! Entity capability traits
//!
//! A record type opts into repository support by implementing [`Entity`].
//! Eager-load defaults are declared through [`Entity::PRELOADS`] and date
//! range queries are unlocked by implementing [`Dateable`]; both are resolved
//! per type at compile time.
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use tracker_repository::entity::Entity;
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Exercise {
//!     #[serde(default)]
//!     id: u64,
//!     name: String,
//! }
//!
//! impl Entity for Exercise {
//!     const COLLECTION: &'static str = "exercises";
//!
//!     fn id(&self) -> u64 {
//!         self.id
//!     }
//!
//!     fn set_id(&mut self, id: u64) {
//!         self.id = id;
//!     }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::store::Table;

/// A record type with a stable identifier stored in one collection
///
/// Identifier `0` means "not yet persisted"; the store assigns the real value
/// on insert. Entities are exchanged with stores as JSON objects, so the
/// serialized field names are the column names.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Table or collection name
    const COLLECTION: &'static str;

    /// Relation paths loaded when the caller does not choose any
    ///
    /// Paths are dotted chains of relation names, e.g. `"items.food"`.
    const PRELOADS: &'static [&'static str] = &[];

    /// Column holding the entity's date, if it has one
    const DATE_FIELD: Option<&'static str> = None;

    /// Whether the collection carries a `deleted_at` marker
    const SOFT_DELETE: bool = true;

    fn id(&self) -> u64;

    fn set_id(&mut self, id: u64);

    /// Associations that can be preloaded, keyed by the serialized field name
    fn relations() -> Vec<Relation> {
        Vec::new()
    }
}

/// An entity with one date attribute used for range queries
///
/// Implementors set [`Entity::DATE_FIELD`] to the column backing [`date`](Self::date).
pub trait Dateable: Entity {
    fn date(&self) -> DateTime<Utc>;
}

/// How a relation's rows are linked to the owning row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Target rows carry `foreign_key` pointing at the owner
    HasMany { foreign_key: &'static str },
    /// Like `HasMany`, keeping only the first target
    HasOne { foreign_key: &'static str },
    /// Owner carries `foreign_key` pointing at the target
    BelongsTo { foreign_key: &'static str },
    /// Linked through a join table
    ManyToMany {
        join_table: &'static str,
        owner_key: &'static str,
        target_key: &'static str,
    },
}

/// One preloadable association
#[derive(Debug, Clone, Copy)]
pub struct Relation {
    /// Serialized field the related rows are attached to
    pub name: &'static str,
    pub kind: RelationKind,
    pub target: Table,
    /// Relations of the target type, for nested paths
    pub target_relations: fn() -> Vec<Relation>,
}

impl Relation {
    /// `C` rows reference the owner through `foreign_key`
    pub fn has_many<C: Entity>(name: &'static str, foreign_key: &'static str) -> Self {
        Self::to::<C>(name, RelationKind::HasMany { foreign_key })
    }

    pub fn has_one<C: Entity>(name: &'static str, foreign_key: &'static str) -> Self {
        Self::to::<C>(name, RelationKind::HasOne { foreign_key })
    }

    /// The owner references a `P` row through `foreign_key`
    pub fn belongs_to<P: Entity>(name: &'static str, foreign_key: &'static str) -> Self {
        Self::to::<P>(name, RelationKind::BelongsTo { foreign_key })
    }

    pub fn many_to_many<C: Entity>(
        name: &'static str,
        join_table: &'static str,
        owner_key: &'static str,
        target_key: &'static str,
    ) -> Self {
        Self::to::<C>(
            name,
            RelationKind::ManyToMany {
                join_table,
                owner_key,
                target_key,
            },
        )
    }

    fn to<C: Entity>(name: &'static str, kind: RelationKind) -> Self {
        Self {
            name,
            kind,
            target: Table::of::<C>(),
            target_relations: C::relations,
        }
    }
}
