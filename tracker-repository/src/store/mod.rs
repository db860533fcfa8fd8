//! Storage backends
//!
//! A [`Store`] executes row-level operations on behalf of a
//! [`Repository`](crate::repository::Repository). Rows travel as JSON objects
//! so one store implementation serves every entity type.
//!
//! - [`MemoryStore`]: in-process tables, used by tests and embedded tools
//! - `PgStore`: PostgreSQL through sqlx (`database` feature)

use std::future::Future;

use crate::entity::Entity;
use crate::repository::{FilterCondition, OrderDirection, RepositoryResult};

mod memory;
pub(crate) mod preload;

#[cfg(feature = "database")]
mod postgres;

pub use memory::{MemoryStore, MemoryTransaction};
#[cfg(feature = "database")]
pub use postgres::{PgStore, PgTransaction};

/// One stored row, keyed by column name
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Column holding the soft-delete marker
pub const DELETED_AT: &str = "deleted_at";

/// Column holding the identifier
pub const ID: &str = "id";

/// A collection and whether it carries a soft-delete marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub soft_delete: bool,
}

impl Table {
    pub fn of<T: Entity>() -> Self {
        Self {
            name: T::COLLECTION,
            soft_delete: T::SOFT_DELETE,
        }
    }

    /// Plain table without a soft-delete marker, e.g. a join table
    pub fn plain(name: &'static str) -> Self {
        Self {
            name,
            soft_delete: false,
        }
    }
}

/// A read against one table
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub table: Table,
    /// Predicates combined with AND
    pub conditions: Vec<FilterCondition>,
    pub order_by: Option<(String, OrderDirection)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Also match rows whose soft-delete marker is set
    pub include_deleted: bool,
}

impl Selection {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            conditions: Vec::new(),
            order_by: None,
            limit: None,
            offset: None,
            include_deleted: false,
        }
    }

    #[must_use]
    pub fn with_condition(mut self, condition: FilterCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn ordered_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    /// Whether rows with a set `deleted_at` are filtered out
    pub fn hides_deleted(&self) -> bool {
        self.table.soft_delete && !self.include_deleted
    }
}

/// Row-level operations a repository needs from its backend
///
/// Errors are reported as repository errors; the repository adds the
/// operation and entity context.
pub trait Store: Clone + Send + Sync + 'static {
    /// Handle for a unit of work opened by [`begin`](Store::begin)
    type Tx: StoreTransaction;

    fn fetch(&self, selection: &Selection) -> impl Future<Output = RepositoryResult<Vec<Row>>> + Send;

    /// Number of rows matching the selection, ignoring order, limit and offset
    fn count(&self, selection: &Selection) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Insert all rows or none; returns the assigned identifiers in input order
    fn insert(
        &self,
        table: &Table,
        rows: Vec<Row>,
    ) -> impl Future<Output = RepositoryResult<Vec<u64>>> + Send;

    /// Replace every column of a visible row; returns the affected count
    fn update(
        &self,
        table: &Table,
        id: u64,
        row: Row,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Mark visible rows deleted; returns the affected count
    fn soft_delete(
        &self,
        table: &Table,
        ids: &[u64],
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Clear the deleted marker; returns the affected count
    fn restore(&self, table: &Table, id: u64) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Remove rows permanently; returns the affected count
    fn delete(&self, table: &Table, ids: &[u64])
        -> impl Future<Output = RepositoryResult<u64>> + Send;

    fn begin(&self) -> impl Future<Output = RepositoryResult<Self::Tx>> + Send;
}

/// A store bound to one open transaction
///
/// Calling [`Store::begin`] on a transaction fails; nesting is not supported.
pub trait StoreTransaction: Store<Tx = Self> {
    fn commit(&self) -> impl Future<Output = RepositoryResult<()>> + Send;

    fn rollback(&self) -> impl Future<Output = RepositoryResult<()>> + Send;
}
