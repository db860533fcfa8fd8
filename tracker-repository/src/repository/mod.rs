//! Generic repository, query options and pagination
//!
//! # Features
//!
//! - **Generic CRUD**: [`Repository`] over any [`Entity`](crate::entity::Entity) and [`Store`](crate::store::Store)
//! - **Batch operations**: create, update (one transaction) and delete many entities
//! - **Date queries**: inclusive ranges for [`Dateable`](crate::entity::Dateable) entities
//! - **Query options**: [`QueryOption`] constructors folded into [`QueryOptions`]
//! - **Pagination**: [`PaginatedResult`] with totals counted over the same predicates
//! - **Transactions**: scoped units of work with commit on success, rollback on error
//!
//! # Example
//!
//! ```rust,ignore
//! use tracker_repository::prelude::*;
//!
//! let repo: Repository<WorkoutLog, _> = Repository::new(MemoryStore::new());
//! let ctx = QueryContext::background();
//!
//! let january = repo
//!     .get_by_date_range(&ctx, start, end, &[QueryOption::no_preloads()])
//!     .await?;
//!
//! repo.transaction(&ctx, |tx| async move {
//!     tx.delete(&ctx, january[0].id).await?;
//!     tx.scoped::<Exercise>().create(&ctx, &mut exercise).await?;
//!     Ok::<_, RepositoryError>(())
//! })
//! .await?;
//! ```

mod batch;
mod dated;
mod error;
mod generic;
mod options;
mod pagination;

pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult};
pub use generic::Repository;
pub use options::{PreloadSelection, QueryOption, QueryOptions, DEFAULT_PAGE_SIZE};
pub use pagination::{
    FilterCondition, FilterOperator, FilterValue, OrderDirection, PageMeta, PaginatedResult,
};
