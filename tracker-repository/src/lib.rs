//! # tracker-repository
//!
//! Generic persistence layer for the meal and workout tracker: one repository
//! implementation serves every record type, and one route adapter exposes it
//! over HTTP.
//!
//! ## Features
//!
//! - **Entities**: [`Entity`](entity::Entity) with declared default preloads,
//!   [`Dateable`](entity::Dateable) for date-range queries
//! - **Repository**: CRUD, batch operations, count/exists/find-one, pagination,
//!   date ranges, transactions and soft delete over any [`Store`](store::Store)
//! - **Query options**: composable [`QueryOption`](repository::QueryOption) values
//! - **Cancellation**: every call takes a [`QueryContext`](context::QueryContext)
//! - **Stores**: in-memory, and PostgreSQL through sqlx (`database` feature)
//! - **Routes**: generic CRUD routes on axum (`handlers` feature)
//!
//! ## Example
//!
//! ```rust,ignore
//! use tracker_repository::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let Some(database) = &config.database else {
//!         return Ok(());
//!     };
//!     let store = PgStore::connect(database).await?;
//!     let logs = Repository::<WorkoutLog, _>::new(store).with_config(&config.repository);
//!     let ctx = QueryContext::from_config(&config.repository);
//!
//!     let page = logs
//!         .get_by_date_range_paginated(&ctx, start, end, 1, 20, &[])
//!         .await?;
//!     println!("{} workouts in range", page.total);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod observability;
pub mod repository;
pub mod store;

#[cfg(feature = "database")]
pub mod database;

#[cfg(feature = "handlers")]
pub mod handlers;

#[cfg(test)]
pub(crate) mod testing;

pub mod prelude {
    pub use crate::config::{Config, DatabaseConfig, RepositoryConfig, ServiceConfig};
    pub use crate::context::QueryContext;
    pub use crate::entity::{Dateable, Entity, Relation, RelationKind};
    pub use crate::error::{Error, Result};
    pub use crate::observability::init_tracing;

    pub use crate::repository::{
        FilterValue, OrderDirection, PaginatedResult, QueryOption, Repository, RepositoryError,
        RepositoryErrorKind, RepositoryOperation, RepositoryResult,
    };
    pub use crate::store::{MemoryStore, Store, StoreTransaction};

    #[cfg(feature = "database")]
    pub use crate::database::create_pool;
    #[cfg(feature = "database")]
    pub use crate::store::PgStore;

    #[cfg(feature = "handlers")]
    pub use crate::handlers::{ApiError, CrudConfig, CrudResource, ListParams};

    pub use tokio_util::sync::CancellationToken;
}
