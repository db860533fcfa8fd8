//! Generic CRUD routes over a [`Repository`](crate::repository::Repository)
//!
//! A [`CrudConfig`] declares which routes exist and how lists behave; a
//! [`CrudResource`] pairs it with a repository and can be called directly or
//! turned into an axum [`Router`](axum::Router).
//!
//! # Example
//!
//! ```rust,ignore
//! use tracker_repository::handlers::{CrudConfig, CrudResource};
//! use tracker_repository::prelude::*;
//!
//! let store = MemoryStore::new();
//! let exercises = CrudResource::new(
//!     Repository::<Exercise, _>::new(store.clone()),
//!     CrudConfig::new("/exercises", "exercise").default_page_size(50),
//! );
//! let meals = CrudResource::new(
//!     Repository::<Meal, _>::new(store),
//!     CrudConfig::new("/meals", "meal").disable_delete(),
//! );
//!
//! let app: axum::Router = axum::Router::new()
//!     .merge(exercises.into_router())
//!     .merge(meals.into_router());
//! ```
//!
//! # List parameters
//!
//! `page` and `pageSize` select a page; without both, lists use the
//! configured default page size, or return everything when it is 0.
//! `orderBy`/`orderDesc` override the default order, `exclude` and
//! `preloads` take comma separated lists, `useDefaultPreloads=false` skips
//! the entity's default relations, and every other parameter is an equality
//! filter.

mod config;
mod error;
mod query;
mod resource;
mod router;

pub use config::{CrudConfig, HookResult, DEFAULT_LIST_PAGE_SIZE};
pub use error::{ApiError, ApiErrorKind, ApiOperation};
pub use query::{ListParams, RESERVED_PARAMS};
pub use resource::{CrudResource, ListOutcome};
