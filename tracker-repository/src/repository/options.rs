//! Composable query options
//!
//! Each repository read takes a slice of [`QueryOption`]s. They are folded left
//! to right over a default [`QueryOptions`], so a later option overrides an
//! earlier one touching the same setting.
//!
//! ```rust
//! use tracker_repository::repository::{OrderDirection, QueryOption, QueryOptions};
//!
//! let opts = QueryOptions::apply(&[
//!     QueryOption::paginate(2, 10),
//!     QueryOption::filter("muscle_group", "legs"),
//!     QueryOption::order_by_asc("name"),
//!     QueryOption::order_by_desc("id"),
//! ]);
//! assert_eq!(opts.limit, Some(10));
//! assert_eq!(opts.offset, Some(10));
//! assert_eq!(opts.order_by, Some(("id".to_string(), OrderDirection::Descending)));
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::error::{RepositoryError, RepositoryResult};
use super::pagination::{FilterCondition, FilterValue, OrderDirection};

/// Page size used when a caller asks for a non-positive one
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Which relations to load alongside the main entity
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PreloadSelection {
    /// The entity type's declared default paths
    #[default]
    TypeDefaults,
    /// Exactly these dotted relation paths
    Explicit(Vec<String>),
    /// Nothing
    None,
}

/// Per-call query configuration built from [`QueryOption`]s
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryOptions {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub preloads: PreloadSelection,
    pub order_by: Option<(String, OrderDirection)>,
    /// Inclusive lower date bound
    pub date_start: Option<DateTime<Utc>>,
    /// Inclusive upper date bound
    pub date_end: Option<DateTime<Utc>>,
    /// Equality filters, combined with AND
    pub filters: BTreeMap<String, FilterValue>,
    pub exclude_ids: Vec<u64>,
    /// Also return soft-deleted rows
    pub include_deleted: bool,
}

impl QueryOptions {
    /// Fold options over the defaults in call order
    pub fn apply(opts: &[QueryOption]) -> Self {
        let mut options = Self::default();
        for opt in opts {
            opt.apply_to(&mut options);
        }
        options
    }

    /// Relation paths to eager-load given the entity type's defaults
    pub fn resolve_preloads(&self, defaults: &[&str]) -> Vec<String> {
        match &self.preloads {
            PreloadSelection::TypeDefaults => defaults.iter().map(|p| (*p).to_string()).collect(),
            PreloadSelection::Explicit(paths) => paths.clone(),
            PreloadSelection::None => Vec::new(),
        }
    }

    /// Predicates shared by data and count queries
    ///
    /// Order: equality filters, identifier exclusion, date bounds. Date bounds
    /// require a date column.
    pub fn conditions(&self, date_field: Option<&str>) -> RepositoryResult<Vec<FilterCondition>> {
        let mut conditions: Vec<FilterCondition> = self
            .filters
            .iter()
            .map(|(field, value)| FilterCondition::eq(field.clone(), value.clone()))
            .collect();

        if !self.exclude_ids.is_empty() {
            conditions.push(FilterCondition::not_in_ids("id", self.exclude_ids.clone()));
        }

        if self.date_start.is_some() || self.date_end.is_some() {
            let field = date_field.ok_or_else(|| {
                RepositoryError::validation_failed("date bounds given for an entity without a date field")
            })?;
            if let Some(start) = self.date_start {
                conditions.push(FilterCondition::gte(field, start));
            }
            if let Some(end) = self.date_end {
                conditions.push(FilterCondition::lte(field, end));
            }
        }

        Ok(conditions)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Mutation {
    Paginate { page: i64, page_size: i64 },
    Limit(u64),
    Offset(u64),
    Preloads(PreloadSelection),
    OrderBy(String, OrderDirection),
    DateStart(DateTime<Utc>),
    DateEnd(DateTime<Utc>),
    DateRange(DateTime<Utc>, DateTime<Utc>),
    Filter(String, FilterValue),
    Filters(Vec<(String, FilterValue)>),
    ExcludeIds(Vec<u64>),
    IncludeDeleted,
}

/// One mutation of [`QueryOptions`]
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOption(Mutation);

impl QueryOption {
    /// Page-based limit and offset
    ///
    /// A page below 1 becomes 1; a page size below 1 becomes
    /// [`DEFAULT_PAGE_SIZE`].
    pub fn paginate(page: i64, page_size: i64) -> Self {
        Self(Mutation::Paginate { page, page_size })
    }

    /// Maximum number of rows; 0 removes the limit
    pub fn limit(limit: u64) -> Self {
        Self(Mutation::Limit(limit))
    }

    /// Rows to skip
    pub fn offset(offset: u64) -> Self {
        Self(Mutation::Offset(offset))
    }

    /// Load exactly these dotted relation paths
    pub fn preload<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Mutation::Preloads(PreloadSelection::Explicit(
            paths.into_iter().map(Into::into).collect(),
        )))
    }

    /// Load the entity type's default relations
    pub fn default_preloads() -> Self {
        Self(Mutation::Preloads(PreloadSelection::TypeDefaults))
    }

    /// Load no relations
    pub fn no_preloads() -> Self {
        Self(Mutation::Preloads(PreloadSelection::None))
    }

    pub fn order_by(field: impl Into<String>, descending: bool) -> Self {
        Self(Mutation::OrderBy(
            field.into(),
            OrderDirection::from_descending(descending),
        ))
    }

    pub fn order_by_asc(field: impl Into<String>) -> Self {
        Self::order_by(field, false)
    }

    pub fn order_by_desc(field: impl Into<String>) -> Self {
        Self::order_by(field, true)
    }

    /// Inclusive date range; sets both bounds
    pub fn date_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self(Mutation::DateRange(start, end))
    }

    /// Inclusive lower date bound
    pub fn date_from(start: DateTime<Utc>) -> Self {
        Self(Mutation::DateStart(start))
    }

    /// Inclusive upper date bound
    pub fn date_until(end: DateTime<Utc>) -> Self {
        Self(Mutation::DateEnd(end))
    }

    /// Equality filter on one field
    pub fn filter(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self(Mutation::Filter(field.into(), value.into()))
    }

    /// Merge several equality filters; later keys overwrite earlier ones
    pub fn filters<I, K, V>(filters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FilterValue>,
    {
        Self(Mutation::Filters(
            filters
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    /// Exclude these identifiers, replacing any earlier exclusion
    pub fn exclude_ids(ids: impl IntoIterator<Item = u64>) -> Self {
        Self(Mutation::ExcludeIds(ids.into_iter().collect()))
    }

    /// Include soft-deleted rows
    pub fn with_deleted() -> Self {
        Self(Mutation::IncludeDeleted)
    }

    pub(crate) fn apply_to(&self, options: &mut QueryOptions) {
        match &self.0 {
            Mutation::Paginate { page, page_size } => {
                let page = (*page).max(1) as u64;
                let page_size = if *page_size < 1 {
                    u64::from(DEFAULT_PAGE_SIZE)
                } else {
                    *page_size as u64
                };
                options.limit = Some(page_size);
                options.offset = Some((page - 1).saturating_mul(page_size));
            }
            Mutation::Limit(0) => options.limit = None,
            Mutation::Limit(limit) => options.limit = Some(*limit),
            Mutation::Offset(offset) => options.offset = Some(*offset),
            Mutation::Preloads(selection) => options.preloads = selection.clone(),
            Mutation::OrderBy(field, direction) => {
                options.order_by = Some((field.clone(), *direction));
            }
            Mutation::DateStart(start) => options.date_start = Some(*start),
            Mutation::DateEnd(end) => options.date_end = Some(*end),
            Mutation::DateRange(start, end) => {
                options.date_start = Some(*start);
                options.date_end = Some(*end);
            }
            Mutation::Filter(field, value) => {
                options.filters.insert(field.clone(), value.clone());
            }
            Mutation::Filters(filters) => {
                for (field, value) in filters {
                    options.filters.insert(field.clone(), value.clone());
                }
            }
            Mutation::ExcludeIds(ids) => options.exclude_ids = ids.clone(),
            Mutation::IncludeDeleted => options.include_deleted = true,
        }
    }
}
