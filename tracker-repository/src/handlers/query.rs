//! List request parameters
//!
//! ```rust
//! use tracker_repository::handlers::ListParams;
//!
//! let params = ListParams::from_pairs([
//!     ("page", "2"),
//!     ("pageSize", "25"),
//!     ("orderBy", "name"),
//!     ("orderDesc", "true"),
//!     ("exclude", "4,9"),
//!     ("muscle_group", "legs"),
//! ]);
//!
//! assert_eq!(params.pagination(), Some((2, 25)));
//! assert_eq!(params.exclude, vec![4, 9]);
//! assert_eq!(params.filters, vec![("muscle_group".to_string(), "legs".to_string())]);
//! ```

use serde::{Deserialize, Serialize};

use crate::repository::QueryOption;

/// Parameters that configure the listing; every other parameter is a filter
pub const RESERVED_PARAMS: &[&str] = &[
    "page",
    "pageSize",
    "orderBy",
    "orderDesc",
    "exclude",
    "preloads",
    "useDefaultPreloads",
];

/// Parsed query string of a list request
///
/// Unparsable numbers read as 0 and unparsable exclusion identifiers are
/// skipped, so a sloppy query string degrades to an unfiltered listing
/// rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed); 0 when absent
    pub page: i64,
    /// Page size; 0 when absent
    pub page_size: i64,
    pub order_by: Option<String>,
    pub order_desc: bool,
    /// Identifiers to leave out of the listing
    pub exclude: Vec<u64>,
    /// Explicit relation paths to preload
    pub preloads: Vec<String>,
    /// `Some(false)` turns the entity's default preloads off for this request
    pub use_default_preloads: Option<bool>,
    /// Equality filters, first value per field, in request order
    pub filters: Vec<(String, String)>,
}

impl ListParams {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let key = key.into();
            let value = value.into();
            match key.as_str() {
                "page" => params.page = value.trim().parse().unwrap_or(0),
                "pageSize" => params.page_size = value.trim().parse().unwrap_or(0),
                "orderBy" => {
                    if !value.is_empty() {
                        params.order_by = Some(value);
                    }
                }
                "orderDesc" => params.order_desc = value == "true",
                "exclude" => params
                    .exclude
                    .extend(split_list(&value).filter_map(|id| id.parse::<u64>().ok())),
                "preloads" => params
                    .preloads
                    .extend(split_list(&value).map(str::to_string)),
                "useDefaultPreloads" => params.use_default_preloads = Some(value != "false"),
                _ => {
                    if !params.filters.iter().any(|(field, _)| *field == key) {
                        params.filters.push((key, value));
                    }
                }
            }
        }
        params
    }

    /// Page and size when both were given as positive numbers
    pub fn pagination(&self) -> Option<(i64, i64)> {
        (self.page > 0 && self.page_size > 0).then_some((self.page, self.page_size))
    }

    /// Options for this request under the resource's defaults
    pub(crate) fn to_options(
        &self,
        default_order: Option<&(String, bool)>,
        use_default_preloads: bool,
    ) -> Vec<QueryOption> {
        let mut opts = Vec::new();

        if !self.preloads.is_empty() {
            opts.push(QueryOption::preload(self.preloads.iter().cloned()));
        } else if use_default_preloads && self.use_default_preloads != Some(false) {
            opts.push(QueryOption::default_preloads());
        } else {
            opts.push(QueryOption::no_preloads());
        }

        match (&self.order_by, default_order) {
            (Some(field), _) => opts.push(QueryOption::order_by(field.clone(), self.order_desc)),
            (None, Some((field, descending))) => {
                opts.push(QueryOption::order_by(field.clone(), *descending));
            }
            (None, None) => {}
        }

        if !self.filters.is_empty() {
            opts.push(QueryOption::filters(self.filters.iter().cloned()));
        }

        if !self.exclude.is_empty() {
            opts.push(QueryOption::exclude_ids(self.exclude.iter().copied()));
        }

        opts
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}
