//! Ordering, filtering and page metadata
//!
//! [`FilterCondition`]s are the store-facing predicates produced from
//! [`QueryOptions`](super::QueryOptions); [`PaginatedResult`] is what a
//! paginated listing hands back to the caller.
//!
//! # Example
//!
//! ```rust
//! use tracker_repository::repository::PaginatedResult;
//!
//! let page = PaginatedResult::new(vec!["squat"; 10], 25, 1, 10);
//! assert_eq!(page.total_pages, 3);
//! assert!(page.has_next);
//! assert!(!page.has_prev);
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction for ordering results
///
/// ```rust
/// use tracker_repository::repository::OrderDirection;
///
/// assert_eq!(OrderDirection::Ascending.to_string(), "asc");
/// assert_eq!(OrderDirection::Descending.to_string(), "desc");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    Descending,
}

impl OrderDirection {
    /// Descending when `desc` is set
    pub fn from_descending(desc: bool) -> Self {
        if desc {
            Self::Descending
        } else {
            Self::Ascending
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// Comparison operators for filter conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Equal to (=)
    Equal,
    /// Value is in a list (IN)
    In,
    /// Value is not in a list (NOT IN)
    NotIn,
    /// Greater than or equal to (>=)
    GreaterThanOrEqual,
    /// Less than or equal to (<=)
    LessThanOrEqual,
    /// Value is null (IS NULL)
    IsNull,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "="),
            Self::In => write!(f, "IN"),
            Self::NotIn => write!(f, "NOT IN"),
            Self::GreaterThanOrEqual => write!(f, ">="),
            Self::LessThanOrEqual => write!(f, "<="),
            Self::IsNull => write!(f, "IS NULL"),
        }
    }
}

/// A value that can be used in filter conditions
///
/// ```rust
/// use tracker_repository::repository::FilterValue;
///
/// let name: FilterValue = "Squat".into();
/// let sets: FilterValue = 5_i64.into();
/// let done: FilterValue = true.into();
/// assert_eq!(name, FilterValue::String("Squat".to_string()));
/// # let _ = (sets, done);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// String value
    String(String),
    /// 64-bit integer value
    Integer(i64),
    /// 64-bit floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// Point in time
    Timestamp(DateTime<Utc>),
    /// Entity identifiers (for IN / NOT IN)
    IdList(Vec<u64>),
    /// Null value
    Null,
}

impl FilterValue {
    /// JSON form used when comparing against stored rows
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Integer(n) => Value::from(*n),
            Self::Float(n) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
            Self::Boolean(b) => Value::Bool(*b),
            Self::Timestamp(t) => Value::String(t.to_rfc3339()),
            Self::IdList(ids) => Value::Array(ids.iter().map(|id| Value::from(*id)).collect()),
            Self::Null => Value::Null,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for FilterValue {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<u32> for FilterValue {
    fn from(n: u32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t)
    }
}

impl From<Vec<u64>> for FilterValue {
    fn from(ids: Vec<u64>) -> Self {
        Self::IdList(ids)
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A single predicate on one field
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    /// The field name to filter on
    pub field: String,
    /// The comparison operator
    pub operator: FilterOperator,
    /// The value to compare against
    pub value: FilterValue,
}

impl FilterCondition {
    /// Create a new filter condition
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// `field = value`
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::Equal, value.into())
    }

    /// `field >= value`
    pub fn gte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::GreaterThanOrEqual, value.into())
    }

    /// `field <= value`
    pub fn lte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, FilterOperator::LessThanOrEqual, value.into())
    }

    /// `field IN (ids)`
    pub fn in_ids(field: impl Into<String>, ids: Vec<u64>) -> Self {
        Self::new(field, FilterOperator::In, FilterValue::IdList(ids))
    }

    /// `field NOT IN (ids)`
    pub fn not_in_ids(field: impl Into<String>, ids: Vec<u64>) -> Self {
        Self::new(field, FilterOperator::NotIn, FilterValue::IdList(ids))
    }

    /// `field IS NULL`
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNull, FilterValue::Null)
    }
}

/// One page of entities plus the metadata needed to navigate the rest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResult<T> {
    /// Entities on this page
    pub data: Vec<T>,
    /// Matching entities across all pages
    pub total: u64,
    /// Current page number (1-indexed)
    pub page: u32,
    /// Requested page size
    pub page_size: u32,
    /// Total number of pages
    pub total_pages: u32,
    /// Whether there is a next page
    pub has_next: bool,
    /// Whether there is a previous page
    pub has_prev: bool,
}

impl<T> PaginatedResult<T> {
    /// Build page metadata from a slice of results and the unpaginated total
    ///
    /// `page_size` must already be clamped by the caller; a zero size is
    /// treated as one to keep the division defined.
    pub fn new(data: Vec<T>, total: u64, page: u32, page_size: u32) -> Self {
        let divisor = if page_size == 0 { 1 } else { page_size };
        let total_pages = calculate_total_pages(total, divisor);
        Self {
            data,
            total,
            page,
            page_size,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }

    /// Navigation metadata without the data
    pub fn meta(&self) -> PageMeta {
        PageMeta {
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
            has_next: self.has_next,
            has_prev: self.has_prev,
        }
    }

    /// Transform the page's entities, keeping the metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResult<U> {
        PaginatedResult {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
            has_next: self.has_next,
            has_prev: self.has_prev,
        }
    }
}

/// Pagination metadata as rendered in list responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

fn calculate_total_pages(total: u64, per_page: u32) -> u32 {
    let per_page = u64::from(per_page);
    // Ceiling division: (total + per_page - 1) / per_page
    let pages = total.saturating_add(per_page).saturating_sub(1) / per_page;
    u32::try_from(pages).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_middle_last_page() {
        let first = PaginatedResult::new(vec![0; 10], 25, 1, 10);
        assert_eq!(first.total_pages, 3);
        assert!(first.has_next);
        assert!(!first.has_prev);

        let middle = PaginatedResult::new(vec![0; 10], 25, 2, 10);
        assert!(middle.has_next);
        assert!(middle.has_prev);

        let last = PaginatedResult::new(vec![0; 5], 25, 3, 10);
        assert!(!last.has_next);
        assert!(last.has_prev);
    }

    #[test]
    fn test_exact_multiple() {
        let page = PaginatedResult::new(vec![0; 10], 30, 3, 10);
        assert_eq!(page.total_pages, 3);
        assert!(!page.has_next);
    }

    #[test]
    fn test_empty_total() {
        let page: PaginatedResult<u8> = PaginatedResult::new(vec![], 0, 1, 10);
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_next);
        assert!(!page.has_prev);
    }

    #[test]
    fn test_zero_page_size_guard() {
        let page = PaginatedResult::new(vec![1, 2, 3], 3, 1, 0);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page_size, 0);
    }

    #[test]
    fn test_page_meta_serializes_camel_case() {
        let page = PaginatedResult::new(vec![1], 11, 2, 10);
        let json = serde_json::to_value(page.meta()).unwrap();
        assert_eq!(json["pageSize"], 10);
        assert_eq!(json["totalPages"], 2);
        assert_eq!(json["hasNext"], false);
        assert_eq!(json["hasPrev"], true);
    }

    #[test]
    fn test_map_keeps_metadata() {
        let page = PaginatedResult::new(vec![1, 2], 4, 1, 2).map(|n| n * 10);
        assert_eq!(page.data, vec![10, 20]);
        assert_eq!(page.total_pages, 2);
    }

    #[test]
    fn test_filter_value_json() {
        assert_eq!(FilterValue::from("a").to_json(), serde_json::json!("a"));
        assert_eq!(FilterValue::from(vec![1_u64, 2]).to_json(), serde_json::json!([1, 2]));
        assert_eq!(FilterValue::from(None::<i64>).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn test_order_direction_from_flag() {
        assert_eq!(OrderDirection::from_descending(true), OrderDirection::Descending);
        assert_eq!(OrderDirection::from_descending(false), OrderDirection::Ascending);
    }
}
