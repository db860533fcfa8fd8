//! In-process store
//!
//! Tables live behind one async mutex that is held only for the duration of a
//! single call. A transaction reads from a snapshot taken at `begin` plus its
//! own writes, and records those writes in a log. Commit replays the log onto
//! the current tables under the lock, all or nothing. Rollback or drop
//! discards the log. Identifiers for rows inserted inside a transaction are
//! reserved from the shared tables right away, so they never collide with
//! rows inserted outside it.
//!
//! Each collection remembers the columns it has been written with. Filtering
//! or ordering on any other column is a store error, like an unknown column
//! in SQL. A collection that was never written has no known columns yet and
//! accepts any selection.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{Row, Selection, Store, StoreTransaction, Table, DELETED_AT, ID};
use crate::repository::{
    FilterCondition, FilterOperator, OrderDirection, RepositoryError, RepositoryResult,
};

#[derive(Debug, Clone, Default)]
struct Collection {
    rows: BTreeMap<u64, Row>,
    last_id: u64,
    columns: BTreeSet<String>,
}

impl Collection {
    fn record_columns(&mut self, table: &Table, row: &Row) {
        self.columns.insert(ID.to_string());
        if table.soft_delete {
            self.columns.insert(DELETED_AT.to_string());
        }
        self.columns.extend(row.keys().cloned());
    }

    fn check_column(&self, table: &Table, field: &str) -> RepositoryResult<()> {
        if self.columns.is_empty() || self.columns.contains(field) {
            return Ok(());
        }
        Err(RepositoryError::store(format!(
            "column \"{field}\" does not exist in \"{}\"",
            table.name
        )))
    }
}

#[derive(Debug, Clone, Default)]
struct Tables {
    collections: HashMap<&'static str, Collection>,
}

/// Columns that must hold distinct values, per collection
type UniqueColumns = HashMap<String, Vec<String>>;

/// One write performed inside a transaction, replayed on commit
#[derive(Debug, Clone)]
enum Write {
    Insert { table: Table, rows: Vec<(u64, Row)> },
    Update { table: Table, id: u64, row: Row },
    SoftDelete { table: Table, ids: Vec<u64>, at: Value },
    Restore { table: Table, id: u64 },
    Delete { table: Table, ids: Vec<u64> },
}

/// Store keeping every table in memory
///
/// ```rust
/// use tracker_repository::store::MemoryStore;
///
/// let store = MemoryStore::new().with_unique("foods", "name");
/// # let _ = store;
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    unique: Arc<UniqueColumns>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject inserts and updates that would duplicate `field` within `collection`
    #[must_use]
    pub fn with_unique(mut self, collection: &str, field: &str) -> Self {
        Arc::make_mut(&mut self.unique)
            .entry(collection.to_string())
            .or_default()
            .push(field.to_string());
        self
    }
}

impl Store for MemoryStore {
    type Tx = MemoryTransaction;

    async fn fetch(&self, selection: &Selection) -> RepositoryResult<Vec<Row>> {
        self.tables.lock().await.fetch(selection)
    }

    async fn count(&self, selection: &Selection) -> RepositoryResult<u64> {
        self.tables.lock().await.count(selection)
    }

    async fn insert(&self, table: &Table, rows: Vec<Row>) -> RepositoryResult<Vec<u64>> {
        let mut tables = self.tables.lock().await;
        tables.check_insert(&self.unique, table, &rows)?;
        let ids = tables.allocate_ids(table, rows.len());
        tables.apply_insert(table, ids.iter().copied().zip(rows).collect());
        Ok(ids)
    }

    async fn update(&self, table: &Table, id: u64, row: Row) -> RepositoryResult<u64> {
        self.tables.lock().await.update(&self.unique, table, id, row)
    }

    async fn soft_delete(&self, table: &Table, ids: &[u64]) -> RepositoryResult<u64> {
        let now = Value::String(Utc::now().to_rfc3339());
        Ok(self.tables.lock().await.soft_delete(table, ids, &now))
    }

    async fn restore(&self, table: &Table, id: u64) -> RepositoryResult<u64> {
        Ok(self.tables.lock().await.restore(table, id))
    }

    async fn delete(&self, table: &Table, ids: &[u64]) -> RepositoryResult<u64> {
        Ok(self.tables.lock().await.delete(table, ids))
    }

    async fn begin(&self) -> RepositoryResult<MemoryTransaction> {
        let working = self.tables.lock().await.clone();
        Ok(MemoryTransaction {
            state: Arc::new(Mutex::new(Some(TxState {
                working,
                log: Vec::new(),
            }))),
            shared: Arc::clone(&self.tables),
            unique: Arc::clone(&self.unique),
        })
    }
}

#[derive(Debug)]
struct TxState {
    working: Tables,
    log: Vec<Write>,
}

/// Open transaction on a [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct MemoryTransaction {
    state: Arc<Mutex<Option<TxState>>>,
    shared: Arc<Mutex<Tables>>,
    unique: Arc<UniqueColumns>,
}

fn finished() -> RepositoryError {
    RepositoryError::store("transaction already finished")
}

impl MemoryTransaction {
    async fn with_state<R>(
        &self,
        f: impl FnOnce(&mut TxState) -> RepositoryResult<R>,
    ) -> RepositoryResult<R> {
        let mut state = self.state.lock().await;
        f(state.as_mut().ok_or_else(finished)?)
    }
}

impl Store for MemoryTransaction {
    type Tx = MemoryTransaction;

    async fn fetch(&self, selection: &Selection) -> RepositoryResult<Vec<Row>> {
        self.with_state(|tx| tx.working.fetch(selection)).await
    }

    async fn count(&self, selection: &Selection) -> RepositoryResult<u64> {
        self.with_state(|tx| tx.working.count(selection)).await
    }

    async fn insert(&self, table: &Table, rows: Vec<Row>) -> RepositoryResult<Vec<u64>> {
        let mut state = self.state.lock().await;
        let tx = state.as_mut().ok_or_else(finished)?;
        tx.working.check_insert(&self.unique, table, &rows)?;

        let ids = self.shared.lock().await.allocate_ids(table, rows.len());
        let keyed: Vec<(u64, Row)> = ids.iter().copied().zip(rows).collect();
        tx.working.apply_insert(table, keyed.clone());
        tx.log.push(Write::Insert {
            table: *table,
            rows: keyed,
        });
        Ok(ids)
    }

    async fn update(&self, table: &Table, id: u64, row: Row) -> RepositoryResult<u64> {
        let unique = Arc::clone(&self.unique);
        self.with_state(|tx| {
            let affected = tx.working.update(&unique, table, id, row.clone())?;
            tx.log.push(Write::Update {
                table: *table,
                id,
                row,
            });
            Ok(affected)
        })
        .await
    }

    async fn soft_delete(&self, table: &Table, ids: &[u64]) -> RepositoryResult<u64> {
        let at = Value::String(Utc::now().to_rfc3339());
        self.with_state(|tx| {
            let affected = tx.working.soft_delete(table, ids, &at);
            tx.log.push(Write::SoftDelete {
                table: *table,
                ids: ids.to_vec(),
                at,
            });
            Ok(affected)
        })
        .await
    }

    async fn restore(&self, table: &Table, id: u64) -> RepositoryResult<u64> {
        self.with_state(|tx| {
            let affected = tx.working.restore(table, id);
            tx.log.push(Write::Restore { table: *table, id });
            Ok(affected)
        })
        .await
    }

    async fn delete(&self, table: &Table, ids: &[u64]) -> RepositoryResult<u64> {
        self.with_state(|tx| {
            let affected = tx.working.delete(table, ids);
            tx.log.push(Write::Delete {
                table: *table,
                ids: ids.to_vec(),
            });
            Ok(affected)
        })
        .await
    }

    async fn begin(&self) -> RepositoryResult<MemoryTransaction> {
        Err(RepositoryError::store("nested transactions are not supported"))
    }
}

impl StoreTransaction for MemoryTransaction {
    async fn commit(&self) -> RepositoryResult<()> {
        let TxState { log, .. } = self.state.lock().await.take().ok_or_else(finished)?;

        let mut shared = self.shared.lock().await;
        let mut staged = shared.clone();
        for write in log {
            staged.replay(&self.unique, write)?;
        }
        *shared = staged;
        Ok(())
    }

    async fn rollback(&self) -> RepositoryResult<()> {
        self.state
            .lock()
            .await
            .take()
            .map(drop)
            .ok_or_else(finished)
    }
}

impl Tables {
    /// Unknown filter or order columns are errors once a collection has been written
    fn check_selection(&self, selection: &Selection) -> RepositoryResult<Option<&Collection>> {
        let Some(collection) = self.collections.get(selection.table.name) else {
            return Ok(None);
        };
        for condition in &selection.conditions {
            collection.check_column(&selection.table, &condition.field)?;
        }
        if let Some((field, _)) = &selection.order_by {
            collection.check_column(&selection.table, field)?;
        }
        Ok(Some(collection))
    }

    fn fetch(&self, selection: &Selection) -> RepositoryResult<Vec<Row>> {
        let Some(collection) = self.check_selection(selection)? else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<&Row> = collection
            .rows
            .values()
            .filter(|row| is_selected(row, selection))
            .collect();

        if let Some((field, direction)) = &selection.order_by {
            rows.sort_by(|a, b| {
                let ordering = compare(field_value(a, field), field_value(b, field))
                    .unwrap_or(Ordering::Equal);
                match direction {
                    OrderDirection::Ascending => ordering,
                    OrderDirection::Descending => ordering.reverse(),
                }
            });
        }

        let offset = usize::try_from(selection.offset.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = selection
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));

        Ok(rows.into_iter().skip(offset).take(limit).cloned().collect())
    }

    fn count(&self, selection: &Selection) -> RepositoryResult<u64> {
        Ok(self.check_selection(selection)?.map_or(0, |collection| {
            collection
                .rows
                .values()
                .filter(|row| is_selected(row, selection))
                .count() as u64
        }))
    }

    fn check_insert(&self, unique: &UniqueColumns, table: &Table, rows: &[Row]) -> RepositoryResult<()> {
        let existing = self
            .collections
            .get(table.name)
            .map(|collection| collection.rows.values().collect::<Vec<_>>())
            .unwrap_or_default();
        for (i, row) in rows.iter().enumerate() {
            check_unique(
                unique,
                table,
                existing.iter().copied().chain(rows[..i].iter()),
                row,
                None,
            )?;
        }
        Ok(())
    }

    fn allocate_ids(&mut self, table: &Table, n: usize) -> Vec<u64> {
        let collection = self.collections.entry(table.name).or_default();
        (0..n)
            .map(|_| {
                collection.last_id += 1;
                collection.last_id
            })
            .collect()
    }

    fn apply_insert(&mut self, table: &Table, rows: Vec<(u64, Row)>) {
        let collection = self.collections.entry(table.name).or_default();
        for (id, mut row) in rows {
            collection.record_columns(table, &row);
            row.insert(ID.to_string(), Value::from(id));
            if table.soft_delete {
                row.insert(DELETED_AT.to_string(), Value::Null);
            }
            collection.last_id = collection.last_id.max(id);
            collection.rows.insert(id, row);
        }
    }

    fn update(
        &mut self,
        unique: &UniqueColumns,
        table: &Table,
        id: u64,
        mut row: Row,
    ) -> RepositoryResult<u64> {
        let Some(collection) = self.collections.get_mut(table.name) else {
            return Ok(0);
        };
        let Some(existing) = collection.rows.get(&id) else {
            return Ok(0);
        };
        if table.soft_delete && is_deleted(existing) {
            return Ok(0);
        }

        check_unique(unique, table, collection.rows.values(), &row, Some(id))?;

        let marker = existing.get(DELETED_AT).cloned().unwrap_or(Value::Null);
        collection.record_columns(table, &row);
        row.insert(ID.to_string(), Value::from(id));
        if table.soft_delete {
            row.insert(DELETED_AT.to_string(), marker);
        }
        collection.rows.insert(id, row);
        Ok(1)
    }

    fn soft_delete(&mut self, table: &Table, ids: &[u64], at: &Value) -> u64 {
        let Some(collection) = self.collections.get_mut(table.name) else {
            return 0;
        };
        let mut affected = 0;
        for id in ids {
            if let Some(row) = collection.rows.get_mut(id) {
                if !is_deleted(row) {
                    row.insert(DELETED_AT.to_string(), at.clone());
                    affected += 1;
                }
            }
        }
        affected
    }

    fn restore(&mut self, table: &Table, id: u64) -> u64 {
        let Some(row) = self
            .collections
            .get_mut(table.name)
            .and_then(|collection| collection.rows.get_mut(&id))
        else {
            return 0;
        };
        if is_deleted(row) {
            row.insert(DELETED_AT.to_string(), Value::Null);
            1
        } else {
            0
        }
    }

    fn delete(&mut self, table: &Table, ids: &[u64]) -> u64 {
        let Some(collection) = self.collections.get_mut(table.name) else {
            return 0;
        };
        ids.iter()
            .filter(|id| collection.rows.remove(id).is_some())
            .count() as u64
    }

    fn replay(&mut self, unique: &UniqueColumns, write: Write) -> RepositoryResult<()> {
        match write {
            Write::Insert { table, rows } => {
                let plain: Vec<Row> = rows.iter().map(|(_, row)| row.clone()).collect();
                self.check_insert(unique, &table, &plain)?;
                self.apply_insert(&table, rows);
            }
            Write::Update { table, id, row } => {
                self.update(unique, &table, id, row)?;
            }
            Write::SoftDelete { table, ids, at } => {
                self.soft_delete(&table, &ids, &at);
            }
            Write::Restore { table, id } => {
                self.restore(&table, id);
            }
            Write::Delete { table, ids } => {
                self.delete(&table, &ids);
            }
        }
        Ok(())
    }
}

fn check_unique<'a>(
    unique: &UniqueColumns,
    table: &Table,
    existing: impl Iterator<Item = &'a Row>,
    row: &Row,
    skip_id: Option<u64>,
) -> RepositoryResult<()> {
    let Some(fields) = unique.get(table.name) else {
        return Ok(());
    };
    let existing: Vec<&Row> = existing
        .filter(|other| skip_id.is_none() || row_id(other) != skip_id)
        .collect();
    for field in fields {
        let value = field_value(row, field);
        if value.is_null() {
            continue;
        }
        if existing.iter().any(|other| field_value(other, field) == value) {
            return Err(RepositoryError::already_exists(format!(
                "duplicate value for {}.{}",
                table.name, field
            )));
        }
    }
    Ok(())
}

fn is_selected(row: &Row, selection: &Selection) -> bool {
    if selection.hides_deleted() && is_deleted(row) {
        return false;
    }
    selection.conditions.iter().all(|condition| matches(row, condition))
}

fn is_deleted(row: &Row) -> bool {
    !field_value(row, DELETED_AT).is_null()
}

fn row_id(row: &Row) -> Option<u64> {
    field_value(row, ID).as_u64()
}

fn field_value<'a>(row: &'a Row, field: &str) -> &'a Value {
    row.get(field).unwrap_or(&Value::Null)
}

fn matches(row: &Row, condition: &FilterCondition) -> bool {
    let actual = field_value(row, &condition.field);
    let expected = condition.value.to_json();
    match condition.operator {
        FilterOperator::Equal => compare(actual, &expected) == Some(Ordering::Equal),
        FilterOperator::In => contains(&expected, actual),
        FilterOperator::NotIn => !contains(&expected, actual),
        FilterOperator::GreaterThanOrEqual => !actual.is_null()
            && matches!(compare(actual, &expected), Some(Ordering::Greater | Ordering::Equal)),
        FilterOperator::LessThanOrEqual => !actual.is_null()
            && matches!(compare(actual, &expected), Some(Ordering::Less | Ordering::Equal)),
        FilterOperator::IsNull => actual.is_null(),
    }
}

fn contains(list: &Value, actual: &Value) -> bool {
    list.as_array().is_some_and(|items| {
        items
            .iter()
            .any(|item| compare(actual, item) == Some(Ordering::Equal))
    })
}

/// Ordering between stored and filter values
///
/// Nulls sort first. Strings holding RFC 3339 timestamps compare as instants
/// and strings holding numbers compare numerically against numbers, since
/// filters built from query strings arrive untyped.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => match (parse_instant(x), parse_instant(y)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => Some(x.cmp(y)),
        },
        (Value::Number(x), Value::String(y)) => {
            let y: f64 = y.trim().parse().ok()?;
            x.as_f64()?.partial_cmp(&y)
        }
        (Value::String(x), Value::Number(y)) => {
            let x: f64 = x.trim().parse().ok()?;
            x.partial_cmp(&y.as_f64()?)
        }
        (Value::Bool(x), Value::String(y)) => Some(x.cmp(&y.parse().ok()?)),
        (Value::String(x), Value::Bool(y)) => Some(x.parse::<bool>().ok()?.cmp(y)),
        _ => None,
    }
}

fn compare_numbers(x: &serde_json::Number, y: &serde_json::Number) -> Option<Ordering> {
    match (x.as_i64(), y.as_i64()) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => match (x.as_u64(), y.as_u64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
    }
}

fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
