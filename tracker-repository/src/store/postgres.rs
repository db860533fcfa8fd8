//! PostgreSQL store
//!
//! Rows are read as `to_jsonb(t)` and written through `jsonb_populate_record`,
//! so the table's own column types drive conversion. Column and table names
//! are validated and quoted before they reach the query text; every value is
//! bound.

use std::sync::Arc;

use serde_json::Value;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row as _, Transaction};
use tokio::sync::Mutex;

use super::{Row, Selection, Store, StoreTransaction, Table, DELETED_AT, ID};
use crate::config::DatabaseConfig;
use crate::repository::{
    FilterCondition, FilterOperator, FilterValue, OrderDirection, RepositoryError,
    RepositoryResult,
};

/// Store backed by a PostgreSQL connection pool
///
/// Every table is expected to have a `bigserial` `id` column, and soft-delete
/// tables a nullable `deleted_at timestamptz` column.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build the pool from configuration, retrying as configured
    pub async fn connect(config: &DatabaseConfig) -> crate::error::Result<Self> {
        Ok(Self::new(crate::database::create_pool(config).await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn connection(&self) -> RepositoryResult<sqlx::pool::PoolConnection<Postgres>> {
        self.pool.acquire().await.map_err(map_sqlx_error)
    }
}

impl Store for PgStore {
    type Tx = PgTransaction;

    async fn fetch(&self, selection: &Selection) -> RepositoryResult<Vec<Row>> {
        let mut conn = self.connection().await?;
        fetch(&mut conn, selection).await
    }

    async fn count(&self, selection: &Selection) -> RepositoryResult<u64> {
        let mut conn = self.connection().await?;
        count(&mut conn, selection).await
    }

    async fn insert(&self, table: &Table, rows: Vec<Row>) -> RepositoryResult<Vec<u64>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let ids = insert(&mut tx, table, rows).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(ids)
    }

    async fn update(&self, table: &Table, id: u64, row: Row) -> RepositoryResult<u64> {
        let mut conn = self.connection().await?;
        update(&mut conn, table, id, row).await
    }

    async fn soft_delete(&self, table: &Table, ids: &[u64]) -> RepositoryResult<u64> {
        let mut conn = self.connection().await?;
        soft_delete(&mut conn, table, ids).await
    }

    async fn restore(&self, table: &Table, id: u64) -> RepositoryResult<u64> {
        let mut conn = self.connection().await?;
        restore(&mut conn, table, id).await
    }

    async fn delete(&self, table: &Table, ids: &[u64]) -> RepositoryResult<u64> {
        let mut conn = self.connection().await?;
        delete(&mut conn, table, ids).await
    }

    async fn begin(&self) -> RepositoryResult<PgTransaction> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(PgTransaction {
            tx: Arc::new(Mutex::new(Some(tx))),
        })
    }
}

/// Store bound to one open PostgreSQL transaction
///
/// Dropping every clone without committing rolls the transaction back.
#[derive(Clone)]
pub struct PgTransaction {
    tx: Arc<Mutex<Option<Transaction<'static, Postgres>>>>,
}

impl std::fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTransaction").finish_non_exhaustive()
    }
}

fn finished() -> RepositoryError {
    RepositoryError::store("transaction already finished")
}

impl Store for PgTransaction {
    type Tx = PgTransaction;

    async fn fetch(&self, selection: &Selection) -> RepositoryResult<Vec<Row>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        fetch(tx, selection).await
    }

    async fn count(&self, selection: &Selection) -> RepositoryResult<u64> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        count(tx, selection).await
    }

    async fn insert(&self, table: &Table, rows: Vec<Row>) -> RepositoryResult<Vec<u64>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        insert(tx, table, rows).await
    }

    async fn update(&self, table: &Table, id: u64, row: Row) -> RepositoryResult<u64> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        update(tx, table, id, row).await
    }

    async fn soft_delete(&self, table: &Table, ids: &[u64]) -> RepositoryResult<u64> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        soft_delete(tx, table, ids).await
    }

    async fn restore(&self, table: &Table, id: u64) -> RepositoryResult<u64> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        restore(tx, table, id).await
    }

    async fn delete(&self, table: &Table, ids: &[u64]) -> RepositoryResult<u64> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or_else(finished)?;
        delete(tx, table, ids).await
    }

    async fn begin(&self) -> RepositoryResult<PgTransaction> {
        Err(RepositoryError::store("nested transactions are not supported"))
    }
}

impl StoreTransaction for PgTransaction {
    async fn commit(&self) -> RepositoryResult<()> {
        let tx = self.tx.lock().await.take().ok_or_else(finished)?;
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(&self) -> RepositoryResult<()> {
        let tx = self.tx.lock().await.take().ok_or_else(finished)?;
        tx.rollback().await.map_err(map_sqlx_error)
    }
}

async fn fetch(conn: &mut PgConnection, selection: &Selection) -> RepositoryResult<Vec<Row>> {
    let mut query = QueryBuilder::<Postgres>::new("SELECT to_jsonb(t) AS row FROM ");
    push_from(&mut query, selection)?;

    if let Some((field, direction)) = &selection.order_by {
        query.push(" ORDER BY t.").push(quote(field)?);
        query.push(match direction {
            OrderDirection::Ascending => " ASC",
            OrderDirection::Descending => " DESC",
        });
        // Stable pages when the ordered column has ties
        if field != ID {
            query.push(", t.").push(quote(ID)?).push(" ASC");
        }
    } else {
        query.push(" ORDER BY t.").push(quote(ID)?).push(" ASC");
    }
    if let Some(limit) = selection.limit {
        query.push(" LIMIT ").push_bind(to_db_int(limit)?);
    }
    if let Some(offset) = selection.offset {
        query.push(" OFFSET ").push_bind(to_db_int(offset)?);
    }

    let rows = query
        .build()
        .fetch_all(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;

    rows.iter()
        .map(|row| match row.try_get::<Value, _>("row").map_err(map_sqlx_error)? {
            Value::Object(map) => Ok(map),
            other => Err(RepositoryError::store(format!(
                "expected a row object, got {other}"
            ))),
        })
        .collect()
}

async fn count(conn: &mut PgConnection, selection: &Selection) -> RepositoryResult<u64> {
    let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM ");
    push_from(&mut query, selection)?;
    let total: i64 = query
        .build()
        .fetch_one(&mut *conn)
        .await
        .and_then(|row| row.try_get(0))
        .map_err(map_sqlx_error)?;
    Ok(u64::try_from(total).unwrap_or(0))
}

async fn insert(conn: &mut PgConnection, table: &Table, rows: Vec<Row>) -> RepositoryResult<Vec<u64>> {
    let name = quote(table.name)?;
    let mut ids = Vec::with_capacity(rows.len());
    for row in rows {
        let columns = column_list(&row)?;
        let mut query = QueryBuilder::<Postgres>::new("INSERT INTO ");
        query.push(&name);
        if columns.is_empty() {
            query.push(" DEFAULT VALUES");
        } else {
            query
                .push(format!(" ({columns}) SELECT {columns} FROM jsonb_populate_record(NULL::"))
                .push(&name)
                .push(", ")
                .push_bind(Value::Object(row))
                .push(")");
        }
        query.push(" RETURNING ").push(quote(ID)?);

        let id: i64 = query
            .build()
            .fetch_one(&mut *conn)
            .await
            .and_then(|row| row.try_get(0))
            .map_err(map_sqlx_error)?;
        ids.push(from_db_id(id)?);
    }
    Ok(ids)
}

async fn update(conn: &mut PgConnection, table: &Table, id: u64, row: Row) -> RepositoryResult<u64> {
    let name = quote(table.name)?;
    let columns = column_list(&row)?;
    if columns.is_empty() {
        // Nothing to write; still report whether the row is there
        let selection = Selection::new(*table)
            .with_condition(FilterCondition::in_ids(ID, vec![id]));
        return count(conn, &selection).await;
    }

    let mut query = QueryBuilder::<Postgres>::new("UPDATE ");
    query
        .push(&name)
        .push(format!(" SET ({columns}) = (SELECT {columns} FROM jsonb_populate_record(NULL::"))
        .push(&name)
        .push(", ")
        .push_bind(Value::Object(row))
        .push(")) WHERE ")
        .push(quote(ID)?)
        .push(" = ")
        .push_bind(to_db_int(id)?);
    if table.soft_delete {
        query.push(" AND ").push(quote(DELETED_AT)?).push(" IS NULL");
    }
    execute(conn, query).await
}

async fn soft_delete(conn: &mut PgConnection, table: &Table, ids: &[u64]) -> RepositoryResult<u64> {
    let mut query = QueryBuilder::<Postgres>::new("UPDATE ");
    query
        .push(quote(table.name)?)
        .push(" SET ")
        .push(quote(DELETED_AT)?)
        .push(" = now() WHERE ")
        .push(quote(ID)?)
        .push(" = ANY(")
        .push_bind(to_db_ids(ids)?)
        .push(") AND ")
        .push(quote(DELETED_AT)?)
        .push(" IS NULL");
    execute(conn, query).await
}

async fn restore(conn: &mut PgConnection, table: &Table, id: u64) -> RepositoryResult<u64> {
    let mut query = QueryBuilder::<Postgres>::new("UPDATE ");
    query
        .push(quote(table.name)?)
        .push(" SET ")
        .push(quote(DELETED_AT)?)
        .push(" = NULL WHERE ")
        .push(quote(ID)?)
        .push(" = ")
        .push_bind(to_db_int(id)?)
        .push(" AND ")
        .push(quote(DELETED_AT)?)
        .push(" IS NOT NULL");
    execute(conn, query).await
}

async fn delete(conn: &mut PgConnection, table: &Table, ids: &[u64]) -> RepositoryResult<u64> {
    let mut query = QueryBuilder::<Postgres>::new("DELETE FROM ");
    query
        .push(quote(table.name)?)
        .push(" WHERE ")
        .push(quote(ID)?)
        .push(" = ANY(")
        .push_bind(to_db_ids(ids)?)
        .push(")");
    execute(conn, query).await
}

async fn execute(conn: &mut PgConnection, mut query: QueryBuilder<'_, Postgres>) -> RepositoryResult<u64> {
    query
        .build()
        .execute(&mut *conn)
        .await
        .map(|done| done.rows_affected())
        .map_err(map_sqlx_error)
}

/// `"table" AS t WHERE ...` for the selection's predicates and visibility
fn push_from(query: &mut QueryBuilder<'_, Postgres>, selection: &Selection) -> RepositoryResult<()> {
    query
        .push(quote(selection.table.name)?)
        .push(" AS t WHERE TRUE");
    for condition in &selection.conditions {
        query.push(" AND ");
        push_condition(query, condition)?;
    }
    if selection.hides_deleted() {
        query.push(" AND t.").push(quote(DELETED_AT)?).push(" IS NULL");
    }
    Ok(())
}

fn push_condition(
    query: &mut QueryBuilder<'_, Postgres>,
    condition: &FilterCondition,
) -> RepositoryResult<()> {
    let column = format!("t.{}", quote(&condition.field)?);
    match (&condition.operator, &condition.value) {
        (FilterOperator::IsNull, _) | (FilterOperator::Equal, FilterValue::Null) => {
            query.push(column).push(" IS NULL");
        }
        (FilterOperator::In, FilterValue::IdList(ids)) => {
            query
                .push(column)
                .push(" = ANY(")
                .push_bind(to_db_ids(ids)?)
                .push(")");
        }
        (FilterOperator::NotIn, FilterValue::IdList(ids)) => {
            query
                .push("NOT (")
                .push(column)
                .push(" = ANY(")
                .push_bind(to_db_ids(ids)?)
                .push("))");
        }
        (FilterOperator::NotIn, value) => {
            query.push(column).push(" IS DISTINCT FROM ");
            push_value(query, value)?;
        }
        // Text values (query string filters) match any column type by its text form
        (FilterOperator::Equal | FilterOperator::In, FilterValue::String(s)) => {
            query.push(column).push("::text = ").push_bind(s.clone());
        }
        (FilterOperator::Equal | FilterOperator::In, value) => {
            query.push(column).push(" = ");
            push_value(query, value)?;
        }
        (FilterOperator::GreaterThanOrEqual, value) => {
            query.push(column).push(" >= ");
            push_value(query, value)?;
        }
        (FilterOperator::LessThanOrEqual, value) => {
            query.push(column).push(" <= ");
            push_value(query, value)?;
        }
    }
    Ok(())
}

fn push_value(query: &mut QueryBuilder<'_, Postgres>, value: &FilterValue) -> RepositoryResult<()> {
    match value {
        FilterValue::String(s) => query.push_bind(s.clone()),
        FilterValue::Integer(n) => query.push_bind(*n),
        FilterValue::Float(n) => query.push_bind(*n),
        FilterValue::Boolean(b) => query.push_bind(*b),
        FilterValue::Timestamp(t) => query.push_bind(*t),
        FilterValue::IdList(ids) => query.push_bind(to_db_ids(ids)?),
        FilterValue::Null => query.push("NULL"),
    };
    Ok(())
}

/// Comma separated, quoted column names of a row
fn column_list(row: &Row) -> RepositoryResult<String> {
    let columns = row
        .keys()
        .map(|key| quote(key))
        .collect::<RepositoryResult<Vec<_>>>()?;
    Ok(columns.join(", "))
}

/// Double-quote an identifier after checking it is a plain SQL name
fn quote(identifier: &str) -> RepositoryResult<String> {
    let mut chars = identifier.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && identifier.len() <= 63;
    if !valid {
        return Err(RepositoryError::validation_failed(format!(
            "invalid column or table name: {identifier:?}"
        )));
    }
    Ok(format!("\"{identifier}\""))
}

fn to_db_int(value: u64) -> RepositoryResult<i64> {
    i64::try_from(value)
        .map_err(|_| RepositoryError::validation_failed(format!("{value} is out of range")))
}

fn to_db_ids(ids: &[u64]) -> RepositoryResult<Vec<i64>> {
    ids.iter().copied().map(to_db_int).collect()
}

fn from_db_id(id: i64) -> RepositoryResult<u64> {
    u64::try_from(id).map_err(|_| RepositoryError::store(format!("negative identifier {id}")))
}

/// Translate a sqlx error into the repository's error kinds
fn map_sqlx_error(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::RowNotFound => RepositoryError::new(
            crate::repository::RepositoryOperation::GetById,
            crate::repository::RepositoryErrorKind::NotFound,
            "row not found",
        ),
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::already_exists(db.message().to_string())
        }
        sqlx::Error::PoolTimedOut => RepositoryError::timeout(
            crate::repository::RepositoryOperation::GetAll,
            "timed out waiting for a database connection",
        ),
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::Tls(_) => {
            RepositoryError::connection_failed(err.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => RepositoryError::serialization(
            crate::repository::RepositoryOperation::GetAll,
            err.to_string(),
        ),
        _ => RepositoryError::store(err.to_string()),
    }
}
