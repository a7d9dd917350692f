//! `AsyncConnection` over an sqlx SQLite connection.

use std::future::Future;
use std::ops::DerefMut;
use std::time::Duration;

use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqliteConnection, TypeInfo, ValueRef};
use tracing::debug;

use sqlweave_core::builder::Parameter;
use sqlweave_core::execution::{AsyncConnection, Command, RowSet};
use sqlweave_core::token::CommandType;
use sqlweave_core::{Result, SqlValue, WeaveError};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Runs commands on one SQLite connection.
///
/// `C` is anything that dereferences to a [`SqliteConnection`]: a pooled
/// connection, a transaction, or a plain connection borrow.
pub struct SqliteSession<C> {
    conn: C,
}

impl<C> SqliteSession<C>
where
    C: DerefMut<Target = SqliteConnection>,
{
    /// Wraps a connection.
    pub const fn new(conn: C) -> Self {
        Self { conn }
    }

    /// Returns the wrapped connection.
    pub fn into_inner(self) -> C {
        self.conn
    }

    fn query<'q>(command: &Command<'q>) -> Result<SqliteQuery<'q>> {
        if command.command_type == CommandType::StoredProcedure {
            return Err(WeaveError::unsupported("SQLite", "stored procedures"));
        }
        Ok(command
            .parameters
            .iter()
            .fold(sqlx::query(command.text), bind_param))
    }
}

fn bind_param<'q>(query: SqliteQuery<'q>, parameter: &Parameter) -> SqliteQuery<'q> {
    match &parameter.value {
        SqlValue::Null => query.bind(Option::<i64>::None),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Blob(b) => query.bind(b.clone()),
        SqlValue::Timestamp(t) => query.bind(*t),
    }
}

/// Applies the command timeout, if any, to a driver call.
async fn run<T, F>(timeout: Option<Duration>, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| WeaveError::Cancelled)?
            .map_err(WeaveError::driver),
        None => call.await.map_err(WeaveError::driver),
    }
}

/// Reads one value by the storage class SQLite reports for it.
fn read_value(row: &SqliteRow, index: usize) -> Result<SqlValue> {
    let storage = {
        let raw = row.try_get_raw(index).map_err(WeaveError::driver)?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        raw.type_info().name().to_ascii_uppercase()
    };
    let value = match storage.as_str() {
        "INTEGER" | "INT" | "INT8" | "BIGINT" => {
            SqlValue::Int(row.try_get(index).map_err(WeaveError::driver)?)
        }
        "BOOLEAN" => SqlValue::Bool(row.try_get(index).map_err(WeaveError::driver)?),
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
            SqlValue::Float(row.try_get(index).map_err(WeaveError::driver)?)
        }
        "BLOB" => SqlValue::Blob(row.try_get(index).map_err(WeaveError::driver)?),
        _ => SqlValue::Text(row.try_get(index).map_err(WeaveError::driver)?),
    };
    Ok(value)
}

fn read_rows(rows: &[SqliteRow]) -> Result<RowSet> {
    let columns = rows.first().map_or_else(Vec::new, |row| {
        row.columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect()
    });
    let values = rows
        .iter()
        .map(|row| {
            (0..row.len())
                .map(|i| read_value(row, i))
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<Vec<SqlValue>>>>()?;
    Ok(RowSet::new(columns, values))
}

impl<C> AsyncConnection for SqliteSession<C>
where
    C: DerefMut<Target = SqliteConnection>,
{
    async fn execute_non_query(&mut self, command: &Command<'_>) -> Result<u64> {
        let query = Self::query(command)?;
        let result = run(command.timeout, query.execute(&mut *self.conn)).await?;
        debug!(rows = result.rows_affected(), "sqlite non-query");
        Ok(result.rows_affected())
    }

    async fn execute_scalar(&mut self, command: &Command<'_>) -> Result<SqlValue> {
        let query = Self::query(command)?;
        let row = run(command.timeout, query.fetch_optional(&mut *self.conn)).await?;
        match row {
            Some(row) if !row.is_empty() => read_value(&row, 0),
            _ => Ok(SqlValue::Null),
        }
    }

    async fn execute_reader(&mut self, command: &Command<'_>) -> Result<RowSet> {
        let query = Self::query(command)?;
        let rows = run(command.timeout, query.fetch_all(&mut *self.conn)).await?;
        debug!(rows = rows.len(), "sqlite reader");
        read_rows(&rows)
    }
}
