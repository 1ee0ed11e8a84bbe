//! `DatabaseAdapter` over a `sqlx` SQLite pool.
//!
//! Repositories talk to this adapter in positional-parameter SQL; the pool
//! itself (pragmas, migrations) comes from [`crate::db`].

use async_trait::async_trait;
use bridge_traits::database::{DatabaseAdapter, QueryRow, QueryValue};
use bridge_traits::error::{BridgeError, Result};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqlitePool};
use tracing::debug;

use crate::db;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

pub struct SqliteAdapter {
    pool: SqlitePool,
}

impl SqliteAdapter {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn bind_all<'q>(sql: &'q str, params: &'q [QueryValue]) -> SqliteQuery<'q> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| match param {
            QueryValue::Null => query.bind(None::<i64>),
            QueryValue::Integer(value) => query.bind(*value),
            QueryValue::Real(value) => query.bind(*value),
            QueryValue::Text(value) => query.bind(value.as_str()),
            QueryValue::Blob(value) => query.bind(value.as_slice()),
        })
}

/// Columns decode as the first of integer, real, text or blob that fits.
fn decode_row(row: &SqliteRow) -> QueryRow {
    row.columns()
        .iter()
        .map(|column| {
            let index = column.ordinal();
            let value = if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
                value.map(QueryValue::Integer)
            } else if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
                value.map(QueryValue::Real)
            } else if let Ok(value) = row.try_get::<Option<String>, _>(index) {
                value.map(QueryValue::Text)
            } else {
                row.try_get::<Option<Vec<u8>>, _>(index)
                    .ok()
                    .flatten()
                    .map(QueryValue::Blob)
            };
            (column.name().to_string(), value.unwrap_or(QueryValue::Null))
        })
        .collect()
}

fn failed(context: &'static str) -> impl Fn(sqlx::Error) -> BridgeError {
    move |e| BridgeError::Database(format!("{}: {}", context, e))
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    async fn health_check(&self) -> Result<()> {
        db::health_check(&self.pool)
            .await
            .map_err(|e| BridgeError::Database(format!("health check failed: {}", e)))
    }

    async fn query(&self, query: &str, params: &[QueryValue]) -> Result<Vec<QueryRow>> {
        let rows = bind_all(query, params)
            .fetch_all(&self.pool)
            .await
            .map_err(failed("query failed"))?;
        debug!(rows = rows.len(), "Query returned");
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn execute(&self, statement: &str, params: &[QueryValue]) -> Result<u64> {
        let outcome = bind_all(statement, params)
            .execute(&self.pool)
            .await
            .map_err(failed("statement failed"))?;
        Ok(outcome.rows_affected())
    }

    async fn query_one_optional(
        &self,
        query: &str,
        params: &[QueryValue],
    ) -> Result<Option<QueryRow>> {
        let row = bind_all(query, params)
            .fetch_optional(&self.pool)
            .await
            .map_err(failed("query failed"))?;
        Ok(row.as_ref().map(decode_row))
    }

    async fn query_one(&self, query: &str, params: &[QueryValue]) -> Result<QueryRow> {
        let row = bind_all(query, params)
            .fetch_one(&self.pool)
            .await
            .map_err(failed("query failed"))?;
        Ok(decode_row(&row))
    }
}
