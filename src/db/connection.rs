//! Transport seam between the executor and the driver.
//!
//! The executor and session only need three primitives: acquire a connection,
//! run a statement on it, and give it back. [`Connection`] and
//! [`ConnectionPool`] capture those; sqlx's `PgPool` implements them.

use crate::db::normalize::Row;
use crate::db::params::{QueryParam, bind_postgres_param};
use crate::error::{DbError, DbResult};
use serde_json::Value as JsonValue;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use std::future::Future;
use std::sync::Arc;

/// One driver row, labelled by the result set it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub columns: Arc<[String]>,
    pub values: Vec<JsonValue>,
}

/// Rows as returned by the driver, before normalization.
///
/// Values are positional so callers can check the column count of each row.
/// Multi-statement text yields rows from several result sets, so labels are
/// kept per row rather than once for the whole batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRows {
    pub rows: Vec<RawRow>,
}

impl RawRows {
    /// Rows of a single result set.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<JsonValue>>) -> Self {
        let columns: Arc<[String]> = columns.into();
        Self {
            rows: rows
                .into_iter()
                .map(|values| RawRow {
                    columns: Arc::clone(&columns),
                    values,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Convert positional rows into column-keyed maps.
    ///
    /// A repeated column name keeps the last value.
    pub fn into_maps(self) -> Vec<Row> {
        self.rows
            .into_iter()
            .map(|row| row.columns.iter().cloned().zip(row.values).collect())
            .collect()
    }
}

/// A single database connection able to run statements.
pub trait Connection: Send {
    /// Run a statement and collect its rows.
    fn fetch(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> impl Future<Output = DbResult<RawRows>> + Send;

    /// Run a statement and return the number of affected rows.
    fn execute(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> impl Future<Output = DbResult<u64>> + Send;
}

/// Source of connections. Sizing, health checks and queuing belong to the pool.
pub trait ConnectionPool: Send + Sync {
    type Connection: Connection;

    fn acquire(&self) -> impl Future<Output = DbResult<Self::Connection>> + Send;

    /// Return a connection. Takes ownership so it cannot be used afterwards.
    fn release(&self, connection: Self::Connection);
}

impl Connection for PoolConnection<Postgres> {
    async fn fetch(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<RawRows> {
        // Without params, run raw SQL (simple protocol) so multi-statement text works
        let rows = if params.is_empty() {
            use sqlx::Executor;
            (&mut **self).fetch_all(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            query.fetch_all(&mut **self).await?
        };
        Ok(RawRows::from_pg_rows(&rows))
    }

    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let result = if params.is_empty() {
            use sqlx::Executor;
            (&mut **self).execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            query.execute(&mut **self).await?
        };
        Ok(result.rows_affected())
    }
}

impl ConnectionPool for PgPool {
    type Connection = PoolConnection<Postgres>;

    async fn acquire(&self) -> DbResult<Self::Connection> {
        sqlx::Pool::acquire(self).await.map_err(DbError::from)
    }

    fn release(&self, connection: Self::Connection) {
        // Dropping a PoolConnection hands it back to its pool.
        drop(connection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_maps() {
        let raw = RawRows::new(
            vec!["id".into(), "name".into()],
            vec![vec![json!(1), json!("a")], vec![json!(2), JsonValue::Null]],
        );
        let maps = raw.into_maps();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0].get("name"), Some(&json!("a")));
        assert_eq!(maps[1].get("name"), Some(&JsonValue::Null));
    }

    #[test]
    fn test_into_maps_keeps_labels_per_result_set() {
        let first = RawRows::new(vec!["a".into()], vec![vec![json!(1)]]);
        let second = RawRows::new(vec!["b".into(), "c".into()], vec![vec![json!("x"), json!(2)]]);
        let raw = RawRows {
            rows: [first.rows, second.rows].concat(),
        };
        let maps = raw.into_maps();
        assert_eq!(JsonValue::Object(maps[0].clone()), json!({"a": 1}));
        assert_eq!(JsonValue::Object(maps[1].clone()), json!({"b": "x", "c": 2}));
    }

    #[test]
    fn test_into_maps_empty() {
        assert!(RawRows::default().into_maps().is_empty());
    }
}
