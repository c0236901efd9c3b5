//! Query execution engine.
//!
//! `QueryExecutor` issues statements on one connection and provides the
//! accessor shapes callers use:
//! - `exec`: all rows
//! - `get`: zero or one row
//! - `proc`: affected-row count
//! - `func`: a single scalar
//! - `map`: rows keyed by a column
//! - `insert` / `upsert` / `update`: synthesized statements from a schema
//!
//! Every call is timed and logged through the injected [`QueryLogger`] unless
//! the SQL starts with `!`, which is stripped before execution. Every failure is
//! translated (see [`DbError::translate`]) and logged with its query text and
//! arguments before it propagates.

use crate::db::connection::{Connection, RawRows};
use crate::db::logger::{QueryKind, QueryLogger, QueryOutcome, reindent};
use crate::db::normalize::{NormalizeOptions, Row, normalize};
use crate::db::params::QueryParam;
use crate::db::schema::{Entity, Record, Schema, to_record};
use crate::db::statement::{self, Statement};
use crate::error::{DbError, DbResult};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Leading marker that silences per-call logging.
pub const QUIET_PREFIX: char = '!';

/// Rows returned by [`QueryExecutor::exec`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub rows: Vec<Row>,
    pub row_count: usize,
}

impl QueryOutput {
    fn new(rows: Vec<Row>) -> Self {
        Self {
            row_count: rows.len(),
            rows,
        }
    }
}

/// An in-flight call: the SQL to send and whether to log it.
struct Call<'s> {
    kind: QueryKind,
    sql: &'s str,
    quiet: bool,
    started: Instant,
}

/// Split the quiet marker off a statement.
fn split_quiet(sql: &str) -> (&str, bool) {
    match sql.strip_prefix(QUIET_PREFIX) {
        Some(rest) => (rest, true),
        None => (sql, false),
    }
}

/// Query executor bound to a single connection.
pub struct QueryExecutor<C: Connection> {
    connection: C,
    logger: Arc<dyn QueryLogger>,
}

impl<C: Connection> QueryExecutor<C> {
    pub fn new(connection: C, logger: Arc<dyn QueryLogger>) -> Self {
        Self { connection, logger }
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    pub fn into_connection(self) -> C {
        self.connection
    }

    fn start<'s>(&self, kind: QueryKind, sql: &'s str, params: &[QueryParam]) -> Call<'s> {
        let (sql, quiet) = split_quiet(sql);
        if !quiet {
            self.logger.statement(kind, &reindent(sql), params);
        }
        Call {
            kind,
            sql,
            quiet,
            started: Instant::now(),
        }
    }

    fn finish(&self, call: &Call<'_>, outcome: QueryOutcome) {
        if !call.quiet {
            self.logger
                .completed(call.kind, &outcome, call.started.elapsed());
        }
    }

    fn fail(&self, call: &Call<'_>, params: &[QueryParam], err: DbError) -> DbError {
        let err = err.translate();
        self.logger
            .failed(call.kind, &reindent(call.sql), params, &err);
        err
    }

    async fn fetch(
        &mut self,
        kind: QueryKind,
        sql: &str,
        params: &[QueryParam],
        options: NormalizeOptions,
    ) -> DbResult<Vec<Row>> {
        let call = self.start(kind, sql, params);
        match self.connection.fetch(call.sql, params).await {
            Ok(raw) => {
                let mut rows = raw.into_maps();
                normalize(&mut rows, options);
                self.finish(&call, QueryOutcome::Rows(rows.len()));
                Ok(rows)
            }
            Err(e) => Err(self.fail(&call, params, e)),
        }
    }

    /// Execute a parameterized statement and return all (normalized) rows.
    pub async fn exec(
        &mut self,
        sql: &str,
        args: &[QueryParam],
        options: NormalizeOptions,
    ) -> DbResult<QueryOutput> {
        let rows = self.fetch(QueryKind::Query, sql, args, options).await?;
        Ok(QueryOutput::new(rows))
    }

    /// Execute a statement expected to return at most one row.
    ///
    /// More than one row is an internal-consistency error.
    pub async fn get(
        &mut self,
        sql: &str,
        args: &[QueryParam],
        options: NormalizeOptions,
    ) -> DbResult<Option<Row>> {
        let mut rows = self.fetch(QueryKind::Query, sql, args, options).await?;
        if rows.len() > 1 {
            let (sql, _) = split_quiet(sql);
            let err = DbError::internal(format!(
                "get() expected at most one row, got {}",
                rows.len()
            ));
            self.logger
                .failed(QueryKind::Query, &reindent(sql), args, &err);
            return Err(err);
        }
        Ok(rows.pop())
    }

    /// Execute a statement without a row payload; returns the affected-row count.
    pub async fn proc(&mut self, sql: &str, args: &[QueryParam]) -> DbResult<u64> {
        let call = self.start(QueryKind::Proc, sql, args);
        match self.connection.execute(call.sql, args).await {
            Ok(affected) => {
                self.finish(&call, QueryOutcome::Affected(affected));
                Ok(affected)
            }
            Err(e) => Err(self.fail(&call, args, e)),
        }
    }

    /// Run a transaction-control statement (BEGIN, COMMIT, ...).
    pub(crate) async fn control(&mut self, sql: &str) -> DbResult<()> {
        let call = self.start(QueryKind::Transaction, sql, &[]);
        match self.connection.execute(call.sql, &[]).await {
            Ok(_) => {
                self.finish(&call, QueryOutcome::Affected(0));
                Ok(())
            }
            Err(e) => Err(self.fail(&call, &[], e)),
        }
    }

    /// Execute a statement returning exactly one row with exactly one column.
    pub async fn func(&mut self, sql: &str, args: &[QueryParam]) -> DbResult<JsonValue> {
        let call = self.start(QueryKind::Func, sql, args);
        let raw = match self.connection.fetch(call.sql, args).await {
            Ok(raw) => raw,
            Err(e) => return Err(self.fail(&call, args, e)),
        };
        match scalar(raw) {
            Ok(value) => {
                self.finish(&call, QueryOutcome::Scalar(value.to_string()));
                Ok(value)
            }
            Err(e) => Err(self.fail(&call, args, e)),
        }
    }

    /// Execute a query and key the rows by the value of `key`.
    ///
    /// Later rows overwrite earlier ones with the same key. Rows without the
    /// key column are skipped.
    pub async fn map(
        &mut self,
        sql: &str,
        key: &str,
        args: &[QueryParam],
    ) -> DbResult<HashMap<String, Row>> {
        let rows = self
            .fetch(QueryKind::Map, sql, args, NormalizeOptions::default())
            .await?;
        Ok(key_rows(rows, key))
    }

    async fn returning(&mut self, kind: QueryKind, stmt: Statement) -> DbResult<Option<Row>> {
        let mut rows = self
            .fetch(kind, &stmt.sql, &[], NormalizeOptions::default())
            .await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Insert a record; returns the inserted columns.
    pub async fn insert(&mut self, table: &str, schema: &Schema, record: &Record) -> DbResult<Row> {
        let stmt = statement::insert(table, schema, record)?;
        self.returning(QueryKind::Insert, stmt)
            .await?
            .ok_or_else(|| DbError::internal(format!("INSERT into '{}' returned no row", table)))
    }

    /// Insert or update a record by its key; returns the non-key columns.
    pub async fn upsert(&mut self, table: &str, schema: &Schema, record: &Record) -> DbResult<Row> {
        let stmt = statement::upsert(table, schema, record)?;
        self.returning(QueryKind::Upsert, stmt)
            .await?
            .ok_or_else(|| DbError::internal(format!("UPSERT into '{}' returned no row", table)))
    }

    /// Update a record by its key; `None` when no row matched.
    pub async fn update(
        &mut self,
        table: &str,
        schema: &Schema,
        record: &Record,
    ) -> DbResult<Option<Row>> {
        let stmt = statement::update(table, schema, record)?;
        self.returning(QueryKind::Update, stmt).await
    }

    pub async fn insert_entity<T: Entity + Serialize>(&mut self, value: &T) -> DbResult<Row> {
        let record = to_record(value)?;
        self.insert(T::TABLE, T::schema(), &record).await
    }

    pub async fn upsert_entity<T: Entity + Serialize>(&mut self, value: &T) -> DbResult<Row> {
        let record = to_record(value)?;
        self.upsert(T::TABLE, T::schema(), &record).await
    }

    pub async fn update_entity<T: Entity + Serialize>(&mut self, value: &T) -> DbResult<Option<Row>> {
        let record = to_record(value)?;
        self.update(T::TABLE, T::schema(), &record).await
    }
}

/// Extract the single value of a one-row, one-column result.
fn scalar(raw: RawRows) -> DbResult<JsonValue> {
    let shape = (raw.len(), raw.rows.first().map(|row| row.values.len()));
    match shape {
        (1, Some(1)) => Ok(raw
            .rows
            .into_iter()
            .flat_map(|row| row.values)
            .next()
            .unwrap_or(JsonValue::Null)),
        (rows, cols) => Err(DbError::internal(format!(
            "func() expected 1 row with 1 column, got {} rows with {} columns",
            rows,
            cols.unwrap_or(0)
        ))),
    }
}

fn key_rows(rows: Vec<Row>, key: &str) -> HashMap<String, Row> {
    let mut keyed = HashMap::with_capacity(rows.len());
    for row in rows {
        let id = match row.get(key) {
            Some(JsonValue::String(s)) => s.clone(),
            Some(JsonValue::Null) | None => {
                warn!(key = %key, "map(): row without key column skipped");
                continue;
            }
            Some(other) => other.to_string(),
        };
        keyed.insert(id, row);
    }
    keyed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: JsonValue) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_split_quiet() {
        assert_eq!(split_quiet("!SELECT 1"), ("SELECT 1", true));
        assert_eq!(split_quiet("SELECT 1"), ("SELECT 1", false));
        assert_eq!(split_quiet(" !SELECT 1"), (" !SELECT 1", false));
    }

    #[test]
    fn test_scalar_shapes() {
        let one = RawRows::new(vec!["n".into()], vec![vec![json!(42)]]);
        assert_eq!(scalar(one).unwrap(), json!(42));

        let two_rows = RawRows::new(vec!["n".into()], vec![vec![json!(1)], vec![json!(2)]]);
        assert!(matches!(scalar(two_rows), Err(DbError::Internal { .. })));

        let two_cols = RawRows::new(vec!["a".into(), "b".into()], vec![vec![json!(1), json!(2)]]);
        assert!(matches!(scalar(two_cols), Err(DbError::Internal { .. })));

        assert!(matches!(scalar(RawRows::default()), Err(DbError::Internal { .. })));
    }

    #[test]
    fn test_key_rows_last_wins() {
        let keyed = key_rows(
            vec![
                row(json!({"id": 1, "v": "first"})),
                row(json!({"id": 2, "v": "other"})),
                row(json!({"id": 1, "v": "second"})),
            ],
            "id",
        );
        assert_eq!(keyed.len(), 2);
        assert_eq!(keyed["1"].get("v"), Some(&json!("second")));
    }

    #[test]
    fn test_key_rows_string_keys_and_missing() {
        let keyed = key_rows(
            vec![row(json!({"code": "A"})), row(json!({"other": 1}))],
            "code",
        );
        assert_eq!(keyed.len(), 1);
        assert!(keyed.contains_key("A"));
    }
}
