//! Per-call query logging.
//!
//! The executor decides *what* to log and hands it to an injected
//! [`QueryLogger`]; [`TracingQueryLogger`] forwards it to `tracing`.

use crate::db::params::QueryParam;
use crate::error::DbError;
use std::time::Duration;

/// Which accessor issued a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Query,
    Proc,
    Func,
    Map,
    Insert,
    Upsert,
    Update,
    Transaction,
}

impl QueryKind {
    /// One-letter tag used in log lines.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Query | Self::Map => "Q",
            Self::Proc => "P",
            Self::Func => "F",
            Self::Insert => "I",
            Self::Upsert => "U",
            Self::Update => "W",
            Self::Transaction => "T",
        }
    }
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// What a completed statement produced.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(usize),
    Affected(u64),
    Scalar(String),
}

impl std::fmt::Display for QueryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rows(n) => write!(f, "{} rows", n),
            Self::Affected(n) => write!(f, "{} affected", n),
            Self::Scalar(v) => f.write_str(v),
        }
    }
}

/// Receives per-call log events from the executor.
pub trait QueryLogger: Send + Sync {
    /// A statement is about to run. `sql` is already re-indented.
    fn statement(&self, kind: QueryKind, sql: &str, params: &[QueryParam]);

    /// A statement finished.
    fn completed(&self, kind: QueryKind, outcome: &QueryOutcome, elapsed: Duration);

    /// A statement failed. Called even when logging was suppressed for the call.
    fn failed(&self, kind: QueryKind, sql: &str, params: &[QueryParam], error: &DbError);
}

/// Default logger writing structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingQueryLogger;

impl QueryLogger for TracingQueryLogger {
    fn statement(&self, kind: QueryKind, sql: &str, params: &[QueryParam]) {
        tracing::debug!(kind = %kind, params = ?params, "{}: {}", kind, sql);
    }

    fn completed(&self, kind: QueryKind, outcome: &QueryOutcome, elapsed: Duration) {
        tracing::debug!(
            kind = %kind,
            elapsed_ms = elapsed.as_millis() as u64,
            "R: {} {} ms",
            outcome,
            elapsed.as_millis()
        );
    }

    fn failed(&self, kind: QueryKind, sql: &str, params: &[QueryParam], error: &DbError) {
        match error {
            DbError::Server(server) => tracing::info!(
                kind = %kind,
                error_code = %server.error_code,
                params = ?params,
                "E: {}",
                sql
            ),
            _ => tracing::warn!(kind = %kind, error = %error, params = ?params, "E: {}", sql),
        }
    }
}

/// Strip the indentation shared by all non-blank lines, and surrounding blank lines.
///
/// Statements written inline in indented Rust string literals read better in logs
/// this way.
pub fn reindent(sql: &str) -> String {
    let lines: Vec<&str> = sql.lines().collect();
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    let (Some(start), Some(end)) = (start, end) else {
        return String::new();
    };
    let lines = &lines[start..=end];

    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|l| {
            if l.trim().is_empty() {
                ""
            } else {
                l[indent..].trim_end()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
