//! In-memory connection pool and logger shared by the integration tests.

#![allow(dead_code)]

use pg_access::db::{
    Connection, ConnectionPool, QueryKind, QueryLogger, QueryOutcome, QueryParam, RawRows,
};
use pg_access::error::{DbError, DbResult};
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted reply for the next statement.
pub enum Reply {
    Rows(RawRows),
    Affected(u64),
    Fail(DbError),
}

#[derive(Default)]
struct PoolState {
    next_id: usize,
    acquired: Vec<usize>,
    released: Vec<usize>,
    replies: VecDeque<Reply>,
    statements: Vec<(usize, String, Vec<QueryParam>)>,
    fail_acquire: bool,
}

#[derive(Clone, Default)]
pub struct MockPool {
    state: Arc<Mutex<PoolState>>,
}

impl MockPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, reply: Reply) -> &Self {
        self.state.lock().unwrap().replies.push_back(reply);
        self
    }

    pub fn fail_acquire(&self) {
        self.state.lock().unwrap().fail_acquire = true;
    }

    pub fn acquired(&self) -> usize {
        self.state.lock().unwrap().acquired.len()
    }

    pub fn released(&self) -> usize {
        self.state.lock().unwrap().released.len()
    }

    pub fn released_ids(&self) -> Vec<usize> {
        self.state.lock().unwrap().released.clone()
    }

    /// SQL text of every statement sent, in order.
    pub fn statements(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .statements
            .iter()
            .map(|(_, sql, _)| sql.clone())
            .collect()
    }

    pub fn params(&self, index: usize) -> Vec<QueryParam> {
        self.state.lock().unwrap().statements[index].2.clone()
    }

    pub fn connection_ids(&self) -> Vec<usize> {
        self.state
            .lock()
            .unwrap()
            .statements
            .iter()
            .map(|(id, _, _)| *id)
            .collect()
    }
}

pub struct MockConnection {
    id: usize,
    state: Arc<Mutex<PoolState>>,
}

impl MockConnection {
    fn next(&self, sql: &str, params: &[QueryParam]) -> Option<Reply> {
        let mut state = self.state.lock().unwrap();
        state
            .statements
            .push((self.id, sql.to_string(), params.to_vec()));
        state.replies.pop_front()
    }
}

impl Connection for MockConnection {
    async fn fetch(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<RawRows> {
        match self.next(sql, params) {
            Some(Reply::Rows(rows)) => Ok(rows),
            Some(Reply::Affected(_)) | None => Ok(RawRows::default()),
            Some(Reply::Fail(e)) => Err(e),
        }
    }

    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        match self.next(sql, params) {
            Some(Reply::Affected(n)) => Ok(n),
            Some(Reply::Rows(rows)) => Ok(rows.len() as u64),
            None => Ok(0),
            Some(Reply::Fail(e)) => Err(e),
        }
    }
}

impl ConnectionPool for MockPool {
    type Connection = MockConnection;

    async fn acquire(&self) -> DbResult<MockConnection> {
        let mut state = self.state.lock().unwrap();
        if state.fail_acquire {
            return Err(DbError::connection("pool exhausted", "try later"));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.acquired.push(id);
        Ok(MockConnection {
            id,
            state: self.state.clone(),
        })
    }

    fn release(&self, connection: MockConnection) {
        self.state.lock().unwrap().released.push(connection.id);
    }
}

/// Build driver rows from column names and positional values.
pub fn raw_rows(columns: &[&str], rows: Vec<Vec<JsonValue>>) -> RawRows {
    RawRows::new(columns.iter().map(|c| c.to_string()).collect(), rows)
}

/// Logger that keeps every event as a line of text.
#[derive(Default)]
pub struct RecordingLogger {
    events: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl QueryLogger for RecordingLogger {
    fn statement(&self, kind: QueryKind, sql: &str, params: &[QueryParam]) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{}: {} {:?}", kind, sql, params));
    }

    fn completed(&self, kind: QueryKind, outcome: &QueryOutcome, _elapsed: Duration) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{} R: {}", kind, outcome));
    }

    fn failed(&self, kind: QueryKind, sql: &str, _params: &[QueryParam], error: &DbError) {
        self.events
            .lock()
            .unwrap()
            .push(format!("{} E: {} ({})", kind, sql, error));
    }
}
