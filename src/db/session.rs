//! Connection-scoped sessions and units of work.
//!
//! A [`UnitOfWork`] holds at most one pooled connection. The connection is
//! acquired the first time [`UnitOfWork::session`] is called and handed back
//! to the pool exactly once: by [`UnitOfWork::release`], at the end of
//! [`UnitOfWork::run`] / [`UnitOfWork::scope`], or when the unit of work is
//! dropped. A failing statement does not roll anything back; that decision
//! stays with the caller.

use crate::db::connection::{Connection, ConnectionPool};
use crate::db::executor::QueryExecutor;
use crate::db::logger::QueryLogger;
use crate::error::{DbError, DbResult};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::debug;

/// One connection plus the executor and transaction primitives on top of it.
pub struct Session<C: Connection> {
    executor: QueryExecutor<C>,
}

impl<C: Connection> Session<C> {
    pub fn new(connection: C, logger: Arc<dyn QueryLogger>) -> Self {
        Self {
            executor: QueryExecutor::new(connection, logger),
        }
    }

    /// Issue `BEGIN` under the server's default isolation level.
    pub async fn begin(&mut self) -> DbResult<()> {
        self.executor.control("BEGIN").await
    }

    pub async fn commit(&mut self) -> DbResult<()> {
        self.executor.control("COMMIT").await
    }

    pub async fn rollback(&mut self) -> DbResult<()> {
        self.executor.control("ROLLBACK").await
    }

    pub fn into_connection(self) -> C {
        self.executor.into_connection()
    }
}

impl<C: Connection> Deref for Session<C> {
    type Target = QueryExecutor<C>;

    fn deref(&self) -> &Self::Target {
        &self.executor
    }
}

impl<C: Connection> DerefMut for Session<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.executor
    }
}

/// The scope during which a single pooled connection is held.
pub struct UnitOfWork<'p, P: ConnectionPool> {
    pool: &'p P,
    logger: Arc<dyn QueryLogger>,
    session: Option<Session<P::Connection>>,
}

impl<'p, P: ConnectionPool> UnitOfWork<'p, P> {
    pub fn new(pool: &'p P, logger: Arc<dyn QueryLogger>) -> Self {
        Self {
            pool,
            logger,
            session: None,
        }
    }

    /// Run `f` in a fresh unit of work, releasing its connection before the
    /// result (success or error) is returned.
    pub async fn run<T, E, F>(pool: &'p P, logger: Arc<dyn QueryLogger>, f: F) -> Result<T, E>
    where
        F: AsyncFnOnce(&mut UnitOfWork<'p, P>) -> Result<T, E>,
    {
        let mut work = UnitOfWork::new(pool, logger);
        let result = f(&mut work).await;
        work.release();
        result
    }

    /// Run `f` inside this unit of work.
    ///
    /// When a session already exists it is reused and left open for the outer
    /// scope; otherwise any session `f` creates is released when `f` returns.
    pub async fn scope<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: AsyncFnOnce(&mut Self) -> Result<T, E>,
    {
        let owns_session = self.session.is_none();
        let result = f(&mut *self).await;
        if owns_session {
            self.release();
        }
        result
    }

    /// The session for this unit of work, acquiring a connection on first use.
    pub async fn session(&mut self) -> DbResult<&mut Session<P::Connection>> {
        if self.session.is_none() {
            let connection = self.pool.acquire().await?;
            debug!("Acquired connection for unit of work");
            self.session = Some(Session::new(connection, self.logger.clone()));
        }
        self.session
            .as_mut()
            .ok_or_else(|| DbError::internal("Session missing after acquire"))
    }

    /// Whether a connection is currently held.
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Return the connection to the pool. Does nothing if none is held.
    pub fn release(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session.into_connection());
            debug!("Released connection for unit of work");
        }
    }
}

impl<P: ConnectionPool> Drop for UnitOfWork<'_, P> {
    fn drop(&mut self) {
        self.release();
    }
}
