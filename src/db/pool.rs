//! Connection pool setup and the database handle.

use crate::config::DbConfig;
use crate::db::connection::ConnectionPool;
use crate::db::logger::{QueryLogger, TracingQueryLogger};
use crate::db::session::UnitOfWork;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{debug, info};

/// A pool plus the logger handed to every session created from it.
#[derive(Clone)]
pub struct Database<P: ConnectionPool = PgPool> {
    pool: P,
    logger: Arc<dyn QueryLogger>,
}

impl Database<PgPool> {
    /// Create a PostgreSQL pool for `config`.
    ///
    /// Connections are opened lazily by the pool, so this never touches the
    /// network. Server notices and driver errors are emitted by sqlx as
    /// `tracing` events.
    pub fn connect(config: &DbConfig) -> Self {
        info!(url = %config.masked_url(), max_connections = ?config.max_connections, "Creating connection pool");

        let mut options = PgPoolOptions::new().after_connect(|_conn, _meta| {
            Box::pin(async move {
                debug!("Opened database connection");
                Ok(())
            })
        });
        if let Some(max) = config.max_connections {
            options = options.max_connections(max);
        }

        let pool = options.connect_lazy_with(config.connect_options());
        Self::new(pool)
    }

    /// Close the pool, waiting for connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl<P: ConnectionPool> Database<P> {
    /// Wrap an existing pool with the default `tracing` logger.
    pub fn new(pool: P) -> Self {
        Self::with_logger(pool, Arc::new(TracingQueryLogger))
    }

    pub fn with_logger(pool: P, logger: Arc<dyn QueryLogger>) -> Self {
        Self { pool, logger }
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Start a unit of work; no connection is taken until its session is used.
    pub fn unit_of_work(&self) -> UnitOfWork<'_, P> {
        UnitOfWork::new(&self.pool, self.logger.clone())
    }

    /// Run `f` in a unit of work and release its connection afterwards.
    pub async fn run<'a, T, E, F>(&'a self, f: F) -> Result<T, E>
    where
        F: AsyncFnOnce(&mut UnitOfWork<'a, P>) -> Result<T, E>,
    {
        UnitOfWork::run(&self.pool, self.logger.clone(), f).await
    }
}

impl<P: ConnectionPool> std::fmt::Debug for Database<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
