//! pg-access library
//!
//! A data-access layer for PostgreSQL: schema-driven INSERT / UPSERT / UPDATE
//! synthesis, query execution with logging, result normalization and typed
//! server errors, and one pooled connection per unit of work.

pub mod config;
pub mod db;
pub mod error;

pub use config::{Config, DbConfig};
pub use db::{Database, QueryExecutor, Session, UnitOfWork};
pub use error::{DbError, DbResult, ServerError};
