//! Database access layer.
//!
//! This module provides:
//! - Literal and identifier quoting for synthesized SQL
//! - Schema descriptors and statement synthesis (INSERT / UPSERT / UPDATE)
//! - Result normalization
//! - Query execution with logging and error translation
//! - Connection-scoped sessions and units of work
//! - The transport seam and its sqlx implementation

pub mod connection;
pub mod executor;
pub mod logger;
pub mod normalize;
pub mod params;
pub mod pool;
pub mod quote;
pub mod schema;
pub mod session;
pub mod statement;
pub mod types;

pub use connection::{Connection, ConnectionPool, RawRow, RawRows};
pub use executor::{QueryExecutor, QueryOutput};
pub use logger::{QueryKind, QueryLogger, QueryOutcome, TracingQueryLogger};
pub use normalize::{NormalizeOptions, Row, normalize};
pub use params::QueryParam;
pub use pool::Database;
pub use quote::{quote_identifier, quote_literal, quote_table};
pub use schema::{Entity, FieldDescriptor, Record, Schema, ValueType, to_record};
pub use session::{Session, UnitOfWork};
pub use statement::Statement;
