//! Error types for pg-access.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! It also hosts the error translator: failures raised by server-side logic that
//! follow the `@CODE description` convention surface as [`ServerError`] rather
//! than as opaque driver messages.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Default HTTP status suggested for typed server errors.
pub const DEFAULT_SERVER_ERROR_STATUS: u16 = 400;

/// `<prefix without @>@<CODE> <description>`
static SERVER_ERROR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@]*@([A-Z0-9-]+) *(.*)$").expect("server error pattern is valid")
});

/// A domain failure signalled by server-side logic.
///
/// Procedures raise these with a message such as
/// `"@OUT-OF-STOCK insufficient inventory"`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error_code}: {description}")]
pub struct ServerError {
    pub error_code: String,
    pub description: String,
    pub http_status: u16,
}

impl ServerError {
    /// Create a typed error with the default status.
    pub fn new(error_code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            description: description.into(),
            http_status: DEFAULT_SERVER_ERROR_STATUS,
        }
    }

    /// Override the suggested HTTP status.
    pub fn with_status(mut self, http_status: u16) -> Self {
        self.http_status = http_status;
        self
    }

    /// Parse a failure message following the `@CODE description` convention.
    ///
    /// Returns `None` when the message does not match; matching is best-effort
    /// and relies on the server emitting the convention deliberately.
    pub fn parse(message: &str) -> Option<Self> {
        let captures = SERVER_ERROR_PATTERN.captures(message)?;
        let code = captures.get(1)?.as_str();
        let description = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        Some(Self::new(code, description))
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "23505" for unique violation
        sql_state: Option<String>,
    },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Timeout: {operation} timed out")]
    Timeout { operation: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal-consistency error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a generic database error with optional SQL state.
    pub fn database(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Promote a generic database failure into a typed [`ServerError`] when its
    /// message follows the `@CODE description` convention.
    pub fn translate(self) -> Self {
        match self {
            Self::Database { message, sql_state } => match ServerError::parse(&message) {
                Some(server) => Self::Server(server),
                None => Self::Database { message, sql_state },
            },
            other => other,
        }
    }

    /// The typed server error, if this is one.
    pub fn as_server_error(&self) -> Option<&ServerError> {
        match self {
            Self::Server(err) => Some(err),
            _ => None,
        }
    }

    /// Suggested HTTP status for a boundary layer rendering this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Server(err) => err.http_status,
            Self::InvalidInput { .. } | Self::Database { .. } => 400,
            Self::Timeout { .. } => 504,
            Self::Connection { .. } => 503,
            Self::Configuration { .. } | Self::Internal { .. } => 500,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Whether a caller could reasonably retry. Nothing in this crate retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DbError::database("No rows returned", None),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire"),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            other => DbError::database(other.to_string(), None),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
