//! pg-access - Main entry point.
//!
//! Runs a single statement against PostgreSQL inside one unit of work and
//! prints the result as JSON.

use pg_access::config::{Config, QueryMode};
use pg_access::db::{Database, QueryParam};
use pg_access::error::DbError;
use serde_json::{Value as JsonValue, json};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Interpret a CLI argument as JSON, falling back to plain text.
fn parse_arg(raw: &str) -> QueryParam {
    match serde_json::from_str::<JsonValue>(raw) {
        Ok(value) => QueryParam::from_json(value),
        Err(_) => QueryParam::String(raw.to_string()),
    }
}

async fn run(config: &Config) -> Result<JsonValue, DbError> {
    let db_config = config.db_config()?;
    let db = Database::connect(&db_config);
    let args: Vec<QueryParam> = config.args.iter().map(|a| parse_arg(a)).collect();
    let options = config.normalize_options();

    let result = db
        .run(async |work| {
            let session = work.session().await?;
            let value = match config.mode {
                QueryMode::Exec => {
                    let output = session.exec(&config.sql, &args, options).await?;
                    json!({ "rows": output.rows, "row_count": output.row_count })
                }
                QueryMode::Get => json!(session.get(&config.sql, &args, options).await?),
                QueryMode::Proc => json!({ "rows_affected": session.proc(&config.sql, &args).await? }),
                QueryMode::Func => session.func(&config.sql, &args).await?,
            };
            Ok::<_, DbError>(value)
        })
        .await;

    db.close().await;
    result
}

#[tokio::main]
async fn main() {
    let config = Config::parse_args();
    init_tracing(&config);

    info!(mode = %config.mode, "Starting pg-access v{}", env!("CARGO_PKG_VERSION"));

    match run(&config).await {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default()),
        Err(DbError::Server(server)) => {
            error!(error_code = %server.error_code, "Server error");
            println!(
                "{}",
                json!({
                    "error_code": server.error_code,
                    "description": server.description,
                    "http_status": server.http_status,
                })
            );
            std::process::exit(2);
        }
        Err(e) => {
            error!(error = %e, "Statement failed");
            eprintln!("Error: {}", e);
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            std::process::exit(1);
        }
    }
}
