//! txpool - Main entry point.
//!
//! Runs SQL statements through the transaction manager: all statements share
//! one pooled transaction (or the dedicated session with `--basic`), and each
//! result is printed as one line of JSON.

use clap::Parser;
use txpool::config::{Config, FetchMode};
use txpool::db::{BasicSession, Session, TransactionManager};
use txpool::error::DbResult;
use txpool::models::Params;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // Logs go to stderr, results to stdout
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

async fn run_in_transaction(
    session: &mut Session,
    mode: FetchMode,
    statements: &[String],
    params: &Params,
) -> DbResult<Vec<serde_json::Value>> {
    let mut results = Vec::with_capacity(statements.len());
    for sql in statements {
        let value = match mode {
            FetchMode::Command => serde_json::json!(session.command(sql, params).await?),
            FetchMode::Array => serde_json::json!(session.fetch_array(sql, params).await?),
            FetchMode::One => serde_json::json!(session.fetch_one(sql, params).await?),
        };
        results.push(value);
    }
    Ok(results)
}

async fn run_basic(
    basic: &BasicSession,
    mode: FetchMode,
    statements: &[String],
    params: &Params,
) -> DbResult<Vec<serde_json::Value>> {
    let mut results = Vec::with_capacity(statements.len());
    for sql in statements {
        let value = match mode {
            FetchMode::Command => serde_json::json!(basic.command(sql, params).await?),
            FetchMode::Array => serde_json::json!(basic.fetch_array(sql, params).await?),
            FetchMode::One => serde_json::json!(basic.fetch_one(sql, params).await?),
        };
        results.push(value);
    }
    Ok(results)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    let manager_config = config.manager_config()?;
    if manager_config.poolsize == 0 && !config.basic {
        eprintln!("Error: a transaction needs at least one pooled session.");
        eprintln!("Use --poolsize 1 or higher, or run with --basic.");
        std::process::exit(1);
    }

    info!(
        db_type = %manager_config.connection.db_type,
        mode = %config.mode,
        statements = config.statements.len(),
        "Starting txpool v{}",
        env!("CARGO_PKG_VERSION")
    );

    let manager = TransactionManager::new(manager_config);
    manager.on_error(|e| error!(error = %e, "Connection error"));
    manager.init().await?;

    let params: Params = config.params.iter().cloned().collect();

    let outcome = if config.basic {
        let basic = manager.basic()?;
        run_basic(&basic, config.mode, &config.statements, &params).await
    } else {
        let mut session = manager.begin().await?;
        match run_in_transaction(&mut session, config.mode, &config.statements, &params).await {
            Ok(results) if config.rollback => session.rollback().await.map(|_| results),
            Ok(results) => session.commit().await.map(|_| results),
            Err(e) => {
                if let Err(rollback_err) = session.rollback().await {
                    error!(error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    };

    manager.close().await?;

    match outcome {
        Ok(results) => {
            for result in results {
                println!("{}", serde_json::to_string(&result)?);
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Statement failed");
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Error: {}\nSuggestion: {}", e, suggestion);
            } else {
                eprintln!("Error: {}", e);
            }
            std::process::exit(1);
        }
    }
}
