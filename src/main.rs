//! platform-ping: connectivity check for a database URL.
//!
//! Connects through the same pool and executor services use, pings once
//! within the configured timeout and exits non-zero on failure.

use clap::Parser;
use platform_common::config::Config;
use platform_common::{Client, Context, logging};
use std::time::Instant;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    logging::init(&config.log_level, config.json_logs);

    info!(
        "Starting platform-ping v{}",
        env!("CARGO_PKG_VERSION")
    );

    let db_config = config.database_config()?;
    info!(
        db_type = %db_config.db_type,
        url = %db_config.masked_connection_string(),
        "Connecting to database"
    );

    let started = Instant::now();
    let client = match Client::connect_with(&db_config).await {
        Ok(client) => client,
        Err(e) => {
            error!(
                error = %e,
                suggestion = e.suggestion().unwrap_or_default(),
                "Connection failed"
            );
            return Err(e.into());
        }
    };

    let ctx = Context::background().with_timeout(config.ping_timeout_duration());
    let result = client.ping(&ctx).await;
    client.close().await;

    if let Err(e) = result {
        error!(error = %e, "Ping failed");
        return Err(e.into());
    }

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Database is reachable"
    );
    Ok(())
}
