//! Viewgate Server: viewer admission queue for scarce resources
//!
//! Main entry point: loads configuration, initializes logging, and hands
//! over to the API crate's server runner.

use tracing_subscriber::{EnvFilter, fmt};

use viewgate_core::config::{AppConfig, LoggingConfig};

#[tokio::main]
async fn main() {
    let env = std::env::var("VIEWGATE_ENV").unwrap_or_else(|_| "development".to_string());

    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.logging);
    tracing::info!(
        env = %env,
        capacity = config.queue.capacity,
        heartbeat_timeout_seconds = config.queue.heartbeat_timeout_seconds,
        "Starting Viewgate v{}",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = viewgate_api::run_server(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}
