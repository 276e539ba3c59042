#![cfg(not(tarpaulin_include))]

use student_analytics::app;
use student_analytics::config::AppConfig;

/// Main entry point for the web application
///
/// Reads `STORE_BACKEND`, `DATA_DIR`, `BIND_ADDR` and `SESSION_HOURS` from
/// the environment and serves the dashboard. Log verbosity follows `RUST_LOG`.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()?;
    app::run(config).await
}
