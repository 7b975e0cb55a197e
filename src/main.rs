#![cfg(not(tarpaulin_include))]

use tabsheet::app;
use tabsheet::config::Config;

/// Main entry point for the web application
///
/// Reads configuration from flags, the environment and an optional `.env`
/// file, then serves the UI and JSON API until the process is stopped.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load();

    app::run(config).await
}
