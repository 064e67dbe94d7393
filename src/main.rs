use anyhow::Context;

mod app;
mod config;
mod db;
mod error;
mod routes;
mod server;
mod state;
mod users;

use crate::config::{AppConfig, AppMode};
use crate::server::{shutdown_signal, Server};
use crate::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // the mode only picks logging defaults, so a bad value is reported after init
    let mode = std::env::var("APP_MODE")
        .ok()
        .and_then(|m| m.parse::<AppMode>().ok())
        .unwrap_or_default();
    init_tracing(mode);

    if let Err(e) = run().await {
        tracing::error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(mode: AppMode) {
    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| mode.default_log_filter().to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(mode.json_logs_by_default());

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    let addr = config.listen_addr().context("invalid listen address")?;
    tracing::info!(
        backend = config.database.kind(),
        mode = ?config.mode,
        error_routes = config.error_routes,
        "configuration loaded"
    );

    let store = db::connect(&config.database, config.pool)
        .await
        .context("failed to initialize database")?;

    let drain_budget = config.shutdown_timeout;
    let app = app::build_app(AppState::new(store, config));

    let server = Server::bind(addr, app, drain_budget).await?;
    server.run(shutdown_signal()).await?;
    Ok(())
}
