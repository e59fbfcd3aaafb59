mod analytics;
mod catalog;
mod config;
mod engine;
mod errors;
mod orchestrator;
mod portfolio;
mod pricing;
mod server;
mod state;

use crate::pricing::client::PricingClient;
use crate::state::{Action, AppState, Command, Session};
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("optiscope starting");

    let cfg = match config::AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        pricing_url = %cfg.pricing_base_url,
        horizon = cfg.simulation.horizon,
        n_simulations = cfg.simulation.n_simulations,
        histogram_bins = cfg.histogram_bins,
        "configuration loaded"
    );

    // Bounded command channel into the engine
    let (engine_tx, engine_rx) = mpsc::channel::<Command>(256);

    let session = Session::from_config(&cfg);
    let app_state = AppState::new(&session, engine_tx.clone());
    let service = match PricingClient::new(&cfg.pricing_base_url, cfg.pricing_timeout_secs) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!("pricing client error: {e}");
            std::process::exit(1);
        }
    };

    // ── Spawn tasks ──

    // 1. Engine task (sole owner of the session)
    let engine_state = app_state.clone();
    tokio::spawn(async move {
        engine::run_engine(engine_state, service, session, engine_rx).await;
    });

    // 2. Initial catalog load; failures surface as a notice and can be retried
    if engine_tx
        .send(Command { action: Action::RefreshCatalog, reply: None })
        .await
        .is_err()
    {
        tracing::error!("engine channel closed before startup");
        std::process::exit(1);
    }

    // 3. Axum HTTP + WS server
    let app = server::router(app_state);
    let addr = format!("{}:{}", cfg.server_host, cfg.server_port);
    tracing::info!("server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("bind error: {e}");
            std::process::exit(1);
        });

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {e}");
    }
}
