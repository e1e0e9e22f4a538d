use std::sync::Arc;

use clap::Parser;
use pairlink_relay::config::RelayConfig;
use pairlink_relay::{router, AppState, RelayServer};
use tokio::net::TcpListener;

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    pairlink_common::init_tracing_with_default("pairlink_relay=info,tower_http=info");

    let config = RelayConfig::parse();
    config.check_bind()?;

    let validator = config.build_validator()?;
    let relay = Arc::new(RelayServer::new(validator));
    let app = router(AppState::new(relay, config.limits()));

    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!("relay listening on ws://{}/ws", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
