mod cli;
mod demo;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gqlws_core::{Authenticator, SharedSecretAuthenticator};
use gqlws_server::create_bridge;
use gqlws_subscriptions::SubscriptionManager;
use gqlws_telemetry::init_telemetry;
use serde_json::json;
use tokio::sync::broadcast;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli.telemetry_config()).context("Failed to initialize telemetry")?;

    tracing::info!("Starting GraphQL WS server");

    let schema = demo::schema().context("Failed to build schema")?;
    let manager = Arc::new(SubscriptionManager::new(Arc::new(schema)));

    let authenticator = cli.auth_token.clone().map(|token| {
        Arc::new(SharedSecretAuthenticator::new(token, json!({"name": "demo"}))) as Arc<dyn Authenticator>
    });

    // Publications flow ticker -> broadcast -> bridge -> subscriptions
    let (publication_tx, publication_rx) = broadcast::channel(1024);
    let _bridge = create_bridge(Arc::clone(&manager), publication_rx);
    let _ticker = demo::start_ticker(publication_tx, cli.tick_interval());

    let handle = gqlws_server::start(cli.server_config(), manager, authenticator)
        .await
        .context("Failed to start server")?;

    tracing::info!(port = handle.port, path = %cli.path, "GraphQL WS server ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    handle.shutdown().await;
    Ok(())
}
