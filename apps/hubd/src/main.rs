//! ThingHub daemon entry point.

mod config;

use anyhow::Context;
use thinghub_server::{HubRelay, HubServer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting ThingHub");

    let path = std::env::args_os()
        .nth(1)
        .map(Into::into)
        .unwrap_or_else(config::config_path);
    let hub_config = config::HubConfig::load(&path)?;
    if hub_config.accounts.is_empty() {
        tracing::warn!(path = %path.display(), "no accounts configured, nobody can log in");
    }

    let handlers = thinghub_server::Handlers::new();
    let server = HubServer::new(hub_config.server.clone(), handlers.clone());
    for account in &hub_config.accounts {
        server.sessions().add_account(&account.client_id, &account.password);
    }
    let relay = HubRelay::new(server.manager().clone());
    relay.install(&handlers);

    let shutdown = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutting down");
            shutdown.shutdown();
        }
    });

    server
        .run()
        .await
        .with_context(|| format!("serving on {}", hub_config.server.address))?;
    tracing::info!("stopped");
    Ok(())
}
