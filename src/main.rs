mod backend;
mod bridge;
mod config;
mod dedup;
mod gateway;
mod guard;
mod health;
mod platform;
mod router;
mod vote;

#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::gateway::Gateway;
use crate::platform::telegram::{self, TelegramSession};
use crate::platform::ChatSession;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Bot URL: {}", config.gateway.bot_url);
    info!("  Bot name: {}", config.gateway.bot_name);
    info!("  Chats: {:?}", config.gateway.chat_ids);
    if config.gateway.webhook_secret.is_none() {
        info!("  WEBHOOK_SECRET is not set, backend calls are unauthenticated");
    }

    let session = Arc::new(TelegramSession::new(&config.telegram.bot_token));
    let gateway = Arc::new(Gateway::new(&config.gateway, session.clone()));

    let health_session: Arc<dyn ChatSession> = session.clone();
    let health = tokio::spawn(health::serve(
        health_session,
        config.gateway.port,
        async {
            tokio::signal::ctrl_c().await.ok();
        },
    ));

    info!("Gateway is starting...");
    tokio::select! {
        _ = telegram::run(gateway, session) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutting down");
        }
    }

    match health.await {
        Ok(Err(e)) => error!("{:#}", e),
        Err(e) => error!("Health server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    Ok(())
}
