//! Governance API server

use anyhow::Context;
use governance_api::{build_router, window_sweeper_task, ApiState};
use std::sync::Arc;
use tenant_governance::GovernanceConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("GOVERNANCE_CONFIG").ok();
    let config = GovernanceConfig::load(config_path.as_deref()).context("loading configuration")?;
    anyhow::ensure!(!config.jwt_secret.is_empty(), "jwt_secret must be configured");

    let state = Arc::new(ApiState::in_memory(&config));
    tokio::spawn(window_sweeper_task(state.clone(), config.window()));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(
        addr = %config.bind_addr,
        environment = ?config.environment,
        tenants = config.tenants.len(),
        "governance API listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
