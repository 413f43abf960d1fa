//! HTTP API for Reach: segments, campaigns, rule translation, live audience
//! previews and AI rule synthesis.

pub mod ai_routes;
pub mod builder_routes;
pub mod campaign_routes;
pub mod config;
pub mod dashboard_routes;
pub mod domain;
pub mod error;
pub mod health;
pub mod rate_limit;
pub mod routing;
pub mod rule_routes;
pub mod segment_routes;
pub mod sessions;
pub mod state;
pub mod store;

use std::net::SocketAddr;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;

use config::GatewayConfig;
use routing::build_app;
use state::AppState;

/// Handle for a gateway started in-process.
pub struct GatewayHandle {
    pub addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
}

impl GatewayHandle {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn shutdown(self) {
        let _ = self.shutdown.send(());
    }
}

pub async fn start_gateway(config: GatewayConfig) -> anyhow::Result<GatewayHandle> {
    let state = AppState::from_config(&config).await?;
    start_gateway_with_state(state, config).await
}

pub async fn start_gateway_with_state(
    state: AppState,
    config: GatewayConfig,
) -> anyhow::Result<GatewayHandle> {
    let router = build_app(state, &config);

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .context("invalid gateway bind address")?;
    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind gateway listener")?;
    let actual_addr = listener
        .local_addr()
        .context("failed to read socket address")?;
    info!(%actual_addr, "starting reach-gateway in-process");

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await
            .ok();
    });

    Ok(GatewayHandle {
        addr: actual_addr,
        shutdown: tx,
    })
}
