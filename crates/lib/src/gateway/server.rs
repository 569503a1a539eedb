//! Gateway HTTP server: health check, webhook handshake and webhook deliveries.

use crate::channels::{check_request, verify_subscription, VerifyQuery, WebhookPayload};
use crate::config::{self, Config};
use crate::connector::Connector;
use crate::init;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Deliveries buffered ahead of the processor; once full, POSTs wait for room.
const WEBHOOK_QUEUE: usize = 64;

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Token expected in the subscription handshake. None rejects every handshake.
    pub verify_token: Option<String>,
    /// Sender for accepted deliveries. The processor task receives.
    pub webhook_tx: mpsc::Sender<WebhookPayload>,
    pub connector: Arc<Connector>,
}

/// Spawn the task that runs queued deliveries through the connector, one at a time and
/// in arrival order. It ends once every sender is dropped.
pub fn spawn_processor(connector: Arc<Connector>, mut webhook_rx: mpsc::Receiver<WebhookPayload>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(payload) = webhook_rx.recv().await {
            if let Err(e) = connector.handle_webhook(&payload).await {
                log::warn!("gateway: delivery failed: {:#}", e);
            }
        }
        log::debug!("gateway: webhook processor finished");
    })
}

/// Routes: `GET /`, `GET /webhook`, `POST /webhook`.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .with_state(state)
}

/// Run the gateway with connectors built from config; binds to config.gateway.bind:config.gateway.port.
/// Requires an initialized config file (`msgbridge init`). Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config, config_path: PathBuf) -> Result<()> {
    init::require_initialized(&config_path)?;
    let connector = Connector::from_config(config.clone()).context("building connector")?;
    serve(config, Arc::new(connector)).await
}

/// Serve webhooks for `connector` until SIGINT or SIGTERM, then drain queued deliveries.
pub async fn serve(config: Config, connector: Arc<Connector>) -> Result<()> {
    let verify_token = config::resolve_verify_token(&config);
    if verify_token.is_none() {
        log::warn!("gateway: no verify token configured; subscription handshakes will be refused");
    }
    let (webhook_tx, webhook_rx) = mpsc::channel::<WebhookPayload>(WEBHOOK_QUEUE);
    let processor = spawn_processor(connector.clone(), webhook_rx);

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let state = GatewayState {
        config: Arc::new(config),
        verify_token,
        webhook_tx,
        connector,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;

    // The router (and with it the last sender) is gone; let queued deliveries finish.
    let _ = processor.await;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining webhook deliveries");
}

/// GET / returns a simple health JSON.
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "sessions": state.connector.sessions().len().await,
    }))
}

/// GET /webhook: echo `hub.challenge` for a subscribe with the expected token, else 403.
async fn verify_webhook(State(state): State<GatewayState>, Query(query): Query<VerifyQuery>) -> Response {
    match verify_subscription(&query, state.verify_token.as_deref()) {
        Some(challenge) => {
            log::info!("gateway: webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        None => {
            log::warn!("gateway: webhook verification rejected (mode {:?})", query.mode);
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// POST /webhook: validate the envelope, queue it for the processor and answer at once.
async fn receive_webhook(State(state): State<GatewayState>, body: Bytes) -> Response {
    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("gateway: webhook body is not JSON: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    if !check_request(&value) {
        log::warn!("gateway: webhook rejected, not a page event");
        return StatusCode::NOT_FOUND.into_response();
    }
    let payload: WebhookPayload = match serde_json::from_value(value) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("gateway: webhook payload malformed: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    if state.webhook_tx.send(payload).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    log::debug!("gateway: webhook accepted");
    (StatusCode::OK, "EVENT_RECEIVED").into_response()
}
