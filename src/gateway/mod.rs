//! HTTP surface: the WeChat webhook plus health and metrics endpoints.

mod wechat;

use crate::config::{Config, GatewayConfig};
use crate::dispatch::Dispatcher;
use crate::observability::Metrics;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

pub const WEBHOOK_PATH: &str = "/weixin";

/// Shared state for all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub token: Arc<str>,
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Arc<Metrics>,
}

pub fn build_router(state: AppState, config: &GatewayConfig) -> Router {
    let timeout_secs = if config.request_timeout_secs == 0 {
        tracing::warn!("gateway.request_timeout_secs is 0, using safe default of 10s");
        10
    } else {
        config.request_timeout_secs
    };

    // The webhook bounds itself through the dispatcher's reply deadline so a
    // slow backend still yields an XML reply instead of an empty 408.
    let webhook = Router::new().route(
        WEBHOOK_PATH,
        get(wechat::handle_wechat_verify).post(wechat::handle_wechat_message),
    );
    let status = Router::new()
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .layer(TimeoutLayer::new(Duration::from_secs(timeout_secs)));

    webhook
        .merge(status)
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .with_state(state)
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
    }))
}

async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Binds the listener and serves until Ctrl-C.
pub async fn run_gateway(config: &Config) -> Result<()> {
    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);
    let dispatcher = Arc::new(Dispatcher::from_config(config, Arc::clone(&metrics))?);
    let state = AppState {
        token: Arc::from(config.wechat.token.as_str()),
        dispatcher,
        metrics,
    };
    let app = build_router(state, &config.gateway);

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("opsangel listening on http://{addr}{WEBHOOK_PATH}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server error")?;
    tracing::info!("opsangel stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
}
