use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{configure_auth_routes, me};
use crate::config::ServerConfig;
use crate::security::rate_limiter::rate_limit_middleware;
use crate::shared::state::AppState;
use crate::tickets::configure_ticket_routes;

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "ticketd",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    // Everything but /health is throttled, authenticated traffic per user
    // and anonymous traffic per peer IP.
    let api = Router::new()
        .merge(configure_auth_routes())
        .merge(configure_ticket_routes())
        .route("/me", get(me))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

pub async fn run(config: &ServerConfig, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}
