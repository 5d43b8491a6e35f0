//! HTTP server module for API and WebSocket endpoints.
//!
//! Serves sensor snapshots and stored configurations, accepts state changes
//! for the recorder, and pushes sensor updates over WebSocket.

pub mod routes;
pub mod state;
pub mod ws;

use crate::database::Database;
use crate::server::routes::{config, configurations, health, sensors, states};
use crate::server::state::AppState;
use crate::server::ws::ws_handler;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

/// Starts the HTTP server on a background thread.
///
/// Returns a handle to the broadcast sender for pushing updates.
pub fn start_server(db: Database, port: u16) -> broadcast::Sender<String> {
    let (tx, _) = broadcast::channel::<String>(100);
    let tx_clone = tx.clone();

    std::thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!(?e, "Failed to create Tokio runtime");
                return;
            }
        };
        rt.block_on(async {
            run_server(db, tx_clone, port).await;
        });
    });

    tracing::info!(port, "HTTP server starting");
    tx
}

/// Builds the router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    // CORS layer for frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Sensors API
        .route("/api/sensors", get(sensors::get_sensors))
        .route("/api/sensors/:entity_id", get(sensors::get_sensor))
        // Stored configurations
        .route(
            "/api/configurations",
            get(configurations::get_configurations),
        )
        // Config API
        .route("/api/config", get(config::get_config))
        // Recorder ingest
        .route("/api/states/:entity_id", post(states::post_state))
        // WebSocket
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

/// Runs the axum server.
async fn run_server(db: Database, broadcast_tx: broadcast::Sender<String>, port: u16) {
    let app = router(Arc::new(AppState::new(db, broadcast_tx)));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("HTTP server listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(?e, %addr, "Failed to bind HTTP server");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(?e, "HTTP server stopped");
    }
}
