//! Shared application state for the HTTP server.

use crate::database::Database;
use tokio::sync::broadcast;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Recorder database.
    pub db: Database,

    /// Broadcast channel for WebSocket updates.
    pub broadcast_tx: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(db: Database, broadcast_tx: broadcast::Sender<String>) -> Self {
        Self { db, broadcast_tx }
    }

    /// Subscribe to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.broadcast_tx.subscribe()
    }
}
