//! Sensor entities and their periodic recomputation.
//!
//! Each configuration is exposed as one sensor. Fresh snapshots are kept in
//! a shared store for the HTTP API and pushed to WebSocket clients.

pub mod entity;
pub mod manager;
pub mod scheduler;

pub use entity::*;
pub use manager::*;
pub use scheduler::*;

use once_cell::sync::{Lazy, OnceCell};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tokio::sync::broadcast;

/// Latest snapshot per source entity id.
pub static SENSOR_STATES: Lazy<RwLock<BTreeMap<String, SensorSnapshot>>> =
    Lazy::new(|| RwLock::new(BTreeMap::new()));

/// Global WebSocket broadcast sender (set by the HTTP server).
pub static BROADCAST_TX: OnceCell<broadcast::Sender<String>> = OnceCell::new();

/// Sends an update to all connected WebSocket clients.
pub fn broadcast_update(update_type: &str, data: &impl serde::Serialize) {
    if let Some(tx) = BROADCAST_TX.get() {
        let message = serde_json::json!({
            "type": update_type,
            "data": data,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        if let Ok(json) = serde_json::to_string(&message) {
            let _ = tx.send(json);
        }
    }
}

/// Stores a snapshot and pushes it as `sensor_update`.
pub fn publish(snapshot: &SensorSnapshot) {
    if let Ok(mut states) = SENSOR_STATES.write() {
        states.insert(snapshot.entity_id.clone(), snapshot.clone());
    }
    broadcast_update("sensor_update", snapshot);
}

/// Drops the snapshot of a removed sensor and pushes `sensor_removed`.
pub fn unpublish(entity_id: &str) {
    let removed = SENSOR_STATES
        .write()
        .ok()
        .and_then(|mut states| states.remove(entity_id));
    if let Some(snapshot) = removed {
        broadcast_update("sensor_removed", &snapshot.unique_id);
    }
}

pub fn snapshot(entity_id: &str) -> Option<SensorSnapshot> {
    SENSOR_STATES.read().ok()?.get(entity_id).cloned()
}

pub fn all_snapshots() -> Vec<SensorSnapshot> {
    SENSOR_STATES
        .read()
        .map(|states| states.values().cloned().collect())
        .unwrap_or_default()
}
