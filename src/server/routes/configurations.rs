//! Stored configuration endpoint.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::points::{unique_labels, Configuration};
use crate::server::state::AppState;
use crate::wizard::entry_title;

#[derive(Debug, Serialize)]
pub struct ConfigurationEntry {
    pub title: String,
    /// Attribute labels the points will produce, in order.
    pub labels: Vec<String>,
    #[serde(flatten)]
    pub config: Configuration,
}

/// GET /api/configurations - All stored configurations.
pub async fn get_configurations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ConfigurationEntry>>, StatusCode> {
    let configs = state.db.list_configurations().map_err(|e| {
        tracing::error!(?e, "Failed to list configurations");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let entries = configs
        .into_iter()
        .map(|config| ConfigurationEntry {
            title: entry_title(&config),
            labels: unique_labels(config.points.as_slice()),
            config,
        })
        .collect();

    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::points::{MeasurementPoint, StatType, TimeUnit};
    use tokio::sync::broadcast;

    #[tokio::test]
    async fn test_lists_configurations_with_labels() {
        let db = Database::open_in_memory().unwrap();
        db.save_configuration(&Configuration {
            entity_id: "sensor.energy".into(),
            friendly_name: Some("Energy".into()),
            update_interval: 60,
            points: vec![
                MeasurementPoint::new(StatType::Total, TimeUnit::Months, 1),
                MeasurementPoint::new(StatType::Total, TimeUnit::Months, 1),
            ]
            .into(),
        })
        .unwrap();
        let (tx, _) = broadcast::channel(4);
        let state = Arc::new(AppState::new(db, tx));

        let Json(entries) = get_configurations(State(state)).await.unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Historical statistics: Energy");
        assert_eq!(entries[0].labels, vec!["months_1_total", "months_1_total_2"]);
    }
}
