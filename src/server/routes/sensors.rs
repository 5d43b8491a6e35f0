//! Sensor snapshot endpoints.

use axum::{extract::Path, http::StatusCode, Json};

use crate::sensor::{all_snapshots, snapshot, SensorSnapshot};

/// GET /api/sensors - Latest snapshot of every running sensor.
pub async fn get_sensors() -> Json<Vec<SensorSnapshot>> {
    Json(all_snapshots())
}

/// GET /api/sensors/:entity_id - Snapshot for one source entity.
pub async fn get_sensor(
    Path(entity_id): Path<String>,
) -> Result<Json<SensorSnapshot>, StatusCode> {
    snapshot(&entity_id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{publish, unpublish};
    use std::collections::BTreeMap;

    fn sample(entity_id: &str) -> SensorSnapshot {
        SensorSnapshot {
            entity_id: entity_id.into(),
            unique_id: format!("historical_stats_{}", entity_id.replace('.', "_")),
            name: "Historical statistics for test".into(),
            state: "unknown".into(),
            attributes: BTreeMap::new(),
            update_interval: 10,
            last_updated: None,
        }
    }

    #[tokio::test]
    async fn test_get_sensor() {
        publish(&sample("sensor.route_known"));

        let Json(found) = get_sensor(Path("sensor.route_known".into())).await.unwrap();
        assert_eq!(found.state, "unknown");

        let missing = get_sensor(Path("sensor.route_missing".into())).await;
        assert_eq!(missing.unwrap_err(), StatusCode::NOT_FOUND);

        let Json(all) = get_sensors().await;
        assert!(all.iter().any(|s| s.entity_id == "sensor.route_known"));

        unpublish("sensor.route_known");
    }
}
