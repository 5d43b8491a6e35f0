//! Recorder ingest endpoint.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::server::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StateInput {
    pub state: String,
    /// Defaults to the time of the request.
    pub changed_at: Option<DateTime<Utc>>,
    /// Registers or renames the entity in the registry.
    #[serde(default)]
    pub friendly_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecordedState {
    pub id: i64,
    pub entity_id: String,
    pub state: String,
    pub changed_at: DateTime<Utc>,
}

/// POST /api/states/:entity_id - Record a state change.
pub async fn post_state(
    State(state): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
    Json(input): Json<StateInput>,
) -> Result<(StatusCode, Json<RecordedState>), StatusCode> {
    let entity_id = entity_id.trim().to_string();
    if entity_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let changed_at = input.changed_at.unwrap_or_else(Utc::now);

    if let Some(name) = input.friendly_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        if let Err(e) = state.db.upsert_entity(&entity_id, name) {
            tracing::error!(?e, entity_id = %entity_id, "Failed to register entity");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    match state.db.record_state(&entity_id, &input.state, changed_at) {
        Ok(id) => {
            tracing::debug!(entity_id = %entity_id, state = %input.state, "State recorded");
            Ok((
                StatusCode::CREATED,
                Json(RecordedState {
                    id,
                    entity_id,
                    state: input.state,
                    changed_at,
                }),
            ))
        }
        Err(e) => {
            tracing::error!(?e, entity_id = %entity_id, "Failed to record state");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use chrono::TimeZone;
    use tokio::sync::broadcast;

    #[tokio::test]
    async fn test_records_state() {
        let db = Database::open_in_memory().unwrap();
        let (tx, _) = broadcast::channel(4);
        let state = Arc::new(AppState::new(db.clone(), tx));
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap();

        let (status, Json(recorded)) = post_state(
            State(state),
            Path("sensor.temp".into()),
            Json(StateInput {
                state: "21.5".into(),
                changed_at: Some(at),
                friendly_name: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(recorded.changed_at, at);
        let samples = db
            .get_states("sensor.temp", at, at + chrono::Duration::seconds(1))
            .unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, "21.5");
    }

    #[tokio::test]
    async fn test_rejects_blank_entity() {
        let (tx, _) = broadcast::channel(4);
        let state = Arc::new(AppState::new(Database::open_in_memory().unwrap(), tx));

        let result = post_state(
            State(state),
            Path("  ".into()),
            Json(StateInput {
                state: "1".into(),
                changed_at: None,
                friendly_name: None,
            }),
        )
        .await;

        assert_eq!(result.unwrap_err(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_friendly_name_feeds_registry() {
        let db = Database::open_in_memory().unwrap();
        let (tx, _) = broadcast::channel(4);
        let state = Arc::new(AppState::new(db.clone(), tx));

        for (value, name) in [("20", Some("Hall")), ("21", Some(" ")), ("22", None)] {
            post_state(
                State(Arc::clone(&state)),
                Path("sensor.hall".into()),
                Json(StateInput {
                    state: value.into(),
                    changed_at: None,
                    friendly_name: name.map(String::from),
                }),
            )
            .await
            .unwrap();
        }

        assert_eq!(db.get_entity_name("sensor.hall").unwrap().as_deref(), Some("Hall"));
        assert!(db.get_entity_name("sensor.other").unwrap().is_none());
    }
}
