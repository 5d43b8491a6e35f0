//! Read-only collaborator interfaces consumed by the engine.
//!
//! The recorder database implements all of them; tests may substitute
//! their own implementations.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    /// Raw state value as recorded (may be textual).
    pub value: String,

    /// When the state changed to `value`.
    pub changed_at: DateTime<Utc>,
}

impl Sample {
    pub fn new(value: impl Into<String>, changed_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            changed_at,
        }
    }

    /// The value as a finite number, if it parses as one.
    pub fn numeric(&self) -> Option<f64> {
        parse_numeric(&self.value)
    }
}

/// Parses a state value as a finite float. `nan` and `inf` count as textual.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Bucket width of long-term statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Hour,
}

/// Aggregate column requested from the long-term statistics store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateField {
    Min,
    Max,
    Mean,
}

/// One pre-aggregated bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    /// Start of the bucket.
    pub start: DateTime<Utc>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

/// Source of significant state changes.
pub trait HistoryStore: Send + Sync {
    /// Samples with `start <= changed_at < end`, oldest first.
    fn fetch_samples(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Sample>, StoreError>;

    /// State in effect at `start`: the last change before it, stamped with
    /// `start`. Stores without history before a window return `None`.
    fn fetch_start_state(
        &self,
        _entity_id: &str,
        _start: DateTime<Utc>,
    ) -> Result<Option<Sample>, StoreError> {
        Ok(None)
    }
}

/// Source of long-term statistics retained after raw history is purged.
pub trait StatisticsStore: Send + Sync {
    /// Buckets starting in `[start, end)`, oldest first. Only `fields` need be populated.
    fn fetch_aggregates(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
        fields: &[AggregateField],
    ) -> Result<Vec<AggregateRow>, StoreError>;
}

/// Registry entry for a source entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityInfo {
    pub display_name: String,
}

/// Lookup of entity display names.
pub trait EntityRegistry: Send + Sync {
    fn lookup(&self, entity_id: &str) -> Option<EntityInfo>;
}

/// Resolves the display name of a configuration: explicit name, then the
/// registry's display name, then the raw entity id.
pub fn resolve_friendly_name(
    registry: &dyn EntityRegistry,
    entity_id: &str,
    friendly_name: Option<&str>,
) -> String {
    match friendly_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => registry
            .lookup(entity_id)
            .map(|info| info.display_name)
            .unwrap_or_else(|| entity_id.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric("21.5"), Some(21.5));
        assert_eq!(parse_numeric(" -3 "), Some(-3.0));
        assert_eq!(parse_numeric("1e3"), Some(1000.0));
        assert_eq!(parse_numeric("unavailable"), None);
        assert_eq!(parse_numeric("nan"), None);
        assert_eq!(parse_numeric("inf"), None);
        assert_eq!(parse_numeric(""), None);
    }
}
