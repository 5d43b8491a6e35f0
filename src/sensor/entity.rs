//! The historical statistics sensor.

use crate::engine::{
    resolve_friendly_name, AttributeValue, ComputationResult, EntityRegistry, StatisticsEngine,
    STATE_UNKNOWN,
};
use crate::points::Configuration;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Sensor exposing the statistics of one configuration.
///
/// The native value is the overall status, the attributes are the computed
/// label mapping. Until the first update the state is `unknown`.
pub struct HistoricalStatsSensor {
    config: Configuration,
    friendly_name: String,
    unique_id: String,
    engine: StatisticsEngine,
    last_result: Option<ComputationResult>,
    last_updated: Option<DateTime<Utc>>,
}

impl HistoricalStatsSensor {
    pub fn new(
        config: Configuration,
        engine: StatisticsEngine,
        registry: &dyn EntityRegistry,
    ) -> Self {
        let friendly_name =
            resolve_friendly_name(registry, &config.entity_id, config.friendly_name.as_deref());
        let unique_id = format!("historical_stats_{}", slugify(&config.entity_id));
        Self {
            config,
            friendly_name,
            unique_id,
            engine,
            last_result: None,
            last_updated: None,
        }
    }

    pub fn name(&self) -> String {
        format!("Historical statistics for {}", self.friendly_name)
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn state(&self) -> &str {
        self.last_result
            .as_ref()
            .map(|r| r.status.as_str())
            .unwrap_or(STATE_UNKNOWN)
    }

    pub fn attributes(&self) -> BTreeMap<String, AttributeValue> {
        self.last_result
            .as_ref()
            .map(|r| r.attributes.clone())
            .unwrap_or_default()
    }

    /// Recomputes all points as of `now`.
    pub fn update(&mut self, now: DateTime<Utc>) -> &ComputationResult {
        let result = self
            .engine
            .compute(&self.config.entity_id, self.config.points.as_slice(), now);
        tracing::debug!(
            entity_id = %self.config.entity_id,
            status = %result.status,
            attributes = result.attributes.len(),
            "Sensor updated"
        );
        self.last_updated = Some(now);
        self.last_result.insert(result)
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            entity_id: self.config.entity_id.clone(),
            unique_id: self.unique_id.clone(),
            name: self.name(),
            state: self.state().to_string(),
            attributes: self.attributes(),
            update_interval: self.config.update_interval,
            last_updated: self.last_updated,
        }
    }
}

/// Point-in-time view of a sensor, as served over HTTP and WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSnapshot {
    /// Source entity id.
    pub entity_id: String,
    pub unique_id: String,
    pub name: String,
    pub state: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Minutes between updates.
    pub update_interval: u32,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Lowercases and replaces every run of non-alphanumerics with `_`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}
