//! Creation flow: select entity → set details → add points → finalize.

use super::{validate_point, validate_update_interval, ConfigurationStore, DetailsInput, PointInput};
use crate::engine::{resolve_friendly_name, EntityRegistry};
use crate::error::WizardError;
use crate::points::{Configuration, MeasurementPoint, PointList};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Step the creation flow is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStep {
    SelectEntity,
    SetDetails,
    /// Repeatable; points may also be edited or removed here.
    AddPoint,
}

impl ConfigStep {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigStep::SelectEntity => "select_entity",
            ConfigStep::SetDetails => "set_details",
            ConfigStep::AddPoint => "add_point",
        }
    }
}

/// Wizard creating a new configuration.
pub struct ConfigFlow<'a> {
    store: &'a dyn ConfigurationStore,
    registry: &'a dyn EntityRegistry,
    step: ConfigStep,
    entity_id: String,
    update_interval: u32,
    friendly_name: Option<String>,
    points: PointList,
}

impl<'a> ConfigFlow<'a> {
    /// Starts a flow. `default_update_interval` pre-fills the details step.
    pub fn new(
        store: &'a dyn ConfigurationStore,
        registry: &'a dyn EntityRegistry,
        default_update_interval: u32,
    ) -> Self {
        Self {
            store,
            registry,
            step: ConfigStep::SelectEntity,
            entity_id: String::new(),
            update_interval: default_update_interval,
            friendly_name: None,
            points: PointList::new(),
        }
    }

    pub fn step(&self) -> ConfigStep {
        self.step
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn update_interval(&self) -> u32 {
        self.update_interval
    }

    pub fn points(&self) -> &PointList {
        &self.points
    }

    fn require_step(&self, expected: ConfigStep) -> Result<(), WizardError> {
        if self.step == expected {
            Ok(())
        } else {
            Err(WizardError::WrongStep {
                expected: expected.as_str(),
                actual: self.step.as_str(),
            })
        }
    }

    /// Chooses the source entity. Fails with `DuplicateEntity` if it is
    /// already configured.
    pub fn select_entity(&mut self, entity_id: &str) -> Result<ConfigStep, WizardError> {
        self.require_step(ConfigStep::SelectEntity)?;

        let entity_id = entity_id.trim();
        if entity_id.is_empty() {
            return Err(WizardError::validation("entity_id", "error.empty_entity_id"));
        }
        if self.store.has_configuration(entity_id)? {
            tracing::debug!(entity_id, "Rejected duplicate entity");
            return Err(WizardError::DuplicateEntity(entity_id.to_string()));
        }

        self.entity_id = entity_id.to_string();
        self.step = ConfigStep::SetDetails;
        Ok(self.step)
    }

    /// Sets the update interval (1..=1440 minutes) and optional display name.
    pub fn set_details(&mut self, input: DetailsInput) -> Result<ConfigStep, WizardError> {
        self.require_step(ConfigStep::SetDetails)?;

        self.update_interval = validate_update_interval(input.update_interval)?;
        self.friendly_name = input
            .friendly_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self.step = ConfigStep::AddPoint;
        Ok(self.step)
    }

    /// Appends one point per selected statistic.
    pub fn add_point(
        &mut self,
        input: PointInput,
        now: DateTime<Utc>,
    ) -> Result<ConfigStep, WizardError> {
        self.require_step(ConfigStep::AddPoint)?;

        let added = input.into_points(now)?;
        self.points = self.points.with_appended(added);
        Ok(self.step)
    }

    /// Replaces the point at `index`. Out-of-range indices are ignored.
    pub fn edit_point(
        &mut self,
        index: usize,
        point: MeasurementPoint,
        now: DateTime<Utc>,
    ) -> Result<ConfigStep, WizardError> {
        self.require_step(ConfigStep::AddPoint)?;
        if index >= self.points.len() {
            return Ok(self.step);
        }

        validate_point(&point, now)?;
        self.points = self.points.with_replaced(index, point);
        Ok(self.step)
    }

    /// Removes the points at `indices`. Out-of-range indices are ignored.
    pub fn remove_points(&mut self, indices: &BTreeSet<usize>) -> Result<ConfigStep, WizardError> {
        self.require_step(ConfigStep::AddPoint)?;

        self.points = self.points.without(indices);
        Ok(self.step)
    }

    /// Produces the configuration. A missing display name is resolved from
    /// the entity registry, falling back to the entity id.
    pub fn finalize(&self) -> Result<Configuration, WizardError> {
        self.require_step(ConfigStep::AddPoint)?;
        if self.points.is_empty() {
            return Err(WizardError::validation("points", "error.no_points"));
        }

        let friendly_name =
            resolve_friendly_name(self.registry, &self.entity_id, self.friendly_name.as_deref());

        tracing::info!(
            entity_id = %self.entity_id,
            points = self.points.len(),
            "Configuration completed"
        );
        Ok(Configuration {
            entity_id: self.entity_id.clone(),
            friendly_name: Some(friendly_name),
            update_interval: self.update_interval,
            points: self.points.clone(),
        })
    }
}

/// Title shown for a stored configuration.
pub fn entry_title(config: &Configuration) -> String {
    format!(
        "Historical statistics: {}",
        config.friendly_name.as_deref().unwrap_or(&config.entity_id)
    )
}
