//! Configuration wizard.
//!
//! Collects a [`Configuration`](crate::points::Configuration) through a
//! sequence of steps. Input is validated per step; a rejected submission
//! leaves the flow exactly as it was so the form can be shown again.
//! Nothing is persisted until the caller stores the finished configuration.

pub mod config_flow;
pub mod options_flow;

pub use config_flow::*;
pub use options_flow::*;

use crate::error::{StoreError, WizardError};
use crate::points::{resolve, MeasurementPoint, StatType, TimeUnit};
use chrono::{DateTime, Utc};

/// Smallest accepted update interval, in minutes.
pub const MIN_UPDATE_INTERVAL: u32 = 1;
/// Largest accepted update interval, in minutes (one day).
pub const MAX_UPDATE_INTERVAL: u32 = 1440;

/// Lookup of already configured entities.
pub trait ConfigurationStore {
    fn has_configuration(&self, entity_id: &str) -> Result<bool, StoreError>;
}

/// Submission of the details step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailsInput {
    pub update_interval: u32,
    pub friendly_name: Option<String>,
}

/// Submission of the add-point step: one window, one or more statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointInput {
    pub stat_types: Vec<StatType>,
    pub time_unit: TimeUnit,
    pub time_value: u32,
    pub time_unit_to: Option<TimeUnit>,
    pub time_value_to: Option<u32>,
}

impl PointInput {
    pub fn new(stat_types: Vec<StatType>, time_unit: TimeUnit, time_value: u32) -> Self {
        Self {
            stat_types,
            time_unit,
            time_value,
            time_unit_to: None,
            time_value_to: None,
        }
    }

    pub fn ending(mut self, time_unit_to: TimeUnit, time_value_to: u32) -> Self {
        self.time_unit_to = Some(time_unit_to);
        self.time_value_to = Some(time_value_to);
        self
    }

    /// Expands the submission into one point per selected statistic.
    ///
    /// Repeated selections count once. Rejects empty selections, `value_at`
    /// or `total` combined with anything else, and windows that do not end
    /// after they start as of `now`.
    pub fn into_points(self, now: DateTime<Utc>) -> Result<Vec<MeasurementPoint>, WizardError> {
        let mut selected: Vec<StatType> = Vec::with_capacity(self.stat_types.len());
        for stat in self.stat_types {
            if !selected.contains(&stat) {
                selected.push(stat);
            }
        }

        if selected.is_empty() {
            return Err(WizardError::validation("stat_types", "error.no_stat_types"));
        }
        if selected.len() > 1 && selected.iter().any(|s| s.is_exclusive()) {
            return Err(WizardError::validation(
                "stat_types",
                "error.exclusive_stat_type",
            ));
        }

        let points: Vec<MeasurementPoint> = selected
            .into_iter()
            .map(|stat_type| MeasurementPoint {
                stat_type,
                time_unit: self.time_unit,
                time_value: self.time_value,
                time_unit_to: self.time_unit_to,
                time_value_to: self.time_unit_to.map(|_| self.time_value_to.unwrap_or(0)),
            })
            .collect();

        for point in &points {
            validate_point(point, now)?;
        }
        Ok(points)
    }
}

impl From<&MeasurementPoint> for PointInput {
    fn from(point: &MeasurementPoint) -> Self {
        Self {
            stat_types: vec![point.stat_type],
            time_unit: point.time_unit,
            time_value: point.time_value,
            time_unit_to: point.time_unit_to,
            time_value_to: point.time_value_to,
        }
    }
}

/// Checks the window shape of a single point.
pub fn validate_point(point: &MeasurementPoint, now: DateTime<Utc>) -> Result<(), WizardError> {
    let Some((end_unit, _)) = point.end_offset() else {
        return Ok(());
    };

    if point.stat_type == StatType::ValueAt {
        return Err(WizardError::validation(
            "time_unit_to",
            "error.value_at_single_instant",
        ));
    }
    if end_unit == TimeUnit::All {
        return Err(WizardError::validation(
            "time_unit_to",
            "error.invalid_window_end",
        ));
    }
    match resolve(point, now) {
        Some(window) if window.end > window.start => Ok(()),
        _ => Err(WizardError::validation(
            "time_value_to",
            "error.window_end_before_start",
        )),
    }
}

/// Checks an update interval against `[1, 1440]` minutes.
pub fn validate_update_interval(minutes: u32) -> Result<u32, WizardError> {
    if (MIN_UPDATE_INTERVAL..=MAX_UPDATE_INTERVAL).contains(&minutes) {
        Ok(minutes)
    } else {
        Err(WizardError::validation(
            "update_interval",
            "error.update_interval_range",
        ))
    }
}
