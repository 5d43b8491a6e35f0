//! Options flow: edit the point list of an existing configuration.

use super::{validate_point, PointInput};
use crate::error::WizardError;
use crate::points::{Configuration, MeasurementPoint, PointList};
use crate::translations::EN;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Edits a copy of a configuration's points; the original is untouched
/// until [`OptionsFlow::finish`] hands back the updated configuration.
#[derive(Debug, Clone)]
pub struct OptionsFlow {
    base: Configuration,
    points: PointList,
}

impl OptionsFlow {
    pub fn new(config: &Configuration) -> Self {
        Self {
            base: config.clone(),
            points: config.points.clone(),
        }
    }

    pub fn points(&self) -> &PointList {
        &self.points
    }

    /// Listing shown on the edit-list step.
    pub fn current_points(&self) -> String {
        if self.points.is_empty() {
            EN.text("step.edit_list.empty")
        } else {
            self.points.summary().join("\n")
        }
    }

    /// Appends one point per selected statistic.
    pub fn add_point(&mut self, input: PointInput, now: DateTime<Utc>) -> Result<(), WizardError> {
        let added = input.into_points(now)?;
        self.points = self.points.with_appended(added);
        Ok(())
    }

    /// Replaces the point at `index` entirely.
    ///
    /// Returns `Ok(false)` without changes when `index` is out of range.
    pub fn edit_point(
        &mut self,
        index: usize,
        point: MeasurementPoint,
        now: DateTime<Utc>,
    ) -> Result<bool, WizardError> {
        if index >= self.points.len() {
            tracing::debug!(index, len = self.points.len(), "Ignoring edit of stale index");
            return Ok(false);
        }
        validate_point(&point, now)?;
        self.points = self.points.with_replaced(index, point);
        Ok(true)
    }

    /// Removes the points at `indices`, returning how many were removed.
    pub fn remove_points(&mut self, indices: &BTreeSet<usize>) -> usize {
        let before = self.points.len();
        self.points = self.points.without(indices);
        before - self.points.len()
    }

    /// Commits the edited list.
    pub fn finish(self) -> Configuration {
        Configuration {
            points: self.points,
            ..self.base
        }
    }
}
