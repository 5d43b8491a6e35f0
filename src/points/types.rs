//! Data types for measurement point configuration.
//!
//! Defines the statistic and time-unit enums, a single measurement point,
//! and the persisted per-sensor configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Statistic computed for a measurement point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatType {
    /// Recorded value closest to the window start.
    ValueAt,
    Min,
    Max,
    Mean,
    /// Last value minus first value in the window.
    Total,
    Sum,
}

impl StatType {
    pub const ALL: [StatType; 6] = [
        StatType::ValueAt,
        StatType::Min,
        StatType::Max,
        StatType::Mean,
        StatType::Total,
        StatType::Sum,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StatType::ValueAt => "value_at",
            StatType::Min => "min",
            StatType::Max => "max",
            StatType::Mean => "mean",
            StatType::Total => "total",
            StatType::Sum => "sum",
        }
    }

    /// Types that cannot share a submission with any other type.
    pub fn is_exclusive(self) -> bool {
        matches!(self, StatType::ValueAt | StatType::Total)
    }

    /// Types that may fall back to long-term statistics when raw history is gone.
    pub fn has_statistics_fallback(self) -> bool {
        matches!(self, StatType::Min | StatType::Max | StatType::Mean)
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for StatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of a window offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
    /// Everything since the epoch floor; the offset value is ignored.
    All,
}

impl TimeUnit {
    pub const ALL: [TimeUnit; 7] = [
        TimeUnit::Minutes,
        TimeUnit::Hours,
        TimeUnit::Days,
        TimeUnit::Weeks,
        TimeUnit::Months,
        TimeUnit::Years,
        TimeUnit::All,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
            TimeUnit::Weeks => "weeks",
            TimeUnit::Months => "months",
            TimeUnit::Years => "years",
            TimeUnit::All => "all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|u| u.as_str() == s)
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_time_unit() -> TimeUnit {
    TimeUnit::Days
}

fn default_time_value() -> u32 {
    1
}

/// One requested statistic over one time window.
///
/// The window starts `time_value` units before "now" and ends either at
/// "now" or `time_value_to` units of `time_unit_to` before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementPoint {
    /// Statistic to compute.
    pub stat_type: StatType,

    /// Unit of the start offset.
    #[serde(default = "default_time_unit")]
    pub time_unit: TimeUnit,

    /// How many units ago the window starts.
    #[serde(default = "default_time_value")]
    pub time_value: u32,

    /// Unit of the optional end offset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_unit_to: Option<TimeUnit>,

    /// How many units ago the window ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_value_to: Option<u32>,
}

impl MeasurementPoint {
    /// Creates a point whose window ends now.
    pub fn new(stat_type: StatType, time_unit: TimeUnit, time_value: u32) -> Self {
        Self {
            stat_type,
            time_unit,
            time_value,
            time_unit_to: None,
            time_value_to: None,
        }
    }

    /// Sets an explicit end offset.
    pub fn ending(mut self, time_unit_to: TimeUnit, time_value_to: u32) -> Self {
        self.time_unit_to = Some(time_unit_to);
        self.time_value_to = Some(time_value_to);
        self
    }

    /// The explicit end offset, if any. A unit without a value means zero units ago.
    pub fn end_offset(&self) -> Option<(TimeUnit, u32)> {
        self.time_unit_to
            .map(|unit| (unit, self.time_value_to.unwrap_or(0)))
    }

    /// One-line description used in option-flow listings, e.g. `min 1 days`.
    pub fn describe(&self) -> String {
        let mut line = match self.time_unit {
            TimeUnit::All => format!("{} all", self.stat_type),
            unit => format!("{} {} {}", self.stat_type, self.time_value, unit),
        };
        if let Some((unit, value)) = self.end_offset() {
            line.push_str(&format!(" to {} {}", value, unit));
        }
        line
    }
}

/// Ordered list of measurement points with copy-on-edit semantics.
///
/// Every edit returns a new list; the receiver is never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointList(Vec<MeasurementPoint>);

impl PointList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MeasurementPoint> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MeasurementPoint> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[MeasurementPoint] {
        &self.0
    }

    /// Returns a copy with `points` appended in order.
    pub fn with_appended(&self, points: impl IntoIterator<Item = MeasurementPoint>) -> Self {
        let mut next = self.0.clone();
        next.extend(points);
        Self(next)
    }

    /// Returns a copy with the point at `index` replaced.
    ///
    /// An out-of-range index yields an unchanged copy.
    pub fn with_replaced(&self, index: usize, point: MeasurementPoint) -> Self {
        let mut next = self.0.clone();
        if let Some(slot) = next.get_mut(index) {
            *slot = point;
        }
        Self(next)
    }

    /// Returns a copy without the points at `indices`.
    ///
    /// Indices are removed highest first so earlier indices stay valid during
    /// the pass. Out-of-range indices are ignored.
    pub fn without(&self, indices: &BTreeSet<usize>) -> Self {
        let mut next = self.0.clone();
        for &index in indices.iter().rev() {
            if index < next.len() {
                next.remove(index);
            }
        }
        Self(next)
    }

    /// Numbered summary lines, `"1: min 1 days"`.
    pub fn summary(&self) -> Vec<String> {
        self.0
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{}: {}", i + 1, p.describe()))
            .collect()
    }
}

impl From<Vec<MeasurementPoint>> for PointList {
    fn from(points: Vec<MeasurementPoint>) -> Self {
        Self(points)
    }
}

impl<'a> IntoIterator for &'a PointList {
    type Item = &'a MeasurementPoint;
    type IntoIter = std::slice::Iter<'a, MeasurementPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Full setup of one historical statistics sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Source entity the statistics are computed for. Unique across configurations.
    pub entity_id: String,

    /// Display label. Resolved from the entity registry when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    /// Minutes between recomputations, 1..=1440.
    pub update_interval: u32,

    /// Requested statistics, in display order.
    #[serde(default)]
    pub points: PointList,
}
