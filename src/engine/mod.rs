//! Historical statistics computation.
//!
//! The engine resolves each measurement point to a window, reads the
//! source entity's history for it and reduces the numeric samples to one
//! labelled value. Failures are contained per point: the label reads
//! `unknown` and the overall status is escalated, but the remaining points
//! are still computed.

pub mod history;
pub mod result;

pub use history::*;
pub use result::*;

use crate::error::PointError;
use crate::points::{resolve, unique_labels, MeasurementPoint, StatType, Window};
use chrono::{DateTime, Duration, Local, Utc};
use std::sync::Arc;

/// Default half-width of the lookup window around a `value_at` target.
pub const DEFAULT_VALUE_AT_TOLERANCE_MINS: i64 = 10;

/// Local-time format of the `_ts_human` attributes.
pub const HUMAN_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Value computed for one point, with the timestamp of the sample it came from.
#[derive(Debug, Clone, PartialEq)]
struct PointValue {
    value: AttributeValue,
    changed_at: Option<DateTime<Utc>>,
}

impl PointValue {
    fn number(value: f64) -> Self {
        Self {
            value: AttributeValue::Number(value),
            changed_at: None,
        }
    }

    fn unknown() -> Self {
        Self {
            value: AttributeValue::Unknown,
            changed_at: None,
        }
    }

    fn sample(value: f64, changed_at: DateTime<Utc>) -> Self {
        Self {
            value: AttributeValue::Number(value),
            changed_at: Some(changed_at),
        }
    }
}

/// Computes statistics over an entity's recorded history.
#[derive(Clone)]
pub struct StatisticsEngine {
    history: Arc<dyn HistoryStore>,
    statistics: Option<Arc<dyn StatisticsStore>>,
    value_at_tolerance: Duration,
}

impl StatisticsEngine {
    /// Creates an engine reading raw samples from `history`, without a
    /// long-term statistics fallback.
    pub fn new(history: Arc<dyn HistoryStore>) -> Self {
        Self {
            history,
            statistics: None,
            value_at_tolerance: Duration::minutes(DEFAULT_VALUE_AT_TOLERANCE_MINS),
        }
    }

    /// Enables the long-term statistics fallback for `min`, `max` and `mean`.
    pub fn with_statistics(mut self, statistics: Arc<dyn StatisticsStore>) -> Self {
        self.statistics = Some(statistics);
        self
    }

    /// Sets the half-width of the `value_at` lookup window.
    pub fn with_value_at_tolerance(mut self, tolerance: Duration) -> Self {
        self.value_at_tolerance = tolerance;
        self
    }

    /// Computes every point of `points` for `entity_id` as of `now`.
    pub fn compute(
        &self,
        entity_id: &str,
        points: &[MeasurementPoint],
        now: DateTime<Utc>,
    ) -> ComputationResult {
        let mut result = ComputationResult::default();

        for (point, label) in points.iter().zip(unique_labels(points)) {
            match self.compute_point(entity_id, point, now) {
                Ok(computed) => {
                    if let Some(changed_at) = computed.changed_at {
                        insert_timestamps(&mut result, &label, changed_at);
                    }
                    result.attributes.insert(label, computed.value);
                }
                Err(PointError::NoData) => {
                    tracing::debug!(entity_id, label = %label, "No data for measurement point");
                    result.attributes.insert(label, AttributeValue::Unknown);
                    result.status.escalate(Status::NoData);
                }
                Err(PointError::Computation(reason)) => {
                    tracing::warn!(
                        entity_id,
                        label = %label,
                        reason = %reason,
                        "Failed to compute measurement point"
                    );
                    result.attributes.insert(label, AttributeValue::Unknown);
                    result.status.escalate(Status::Error);
                }
            }
        }

        tracing::debug!(
            entity_id,
            points = points.len(),
            status = %result.status,
            "Computed historical statistics"
        );
        result
    }

    fn compute_point(
        &self,
        entity_id: &str,
        point: &MeasurementPoint,
        now: DateTime<Utc>,
    ) -> Result<PointValue, PointError> {
        let window = resolve(point, now).ok_or_else(|| {
            PointError::Computation(format!("window of {} is out of range", point.describe()))
        })?;

        match point.stat_type {
            StatType::ValueAt => self.value_at(entity_id, window.start),
            stat => self.window_statistic(entity_id, stat, &window),
        }
    }

    /// Recorded value closest to `target`. Missing samples yield `unknown`
    /// without raising the status.
    fn value_at(&self, entity_id: &str, target: DateTime<Utc>) -> Result<PointValue, PointError> {
        let (Some(start), Some(end)) = (
            target.checked_sub_signed(self.value_at_tolerance),
            target.checked_add_signed(self.value_at_tolerance),
        ) else {
            return Err(PointError::Computation(format!(
                "value_at target {} is out of range",
                target
            )));
        };

        let samples = self.history.fetch_samples(entity_id, start, end)?;
        let Some(found) = closest(&samples, target) else {
            return Ok(PointValue::unknown());
        };

        let value = match found.numeric() {
            Some(v) => AttributeValue::Number(v),
            None => AttributeValue::Text(found.value.clone()),
        };
        Ok(PointValue {
            value,
            changed_at: Some(found.changed_at),
        })
    }

    fn window_statistic(
        &self,
        entity_id: &str,
        stat: StatType,
        window: &Window,
    ) -> Result<PointValue, PointError> {
        if window.end <= window.start {
            return Err(PointError::Computation(format!(
                "window ends at {} before it starts at {}",
                window.end, window.start
            )));
        }

        let mut samples = self
            .history
            .fetch_samples(entity_id, window.start, window.end)?;
        if samples.first().map_or(true, |s| s.changed_at > window.start) {
            if let Some(prevailing) = self.history.fetch_start_state(entity_id, window.start)? {
                if samples.first().is_some_and(|s| s.value == prevailing.value) {
                    samples.remove(0);
                }
                samples.insert(0, prevailing);
            }
        }

        let numeric: Vec<(f64, DateTime<Utc>)> = samples
            .iter()
            .filter_map(|s| s.numeric().map(|v| (v, s.changed_at)))
            .collect();

        if numeric.is_empty() {
            return self.from_statistics(entity_id, stat, window);
        }

        let count = numeric.len() as f64;
        let sum: f64 = numeric.iter().map(|(v, _)| v).sum();

        let computed = match stat {
            StatType::Min => extremum(numeric.iter().copied(), |a, b| a < b)
                .map(|(v, at)| PointValue::sample(v, at))
                .unwrap_or_else(PointValue::unknown),
            StatType::Max => extremum(numeric.iter().copied(), |a, b| a > b)
                .map(|(v, at)| PointValue::sample(v, at))
                .unwrap_or_else(PointValue::unknown),
            StatType::Mean => PointValue::number(sum / count),
            StatType::Sum => PointValue::number(sum),
            StatType::Total => match (numeric.first(), numeric.last()) {
                (Some((first, _)), Some((last, _))) if numeric.len() >= 2 => {
                    PointValue::number(last - first)
                }
                _ => PointValue::unknown(),
            },
            StatType::ValueAt => {
                return Err(PointError::Computation(
                    "value_at is not a window statistic".to_string(),
                ))
            }
        };
        Ok(computed)
    }

    /// Falls back to hourly long-term statistics once raw samples are gone.
    fn from_statistics(
        &self,
        entity_id: &str,
        stat: StatType,
        window: &Window,
    ) -> Result<PointValue, PointError> {
        if !stat.has_statistics_fallback() {
            return Err(PointError::NoData);
        }
        let Some(statistics) = self.statistics.as_ref() else {
            return Err(PointError::NoData);
        };
        let field = match stat {
            StatType::Min => AggregateField::Min,
            StatType::Max => AggregateField::Max,
            _ => AggregateField::Mean,
        };

        let rows = statistics.fetch_aggregates(
            entity_id,
            window.start,
            window.end,
            Granularity::Hour,
            &[field],
        )?;

        let computed = match field {
            AggregateField::Min => {
                extremum(rows.iter().filter_map(|r| r.min.map(|v| (v, r.start))), |a, b| a < b)
                    .map(|(v, at)| PointValue::sample(v, at))
            }
            AggregateField::Max => {
                extremum(rows.iter().filter_map(|r| r.max.map(|v| (v, r.start))), |a, b| a > b)
                    .map(|(v, at)| PointValue::sample(v, at))
            }
            AggregateField::Mean => {
                let means: Vec<f64> = rows.iter().filter_map(|r| r.mean).collect();
                (!means.is_empty())
                    .then(|| PointValue::number(means.iter().sum::<f64>() / means.len() as f64))
            }
        };

        if computed.is_some() {
            tracing::debug!(entity_id, stat = %stat, buckets = rows.len(), "Used long-term statistics");
        }
        computed.ok_or(PointError::NoData)
    }
}

/// First value for which no later value is `better`.
fn extremum(
    values: impl IntoIterator<Item = (f64, DateTime<Utc>)>,
    better: fn(f64, f64) -> bool,
) -> Option<(f64, DateTime<Utc>)> {
    values
        .into_iter()
        .reduce(|best, cur| if better(cur.0, best.0) { cur } else { best })
}

/// Sample with the smallest distance to `target`; the first one wins ties.
fn closest(samples: &[Sample], target: DateTime<Utc>) -> Option<&Sample> {
    samples
        .iter()
        .min_by_key(|s| (s.changed_at - target).abs())
}

fn insert_timestamps(result: &mut ComputationResult, label: &str, changed_at: DateTime<Utc>) {
    result.attributes.insert(
        format!("{}_ts", label),
        AttributeValue::Text(changed_at.to_rfc3339()),
    );
    result.attributes.insert(
        format!("{}_ts_human", label),
        AttributeValue::Text(
            changed_at
                .with_timezone(&Local)
                .format(HUMAN_TIMESTAMP_FORMAT)
                .to_string(),
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::points::TimeUnit;
    use chrono::TimeZone;
    use std::sync::Mutex;

    const ENTITY: &str = "sensor.energy";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[derive(Default)]
    struct MemoryHistory {
        samples: Vec<Sample>,
        calls: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    }

    impl MemoryHistory {
        fn with(samples: Vec<Sample>) -> Arc<Self> {
            Arc::new(Self {
                samples,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl HistoryStore for MemoryHistory {
        fn fetch_samples(
            &self,
            _entity_id: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<Sample>, StoreError> {
            self.calls.lock().unwrap().push((start, end));
            Ok(self
                .samples
                .iter()
                .filter(|s| s.changed_at >= start && s.changed_at < end)
                .cloned()
                .collect())
        }

        fn fetch_start_state(
            &self,
            _entity_id: &str,
            start: DateTime<Utc>,
        ) -> Result<Option<Sample>, StoreError> {
            Ok(self
                .samples
                .iter()
                .filter(|s| s.changed_at < start)
                .last()
                .map(|s| Sample::new(s.value.clone(), start)))
        }
    }

    struct FailingHistory;

    impl HistoryStore for FailingHistory {
        fn fetch_samples(
            &self,
            _entity_id: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<Sample>, StoreError> {
            Err(StoreError::InvalidTimestamp("corrupt row".to_string()))
        }
    }

    struct MemoryStatistics(Vec<AggregateRow>);

    impl StatisticsStore for MemoryStatistics {
        fn fetch_aggregates(
            &self,
            _entity_id: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
            _granularity: Granularity,
            _fields: &[AggregateField],
        ) -> Result<Vec<AggregateRow>, StoreError> {
            Ok(self
                .0
                .iter()
                .filter(|r| r.start >= start && r.start < end)
                .cloned()
                .collect())
        }
    }

    fn ago(minutes: i64) -> DateTime<Utc> {
        now() - Duration::minutes(minutes)
    }

    fn point(stat: StatType, unit: TimeUnit, value: u32) -> MeasurementPoint {
        MeasurementPoint::new(stat, unit, value)
    }

    #[test]
    fn test_mean_over_week() {
        let history = MemoryHistory::with(vec![
            Sample::new("1.0", ago(6 * 24 * 60)),
            Sample::new("3.0", ago(3 * 24 * 60)),
            Sample::new("5.0", ago(60)),
        ]);
        let engine = StatisticsEngine::new(history);

        let result = engine.compute(ENTITY, &[point(StatType::Mean, TimeUnit::Days, 7)], now());

        assert_eq!(result.get("days_7_mean"), Some(&AttributeValue::Number(3.0)));
        assert_eq!(result.status, Status::Ok);
    }

    #[test]
    fn test_min_and_max_do_not_collide() {
        let history = MemoryHistory::with(vec![
            Sample::new("4", ago(600)),
            Sample::new("unavailable", ago(500)),
            Sample::new("-2", ago(400)),
            Sample::new("9", ago(300)),
            Sample::new("-2", ago(200)),
        ]);
        let engine = StatisticsEngine::new(history);
        let points = [
            point(StatType::Min, TimeUnit::Days, 1),
            point(StatType::Max, TimeUnit::Days, 1),
        ];

        let result = engine.compute(ENTITY, &points, now());

        assert_eq!(result.get("days_1_min"), Some(&AttributeValue::Number(-2.0)));
        assert_eq!(result.get("days_1_max"), Some(&AttributeValue::Number(9.0)));
        // Ties resolve to the first sample in scan order.
        assert_eq!(
            result.get("days_1_min_ts"),
            Some(&AttributeValue::Text(ago(400).to_rfc3339()))
        );
        assert!(result.get("days_1_max_ts_human").is_some());
        assert_eq!(result.status, Status::Ok);
    }

    #[test]
    fn test_total_needs_two_samples() {
        let engine = StatisticsEngine::new(MemoryHistory::with(vec![Sample::new("10", ago(30))]));
        let total = [point(StatType::Total, TimeUnit::Hours, 1)];

        let result = engine.compute(ENTITY, &total, now());
        assert_eq!(result.get("hours_1_total"), Some(&AttributeValue::Unknown));
        assert_eq!(result.status, Status::Ok);

        let engine = StatisticsEngine::new(MemoryHistory::with(vec![
            Sample::new("10.25", ago(50)),
            Sample::new("12.75", ago(10)),
        ]));
        let result = engine.compute(ENTITY, &total, now());
        assert_eq!(result.get("hours_1_total"), Some(&AttributeValue::Number(2.5)));
    }

    #[test]
    fn test_sum() {
        let engine = StatisticsEngine::new(MemoryHistory::with(vec![
            Sample::new("1.5", ago(50)),
            Sample::new("off", ago(40)),
            Sample::new("2.5", ago(10)),
        ]));
        let result = engine.compute(ENTITY, &[point(StatType::Sum, TimeUnit::Hours, 1)], now());
        assert_eq!(result.get("hours_1_sum"), Some(&AttributeValue::Number(4.0)));
    }

    #[test]
    fn test_empty_window_is_no_data() {
        let engine = StatisticsEngine::new(MemoryHistory::with(vec![Sample::new("on", ago(5))]));
        let points: Vec<_> = [StatType::Min, StatType::Max, StatType::Mean, StatType::Sum]
            .into_iter()
            .map(|s| point(s, TimeUnit::Hours, 1))
            .collect();

        let result = engine.compute(ENTITY, &points, now());

        for label in ["hours_1_min", "hours_1_max", "hours_1_mean", "hours_1_sum"] {
            assert_eq!(result.get(label), Some(&AttributeValue::Unknown), "{label}");
        }
        assert_eq!(result.status, Status::NoData);
    }

    #[test]
    fn test_statistics_fallback_for_min_max_mean() {
        let rows = vec![
            AggregateRow {
                start: ago(180),
                min: Some(2.0),
                max: Some(8.0),
                mean: Some(5.0),
            },
            AggregateRow {
                start: ago(120),
                min: Some(1.0),
                max: Some(6.0),
                mean: Some(3.0),
            },
        ];
        let engine = StatisticsEngine::new(MemoryHistory::with(vec![]))
            .with_statistics(Arc::new(MemoryStatistics(rows)));
        let points: Vec<_> = [StatType::Min, StatType::Max, StatType::Mean, StatType::Sum]
            .into_iter()
            .map(|s| point(s, TimeUnit::Hours, 4))
            .collect();

        let result = engine.compute(ENTITY, &points, now());

        assert_eq!(result.get("hours_4_min"), Some(&AttributeValue::Number(1.0)));
        assert_eq!(result.get("hours_4_max"), Some(&AttributeValue::Number(8.0)));
        assert_eq!(result.get("hours_4_mean"), Some(&AttributeValue::Number(4.0)));
        assert_eq!(
            result.get("hours_4_max_ts"),
            Some(&AttributeValue::Text(ago(180).to_rfc3339()))
        );
        // Sum has no fallback.
        assert_eq!(result.get("hours_4_sum"), Some(&AttributeValue::Unknown));
        assert_eq!(result.status, Status::NoData);
    }

    #[test]
    fn test_value_at_picks_closest_sample() {
        let history = MemoryHistory::with(vec![
            Sample::new("18.0", ago(128)),
            Sample::new("19.5", ago(119)),
            Sample::new("heating", ago(112)),
        ]);
        let engine = StatisticsEngine::new(history.clone());

        let result = engine.compute(ENTITY, &[point(StatType::ValueAt, TimeUnit::Hours, 2)], now());

        assert_eq!(result.get("hours_2_value_at"), Some(&AttributeValue::Number(19.5)));
        assert_eq!(
            result.get("hours_2_value_at_ts"),
            Some(&AttributeValue::Text(ago(119).to_rfc3339()))
        );
        let calls = history.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[(ago(130), ago(110))]);
    }

    #[test]
    fn test_value_at_keeps_textual_state() {
        let engine = StatisticsEngine::new(MemoryHistory::with(vec![Sample::new("heating", ago(61))]));
        let result = engine.compute(ENTITY, &[point(StatType::ValueAt, TimeUnit::Hours, 1)], now());
        assert_eq!(
            result.get("hours_1_value_at"),
            Some(&AttributeValue::Text("heating".to_string()))
        );
    }

    #[test]
    fn test_value_at_missing_does_not_escalate() {
        let engine = StatisticsEngine::new(MemoryHistory::with(vec![Sample::new("3", ago(60))]));

        let result = engine.compute(ENTITY, &[point(StatType::ValueAt, TimeUnit::Hours, 2)], now());

        assert_eq!(result.get("hours_2_value_at"), Some(&AttributeValue::Unknown));
        assert!(result.get("hours_2_value_at_ts").is_none());
        assert_eq!(result.status, Status::Ok);
    }

    #[test]
    fn test_lookup_failure_is_contained() {
        let engine = StatisticsEngine::new(Arc::new(FailingHistory));
        let points = [
            point(StatType::Mean, TimeUnit::Days, 1),
            point(StatType::ValueAt, TimeUnit::Days, 1),
        ];

        let result = engine.compute(ENTITY, &points, now());

        assert_eq!(result.get("days_1_mean"), Some(&AttributeValue::Unknown));
        assert_eq!(result.get("days_1_value_at"), Some(&AttributeValue::Unknown));
        assert_eq!(result.status, Status::Error);
    }

    #[test]
    fn test_error_dominates_no_data() {
        // The first point errors, the second has no data; the later no-data must not downgrade.
        let engine = StatisticsEngine::new(MemoryHistory::with(vec![]));
        let inverted = point(StatType::Mean, TimeUnit::Days, 1).ending(TimeUnit::Days, 2);
        let points = [inverted, point(StatType::Max, TimeUnit::Days, 1)];

        let result = engine.compute(ENTITY, &points, now());

        assert_eq!(result.get("days_1_to_days_2_mean"), Some(&AttributeValue::Unknown));
        assert_eq!(result.get("days_1_max"), Some(&AttributeValue::Unknown));
        assert_eq!(result.status, Status::Error);
    }

    #[test]
    fn test_explicit_end_offset_limits_window() {
        let engine = StatisticsEngine::new(MemoryHistory::with(vec![
            Sample::new("1", ago(3 * 24 * 60)),
            Sample::new("100", ago(60)),
        ]));
        let p = point(StatType::Max, TimeUnit::Days, 7).ending(TimeUnit::Days, 1);

        let result = engine.compute(ENTITY, &[p], now());

        assert_eq!(result.get("days_7_to_days_1_max"), Some(&AttributeValue::Number(1.0)));
    }

    #[test]
    fn test_full_history_uses_epoch_floor() {
        let history = MemoryHistory::with(vec![Sample::new("7", ago(10))]);
        let engine = StatisticsEngine::new(history.clone());

        let result = engine.compute(ENTITY, &[point(StatType::Max, TimeUnit::All, 99)], now());

        assert_eq!(result.get("full_max"), Some(&AttributeValue::Number(7.0)));
        let calls = history.calls.lock().unwrap();
        assert_eq!(calls[0].0, *crate::points::EPOCH_FLOOR);
    }

    #[test]
    fn test_steady_sensor_uses_state_at_window_start() {
        let engine = StatisticsEngine::new(MemoryHistory::with(vec![Sample::new("21.0", ago(180))]));
        let points = [
            point(StatType::Max, TimeUnit::Hours, 1),
            point(StatType::ValueAt, TimeUnit::Hours, 1),
        ];

        let result = engine.compute(ENTITY, &points, now());

        assert_eq!(result.get("hours_1_max"), Some(&AttributeValue::Number(21.0)));
        assert_eq!(
            result.get("hours_1_max_ts"),
            Some(&AttributeValue::Text(ago(60).to_rfc3339()))
        );
        // value_at only looks around its target.
        assert_eq!(result.get("hours_1_value_at"), Some(&AttributeValue::Unknown));
        assert_eq!(result.status, Status::Ok);
    }

    #[test]
    fn test_total_starts_from_prevailing_value() {
        let engine = StatisticsEngine::new(MemoryHistory::with(vec![
            Sample::new("100", ago(120)),
            Sample::new("104.5", ago(30)),
        ]));

        let result = engine.compute(ENTITY, &[point(StatType::Total, TimeUnit::Hours, 1)], now());

        assert_eq!(result.get("hours_1_total"), Some(&AttributeValue::Number(4.5)));
    }

    #[test]
    fn test_prevailing_value_collapses_with_repeat() {
        let engine = StatisticsEngine::new(MemoryHistory::with(vec![
            Sample::new("5", ago(90)),
            Sample::new("5", ago(40)),
            Sample::new("7", ago(20)),
        ]));

        let result = engine.compute(ENTITY, &[point(StatType::Mean, TimeUnit::Hours, 1)], now());

        assert_eq!(result.get("hours_1_mean"), Some(&AttributeValue::Number(6.0)));
    }
}
