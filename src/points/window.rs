//! Window resolution and attribute labels.
//!
//! Converts a point's relative offsets into absolute UTC instants and
//! derives the stable attribute label for it.

use super::types::{MeasurementPoint, StatType, TimeUnit};
use chrono::{DateTime, Duration, Months, Utc};
use once_cell::sync::Lazy;

/// Earliest instant the host can have recorded history for (2013-11-01 UTC).
pub static EPOCH_FLOOR: Lazy<DateTime<Utc>> =
    Lazy::new(|| DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(1_383_264_000));

/// Absolute bounds of a measurement window, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Returns the instant `value` units of `unit` before `now`.
///
/// Months and years subtract calendar months; other units are fixed-length.
/// `All` always maps to [`EPOCH_FLOOR`]. Returns `None` if the result is not
/// representable.
pub fn offset_before(now: DateTime<Utc>, unit: TimeUnit, value: u32) -> Option<DateTime<Utc>> {
    let value = i64::from(value);
    match unit {
        TimeUnit::Minutes => now.checked_sub_signed(Duration::try_minutes(value)?),
        TimeUnit::Hours => now.checked_sub_signed(Duration::try_hours(value)?),
        TimeUnit::Days => now.checked_sub_signed(Duration::try_days(value)?),
        TimeUnit::Weeks => now.checked_sub_signed(Duration::try_weeks(value)?),
        TimeUnit::Months => now.checked_sub_months(Months::new(u32::try_from(value).ok()?)),
        TimeUnit::Years => {
            let months = u32::try_from(value.checked_mul(12)?).ok()?;
            now.checked_sub_months(Months::new(months))
        }
        TimeUnit::All => Some(*EPOCH_FLOOR),
    }
}

/// Resolves the window of `point` relative to `now`.
///
/// The end defaults to `now`. The caller decides whether an empty or
/// inverted window is acceptable.
pub fn resolve(point: &MeasurementPoint, now: DateTime<Utc>) -> Option<Window> {
    let start = offset_before(now, point.time_unit, point.time_value)?;
    let end = match point.end_offset() {
        Some((unit, value)) => offset_before(now, unit, value)?,
        None => now,
    };
    Some(Window { start, end })
}

fn offset_label(unit: TimeUnit, value: u32) -> String {
    match unit {
        TimeUnit::All => "full".to_string(),
        unit => format!("{}_{}", unit, value),
    }
}

/// Base attribute label for `point`, e.g. `days_7_mean`, `full_max` or
/// `weeks_2_to_weeks_1_sum`.
///
/// `value_at` targets a single instant, so its label ignores any end offset.
pub fn label(point: &MeasurementPoint) -> String {
    let from = offset_label(point.time_unit, point.time_value);
    match (point.stat_type, point.end_offset()) {
        (StatType::ValueAt, _) | (_, None) => format!("{}_{}", from, point.stat_type),
        (stat, Some((unit, value))) => {
            format!("{}_to_{}_{}", from, offset_label(unit, value), stat)
        }
    }
}

/// Labels for an ordered point list, suffixing repeats with `_2`, `_3`, ...
pub fn unique_labels<'a>(points: impl IntoIterator<Item = &'a MeasurementPoint>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    points
        .into_iter()
        .map(|point| {
            let base = label(point);
            let mut candidate = base.clone();
            let mut n = 2;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{}_{}", base, n);
                n += 1;
            }
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_epoch_floor_value() {
        assert_eq!(*EPOCH_FLOOR, Utc.with_ymd_and_hms(2013, 11, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_all_ignores_value() {
        for value in [0, 1, 42, u32::MAX] {
            let p = MeasurementPoint::new(StatType::Max, TimeUnit::All, value);
            let w = resolve(&p, now()).unwrap();
            assert_eq!(w.start, *EPOCH_FLOOR);
            assert_eq!(w.end, now());
        }
    }

    #[test]
    fn test_fixed_length_units() {
        let p = MeasurementPoint::new(StatType::Min, TimeUnit::Hours, 5);
        assert_eq!(resolve(&p, now()).unwrap().start, now() - Duration::hours(5));

        let p = MeasurementPoint::new(StatType::Min, TimeUnit::Weeks, 2);
        assert_eq!(resolve(&p, now()).unwrap().start, now() - Duration::days(14));
    }

    #[test]
    fn test_months_are_calendar_aware() {
        // March 31 minus one month clamps to the end of February (leap year).
        let p = MeasurementPoint::new(StatType::Mean, TimeUnit::Months, 1);
        let w = resolve(&p, now()).unwrap();
        assert_eq!(w.start, Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap());

        let p = MeasurementPoint::new(StatType::Mean, TimeUnit::Years, 1);
        let w = resolve(&p, now()).unwrap();
        assert_eq!(w.start, Utc.with_ymd_and_hms(2023, 3, 31, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_end_offset() {
        let p = MeasurementPoint::new(StatType::Sum, TimeUnit::Days, 7).ending(TimeUnit::Days, 1);
        let w = resolve(&p, now()).unwrap();
        assert_eq!(w.start, now() - Duration::days(7));
        assert_eq!(w.end, now() - Duration::days(1));
    }

    #[test]
    fn test_labels() {
        let p = MeasurementPoint::new(StatType::Mean, TimeUnit::Days, 7);
        assert_eq!(label(&p), "days_7_mean");

        let p = MeasurementPoint::new(StatType::Max, TimeUnit::All, 3);
        assert_eq!(label(&p), "full_max");

        let p = MeasurementPoint::new(StatType::Sum, TimeUnit::Weeks, 2).ending(TimeUnit::Weeks, 1);
        assert_eq!(label(&p), "weeks_2_to_weeks_1_sum");

        let p = MeasurementPoint::new(StatType::ValueAt, TimeUnit::Hours, 2).ending(TimeUnit::Hours, 1);
        assert_eq!(label(&p), "hours_2_value_at");
    }

    #[test]
    fn test_unique_labels_suffix_repeats() {
        let points = vec![
            MeasurementPoint::new(StatType::Min, TimeUnit::Days, 1),
            MeasurementPoint::new(StatType::Max, TimeUnit::Days, 1),
            MeasurementPoint::new(StatType::Min, TimeUnit::Days, 1),
        ];
        assert_eq!(
            unique_labels(&points),
            vec!["days_1_min", "days_1_max", "days_1_min_2"]
        );
    }
}
