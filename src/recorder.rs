//! Recorder housekeeping.
//!
//! Completed hours of raw states are compiled into long-term statistics,
//! then states older than the keep period are purged. Windows reaching
//! past the purge horizon are served from the compiled statistics.

use crate::database::{hour_start, Database};
use crate::error::StoreError;
use crate::sensor::{ScheduleHandle, Scheduler};
use chrono::{DateTime, Duration, Utc};

/// How often maintenance runs.
pub const MAINTENANCE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60 * 60);

/// What one maintenance run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceSummary {
    pub compiled: usize,
    pub purged: usize,
}

pub struct RecorderMaintenance {
    db: Database,
    keep: Duration,
}

impl RecorderMaintenance {
    pub fn new(db: Database, purge_keep_days: u32) -> Self {
        Self {
            db,
            keep: Duration::try_days(i64::from(purge_keep_days.max(1)))
                .unwrap_or_else(|| Duration::days(1)),
        }
    }

    /// Compiles every hour that ended before `now`, then purges states
    /// older than the keep period. Only compiled hours are purged.
    pub fn run(&self, now: DateTime<Utc>) -> Result<MaintenanceSummary, StoreError> {
        let until = hour_start(now)
            .ok_or_else(|| StoreError::InvalidTimestamp(now.to_rfc3339()))?;
        let compiled = self.db.compile_statistics(until)?;

        let cutoff = now
            .checked_sub_signed(self.keep)
            .map_or(until, |cutoff| cutoff.min(until));
        let purged = self.db.purge_states_before(cutoff)?;

        Ok(MaintenanceSummary { compiled, purged })
    }

    /// Runs maintenance now and every [`MAINTENANCE_INTERVAL`].
    pub fn schedule(self, scheduler: &dyn Scheduler) -> ScheduleHandle {
        scheduler.schedule(
            "recorder_maintenance",
            MAINTENANCE_INTERVAL,
            Box::new(move || match self.run(Utc::now()) {
                Ok(summary) => tracing::info!(
                    compiled = summary.compiled,
                    purged = summary.purged,
                    "Recorder maintenance finished"
                ),
                Err(e) => tracing::warn!(?e, "Recorder maintenance failed"),
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AttributeValue, StatisticsEngine, Status};
    use crate::points::{MeasurementPoint, StatType, TimeUnit};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    const ENTITY: &str = "sensor.boiler";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 20, 0).unwrap()
    }

    fn ago(minutes: i64) -> DateTime<Utc> {
        now() - Duration::minutes(minutes)
    }

    #[test]
    fn test_compile_and_purge_then_fall_back() {
        let db = Database::open_in_memory().unwrap();
        // 2024-06-14 06:05 .. 06:45, all in one hour
        for (minutes, value) in [(1815, "2"), (1800, "8"), (1775, "5")] {
            db.record_state(ENTITY, value, ago(minutes)).unwrap();
        }
        db.record_state(ENTITY, "40", ago(10)).unwrap();

        let summary = RecorderMaintenance::new(db.clone(), 1).run(now()).unwrap();

        // The running hour is neither compiled nor purged.
        assert_eq!(
            summary,
            MaintenanceSummary {
                compiled: 1,
                purged: 3
            }
        );
        assert!(db.get_states(ENTITY, ago(2000), ago(1000)).unwrap().is_empty());

        let engine = StatisticsEngine::new(Arc::new(db.clone())).with_statistics(Arc::new(db.clone()));
        let points: Vec<_> = [StatType::Max, StatType::Mean]
            .into_iter()
            .map(|stat| MeasurementPoint::new(stat, TimeUnit::Days, 2).ending(TimeUnit::Days, 1))
            .collect();

        let result = engine.compute(ENTITY, &points, now());

        assert_eq!(result.get("days_2_to_days_1_max"), Some(&AttributeValue::Number(8.0)));
        assert_eq!(result.get("days_2_to_days_1_mean"), Some(&AttributeValue::Number(5.0)));
        assert_eq!(result.status, Status::Ok);
    }

    #[test]
    fn test_keep_period_limits_purge() {
        let db = Database::open_in_memory().unwrap();
        db.record_state(ENTITY, "1", ago(3 * 24 * 60)).unwrap();
        db.record_state(ENTITY, "2", ago(24 * 60)).unwrap();

        let summary = RecorderMaintenance::new(db.clone(), 2).run(now()).unwrap();

        assert_eq!(summary.compiled, 2);
        assert_eq!(summary.purged, 1);
        assert_eq!(db.get_states(ENTITY, ago(2 * 24 * 60), now()).unwrap().len(), 1);
    }

    #[test]
    fn test_schedule_runs_maintenance() {
        struct CountingScheduler(AtomicUsize);

        impl Scheduler for CountingScheduler {
            fn schedule(
                &self,
                _name: &str,
                interval: std::time::Duration,
                mut job: Box<dyn FnMut() + Send>,
            ) -> ScheduleHandle {
                assert_eq!(interval, MAINTENANCE_INTERVAL);
                self.0.fetch_add(1, Ordering::SeqCst);
                job();
                ScheduleHandle::from_flag(Arc::new(AtomicBool::new(false)))
            }
        }

        let db = Database::open_in_memory().unwrap();
        db.record_state(ENTITY, "3", Utc::now() - Duration::days(30)).unwrap();
        let scheduler = CountingScheduler(AtomicUsize::new(0));

        RecorderMaintenance::new(db.clone(), 10)
            .schedule(&scheduler)
            .stop();

        assert_eq!(scheduler.0.load(Ordering::SeqCst), 1);
        let since = Utc::now() - Duration::days(60);
        assert!(db.get_states(ENTITY, since, Utc::now()).unwrap().is_empty());
        assert_eq!(db.get_statistics(ENTITY, since, Utc::now()).unwrap().len(), 1);
    }
}
