//! Lifecycle of the running sensors.

use super::{publish, unpublish, HistoricalStatsSensor, ScheduleHandle, Scheduler};
use crate::engine::{EntityRegistry, StatisticsEngine};
use crate::points::Configuration;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

struct RunningSensor {
    config: Configuration,
    handle: ScheduleHandle,
}

/// Counts of what a [`SensorManager::sync`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub started: usize,
    pub stopped: usize,
    pub restarted: usize,
}

impl SyncSummary {
    pub fn is_empty(&self) -> bool {
        self.started + self.stopped + self.restarted == 0
    }
}

/// Owns one scheduled sensor per configuration.
pub struct SensorManager {
    engine: StatisticsEngine,
    registry: Arc<dyn EntityRegistry>,
    scheduler: Arc<dyn Scheduler>,
    running: BTreeMap<String, RunningSensor>,
}

impl SensorManager {
    pub fn new(
        engine: StatisticsEngine,
        registry: Arc<dyn EntityRegistry>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            engine,
            registry,
            scheduler,
            running: BTreeMap::new(),
        }
    }

    pub fn running_ids(&self) -> Vec<String> {
        self.running.keys().cloned().collect()
    }

    pub fn is_running(&self, entity_id: &str) -> bool {
        self.running.contains_key(entity_id)
    }

    /// Starts the sensor for `config`, replacing a running one for the same
    /// entity.
    pub fn start(&mut self, config: Configuration) {
        let entity_id = config.entity_id.clone();
        self.stop(&entity_id);

        let mut sensor =
            HistoricalStatsSensor::new(config.clone(), self.engine.clone(), self.registry.as_ref());
        publish(&sensor.snapshot());

        tracing::info!(
            entity_id = %entity_id,
            name = %sensor.name(),
            interval_mins = config.update_interval,
            points = config.points.len(),
            "Sensor started"
        );

        let interval = Duration::from_secs(u64::from(config.update_interval.max(1)) * 60);
        let job_name = sensor.unique_id().to_string();
        let handle = self.scheduler.schedule(
            &job_name,
            interval,
            Box::new(move || {
                sensor.update(Utc::now());
                publish(&sensor.snapshot());
            }),
        );

        self.running
            .insert(entity_id, RunningSensor { config, handle });
    }

    /// Stops the sensor for `entity_id`. Returns false if none was running.
    pub fn stop(&mut self, entity_id: &str) -> bool {
        let Some(running) = self.running.remove(entity_id) else {
            return false;
        };
        running.handle.stop();
        unpublish(entity_id);
        tracing::info!(entity_id, "Sensor stopped");
        true
    }

    /// Brings the running set in line with `configs`: new configurations are
    /// started, missing ones stopped, changed ones restarted.
    pub fn sync(&mut self, configs: Vec<Configuration>) -> SyncSummary {
        let mut summary = SyncSummary::default();
        let wanted: HashSet<String> = configs.iter().map(|c| c.entity_id.clone()).collect();

        for entity_id in self.running_ids() {
            if !wanted.contains(&entity_id) && self.stop(&entity_id) {
                summary.stopped += 1;
            }
        }

        for config in configs {
            match self.running.get(&config.entity_id) {
                Some(running) if running.config == config => {}
                Some(_) => {
                    self.start(config);
                    summary.restarted += 1;
                }
                None => {
                    self.start(config);
                    summary.started += 1;
                }
            }
        }

        if !summary.is_empty() {
            tracing::info!(
                started = summary.started,
                stopped = summary.stopped,
                restarted = summary.restarted,
                "Sensors synchronized"
            );
        }
        summary
    }

    pub fn shutdown_all(&mut self) {
        for entity_id in self.running_ids() {
            self.stop(&entity_id);
        }
    }
}
