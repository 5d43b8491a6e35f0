//! SQLite recorder database.
//!
//! Holds the significant state changes and hourly long-term statistics
//! the engine reads, the entity registry, the persisted sensor
//! configurations and the settings table.

use crate::engine::{
    parse_numeric, AggregateField, AggregateRow, EntityInfo, EntityRegistry, Granularity,
    HistoryStore, Sample, StatisticsStore,
};
use crate::error::StoreError;
use crate::points::{Configuration, PointList};
use crate::wizard::ConfigurationStore;
use chrono::{DateTime, Duration, DurationRound, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Environment variable overriding the database location.
pub const DB_PATH_ENV: &str = "HISTORICAL_STATS_DB";

type StoreResult<T> = Result<T, StoreError>;

/// Database wrapper with a shared, thread-safe connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// Formats a timestamp as fixed-width RFC 3339 so text order is time order.
fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidTimestamp(format!("{raw}: {e}")))
}

/// Start of the hour containing `at`.
pub fn hour_start(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    at.duration_trunc(Duration::hours(1)).ok()
}

/// Running aggregate of one hour of numeric states.
#[derive(Debug, Clone, Copy)]
struct HourBucket {
    min: f64,
    max: f64,
    sum: f64,
    count: u32,
}

impl HourBucket {
    fn new(value: f64) -> Self {
        Self {
            min: value,
            max: value,
            sum: value,
            count: 1,
        }
    }

    fn add(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> f64 {
        self.sum / f64::from(self.count)
    }
}

impl Database {
    /// Opens or creates the database at the default location.
    ///
    /// Uses `$HISTORICAL_STATS_DB` if set, else
    /// `<data dir>/historical-stats/recorder.db`.
    pub fn open() -> StoreResult<Self> {
        Self::open_at(&Self::get_db_path())
    }

    /// Opens or creates the database at `path`.
    pub fn open_at(path: &Path) -> StoreResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        tracing::info!(path = ?path, "Opening database");

        let conn = Connection::open(path)?;

        // Enable WAL mode for better crash safety
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Opens an in-memory database (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Returns the default database path.
    pub fn get_db_path() -> PathBuf {
        if let Ok(path) = std::env::var(DB_PATH_ENV) {
            return PathBuf::from(path);
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("historical-stats")
            .join("recorder.db")
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Initializes the database schema.
    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock();

        conn.execute_batch(
            r#"
            -- Significant state changes per entity
            CREATE TABLE IF NOT EXISTS states (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_id TEXT NOT NULL,
                state TEXT NOT NULL,
                last_changed TEXT NOT NULL
            );

            -- Hourly long-term statistics, kept after states are purged
            CREATE TABLE IF NOT EXISTS statistics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_id TEXT NOT NULL,
                start TEXT NOT NULL,
                min REAL,
                max REAL,
                mean REAL,
                sum REAL,
                UNIQUE(entity_id, start)
            );

            -- Entity registry
            CREATE TABLE IF NOT EXISTS entities (
                entity_id TEXT PRIMARY KEY,
                friendly_name TEXT NOT NULL
            );

            -- One historical statistics sensor per source entity
            CREATE TABLE IF NOT EXISTS configurations (
                entity_id TEXT PRIMARY KEY,
                friendly_name TEXT,
                update_interval INTEGER NOT NULL,
                points TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Configuration settings
            CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                description TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_states_entity_changed ON states(entity_id, last_changed);
            CREATE INDEX IF NOT EXISTS idx_statistics_entity_start ON statistics(entity_id, start);
            "#,
        )?;

        // Seed default config if empty
        let config_count: i64 = conn.query_row("SELECT COUNT(*) FROM config", [], |r| r.get(0))?;
        if config_count == 0 {
            let now = ts(Utc::now());
            let defaults = [
                ("http_port", "13235", "HTTP API port on 127.0.0.1"),
                (
                    "value_at_tolerance_mins",
                    "10",
                    "Search radius around a value_at target (minutes)",
                ),
                (
                    "default_update_interval_mins",
                    "30",
                    "Update interval offered by the setup wizard (minutes)",
                ),
                (
                    "statistics_fallback",
                    "true",
                    "Use long-term statistics when raw history is purged",
                ),
                (
                    "reload_check_secs",
                    "15",
                    "How often the daemon looks for changed configurations (seconds)",
                ),
                (
                    "purge_keep_days",
                    "10",
                    "Days of raw state history kept after hourly statistics are compiled",
                ),
            ];

            for (key, value, description) in defaults {
                conn.execute(
                    "INSERT INTO config (key, value, description, updated_at) VALUES (?1, ?2, ?3, ?4)",
                    params![key, value, description, &now],
                )?;
            }

            tracing::info!("Added {} default config settings", defaults.len());
        }

        tracing::debug!("Database schema initialized");
        Ok(())
    }

    // === Recorder Methods ===

    /// Records a state change.
    pub fn record_state(
        &self,
        entity_id: &str,
        state: &str,
        changed_at: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO states (entity_id, state, last_changed) VALUES (?1, ?2, ?3)",
            params![entity_id, state, ts(changed_at)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Records (or replaces) one hourly statistics bucket.
    pub fn record_statistic(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        min: Option<f64>,
        max: Option<f64>,
        mean: Option<f64>,
        sum: Option<f64>,
    ) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO statistics (entity_id, start, min, max, mean, sum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![entity_id, ts(start), min, max, mean, sum],
        )?;
        Ok(())
    }

    /// Deletes raw states older than `cutoff`. Long-term statistics are kept.
    pub fn purge_states_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let conn = self.lock();
        let removed = conn.execute(
            "DELETE FROM states WHERE last_changed < ?1",
            params![ts(cutoff)],
        )?;
        tracing::info!(removed, cutoff = %cutoff, "Purged recorded states");
        Ok(removed)
    }

    /// Compiles hourly statistics from the numeric states recorded before
    /// `until`. Buckets are rewritten while their states remain, so a late
    /// state updates its hour. Returns the number of buckets written.
    pub fn compile_statistics(&self, until: DateTime<Utc>) -> StoreResult<usize> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT entity_id, state, last_changed FROM states
             WHERE last_changed < ?1
             ORDER BY entity_id, last_changed, id",
        )?;

        let rows = stmt.query_map(params![ts(until)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut buckets: BTreeMap<(String, DateTime<Utc>), HourBucket> = BTreeMap::new();
        for row in rows {
            let (entity_id, state, changed) = row?;
            let Some(value) = parse_numeric(&state) else {
                continue;
            };
            let start = hour_start(parse_ts(&changed)?)
                .ok_or_else(|| StoreError::InvalidTimestamp(changed.clone()))?;
            buckets
                .entry((entity_id, start))
                .and_modify(|b| b.add(value))
                .or_insert_with(|| HourBucket::new(value));
        }

        for ((entity_id, start), bucket) in &buckets {
            conn.execute(
                "INSERT OR REPLACE INTO statistics (entity_id, start, min, max, mean, sum)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    entity_id,
                    ts(*start),
                    bucket.min,
                    bucket.max,
                    bucket.mean(),
                    bucket.sum
                ],
            )?;
        }

        tracing::debug!(buckets = buckets.len(), until = %until, "Compiled hourly statistics");
        Ok(buckets.len())
    }

    /// Gets the state in effect at `at`: the last change before it, with
    /// its timestamp clamped to `at`.
    pub fn get_state_at(&self, entity_id: &str, at: DateTime<Utc>) -> StoreResult<Option<Sample>> {
        let conn = self.lock();
        let state = conn
            .query_row(
                "SELECT state FROM states
                 WHERE entity_id = ?1 AND last_changed < ?2
                 ORDER BY last_changed DESC, id DESC
                 LIMIT 1",
                params![entity_id, ts(at)],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(state.map(|state| Sample::new(state, at)))
    }

    /// Gets significant state changes in `[start, end)`, oldest first.
    ///
    /// Consecutive identical values are collapsed into the first of them.
    pub fn get_states(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Sample>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT state, last_changed FROM states
             WHERE entity_id = ?1 AND last_changed >= ?2 AND last_changed < ?3
             ORDER BY last_changed, id",
        )?;

        let rows = stmt.query_map(params![entity_id, ts(start), ts(end)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut samples: Vec<Sample> = Vec::new();
        for row in rows {
            let (state, changed) = row?;
            if samples.last().is_some_and(|prev| prev.value == state) {
                continue;
            }
            samples.push(Sample::new(state, parse_ts(&changed)?));
        }
        Ok(samples)
    }

    /// Gets hourly statistics buckets starting in `[start, end)`.
    pub fn get_statistics(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<AggregateRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT start, min, max, mean FROM statistics
             WHERE entity_id = ?1 AND start >= ?2 AND start < ?3
             ORDER BY start",
        )?;

        let rows = stmt.query_map(params![entity_id, ts(start), ts(end)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<f64>>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, Option<f64>>(3)?,
            ))
        })?;

        let mut buckets = Vec::new();
        for row in rows {
            let (bucket_start, min, max, mean) = row?;
            buckets.push(AggregateRow {
                start: parse_ts(&bucket_start)?,
                min,
                max,
                mean,
            });
        }
        Ok(buckets)
    }

    // === Entity Registry Methods ===

    /// Registers an entity or updates its display name.
    pub fn upsert_entity(&self, entity_id: &str, friendly_name: &str) -> StoreResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO entities (entity_id, friendly_name) VALUES (?1, ?2)",
            params![entity_id, friendly_name],
        )?;
        Ok(())
    }

    /// Gets the display name of an entity.
    pub fn get_entity_name(&self, entity_id: &str) -> StoreResult<Option<String>> {
        let conn = self.lock();
        let name = conn
            .query_row(
                "SELECT friendly_name FROM entities WHERE entity_id = ?1",
                params![entity_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    // === Configuration Methods ===

    /// Inserts or replaces the configuration for its entity.
    pub fn save_configuration(&self, config: &Configuration) -> StoreResult<()> {
        let points = serde_json::to_string(&config.points)?;
        let now = ts(Utc::now());
        let conn = self.lock();
        conn.execute(
            "INSERT INTO configurations (entity_id, friendly_name, update_interval, points, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(entity_id) DO UPDATE SET
                friendly_name = excluded.friendly_name,
                update_interval = excluded.update_interval,
                points = excluded.points,
                updated_at = excluded.updated_at",
            params![
                config.entity_id,
                config.friendly_name,
                config.update_interval,
                points,
                now
            ],
        )?;
        tracing::info!(entity_id = %config.entity_id, points = config.points.len(), "Saved configuration");
        Ok(())
    }

    /// Gets the configuration for `entity_id`.
    pub fn get_configuration(&self, entity_id: &str) -> StoreResult<Option<Configuration>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT entity_id, friendly_name, update_interval, points
                 FROM configurations WHERE entity_id = ?1",
                params![entity_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(entity_id, friendly_name, update_interval, points)| {
            Ok(Configuration {
                entity_id,
                friendly_name,
                update_interval,
                points: serde_json::from_str::<PointList>(&points)?,
            })
        })
        .transpose()
    }

    /// Gets all configurations ordered by entity id.
    pub fn list_configurations(&self) -> StoreResult<Vec<Configuration>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT entity_id, friendly_name, update_interval, points
             FROM configurations ORDER BY entity_id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut configs = Vec::new();
        for row in rows {
            let (entity_id, friendly_name, update_interval, points) = row?;
            match serde_json::from_str::<PointList>(&points) {
                Ok(points) => configs.push(Configuration {
                    entity_id,
                    friendly_name,
                    update_interval,
                    points,
                }),
                Err(e) => {
                    tracing::warn!(entity_id = %entity_id, ?e, "Skipping configuration with unreadable points");
                }
            }
        }
        Ok(configs)
    }

    /// Removes the configuration for `entity_id`.
    pub fn delete_configuration(&self, entity_id: &str) -> StoreResult<bool> {
        let conn = self.lock();
        let affected = conn.execute(
            "DELETE FROM configurations WHERE entity_id = ?1",
            params![entity_id],
        )?;
        Ok(affected > 0)
    }

    // === Config Methods ===

    /// Gets a configuration value by key.
    pub fn get_config(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.lock();
        let value = conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Sets a configuration value.
    pub fn set_config(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.lock();
        let now = ts(Utc::now());
        conn.execute(
            "UPDATE config SET value = ?1, updated_at = ?2 WHERE key = ?3",
            params![value, &now, key],
        )?;
        Ok(())
    }

    /// Gets all config settings.
    pub fn get_all_config(&self) -> StoreResult<Vec<(String, String, Option<String>)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT key, value, description FROM config ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl HistoryStore for Database {
    fn fetch_samples(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Sample>, StoreError> {
        self.get_states(entity_id, start, end)
    }

    fn fetch_start_state(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
    ) -> Result<Option<Sample>, StoreError> {
        self.get_state_at(entity_id, start)
    }
}

impl StatisticsStore for Database {
    fn fetch_aggregates(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        granularity: Granularity,
        _fields: &[AggregateField],
    ) -> Result<Vec<AggregateRow>, StoreError> {
        match granularity {
            Granularity::Hour => self.get_statistics(entity_id, start, end),
        }
    }
}

impl EntityRegistry for Database {
    fn lookup(&self, entity_id: &str) -> Option<EntityInfo> {
        match self.get_entity_name(entity_id) {
            Ok(name) => name.map(|display_name| EntityInfo { display_name }),
            Err(e) => {
                tracing::warn!(entity_id, ?e, "Entity registry lookup failed");
                None
            }
        }
    }
}

impl ConfigurationStore for Database {
    fn has_configuration(&self, entity_id: &str) -> Result<bool, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM configurations WHERE entity_id = ?1",
            params![entity_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
