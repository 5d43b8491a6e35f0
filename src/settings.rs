//! Typed view of the `config` table.

use crate::database::Database;
use serde::Serialize;
use std::str::FromStr;

/// Runtime settings. Each field falls back to its default when the stored
/// value is missing or does not parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    /// HTTP API port on 127.0.0.1.
    pub http_port: u16,

    /// Search radius around a `value_at` target, in minutes.
    pub value_at_tolerance_mins: i64,

    /// Update interval the setup wizard proposes, in minutes.
    pub default_update_interval_mins: u32,

    /// Whether min/max/mean may fall back to long-term statistics.
    pub statistics_fallback: bool,

    /// How often the daemon re-reads stored configurations, in seconds.
    pub reload_check_secs: u64,

    /// Days of raw states kept once their hours are compiled into statistics.
    pub purge_keep_days: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_port: 13235,
            value_at_tolerance_mins: 10,
            default_update_interval_mins: 30,
            statistics_fallback: true,
            reload_check_secs: 15,
            purge_keep_days: 10,
        }
    }
}

impl Settings {
    /// Loads settings from the database.
    pub fn load(db: &Database) -> Self {
        let defaults = Self::default();
        Self {
            http_port: read(db, "http_port", defaults.http_port),
            value_at_tolerance_mins: read(
                db,
                "value_at_tolerance_mins",
                defaults.value_at_tolerance_mins,
            )
            .max(1),
            default_update_interval_mins: read(
                db,
                "default_update_interval_mins",
                defaults.default_update_interval_mins,
            ),
            statistics_fallback: read(db, "statistics_fallback", defaults.statistics_fallback),
            reload_check_secs: read(db, "reload_check_secs", defaults.reload_check_secs).max(1),
            purge_keep_days: read(db, "purge_keep_days", defaults.purge_keep_days).max(1),
        }
    }
}

fn read<T: FromStr + Copy + std::fmt::Debug>(db: &Database, key: &str, default: T) -> T {
    match db.get_config(key) {
        Ok(Some(raw)) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, ?default, "Ignoring unparsable setting");
            default
        }),
        Ok(None) => default,
        Err(e) => {
            tracing::warn!(key, ?e, "Failed to read setting");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_settings_match_defaults() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(Settings::load(&db), Settings::default());
    }

    #[test]
    fn test_bad_values_fall_back() {
        let db = Database::open_in_memory().unwrap();
        db.set_config("http_port", "not-a-port").unwrap();
        db.set_config("statistics_fallback", "false").unwrap();

        let settings = Settings::load(&db);

        assert_eq!(settings.http_port, 13235);
        assert!(!settings.statistics_fallback);
    }

    #[test]
    fn test_zero_values_are_clamped() {
        let db = Database::open_in_memory().unwrap();
        db.set_config("value_at_tolerance_mins", "0").unwrap();
        db.set_config("purge_keep_days", "0").unwrap();

        let settings = Settings::load(&db);

        assert_eq!(settings.value_at_tolerance_mins, 1);
        assert_eq!(settings.purge_keep_days, 1);
    }
}
