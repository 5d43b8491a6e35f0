//! User-facing strings for the wizard.
//!
//! The English master file is embedded at build time and looked up by
//! dotted key (`error.update_interval_range`, `stat_type.value_at`).

use crate::engine::Status;
use crate::error::WizardError;
use crate::locales::flatten;
use crate::points::{StatType, TimeUnit};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// English strings, parsed once from `translations/en.json`.
pub static EN: Lazy<Translations> = Lazy::new(|| {
    Translations::from_json(include_str!("../translations/en.json")).unwrap_or_else(|e| {
        tracing::error!(?e, "Embedded translations are invalid, falling back to keys");
        Translations::default()
    })
});

/// Flat key → string lookup table.
#[derive(Debug, Clone, Default)]
pub struct Translations {
    strings: BTreeMap<String, String>,
}

impl Translations {
    /// Parses a nested translation document. Non-string leaves are skipped.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let strings = flatten(&value)
            .into_iter()
            .filter_map(|(key, v)| v.as_str().map(|s| (key, s.to_string())))
            .collect();
        Ok(Self { strings })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.strings.get(key).map(String::as_str)
    }

    /// The string for `key`, or the key itself when untranslated.
    pub fn text(&self, key: &str) -> String {
        self.get(key).unwrap_or(key).to_string()
    }

    pub fn stat_type(&self, stat: StatType) -> String {
        self.text(&format!("stat_type.{}", stat))
    }

    pub fn time_unit(&self, unit: TimeUnit) -> String {
        self.text(&format!("time_unit.{}", unit))
    }

    pub fn status(&self, status: Status) -> String {
        self.text(&format!("status.{}", status))
    }

    pub fn error(&self, error: &WizardError) -> String {
        self.text(error.translation_key())
    }
}
