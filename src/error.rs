//! Error types shared across the crate.
//!
//! Wizard errors are user-facing and re-shown on the step that produced them.
//! Store errors come from the recorder database. Point errors never leave the
//! statistics engine; they are folded into the sensor status instead.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the configuration wizard.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WizardError {
    /// Another configuration already targets this entity.
    #[error("entity {0} already has a historical statistics configuration")]
    DuplicateEntity(String),

    /// Out-of-range or conflicting form input. `key` is a translation key.
    #[error("invalid {field}: {key}")]
    Validation {
        field: &'static str,
        key: &'static str,
    },

    /// An operation was submitted while the flow was on another step.
    #[error("expected step {expected}, flow is at {actual}")]
    WrongStep {
        expected: &'static str,
        actual: &'static str,
    },

    /// The configuration store could not be consulted.
    #[error("storage error: {0}")]
    Storage(String),
}

impl WizardError {
    pub(crate) fn validation(field: &'static str, key: &'static str) -> Self {
        Self::Validation { field, key }
    }

    /// Translation key describing this error, for form rendering.
    pub fn translation_key(&self) -> &'static str {
        match self {
            Self::DuplicateEntity(_) => "error.duplicate_entity",
            Self::Validation { key, .. } => *key,
            Self::WrongStep { .. } => "error.wrong_step",
            Self::Storage(_) => "error.storage",
        }
    }
}

impl From<StoreError> for WizardError {
    fn from(e: StoreError) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Errors raised by the recorder database.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Per-point failure inside the statistics engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PointError {
    /// No numeric data for the window, raw or aggregated.
    #[error("no data in window")]
    NoData,

    /// Lookup failure or an unusable window.
    #[error("computation failed: {0}")]
    Computation(String),
}

impl From<StoreError> for PointError {
    fn from(e: StoreError) -> Self {
        Self::Computation(e.to_string())
    }
}

/// Errors raised by the translation maintenance tooling.
#[derive(Error, Debug)]
pub enum LocaleError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("master file {0} not found")]
    MissingMaster(PathBuf),
}
