//! Historical statistics sensors.
//!
//! Computes min/max/mean/sum/total and point-in-time values over relative
//! windows of an entity's recorded history, and exposes each configuration
//! as a periodically refreshed sensor.

pub mod database;
pub mod engine;
pub mod error;
pub mod locales;
pub mod points;
pub mod recorder;
pub mod sensor;
pub mod server;
pub mod settings;
pub mod translations;
pub mod wizard;
