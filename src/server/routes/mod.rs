//! Route handlers module.

pub mod config;
pub mod configurations;
pub mod health;
pub mod sensors;
pub mod states;
