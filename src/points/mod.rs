//! Measurement point model.
//!
//! Types persisted by the wizard and consumed by the statistics engine,
//! plus window resolution and attribute labelling.

pub mod types;
pub mod window;

pub use types::*;
pub use window::*;
