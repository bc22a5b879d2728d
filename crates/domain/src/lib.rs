//! Domain-level building blocks shared across the monitor, storage and bot
//! crates: canonical address/selector types, the rule model, environment
//! configuration and telemetry wiring.

pub mod config;
pub mod model;
pub mod services;
pub mod storage;

pub use model::*;
pub use storage::*;
