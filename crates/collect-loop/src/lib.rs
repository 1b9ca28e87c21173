//! The collect-loop orchestrator
//!
//! Composes the anchor machine, the search gate, the recovery policy and
//! the progress store into the fixed loop shape:
//! search -> enumerate -> per-item detail -> extract -> recover,
//! with crash-safe checkpoints and idempotent resume.

pub mod config;
pub mod model;
pub mod orchestrator;
pub mod runner;
pub mod sink;

pub use config::*;
pub use model::*;
pub use orchestrator::*;
pub use runner::*;
pub use sink::*;
