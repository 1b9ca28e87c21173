//! Webcollect library
//!
//! Wires the orchestration crates into a runnable CLI and re-exports the
//! embedding surface.

pub mod cli;
pub mod config;
pub mod output;

// Re-export commonly used types for external use
pub use anchor_machine::{AnchorConfig, AnchorStateMachine, EnsureOptions, EvidencePolicy};
pub use browser_capability::{BrowserCapability, ScriptedCapability};
pub use collect_core_types::{Anchor, CollectError, SessionId, Stage};
pub use collect_loop::{CollectConfig, CollectOutcome, Orchestrator, RecordSink};
pub use search_gate::{GateConfig, SearchGate};
