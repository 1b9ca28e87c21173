//! Admission control for one globally rate-limited action
//!
//! Concurrent collect loops all funnel the scarce upstream action (the
//! search) through one [`SearchGate`]:
//! - a single mutual-exclusion lease, granted FIFO
//! - grants spaced by a minimum inter-use interval
//! - explicit release, with a hard expiry to survive a crashed holder
//! - bounded waits: a timed-out caller never observes a grant
//!
//! This turns unbounded concurrent demand into bounded, serialized demand,
//! which is the backpressure protecting the shared upstream resource.

pub mod gate;
pub mod types;

pub use gate::*;
pub use types::*;
