//! Failure routing for the collect loop
//!
//! Every error that surfaces during a run goes through one classifier
//! which maps (error, stage) to a bounded recovery verdict. The
//! [`retry_with_backoff`] decorator is the only retry loop in the system;
//! call sites get consistent backoff semantics by construction.

pub mod classifier;
pub mod retry;
pub mod verdict;

pub use classifier::*;
pub use retry::*;
pub use verdict::*;
