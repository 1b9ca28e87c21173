//! Recovery verdicts

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The four ways the loop is allowed to react to a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Transient; retry the same step with backoff, bounded attempts.
    Retry,
    /// Scoped to the current item; abandon it and continue the loop.
    SkipItem,
    /// Partial success acceptable; proceed with a reduced, flagged record.
    GracefulDegrade,
    /// Systemic; persist progress and stop the run.
    AbortTask,
}

/// Classifier output: what to do, how long to wait before doing it, and a
/// short operator-facing hint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveryVerdict {
    pub action: RecoveryAction,
    pub backoff: Duration,
    pub suggestion: String,
}

impl RecoveryVerdict {
    pub fn retry(backoff: Duration, suggestion: impl Into<String>) -> Self {
        Self {
            action: RecoveryAction::Retry,
            backoff,
            suggestion: suggestion.into(),
        }
    }

    pub fn skip_item(suggestion: impl Into<String>) -> Self {
        Self {
            action: RecoveryAction::SkipItem,
            backoff: Duration::ZERO,
            suggestion: suggestion.into(),
        }
    }

    pub fn degrade(suggestion: impl Into<String>) -> Self {
        Self {
            action: RecoveryAction::GracefulDegrade,
            backoff: Duration::ZERO,
            suggestion: suggestion.into(),
        }
    }

    pub fn abort(suggestion: impl Into<String>) -> Self {
        Self {
            action: RecoveryAction::AbortTask,
            backoff: Duration::ZERO,
            suggestion: suggestion.into(),
        }
    }
}
