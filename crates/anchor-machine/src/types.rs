//! Ephemeral results produced by detect/ensure calls

use std::time::Duration;

use collect_core_types::{Anchor, Stage};
use serde::{Deserialize, Serialize};

use crate::evidence::EvidencePolicy;

/// Result of one probe classification. `checkpoint: None` means the page
/// matched no registered anchor - that is a value, not an error.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckpointState {
    pub checkpoint: Option<Anchor>,
    pub stage: Stage,
    pub url: String,
}

impl CheckpointState {
    pub fn unknown(stage: Stage) -> Self {
        Self {
            checkpoint: None,
            stage,
            url: String::new(),
        }
    }

    pub fn is(&self, anchor: Anchor) -> bool {
        self.checkpoint == Some(anchor)
    }

    pub fn describe(&self) -> String {
        match self.checkpoint {
            Some(anchor) => format!("{} at {}", anchor, self.url),
            None => format!("unknown state at {}", self.url),
        }
    }
}

/// Outcome of one `ensure` call. `reached` may be an ancestor of the
/// requested target when fallback was allowed; callers decide whether an
/// ancestor is good enough for their stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnsureResult {
    pub success: bool,
    pub from: Option<Anchor>,
    pub reached: Option<Anchor>,
    pub stage: Stage,
    pub url: String,
}

impl EnsureResult {
    pub fn reached_exactly(&self, target: Anchor) -> bool {
        self.success && self.reached == Some(target)
    }
}

/// Knobs for one `ensure` call. All waits inside the call are bounded by
/// `timeout`; there is no separate cancellation token.
#[derive(Clone, Debug)]
pub struct EnsureOptions {
    pub timeout: Duration,
    pub allow_ancestor_fallback: bool,
    pub evidence: EvidencePolicy,
}

impl Default for EnsureOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            allow_ancestor_fallback: false,
            evidence: EvidencePolicy::Never,
        }
    }
}

impl EnsureOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_ancestor_fallback(mut self) -> Self {
        self.allow_ancestor_fallback = true;
        self
    }

    pub fn with_evidence(mut self, policy: EvidencePolicy) -> Self {
        self.evidence = policy;
        self
    }
}
