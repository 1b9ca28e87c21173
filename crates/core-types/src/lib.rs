//! Shared primitives for the webcollect orchestration layer.
//!
//! Everything the other crates need to agree on lives here: opaque ids,
//! the closed [`Anchor`] set, pipeline [`Stage`] labels and the
//! [`CollectError`] failure taxonomy that the recovery policy matches on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Failure taxonomy shared by every layer of the collect loop.
///
/// The variants are deliberately coarse: the classifier routes on the
/// variant (plus the pipeline stage), not on message contents, so two
/// errors with the same variant always take the same recovery path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollectError {
    #[error("operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("browser backend error: {0}")]
    Capability(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("upstream rate limit: {0}")]
    RateLimited(String),

    #[error("malformed page: {0}")]
    MalformedPage(String),

    #[error("field '{field}' unavailable: {reason}")]
    FieldUnavailable { field: String, reason: String },

    #[error("authentication expired: {0}")]
    AuthExpired(String),

    #[error("site structure changed: {0}")]
    StructureChanged(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CollectError {
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn field_unavailable(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FieldUnavailable {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for CollectError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CollectError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}

/// Identifies one logical collect session (one browser profile, one
/// progress snapshot). Stable across resumes.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one granted gate lease.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct LeaseId(pub String);

impl LeaseId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for LeaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named, recognizable states of the remote UI's navigation.
///
/// The set is closed on purpose: match rules and recovery edges are
/// static configuration keyed by these variants, never ad hoc strings.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    HomeReady,
    SearchReady,
    ResultsReady,
    DetailOpen,
}

impl Anchor {
    pub const ALL: [Anchor; 4] = [
        Anchor::HomeReady,
        Anchor::SearchReady,
        Anchor::ResultsReady,
        Anchor::DetailOpen,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Anchor::HomeReady => "home_ready",
            Anchor::SearchReady => "search_ready",
            Anchor::ResultsReady => "results_ready",
            Anchor::DetailOpen => "detail_open",
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Anchor {
    type Err = CollectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home_ready" => Ok(Anchor::HomeReady),
            "search_ready" => Ok(Anchor::SearchReady),
            "results_ready" => Ok(Anchor::ResultsReady),
            "detail_open" => Ok(Anchor::DetailOpen),
            other => Err(CollectError::Internal(format!("unknown anchor '{other}'"))),
        }
    }
}

/// Pipeline stage labels, attached to errors so the classifier can
/// distinguish e.g. a serde failure while extracting (skip the item)
/// from one while persisting progress (systemic).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AcquirePermit,
    Search,
    Enumerate,
    OpenDetail,
    Extract,
    Recover,
    Persist,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::AcquirePermit => "acquire_permit",
            Stage::Search => "search",
            Stage::Enumerate => "enumerate",
            Stage::OpenDetail => "open_detail",
            Stage::Extract => "extract",
            Stage::Recover => "recover",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
