//! Gate wire types

use std::time::Duration;

use collect_core_types::LeaseId;
use tokio::time::Instant;

/// Answer to one `wait_for_permit` call. Denials always carry a reason.
#[derive(Clone, Debug)]
pub struct Permit {
    pub granted: bool,
    pub lease_id: Option<LeaseId>,
    pub expires_at: Option<Instant>,
    pub reason: Option<String>,
}

impl Permit {
    pub fn granted(lease_id: LeaseId, expires_at: Instant) -> Self {
        Self {
            granted: true,
            lease_id: Some(lease_id),
            expires_at: Some(expires_at),
            reason: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            granted: false,
            lease_id: None,
            expires_at: None,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GateConfig {
    /// Minimum spacing between a release and the next grant.
    pub min_interval: Duration,
    /// Hard expiry for a lease whose holder never releases it.
    pub max_hold: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(10),
            max_hold: Duration::from_secs(60),
        }
    }
}
