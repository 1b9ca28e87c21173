//! Loop configuration

use std::time::Duration;

use anchor_machine::EvidencePolicy;
use recovery_policy::RetryPolicy;

#[derive(Clone, Debug)]
pub struct CollectConfig {
    /// Stop once this many items have been collected (across resumes).
    pub target_count: usize,
    /// Search keywords, cycled round-robin by `keyword_index`.
    pub keywords: Vec<String>,
    /// Cap on items taken from one search's results.
    pub per_search_max: usize,
    /// Hard bound on search rounds for one `run` call.
    pub max_rounds: u32,
    /// Persist the snapshot after this many newly collected items.
    pub checkpoint_every: usize,
    /// How long one round waits for the search lease.
    pub gate_wait: Duration,
    /// Pause after a denied permit or a failed round before retrying.
    pub round_cooldown: Duration,
    /// Consecutive permit denials before the round counts as consumed,
    /// so a starved gate cannot stall the loop forever.
    pub gate_retry_limit: u32,
    /// Budget for each `ensure` call.
    pub ensure_timeout: Duration,
    /// Mark items we skipped as seen, so future runs will not retry them.
    pub mark_skipped_seen: bool,
    pub retry: RetryPolicy,
    pub evidence: EvidencePolicy,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            target_count: 100,
            keywords: Vec::new(),
            per_search_max: 20,
            max_rounds: 50,
            checkpoint_every: 5,
            gate_wait: Duration::from_secs(30),
            round_cooldown: Duration::from_secs(5),
            gate_retry_limit: 5,
            ensure_timeout: Duration::from_secs(10),
            mark_skipped_seen: false,
            retry: RetryPolicy::default(),
            evidence: EvidencePolicy::Never,
        }
    }
}
