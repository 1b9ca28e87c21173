//! The persisted snapshot

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use collect_core_types::SessionId;
use serde::{Deserialize, Serialize};

/// Everything a resumed run needs: loop position plus the set of item
/// keys already accounted for. `seen_keys` only ever grows within a run;
/// the whole snapshot is deleted on full-run success.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub session_id: SessionId,
    pub keyword_index: usize,
    pub search_round: u32,
    pub collected_count: usize,
    pub seen_keys: BTreeSet<String>,
    pub last_keyword: Option<String>,
    pub last_item_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            keyword_index: 0,
            search_round: 0,
            collected_count: 0,
            seen_keys: BTreeSet::new(),
            last_keyword: None,
            last_item_id: None,
            updated_at: Utc::now(),
        }
    }

    /// Record a key as seen. Returns `true` when the key is new.
    pub fn mark_seen(&mut self, key: &str) -> bool {
        self.seen_keys.insert(key.to_string())
    }

    pub fn is_seen(&self, key: &str) -> bool {
        self.seen_keys.contains(key)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
