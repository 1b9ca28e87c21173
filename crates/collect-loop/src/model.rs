//! Loop data model

use anchor_machine::CheckpointState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// One entry of a search's results list. `list_id` is the approximate
/// list-level id; the canonical id is only known after the detail view
/// resolves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemSummary {
    pub list_id: String,
    pub container_id: Option<String>,
    pub title: Option<String>,
}

impl ItemSummary {
    pub fn from_value(value: &Value) -> Option<Self> {
        let list_id = value.get("id")?.as_str()?.to_string();
        Some(Self {
            list_id,
            container_id: value
                .get("container")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            title: value
                .get("title")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }
}

/// Parse an enumeration payload into summaries, dropping malformed
/// entries, bounded by `per_search_max`.
pub fn parse_items(listing: &Value, per_search_max: usize) -> Vec<ItemSummary> {
    let entries = match listing.get("items").and_then(|v| v.as_array()) {
        Some(entries) => entries,
        None => return Vec::new(),
    };
    entries
        .iter()
        .filter_map(|entry| {
            let parsed = ItemSummary::from_value(entry);
            if parsed.is_none() {
                debug!(?entry, "dropping malformed list entry");
            }
            parsed
        })
        .take(per_search_max)
        .collect()
}

/// One collected item as handed to the record sink.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemRecord {
    pub key: String,
    pub item_id: String,
    pub keyword: String,
    pub payload: Value,
    /// Some optional field was dropped after a recoverable failure.
    pub degraded: bool,
    pub collected_at: DateTime<Utc>,
}

/// What one `run` call reports back to the caller.
#[derive(Clone, Debug)]
pub struct CollectOutcome {
    pub collected_count: usize,
    pub aborted: bool,
    pub last_checkpoint: Option<CheckpointState>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_items_drops_malformed_and_truncates() {
        let listing = json!({
            "items": [
                {"id": "n1", "title": "first", "container": "grid-1"},
                {"title": "no id"},
                {"id": "n2"},
                {"id": "n3"},
            ]
        });
        let items = parse_items(&listing, 2);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].list_id, "n1");
        assert_eq!(items[0].container_id.as_deref(), Some("grid-1"));
        assert_eq!(items[1].list_id, "n2");
    }

    #[test]
    fn parse_items_without_array_is_empty() {
        assert!(parse_items(&json!({}), 10).is_empty());
    }
}
