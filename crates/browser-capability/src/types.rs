//! Wire types for the capability seam

use serde::{Deserialize, Serialize};

/// Raw signal returned by one read-only probe of the remote UI.
///
/// `markers` are backend-defined structural tokens ("search-results",
/// "item-detail", ...) so anchor match rules stay free of selectors.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProbeSignal {
    pub url: String,
    pub title: Option<String>,
    pub markers: Vec<String>,
}

impl ProbeSignal {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            markers: Vec::new(),
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.markers.push(marker.into());
        self
    }

    pub fn has_marker(&self, marker: &str) -> bool {
        self.markers.iter().any(|m| m == marker)
    }
}

/// Symbolic navigation actions.
///
/// The backend resolves each variant to its own clicks and key presses;
/// the orchestration layer only ever speaks in these terms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NavAction {
    /// Return to the site's landing page.
    Home,
    /// One history step back.
    Back,
    /// Dismiss whatever overlay is on top (modal, login wall).
    PressEscape,
    /// Load a specific page.
    Goto { url: String },
    /// Submit the globally rate-limited search. Callers must hold a gate
    /// lease while issuing this.
    Search { keyword: String },
    /// Open the detail view for one enumerated item.
    OpenItem { item_id: String },
}

/// Addresses one registered extraction script on the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractSchema {
    pub name: String,
    /// Fields the extraction must produce; missing ones are an error.
    pub required: Vec<String>,
    /// Fields the extraction may omit without failing.
    pub optional: Vec<String>,
}

impl ExtractSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: Vec::new(),
            optional: Vec::new(),
        }
    }

    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    pub fn allow(mut self, field: impl Into<String>) -> Self {
        self.optional.push(field.into());
        self
    }

    /// Enumeration schema for a results list: per-item ids plus whatever
    /// list-level metadata the backend surfaces.
    pub fn search_results() -> Self {
        Self::new("search_results").require("items")
    }

    /// Full detail-view schema, including the expensive optional panes.
    pub fn item_detail() -> Self {
        Self::new("item_detail")
            .require("id")
            .require("title")
            .require("body")
            .allow("comments")
            .allow("author")
    }

    /// Reduced detail-view schema used for degraded records after an
    /// optional pane failed.
    pub fn item_core() -> Self {
        Self::new("item_core").require("id").require("title").require("body")
    }
}
