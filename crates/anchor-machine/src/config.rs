//! Static anchor configuration
//!
//! One [`AnchorSpec`] per registered anchor: a match rule classifying probe
//! signals, the parent anchor for coarse fallback, and outgoing recovery
//! edges toward other anchors. The graph is data; no match logic lives at
//! call sites.

use std::collections::HashMap;

use browser_capability::{NavAction, ProbeSignal};
use collect_core_types::Anchor;
use once_cell::sync::Lazy;
use regex::Regex;

/// Conditions a probe signal must satisfy to classify as an anchor.
/// Every set condition must hold.
#[derive(Clone, Debug, Default)]
pub struct MatchRule {
    url_pattern: Option<Regex>,
    marker: Option<String>,
}

impl MatchRule {
    pub fn url(pattern: &str) -> Self {
        Self {
            // Patterns are static configuration; a bad one is a programming error.
            url_pattern: Some(Regex::new(pattern).expect("invalid anchor url pattern")),
            marker: None,
        }
    }

    pub fn marker(marker: impl Into<String>) -> Self {
        Self {
            url_pattern: None,
            marker: Some(marker.into()),
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn matches(&self, signal: &ProbeSignal) -> bool {
        if self.url_pattern.is_none() && self.marker.is_none() {
            return false;
        }
        if let Some(pattern) = &self.url_pattern {
            if !pattern.is_match(&signal.url) {
                return false;
            }
        }
        if let Some(marker) = &self.marker {
            if !signal.has_marker(marker) {
                return false;
            }
        }
        true
    }
}

/// One registered anchor: its match rule, its parent in the coarseness
/// hierarchy, and recovery actions toward anchors reachable from here.
#[derive(Clone, Debug)]
pub struct AnchorSpec {
    pub anchor: Anchor,
    pub rule: MatchRule,
    pub parent: Option<Anchor>,
    pub edges: HashMap<Anchor, NavAction>,
}

impl AnchorSpec {
    pub fn new(anchor: Anchor, rule: MatchRule) -> Self {
        Self {
            anchor,
            rule,
            parent: None,
            edges: HashMap::new(),
        }
    }

    pub fn with_parent(mut self, parent: Anchor) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn edge(mut self, to: Anchor, action: NavAction) -> Self {
        self.edges.insert(to, action);
        self
    }
}

/// The full anchor table. Order matters twice: classification tries rules
/// in order (first match wins) and ancestor fallback walks the parent
/// chain nearest-first.
#[derive(Clone, Debug)]
pub struct AnchorConfig {
    specs: Vec<AnchorSpec>,
    /// Recovery action used when the current state matches no anchor.
    pub fallback_action: NavAction,
}

impl AnchorConfig {
    pub fn new(specs: Vec<AnchorSpec>, fallback_action: NavAction) -> Self {
        Self {
            specs,
            fallback_action,
        }
    }

    pub fn spec(&self, anchor: Anchor) -> Option<&AnchorSpec> {
        self.specs.iter().find(|s| s.anchor == anchor)
    }

    /// Classify a probe signal; first matching rule wins, `None` if no
    /// rule matches.
    pub fn classify(&self, signal: &ProbeSignal) -> Option<Anchor> {
        self.specs
            .iter()
            .find(|spec| spec.rule.matches(signal))
            .map(|spec| spec.anchor)
    }

    /// Recovery action for one (current -> target) edge. `None` when the
    /// graph has no such edge.
    pub fn edge(&self, current: Option<Anchor>, target: Anchor) -> Option<NavAction> {
        match current {
            Some(anchor) => self
                .spec(anchor)
                .and_then(|spec| spec.edges.get(&target))
                .cloned(),
            None => Some(self.fallback_action.clone()),
        }
    }

    /// Ancestors of `target`, nearest first, following the parent chain.
    pub fn ancestors(&self, target: Anchor) -> Vec<Anchor> {
        let mut chain = Vec::new();
        let mut cursor = self.spec(target).and_then(|s| s.parent);
        while let Some(anchor) = cursor {
            if chain.contains(&anchor) {
                break;
            }
            chain.push(anchor);
            cursor = self.spec(anchor).and_then(|s| s.parent);
        }
        chain
    }

    /// The standard four-anchor search/detail graph. Detail views cannot
    /// be re-entered by a static edge (opening needs an item id), so
    /// `detail_open` has no incoming recovery edges - callers re-issue
    /// the open action and call `ensure` to verify.
    pub fn standard() -> Self {
        STANDARD.clone()
    }
}

static STANDARD: Lazy<AnchorConfig> = Lazy::new(|| {
    AnchorConfig::new(
        vec![
            AnchorSpec::new(Anchor::DetailOpen, MatchRule::marker("item-detail"))
                .with_parent(Anchor::ResultsReady)
                .edge(Anchor::ResultsReady, NavAction::PressEscape)
                .edge(Anchor::HomeReady, NavAction::Home),
            AnchorSpec::new(
                Anchor::ResultsReady,
                MatchRule::url(r"/search\?").with_marker("search-results"),
            )
            .with_parent(Anchor::SearchReady)
            .edge(Anchor::SearchReady, NavAction::Back)
            .edge(Anchor::HomeReady, NavAction::Home),
            // The home page also shows the search box, so the more
            // specific home rule must classify first.
            AnchorSpec::new(
                Anchor::HomeReady,
                MatchRule::url(r"^https?://[^/]+/$").with_marker("home-feed"),
            )
            .edge(
                Anchor::SearchReady,
                NavAction::Goto {
                    url: "/search".to_string(),
                },
            ),
            AnchorSpec::new(
                Anchor::SearchReady,
                MatchRule::marker("search-box"),
            )
            .with_parent(Anchor::HomeReady)
            .edge(Anchor::HomeReady, NavAction::Home),
        ],
        NavAction::Home,
    )
});
