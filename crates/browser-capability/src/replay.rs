//! Scripted replay capability
//!
//! A deterministic [`BrowserCapability`] that walks a canned site: searches
//! return fixture item lists, detail views return fixture records or
//! injected failures. Tests drive it through [`ReplayScriptBuilder`]; the
//! CLI loads the same shape from a JSON fixture file for offline runs.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use collect_core_types::CollectError;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::capability::BrowserCapability;
use crate::types::{ExtractSchema, NavAction, ProbeSignal};

const HOME_URL: &str = "https://site.test/";
const SEARCH_URL: &str = "https://site.test/search";

const MARKER_HOME: &str = "home-feed";
const MARKER_SEARCH_BOX: &str = "search-box";
const MARKER_RESULTS: &str = "search-results";
const MARKER_DETAIL: &str = "item-detail";

/// Outcome of one scripted extraction.
#[derive(Clone, Debug)]
pub enum ScriptedOutcome {
    Record(Value),
    Fail(CollectError),
}

impl ScriptedOutcome {
    fn resolve(&self) -> Result<Value, CollectError> {
        match self {
            ScriptedOutcome::Record(value) => Ok(value.clone()),
            ScriptedOutcome::Fail(err) => Err(err.clone()),
        }
    }
}

/// Scripted behavior of one item's detail view.
#[derive(Clone, Debug)]
pub struct ScriptedDetail {
    /// Outcome of the full `item_detail` extraction.
    pub full: ScriptedOutcome,
    /// Outcome of the reduced `item_core` extraction.
    pub core: ScriptedOutcome,
}

/// The canned site: what every search returns and how every detail view
/// behaves.
#[derive(Clone, Debug, Default)]
pub struct ReplayScript {
    searches: HashMap<String, Vec<Value>>,
    details: HashMap<String, ScriptedDetail>,
    silent_open_failures: HashSet<String>,
}

impl ReplayScript {
    pub fn builder() -> ReplayScriptBuilder {
        ReplayScriptBuilder::default()
    }
}

#[derive(Default)]
pub struct ReplayScriptBuilder {
    script: ReplayScript,
}

impl ReplayScriptBuilder {
    /// Register the item list a keyword search returns.
    pub fn search(mut self, keyword: impl Into<String>, items: Vec<Value>) -> Self {
        self.script.searches.insert(keyword.into(), items);
        self
    }

    /// Register a detail view that extracts cleanly.
    pub fn detail(mut self, item_id: impl Into<String>, record: Value) -> Self {
        let record = ScriptedOutcome::Record(record);
        self.script.details.insert(
            item_id.into(),
            ScriptedDetail {
                full: record.clone(),
                core: record,
            },
        );
        self
    }

    /// Register a detail view whose full extraction fails every time.
    /// The reduced extraction fails with the same error.
    pub fn detail_error(mut self, item_id: impl Into<String>, error: CollectError) -> Self {
        let fail = ScriptedOutcome::Fail(error);
        self.script.details.insert(
            item_id.into(),
            ScriptedDetail {
                full: fail.clone(),
                core: fail,
            },
        );
        self
    }

    /// Register a detail view whose full extraction fails but whose
    /// reduced extraction still yields a record (the degraded path).
    pub fn degraded_detail(
        mut self,
        item_id: impl Into<String>,
        error: CollectError,
        core_record: Value,
    ) -> Self {
        self.script.details.insert(
            item_id.into(),
            ScriptedDetail {
                full: ScriptedOutcome::Fail(error),
                core: ScriptedOutcome::Record(core_record),
            },
        );
        self
    }

    /// Register an item whose detail view silently never opens: the click
    /// is accepted but the page stays on the results list.
    pub fn silent_open_failure(mut self, item_id: impl Into<String>) -> Self {
        self.script.silent_open_failures.insert(item_id.into());
        self
    }

    pub fn build(self) -> ScriptedCapability {
        ScriptedCapability::new(self.script)
    }
}

#[derive(Debug)]
struct ReplayState {
    url: String,
    title: Option<String>,
    markers: Vec<String>,
    active_keyword: Option<String>,
    open_item: Option<String>,
    nav_log: Vec<NavAction>,
}

impl ReplayState {
    fn at_home() -> Self {
        Self {
            url: HOME_URL.to_string(),
            title: Some("Home".to_string()),
            markers: vec![MARKER_HOME.to_string(), MARKER_SEARCH_BOX.to_string()],
            active_keyword: None,
            open_item: None,
            nav_log: Vec::new(),
        }
    }

    fn goto_home(&mut self) {
        self.url = HOME_URL.to_string();
        self.title = Some("Home".to_string());
        self.markers = vec![MARKER_HOME.to_string(), MARKER_SEARCH_BOX.to_string()];
        self.active_keyword = None;
        self.open_item = None;
    }

    fn goto_search_page(&mut self) {
        self.url = SEARCH_URL.to_string();
        self.title = Some("Search".to_string());
        self.markers = vec![MARKER_SEARCH_BOX.to_string()];
        self.open_item = None;
    }

    fn goto_results(&mut self, keyword: &str) {
        self.url = format!("{SEARCH_URL}?kw={keyword}");
        self.title = Some(format!("Search: {keyword}"));
        self.markers = vec![MARKER_SEARCH_BOX.to_string(), MARKER_RESULTS.to_string()];
        self.active_keyword = Some(keyword.to_string());
        self.open_item = None;
    }

    fn goto_detail(&mut self, item_id: &str) {
        self.url = format!("https://site.test/item/{item_id}");
        self.title = Some(format!("Item {item_id}"));
        self.markers = vec![MARKER_DETAIL.to_string()];
        self.open_item = Some(item_id.to_string());
    }
}

/// Deterministic replay of a [`ReplayScript`].
pub struct ScriptedCapability {
    script: ReplayScript,
    state: Mutex<ReplayState>,
}

impl ScriptedCapability {
    pub fn new(script: ReplayScript) -> Self {
        Self {
            script,
            state: Mutex::new(ReplayState::at_home()),
        }
    }

    /// Load a script from a JSON fixture file.
    pub fn from_fixture(path: &Path) -> Result<Self, CollectError> {
        let raw = std::fs::read_to_string(path)?;
        let fixture: FixtureFile = serde_json::from_str(&raw)?;
        Ok(Self::new(fixture.into_script()?))
    }

    /// Navigation actions observed so far, oldest first.
    pub fn nav_log(&self) -> Vec<NavAction> {
        self.state.lock().nav_log.clone()
    }
}

#[async_trait]
impl BrowserCapability for ScriptedCapability {
    async fn probe(&self) -> Result<ProbeSignal, CollectError> {
        let state = self.state.lock();
        Ok(ProbeSignal {
            url: state.url.clone(),
            title: state.title.clone(),
            markers: state.markers.clone(),
        })
    }

    async fn navigate(&self, action: &NavAction) -> Result<(), CollectError> {
        let mut state = self.state.lock();
        state.nav_log.push(action.clone());
        debug!(?action, "scripted navigate");
        match action {
            NavAction::Home => state.goto_home(),
            NavAction::Goto { url } => {
                if url.contains("/search") {
                    state.goto_search_page();
                } else {
                    state.goto_home();
                }
            }
            NavAction::Search { keyword } => state.goto_results(keyword),
            NavAction::OpenItem { item_id } => {
                if self.script.silent_open_failures.contains(item_id) {
                    // Click accepted, modal never appears.
                    return Ok(());
                }
                state.goto_detail(item_id);
            }
            NavAction::PressEscape | NavAction::Back => {
                if state.open_item.is_some() {
                    let keyword = state.active_keyword.clone();
                    match keyword {
                        Some(kw) => state.goto_results(&kw),
                        None => state.goto_home(),
                    }
                } else if state.active_keyword.is_some() && matches!(action, NavAction::Back) {
                    state.goto_search_page();
                } else if matches!(action, NavAction::Back) {
                    state.goto_home();
                }
                // Escape on a page with nothing on top is a no-op.
            }
        }
        Ok(())
    }

    async fn extract(&self, schema: &ExtractSchema) -> Result<Value, CollectError> {
        let state = self.state.lock();
        match schema.name.as_str() {
            "search_results" => {
                if !state.markers.iter().any(|m| m == MARKER_RESULTS) {
                    return Err(CollectError::MalformedPage(
                        "no results list on current page".into(),
                    ));
                }
                let keyword = state
                    .active_keyword
                    .as_deref()
                    .ok_or_else(|| CollectError::Internal("results without a keyword".into()))?;
                let items = self.script.searches.get(keyword).cloned().unwrap_or_default();
                Ok(serde_json::json!({ "items": items }))
            }
            "item_detail" | "item_core" => {
                let item_id = match state.open_item.as_deref() {
                    Some(id) if state.markers.iter().any(|m| m == MARKER_DETAIL) => id,
                    _ => {
                        return Err(CollectError::MalformedPage(
                            "no detail view open".into(),
                        ))
                    }
                };
                let detail = self.script.details.get(item_id).ok_or_else(|| {
                    CollectError::MalformedPage(format!("no detail scripted for '{item_id}'"))
                })?;
                if schema.name == "item_detail" {
                    detail.full.resolve()
                } else {
                    detail.core.resolve()
                }
            }
            other => Err(CollectError::Internal(format!(
                "unknown extract schema '{other}'"
            ))),
        }
    }

    async fn screenshot(&self) -> Result<Vec<u8>, CollectError> {
        // A tiny stable stub; enough for evidence plumbing.
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn dom_snapshot(&self) -> Result<String, CollectError> {
        let state = self.state.lock();
        Ok(format!(
            "<html data-url=\"{}\" data-markers=\"{}\"></html>",
            state.url,
            state.markers.join(",")
        ))
    }
}

/// On-disk fixture shape for [`ScriptedCapability::from_fixture`].
#[derive(Debug, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    searches: HashMap<String, Vec<Value>>,
    #[serde(default)]
    details: HashMap<String, FixtureDetail>,
    #[serde(default)]
    silent_open_failures: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FixtureDetail {
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    error: Option<FixtureError>,
    /// Reduced record served after a degradable error.
    #[serde(default)]
    core: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct FixtureError {
    kind: String,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl FixtureError {
    fn into_error(self) -> Result<CollectError, CollectError> {
        let message = self.message.unwrap_or_default();
        let err = match self.kind.as_str() {
            "timeout" => CollectError::timeout(message, 0),
            "capability" => CollectError::Capability(message),
            "navigation" => CollectError::Navigation(message),
            "rate_limited" => CollectError::RateLimited(message),
            "malformed_page" => CollectError::MalformedPage(message),
            "field_unavailable" => {
                CollectError::field_unavailable(self.field.unwrap_or_default(), message)
            }
            "auth_expired" => CollectError::AuthExpired(message),
            "structure_changed" => CollectError::StructureChanged(message),
            other => {
                return Err(CollectError::Serde(format!(
                    "unknown fixture error kind '{other}'"
                )))
            }
        };
        Ok(err)
    }
}

impl FixtureFile {
    fn into_script(self) -> Result<ReplayScript, CollectError> {
        let mut builder = ReplayScript::builder();
        for (keyword, items) in self.searches {
            builder = builder.search(keyword, items);
        }
        for (item_id, detail) in self.details {
            builder = match (detail.record, detail.error, detail.core) {
                (Some(record), None, _) => builder.detail(item_id, record),
                (None, Some(error), Some(core)) => {
                    builder.degraded_detail(item_id, error.into_error()?, core)
                }
                (None, Some(error), None) => builder.detail_error(item_id, error.into_error()?),
                _ => {
                    return Err(CollectError::Serde(format!(
                        "fixture detail '{item_id}' needs either a record or an error"
                    )))
                }
            };
        }
        for item_id in self.silent_open_failures {
            builder = builder.silent_open_failure(item_id);
        }
        Ok(builder.build().script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scripted() -> ScriptedCapability {
        ReplayScript::builder()
            .search("rust", vec![json!({"id": "n1", "title": "first"})])
            .detail("n1", json!({"id": "n1", "title": "first", "body": "text"}))
            .silent_open_failure("ghost")
            .build()
    }

    #[tokio::test]
    async fn search_then_enumerate() {
        let browser = scripted();
        browser
            .navigate(&NavAction::Search {
                keyword: "rust".into(),
            })
            .await
            .unwrap();

        let signal = browser.probe().await.unwrap();
        assert!(signal.has_marker("search-results"));

        let listing = browser
            .extract(&ExtractSchema::search_results())
            .await
            .unwrap();
        assert_eq!(listing["items"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn open_and_extract_detail() {
        let browser = scripted();
        browser
            .navigate(&NavAction::Search {
                keyword: "rust".into(),
            })
            .await
            .unwrap();
        browser
            .navigate(&NavAction::OpenItem {
                item_id: "n1".into(),
            })
            .await
            .unwrap();

        let record = browser.extract(&ExtractSchema::item_detail()).await.unwrap();
        assert_eq!(record["id"], "n1");

        browser.navigate(&NavAction::PressEscape).await.unwrap();
        let signal = browser.probe().await.unwrap();
        assert!(signal.has_marker("search-results"));
    }

    #[tokio::test]
    async fn silent_open_failure_leaves_results_page() {
        let browser = scripted();
        browser
            .navigate(&NavAction::Search {
                keyword: "rust".into(),
            })
            .await
            .unwrap();
        browser
            .navigate(&NavAction::OpenItem {
                item_id: "ghost".into(),
            })
            .await
            .unwrap();

        let signal = browser.probe().await.unwrap();
        assert!(signal.has_marker("search-results"));

        let err = browser
            .extract(&ExtractSchema::item_detail())
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::MalformedPage(_)));
    }

    #[tokio::test]
    async fn extract_off_results_page_is_malformed() {
        let browser = scripted();
        let err = browser
            .extract(&ExtractSchema::search_results())
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::MalformedPage(_)));
    }

    #[test]
    fn fixture_round_trip() {
        let raw = json!({
            "searches": { "rust": [ {"id": "n1"} ] },
            "details": {
                "n1": { "record": {"id": "n1", "title": "t", "body": "b"} },
                "n2": {
                    "error": {"kind": "field_unavailable", "field": "comments", "message": "slow pane"},
                    "core": {"id": "n2", "title": "t", "body": "b"}
                },
                "n3": { "error": {"kind": "auth_expired", "message": "cookie gone"} }
            },
            "silent_open_failures": ["n4"]
        });
        let fixture: FixtureFile = serde_json::from_value(raw).unwrap();
        let script = fixture.into_script().unwrap();
        assert_eq!(script.searches["rust"].len(), 1);
        assert!(script.silent_open_failures.contains("n4"));
        assert!(matches!(
            script.details["n3"].full,
            ScriptedOutcome::Fail(CollectError::AuthExpired(_))
        ));
    }
}
