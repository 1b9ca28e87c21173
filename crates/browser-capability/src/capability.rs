//! The capability trait

use async_trait::async_trait;
use collect_core_types::CollectError;

use crate::types::{ExtractSchema, NavAction, ProbeSignal};

/// Everything the orchestration layer is allowed to ask of a browser.
///
/// Implementations own the transport, the selectors and the extraction
/// scripts. Expected scraping failures come back as `Err(CollectError)`
/// values for the classifier; implementations should reserve panics for
/// programming errors.
#[async_trait]
pub trait BrowserCapability: Send + Sync {
    /// One read-only look at the current page. Must not mutate UI state.
    async fn probe(&self) -> Result<ProbeSignal, CollectError>;

    /// Perform a symbolic navigation action and return once the backend
    /// considers it submitted (not necessarily settled).
    async fn navigate(&self, action: &NavAction) -> Result<(), CollectError>;

    /// Run the named extraction against the current page.
    async fn extract(&self, schema: &ExtractSchema) -> Result<serde_json::Value, CollectError>;

    /// Capture a screenshot of the current viewport, for evidence.
    async fn screenshot(&self) -> Result<Vec<u8>, CollectError>;

    /// Capture a serialized DOM snapshot, for evidence.
    async fn dom_snapshot(&self) -> Result<String, CollectError>;
}
