//! Narrow browser-automation interface consumed by the collect loop.
//!
//! The orchestration layer never issues raw DOM selectors; everything it
//! needs from a browser backend goes through [`BrowserCapability`]:
//! - a read-only probe (url + structural markers)
//! - symbolic navigation actions
//! - schema-addressed extraction
//! - screenshot / DOM capture for evidence
//!
//! Real backends (CDP, WebDriver, a remote control service) implement the
//! trait out of tree. The bundled [`ScriptedCapability`] replays a fixture
//! and backs tests and offline demo runs.

pub mod capability;
pub mod replay;
pub mod types;

pub use capability::*;
pub use replay::*;
pub use types::*;
