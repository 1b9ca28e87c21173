//! Detect / ensure implementation

use std::cmp;
use std::sync::Arc;
use std::time::{Duration, Instant};

use browser_capability::BrowserCapability;
use chrono::Utc;
use collect_core_types::{Anchor, Stage};
use tracing::{debug, warn};

use crate::config::AnchorConfig;
use crate::evidence::{EvidenceContext, EvidencePolicy, EvidenceSink};
use crate::types::{CheckpointState, EnsureOptions, EnsureResult};

/// Detects the remote UI's current anchor and drives it back to a wanted
/// one. Holds no UI state of its own; every answer comes from a fresh
/// probe.
pub struct AnchorStateMachine {
    config: AnchorConfig,
    browser: Arc<dyn BrowserCapability>,
    evidence: Option<Arc<dyn EvidenceSink>>,
    settle: Duration,
}

impl AnchorStateMachine {
    pub fn new(config: AnchorConfig, browser: Arc<dyn BrowserCapability>) -> Self {
        Self {
            config,
            browser,
            evidence: None,
            settle: Duration::from_millis(400),
        }
    }

    pub fn with_evidence(mut self, sink: Arc<dyn EvidenceSink>) -> Self {
        self.evidence = Some(sink);
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// One read-only probe classified against the anchor table. Never
    /// fails: a probe transport error or an unmatched page both come back
    /// as `checkpoint: None`.
    pub async fn detect(&self, stage: Stage) -> CheckpointState {
        match self.browser.probe().await {
            Ok(signal) => {
                let checkpoint = self.config.classify(&signal);
                debug!(stage = %stage, url = %signal.url, checkpoint = ?checkpoint.map(|a| a.as_str()), "probe classified");
                CheckpointState {
                    checkpoint,
                    stage,
                    url: signal.url,
                }
            }
            Err(err) => {
                warn!(stage = %stage, %err, "probe failed, treating state as unknown");
                CheckpointState::unknown(stage)
            }
        }
    }

    /// Drive the UI to `target` within `opts.timeout`.
    ///
    /// Already being at `target` is an immediate success with no recovery
    /// action issued. Otherwise recovery edges are applied and the state
    /// re-probed until the target is reached or the budget runs out; with
    /// `allow_ancestor_fallback` a coarser ancestor (parent chain, nearest
    /// first) counts as success and is reported via `reached`. Exhaustion
    /// is a `success: false` result, never an error.
    pub async fn ensure(&self, target: Anchor, stage: Stage, opts: &EnsureOptions) -> EnsureResult {
        let deadline = Instant::now() + opts.timeout;
        let from = self.detect(stage).await;
        if from.is(target) {
            return EnsureResult {
                success: true,
                from: from.checkpoint,
                reached: Some(target),
                stage,
                url: from.url,
            };
        }

        let mut last = from.clone();
        if self.drive(target, stage, opts, deadline, &mut last).await {
            return EnsureResult {
                success: true,
                from: from.checkpoint,
                reached: Some(target),
                stage,
                url: last.url,
            };
        }

        if opts.allow_ancestor_fallback {
            for ancestor in self.config.ancestors(target) {
                if last.is(ancestor)
                    || self.drive(ancestor, stage, opts, deadline, &mut last).await
                {
                    debug!(target = %target, reached = %ancestor, "settled on ancestor anchor");
                    return EnsureResult {
                        success: true,
                        from: from.checkpoint,
                        reached: Some(ancestor),
                        stage,
                        url: last.url,
                    };
                }
            }
        }

        if opts.evidence != EvidencePolicy::Never {
            self.capture(&format!("ensure {} exhausted", target), stage, &last.url)
                .await;
        }
        warn!(target = %target, last = %last.describe(), "ensure gave up");
        EnsureResult {
            success: false,
            from: from.checkpoint,
            reached: last.checkpoint,
            stage,
            url: last.url,
        }
    }

    /// Apply recovery edges toward `target` until it is reached, no edge
    /// exists, or the deadline passes.
    async fn drive(
        &self,
        target: Anchor,
        stage: Stage,
        opts: &EnsureOptions,
        deadline: Instant,
        last: &mut CheckpointState,
    ) -> bool {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let action = match self.config.edge(last.checkpoint, target) {
                Some(action) => action,
                None => {
                    debug!(
                        from = ?last.checkpoint.map(|a| a.as_str()),
                        target = %target,
                        "no recovery edge"
                    );
                    return false;
                }
            };

            if opts.evidence == EvidencePolicy::EveryAttempt {
                self.capture(&format!("recovering toward {}", target), stage, &last.url)
                    .await;
            }

            debug!(target = %target, ?action, "applying recovery action");
            if let Err(err) = self.browser.navigate(&action).await {
                warn!(%err, ?action, "recovery action failed, will re-probe");
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(cmp::min(self.settle, remaining)).await;

            *last = self.detect(stage).await;
            if last.is(target) {
                return true;
            }
        }
    }

    /// Best-effort capture; failures are logged and swallowed.
    async fn capture(&self, label: &str, stage: Stage, url: &str) {
        let Some(sink) = &self.evidence else {
            return;
        };
        let screenshot = self.browser.screenshot().await.ok();
        let dom = self.browser.dom_snapshot().await.ok();
        let evidence = EvidenceContext {
            label: label.to_string(),
            stage,
            url: url.to_string(),
            screenshot,
            dom,
            captured_at: Utc::now(),
        };
        if let Err(err) = sink.capture(&evidence).await {
            warn!(%err, label, "evidence capture failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use browser_capability::{
        ExtractSchema, NavAction, ProbeSignal, ReplayScript, ScriptedCapability,
    };
    use collect_core_types::CollectError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn machine_over(browser: Arc<dyn BrowserCapability>) -> AnchorStateMachine {
        AnchorStateMachine::new(AnchorConfig::standard(), browser)
            .with_settle(Duration::from_millis(5))
    }

    fn scripted() -> Arc<ScriptedCapability> {
        Arc::new(
            ReplayScript::builder()
                .search("rust", vec![json!({"id": "n1"})])
                .detail("n1", json!({"id": "n1", "title": "t", "body": "b"}))
                .build(),
        )
    }

    fn opts() -> EnsureOptions {
        EnsureOptions::default().with_timeout(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn ensure_is_idempotent_at_target() {
        let browser = scripted();
        let machine = machine_over(browser.clone());

        let first = machine
            .ensure(Anchor::HomeReady, Stage::Recover, &opts())
            .await;
        let second = machine
            .ensure(Anchor::HomeReady, Stage::Recover, &opts())
            .await;

        assert!(first.reached_exactly(Anchor::HomeReady));
        assert!(second.reached_exactly(Anchor::HomeReady));
        // No recovery action was ever issued.
        assert!(browser.nav_log().is_empty());
    }

    #[tokio::test]
    async fn ensure_recovers_from_detail_to_results() {
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
        let machine = machine_over(browser.clone());

        let result = machine
            .ensure(Anchor::ResultsReady, Stage::Recover, &opts())
            .await;

        assert!(result.reached_exactly(Anchor::ResultsReady));
        assert_eq!(result.from, Some(Anchor::DetailOpen));
        assert!(browser.nav_log().contains(&NavAction::PressEscape));
    }

    #[tokio::test]
    async fn ensure_detail_without_open_falls_back_to_ancestor() {
        let browser = scripted();
        browser
            .navigate(&NavAction::Search {
                keyword: "rust".into(),
            })
            .await
            .unwrap();
        let machine = machine_over(browser.clone());

        // No static edge reaches detail_open; with fallback enabled the
        // nearest ancestor (the results list we are already on) wins.
        let result = machine
            .ensure(
                Anchor::DetailOpen,
                Stage::OpenDetail,
                &opts().with_ancestor_fallback(),
            )
            .await;

        assert!(result.success);
        assert_eq!(result.reached, Some(Anchor::ResultsReady));
    }

    #[tokio::test]
    async fn ensure_without_fallback_reports_failure() {
        let browser = scripted();
        browser
            .navigate(&NavAction::Search {
                keyword: "rust".into(),
            })
            .await
            .unwrap();
        let machine = machine_over(browser.clone());

        let result = machine
            .ensure(Anchor::DetailOpen, Stage::OpenDetail, &opts())
            .await;

        assert!(!result.success);
        assert_eq!(result.reached, Some(Anchor::ResultsReady));
    }

    /// Browser stuck on a page no rule matches, with a dead navigate.
    struct StuckBrowser;

    #[async_trait]
    impl BrowserCapability for StuckBrowser {
        async fn probe(&self) -> Result<ProbeSignal, CollectError> {
            Ok(ProbeSignal::new("https://site.test/captcha"))
        }
        async fn navigate(&self, _action: &NavAction) -> Result<(), CollectError> {
            Ok(())
        }
        async fn extract(&self, _schema: &ExtractSchema) -> Result<serde_json::Value, CollectError> {
            Err(CollectError::MalformedPage("stuck".into()))
        }
        async fn screenshot(&self) -> Result<Vec<u8>, CollectError> {
            Ok(Vec::new())
        }
        async fn dom_snapshot(&self) -> Result<String, CollectError> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn ensure_times_out_on_unrecoverable_state() {
        let machine = machine_over(Arc::new(StuckBrowser));

        let result = machine
            .ensure(
                Anchor::HomeReady,
                Stage::Recover,
                &EnsureOptions::default().with_timeout(Duration::from_millis(40)),
            )
            .await;

        assert!(!result.success);
        assert_eq!(result.reached, None);
    }

    struct CountingSink {
        captures: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EvidenceSink for CountingSink {
        async fn capture(&self, _evidence: &EvidenceContext) -> Result<(), CollectError> {
            self.captures.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                Err(CollectError::Io("disk full".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn evidence_captured_per_attempt_and_failures_swallowed() {
        let sink = Arc::new(CountingSink {
            captures: AtomicUsize::new(0),
            fail: true,
        });
        let machine = machine_over(Arc::new(StuckBrowser)).with_evidence(sink.clone());

        let result = machine
            .ensure(
                Anchor::HomeReady,
                Stage::Recover,
                &EnsureOptions::default()
                    .with_timeout(Duration::from_millis(40))
                    .with_evidence(EvidencePolicy::EveryAttempt),
            )
            .await;

        // The sink failing never failed the ensure call itself.
        assert!(!result.success);
        assert!(sink.captures.load(Ordering::Relaxed) >= 1);
    }
}
