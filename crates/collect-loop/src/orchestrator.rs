//! The main loop

use std::sync::Arc;

use anchor_machine::{AnchorStateMachine, CheckpointState, EnsureOptions, EnsureResult};
use browser_capability::{BrowserCapability, ExtractSchema, NavAction};
use chrono::Utc;
use collect_core_types::{Anchor, CollectError, SessionId, Stage};
use progress_store::{dedupe_key, ProgressSnapshot, ProgressStore};
use recovery_policy::{retry_with_backoff, Classifier, PolicyClassifier, RecoveryAction};
use search_gate::SearchGate;
use tracing::{debug, error, info, warn};

use crate::config::CollectConfig;
use crate::model::{parse_items, CollectOutcome, ItemRecord, ItemSummary};
use crate::sink::RecordSink;

/// How one item's flow through the loop ended.
enum ItemFlow {
    Collected,
    Skipped,
    Duplicate,
    /// Systemic failure; stop the run.
    Aborted(CollectError),
    /// The results list could not be restored; the round is over.
    ListLost,
}

/// Drives one session's collect loop to completion. All browser state
/// dependencies are sequential within a session; the only resource shared
/// with sibling sessions is the gate.
pub struct Orchestrator {
    browser: Arc<dyn BrowserCapability>,
    anchors: AnchorStateMachine,
    gate: SearchGate,
    store: ProgressStore,
    classifier: Arc<dyn Classifier>,
    sink: Arc<dyn RecordSink>,
    config: CollectConfig,
}

impl Orchestrator {
    pub fn new(
        browser: Arc<dyn BrowserCapability>,
        anchors: AnchorStateMachine,
        gate: SearchGate,
        store: ProgressStore,
        sink: Arc<dyn RecordSink>,
        config: CollectConfig,
    ) -> Self {
        Self {
            browser,
            anchors,
            gate,
            store,
            classifier: Arc::new(PolicyClassifier),
            sink,
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Run the collect loop for `session`, resuming from its snapshot if
    /// one exists. Expected failures are routed through the recovery
    /// policy and reported in the outcome; only environment-level store
    /// failures surface as `Err`.
    pub async fn run(&self, session: &SessionId) -> Result<CollectOutcome, CollectError> {
        if self.config.keywords.is_empty() {
            return Err(CollectError::Internal("no search keywords configured".into()));
        }

        let mut snapshot = match self.store.load(session).map_err(CollectError::from)? {
            Some(snapshot) => {
                info!(
                    session = %session,
                    collected = snapshot.collected_count,
                    round = snapshot.search_round,
                    "resuming from snapshot"
                );
                snapshot
            }
            None => {
                info!(session = %session, "starting fresh run");
                ProgressSnapshot::new(session.clone())
            }
        };

        let mut last_checkpoint: Option<CheckpointState> = None;
        let mut gate_denials: u32 = 0;

        while snapshot.collected_count < self.config.target_count
            && snapshot.search_round < self.config.max_rounds
        {
            let keyword = self.config.keywords
                [snapshot.keyword_index % self.config.keywords.len()]
            .clone();

            // Admission control around the one rate-limited action. A
            // denied permit is round-scoped: cool down and try again,
            // never an item or task failure.
            let permit = self
                .gate
                .wait_for_permit(&session.0, self.config.gate_wait)
                .await;
            if !permit.granted {
                gate_denials += 1;
                warn!(
                    denials = gate_denials,
                    reason = permit.reason.as_deref().unwrap_or("unknown"),
                    "search permit denied"
                );
                if gate_denials >= self.config.gate_retry_limit {
                    self.finish_round(&mut snapshot, &keyword)?;
                    gate_denials = 0;
                }
                tokio::time::sleep(self.config.round_cooldown).await;
                continue;
            }
            gate_denials = 0;

            let action = NavAction::Search {
                keyword: keyword.clone(),
            };
            let search = retry_with_backoff(
                "search",
                Stage::Search,
                &self.config.retry,
                self.classifier.as_ref(),
                || {
                    let action = &action;
                    async move { self.browser.navigate(action).await }
                },
            )
            .await;
            // The critical section is the search submission itself.
            if let Some(lease) = &permit.lease_id {
                self.gate.release(lease);
            }
            if let Err(failure) = search {
                if failure.verdict.action == RecoveryAction::AbortTask {
                    return self.abort(&mut snapshot, last_checkpoint.clone(), &failure.error);
                }
                warn!(error = %failure.error, "search failed, consuming round");
                self.finish_round(&mut snapshot, &keyword)?;
                tokio::time::sleep(self.config.round_cooldown).await;
                continue;
            }

            let ensured = self
                .anchors
                .ensure(Anchor::ResultsReady, Stage::Search, &self.ensure_opts(false))
                .await;
            last_checkpoint = Some(checkpoint_of(&ensured));
            if !ensured.success {
                warn!(keyword, "results never settled, consuming round");
                self.finish_round(&mut snapshot, &keyword)?;
                continue;
            }

            let listing = retry_with_backoff(
                "enumerate",
                Stage::Enumerate,
                &self.config.retry,
                self.classifier.as_ref(),
                || async move { self.browser.extract(&ExtractSchema::search_results()).await },
            )
            .await;
            let items = match listing {
                Ok(value) => parse_items(&value, self.config.per_search_max),
                Err(failure) => {
                    if failure.verdict.action == RecoveryAction::AbortTask {
                        return self.abort(&mut snapshot, last_checkpoint.clone(), &failure.error);
                    }
                    warn!(error = %failure.error, "enumeration failed, consuming round");
                    self.finish_round(&mut snapshot, &keyword)?;
                    continue;
                }
            };
            info!(
                round = snapshot.search_round,
                keyword,
                found = items.len(),
                "round enumerated"
            );

            let mut since_save = 0usize;
            for item in &items {
                if snapshot.collected_count >= self.config.target_count {
                    break;
                }
                let list_key = dedupe_key(&item.list_id, item.container_id.as_deref());
                // Cheap pre-check on the approximate list-level id before
                // paying for the detail view.
                if snapshot.is_seen(&list_key) {
                    debug!(key = %list_key, "already seen, skipping");
                    continue;
                }

                let flow = self
                    .collect_item(item, &keyword, &list_key, &mut snapshot, &mut last_checkpoint)
                    .await;
                match flow {
                    ItemFlow::Collected => {
                        since_save += 1;
                        if since_save >= self.config.checkpoint_every {
                            self.save(&mut snapshot)?;
                            since_save = 0;
                        }
                    }
                    ItemFlow::Skipped | ItemFlow::Duplicate => {}
                    ItemFlow::Aborted(cause) => {
                        return self.abort(&mut snapshot, last_checkpoint.clone(), &cause);
                    }
                    ItemFlow::ListLost => {
                        warn!("results list lost, ending round early");
                        break;
                    }
                }
            }

            self.finish_round(&mut snapshot, &keyword)?;
            info!(
                collected = snapshot.collected_count,
                round = snapshot.search_round,
                "round complete"
            );
        }

        if snapshot.collected_count >= self.config.target_count {
            self.store.cleanup(session).map_err(CollectError::from)?;
            info!(
                collected = snapshot.collected_count,
                "target reached, snapshot cleared"
            );
        } else {
            self.save(&mut snapshot)?;
            info!(
                collected = snapshot.collected_count,
                rounds = snapshot.search_round,
                "rounds exhausted, snapshot kept for resume"
            );
        }

        Ok(CollectOutcome {
            collected_count: snapshot.collected_count,
            aborted: false,
            last_checkpoint,
        })
    }

    /// One item: open the detail view (verifying it actually opened),
    /// extract, route failures, restore the list view.
    async fn collect_item(
        &self,
        item: &ItemSummary,
        keyword: &str,
        list_key: &str,
        snapshot: &mut ProgressSnapshot,
        last_checkpoint: &mut Option<CheckpointState>,
    ) -> ItemFlow {
        let mut detail_open = false;
        // Modals silently fail to open; re-issue the click once before
        // giving up on the item.
        for attempt in 0..2 {
            let open = NavAction::OpenItem {
                item_id: item.list_id.clone(),
            };
            if let Err(err) = self.browser.navigate(&open).await {
                let verdict = self.classifier.classify(&err, Stage::OpenDetail);
                if verdict.action == RecoveryAction::AbortTask {
                    error!(%err, suggestion = %verdict.suggestion, "opening detail hit systemic failure");
                    return ItemFlow::Aborted(err);
                }
                warn!(%err, attempt, "open click failed");
                continue;
            }
            let ensured = self
                .anchors
                .ensure(Anchor::DetailOpen, Stage::OpenDetail, &self.ensure_opts(false))
                .await;
            *last_checkpoint = Some(checkpoint_of(&ensured));
            if ensured.success {
                detail_open = true;
                break;
            }
            debug!(item = %item.list_id, attempt, "detail view did not open");
        }
        if !detail_open {
            warn!(item = %item.list_id, "detail never opened, skipping item");
            if self.config.mark_skipped_seen {
                snapshot.mark_seen(list_key);
            }
            return if self.restore_list(last_checkpoint).await {
                ItemFlow::Skipped
            } else {
                ItemFlow::ListLost
            };
        }

        let extraction = retry_with_backoff(
            "extract",
            Stage::Extract,
            &self.config.retry,
            self.classifier.as_ref(),
            || async move { self.browser.extract(&ExtractSchema::item_detail()).await },
        )
        .await;

        let payload = match extraction {
            Ok(value) => Some((value, false)),
            Err(failure) => match failure.verdict.action {
                RecoveryAction::GracefulDegrade => {
                    warn!(
                        item = %item.list_id,
                        error = %failure.error,
                        suggestion = %failure.verdict.suggestion,
                        "degrading to reduced record"
                    );
                    match self.browser.extract(&ExtractSchema::item_core()).await {
                        Ok(value) => Some((value, true)),
                        Err(err) => {
                            warn!(%err, "reduced extraction also failed, skipping item");
                            None
                        }
                    }
                }
                RecoveryAction::AbortTask => {
                    error!(
                        item = %item.list_id,
                        error = %failure.error,
                        suggestion = %failure.verdict.suggestion,
                        "extraction hit systemic failure"
                    );
                    return ItemFlow::Aborted(failure.error);
                }
                RecoveryAction::SkipItem | RecoveryAction::Retry => {
                    // Retry here means attempts were exhausted; the item
                    // is abandoned but not marked seen, so a future run
                    // may try again.
                    warn!(
                        item = %item.list_id,
                        error = %failure.error,
                        attempts = failure.attempts,
                        "skipping item"
                    );
                    None
                }
            },
        };

        let flow = match payload {
            None => {
                if self.config.mark_skipped_seen {
                    snapshot.mark_seen(list_key);
                }
                ItemFlow::Skipped
            }
            Some((value, degraded)) => {
                // The canonical id may differ from the list-level one;
                // both checks go through the same key function.
                let canonical_id = value
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&item.list_id)
                    .to_string();
                let canonical_key = dedupe_key(&canonical_id, item.container_id.as_deref());
                let newly_seen = snapshot.mark_seen(&canonical_key);
                snapshot.mark_seen(list_key);
                if !newly_seen {
                    debug!(key = %canonical_key, "canonical id already collected");
                    ItemFlow::Duplicate
                } else {
                    let record = ItemRecord {
                        key: canonical_key,
                        item_id: canonical_id,
                        keyword: keyword.to_string(),
                        payload: value,
                        degraded,
                        collected_at: Utc::now(),
                    };
                    let emitted = retry_with_backoff(
                        "emit record",
                        Stage::Persist,
                        &self.config.retry,
                        self.classifier.as_ref(),
                        || {
                            let record = &record;
                            async move { self.sink.emit(record).await }
                        },
                    )
                    .await;
                    if let Err(failure) = emitted {
                        error!(error = %failure.error, "record sink failed");
                        return ItemFlow::Aborted(failure.error);
                    }
                    snapshot.collected_count += 1;
                    snapshot.last_item_id = Some(record.item_id.clone());
                    info!(
                        key = %record.key,
                        degraded = record.degraded,
                        collected = snapshot.collected_count,
                        "item collected"
                    );
                    ItemFlow::Collected
                }
            }
        };

        if self.restore_list(last_checkpoint).await {
            flow
        } else {
            ItemFlow::ListLost
        }
    }

    /// Restore the results list after a detail view. Settling on an
    /// ancestor anchor keeps the session recoverable but loses the list
    /// context, so only an exact restore counts.
    async fn restore_list(&self, last_checkpoint: &mut Option<CheckpointState>) -> bool {
        let ensured = self
            .anchors
            .ensure(Anchor::ResultsReady, Stage::Recover, &self.ensure_opts(true))
            .await;
        *last_checkpoint = Some(checkpoint_of(&ensured));
        ensured.reached_exactly(Anchor::ResultsReady)
    }

    fn ensure_opts(&self, allow_fallback: bool) -> EnsureOptions {
        let mut opts = EnsureOptions::default()
            .with_timeout(self.config.ensure_timeout)
            .with_evidence(self.config.evidence);
        if allow_fallback {
            opts = opts.with_ancestor_fallback();
        }
        opts
    }

    fn finish_round(
        &self,
        snapshot: &mut ProgressSnapshot,
        keyword: &str,
    ) -> Result<(), CollectError> {
        snapshot.keyword_index += 1;
        snapshot.search_round += 1;
        snapshot.last_keyword = Some(keyword.to_string());
        self.save(snapshot)
    }

    fn save(&self, snapshot: &mut ProgressSnapshot) -> Result<(), CollectError> {
        snapshot.touch();
        self.store.save(snapshot).map_err(CollectError::from)?;
        Ok(())
    }

    /// Persist progress, log where to resume from, report the aborted run.
    fn abort(
        &self,
        snapshot: &mut ProgressSnapshot,
        last_checkpoint: Option<CheckpointState>,
        cause: &CollectError,
    ) -> Result<CollectOutcome, CollectError> {
        self.save(snapshot)?;
        error!(
            %cause,
            collected = snapshot.collected_count,
            snapshot_path = %self.store.path(&snapshot.session_id).display(),
            "run aborted, progress persisted"
        );
        Ok(CollectOutcome {
            collected_count: snapshot.collected_count,
            aborted: true,
            last_checkpoint,
        })
    }
}

fn checkpoint_of(ensured: &EnsureResult) -> CheckpointState {
    CheckpointState {
        checkpoint: ensured.reached,
        stage: ensured.stage,
        url: ensured.url.clone(),
    }
}
