//! The failure classifier
//!
//! Classification is a pure function of the error variant and the pipeline
//! stage: no clocks, no counters, no I/O. Call it twice with the same
//! inputs and you get the same verdict.

use std::time::Duration;

use collect_core_types::{CollectError, Stage};

use crate::verdict::RecoveryVerdict;

/// Trait seam so the orchestrator and the retry decorator can be tested
/// against canned policies.
pub trait Classifier: Send + Sync {
    fn classify(&self, error: &CollectError, stage: Stage) -> RecoveryVerdict;
}

/// The production policy table.
#[derive(Clone, Copy, Debug, Default)]
pub struct PolicyClassifier;

impl Classifier for PolicyClassifier {
    fn classify(&self, error: &CollectError, stage: Stage) -> RecoveryVerdict {
        match error {
            CollectError::Timeout { .. } => RecoveryVerdict::retry(
                Duration::from_millis(500),
                "give the page time to settle and retry",
            ),
            CollectError::Capability(_) => RecoveryVerdict::retry(
                Duration::from_secs(1),
                "transient backend error, retry the call",
            ),
            CollectError::Navigation(_) => RecoveryVerdict::retry(
                Duration::from_millis(800),
                "re-drive the navigation from the current anchor",
            ),
            CollectError::RateLimited(_) => RecoveryVerdict::retry(
                Duration::from_secs(15),
                "back off well clear of the upstream rate limit",
            ),
            CollectError::MalformedPage(_) => {
                RecoveryVerdict::skip_item("this item's page is broken, move on")
            }
            CollectError::FieldUnavailable { field, .. } => RecoveryVerdict::degrade(format!(
                "collect the record without '{field}' and flag it degraded"
            )),
            CollectError::AuthExpired(_) => {
                RecoveryVerdict::abort("session credentials are gone, re-authenticate and resume")
            }
            CollectError::StructureChanged(_) => {
                RecoveryVerdict::abort("site layout changed, selectors need updating")
            }
            CollectError::Io(_) => RecoveryVerdict::retry(
                Duration::from_millis(300),
                "transient local io failure, retry",
            ),
            // A parse failure means different things depending on where it
            // happened: scraped data is item noise, our own snapshot is not.
            CollectError::Serde(_) => match stage {
                Stage::Enumerate | Stage::Extract => {
                    RecoveryVerdict::skip_item("unparseable scraped payload, move on")
                }
                _ => RecoveryVerdict::abort("internal serialization failure"),
            },
            CollectError::Internal(_) => RecoveryVerdict::abort("internal invariant violated"),
        }
    }
}

/// Convenience free function over the default policy.
pub fn classify(error: &CollectError, stage: Stage) -> RecoveryVerdict {
    PolicyClassifier.classify(error, stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::RecoveryAction;

    #[test]
    fn classification_is_deterministic() {
        let error = CollectError::timeout("extract comments", 3000);
        let first = classify(&error, Stage::Extract);
        let second = classify(&error, Stage::Extract);
        assert_eq!(first, second);
    }

    #[test]
    fn transient_errors_retry() {
        for error in [
            CollectError::timeout("probe", 1000),
            CollectError::Capability("socket closed".into()),
            CollectError::Navigation("detail click bounced".into()),
            CollectError::RateLimited("429".into()),
        ] {
            let verdict = classify(&error, Stage::Search);
            assert_eq!(verdict.action, RecoveryAction::Retry, "{error}");
        }
    }

    #[test]
    fn rate_limit_backs_off_longer_than_timeouts() {
        let limited = classify(&CollectError::RateLimited("429".into()), Stage::Search);
        let timed_out = classify(&CollectError::timeout("search", 1000), Stage::Search);
        assert!(limited.backoff > timed_out.backoff);
    }

    #[test]
    fn item_scoped_failures_skip() {
        let verdict = classify(
            &CollectError::MalformedPage("missing body".into()),
            Stage::Extract,
        );
        assert_eq!(verdict.action, RecoveryAction::SkipItem);
    }

    #[test]
    fn optional_field_loss_degrades() {
        let verdict = classify(
            &CollectError::field_unavailable("comments", "pane timed out"),
            Stage::Extract,
        );
        assert_eq!(verdict.action, RecoveryAction::GracefulDegrade);
        assert!(verdict.suggestion.contains("comments"));
    }

    #[test]
    fn systemic_failures_abort() {
        for error in [
            CollectError::AuthExpired("cookie invalid".into()),
            CollectError::StructureChanged("results grid renamed".into()),
            CollectError::Internal("impossible state".into()),
        ] {
            let verdict = classify(&error, Stage::OpenDetail);
            assert_eq!(verdict.action, RecoveryAction::AbortTask, "{error}");
        }
    }

    #[test]
    fn serde_verdict_depends_on_stage() {
        let error = CollectError::Serde("bad json".into());
        assert_eq!(
            classify(&error, Stage::Extract).action,
            RecoveryAction::SkipItem
        );
        assert_eq!(
            classify(&error, Stage::Persist).action,
            RecoveryAction::AbortTask
        );
    }
}
