//! Multi-session runner
//!
//! Sessions are independent sequential loops; the only shared mutable
//! resource between them is the search gate, so each gets its own task
//! and outcomes are gathered as they finish.

use std::sync::Arc;

use collect_core_types::{CollectError, SessionId};
use dashmap::DashMap;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::model::CollectOutcome;
use crate::orchestrator::Orchestrator;

/// One session's loop: its id plus a fully wired orchestrator (own
/// browser, own store, own sink; the gate is shared by construction).
pub struct SessionPlan {
    pub session: SessionId,
    pub orchestrator: Orchestrator,
}

/// Run every plan to completion and return each session's result. A
/// panicking session task is logged and reported as an internal error;
/// sibling sessions keep running.
pub async fn run_sessions(
    plans: Vec<SessionPlan>,
) -> DashMap<SessionId, Result<CollectOutcome, CollectError>> {
    let outcomes: Arc<DashMap<SessionId, Result<CollectOutcome, CollectError>>> =
        Arc::new(DashMap::new());
    let mut tasks = JoinSet::new();

    for plan in plans {
        let outcomes = Arc::clone(&outcomes);
        tasks.spawn(async move {
            let session = plan.session.clone();
            info!(session = %session, "session loop started");
            let result = plan.orchestrator.run(&plan.session).await;
            outcomes.insert(session, result);
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            error!(%err, "session task panicked");
        }
    }

    Arc::try_unwrap(outcomes).unwrap_or_else(|shared| shared.as_ref().clone())
}
