//! `webcollect run`

use std::path::PathBuf;
use std::sync::Arc;

use anchor_machine::{AnchorConfig, AnchorStateMachine, FsEvidenceSink};
use anyhow::{bail, Result};
use browser_capability::ScriptedCapability;
use clap::Args;
use collect_core_types::SessionId;
use collect_loop::Orchestrator;
use progress_store::ProgressStore;
use search_gate::SearchGate;
use tracing::info;

use crate::config::AppConfig;
use crate::output::sink_for_path;

#[derive(Args)]
pub struct RunArgs {
    /// Session id; reuse one to resume its snapshot.
    #[arg(long)]
    pub session: Option<String>,

    /// Override the configured target count.
    #[arg(long)]
    pub target: Option<usize>,

    /// Comma-separated keywords, overriding the configured list.
    #[arg(long)]
    pub keywords: Option<String>,

    /// Output file; `.csv` switches format, anything else is JSONL.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Replay fixture for the bundled scripted backend.
    #[arg(long)]
    pub fixture: Option<PathBuf>,
}

pub async fn execute(mut config: AppConfig, args: RunArgs) -> Result<i32> {
    if let Some(target) = args.target {
        config.collect.target = target;
    }
    if let Some(keywords) = &args.keywords {
        config.collect.keywords = keywords
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
    }
    if config.collect.keywords.is_empty() {
        bail!("no keywords configured; set collect.keywords or pass --keywords");
    }

    let fixture = match args.fixture.or_else(|| config.fixture.clone()) {
        Some(path) => path,
        None => bail!(
            "no browser backend configured: pass --fixture for a scripted run \
             (real backends embed the collect-loop crate directly)"
        ),
    };
    let browser = Arc::new(ScriptedCapability::from_fixture(&fixture)?);

    let session = SessionId(
        args.session
            .or_else(|| config.session.clone())
            .unwrap_or_else(|| SessionId::new().0),
    );

    let mut anchors = AnchorStateMachine::new(AnchorConfig::standard(), browser.clone());
    if let Some(evidence_dir) = &config.evidence_dir {
        anchors = anchors.with_evidence(Arc::new(FsEvidenceSink::new(evidence_dir.clone())));
    }

    let gate = SearchGate::new(config.gate_config()?);
    let state_dir = config.state_dir();
    let store = ProgressStore::new(&state_dir);
    let snapshot_path = store.path(&session);

    let output = args
        .output
        .or_else(|| config.output.clone())
        .unwrap_or_else(|| PathBuf::from("collected.jsonl"));
    let sink = sink_for_path(&output)?;

    info!(session = %session, output = %output.display(), "starting collect run");
    let orchestrator = Orchestrator::new(
        browser,
        anchors,
        gate,
        store,
        sink,
        config.collect_config()?,
    );
    let outcome = orchestrator.run(&session).await?;

    println!(
        "collected {} item(s) into {}",
        outcome.collected_count,
        output.display()
    );
    if outcome.aborted {
        let checkpoint = outcome
            .last_checkpoint
            .map(|c| c.describe())
            .unwrap_or_else(|| "unknown".to_string());
        eprintln!("run aborted; last checkpoint: {checkpoint}");
        eprintln!(
            "resume with the same session id; snapshot at {}",
            snapshot_path.display()
        );
        return Ok(1);
    }
    Ok(0)
}
