//! `webcollect clean`

use anyhow::Result;
use clap::Args;
use collect_core_types::SessionId;
use progress_store::ProgressStore;

use crate::config::AppConfig;

#[derive(Args)]
pub struct CleanArgs {
    #[arg(long)]
    pub session: String,
}

pub fn execute(config: AppConfig, args: CleanArgs) -> Result<i32> {
    let store = ProgressStore::new(config.state_dir());
    let session = SessionId(args.session);
    store.cleanup(&session)?;
    println!("snapshot for session '{}' removed", session);
    Ok(0)
}
