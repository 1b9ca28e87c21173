//! `webcollect status`

use anyhow::Result;
use clap::Args;
use collect_core_types::SessionId;
use progress_store::ProgressStore;

use crate::config::AppConfig;

#[derive(Args)]
pub struct StatusArgs {
    #[arg(long)]
    pub session: String,
}

pub fn execute(config: AppConfig, args: StatusArgs) -> Result<i32> {
    let store = ProgressStore::new(config.state_dir());
    let session = SessionId(args.session);
    match store.load(&session)? {
        Some(snapshot) => {
            println!("session:    {}", snapshot.session_id);
            println!("collected:  {}", snapshot.collected_count);
            println!("round:      {}", snapshot.search_round);
            println!(
                "keyword:    {}",
                snapshot.last_keyword.as_deref().unwrap_or("-")
            );
            println!(
                "last item:  {}",
                snapshot.last_item_id.as_deref().unwrap_or("-")
            );
            println!("seen keys:  {}", snapshot.seen_keys.len());
            println!("updated:    {}", snapshot.updated_at.to_rfc3339());
            println!("snapshot:   {}", store.path(&session).display());
        }
        None => {
            println!("no snapshot for session '{}': nothing to resume", session);
        }
    }
    Ok(0)
}
