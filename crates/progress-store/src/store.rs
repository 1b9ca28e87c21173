//! Snapshot persistence

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use collect_core_types::SessionId;
use tracing::debug;

use crate::errors::StoreError;
use crate::model::ProgressSnapshot;

/// Stores one snapshot file per session under a root directory. Writes go
/// to a temp file, fsync, then rename, so readers only ever see the old
/// or the new snapshot, never a mix.
pub struct ProgressStore {
    root: PathBuf,
}

impl ProgressStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, session: &SessionId) -> PathBuf {
        self.root.join(format!("{}.json", session.0))
    }

    pub fn save(&self, snapshot: &ProgressSnapshot) -> Result<PathBuf, StoreError> {
        let path = self.path(&snapshot.session_id);
        let data = serde_json::to_vec_pretty(snapshot)?;
        write_atomic(&path, &data)?;
        debug!(session = %snapshot.session_id, collected = snapshot.collected_count, "snapshot saved");
        Ok(path)
    }

    /// `Ok(None)` means a fresh run: nothing saved for this session.
    pub fn load(&self, session: &SessionId) -> Result<Option<ProgressSnapshot>, StoreError> {
        let path = self.path(session);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let snapshot = serde_json::from_str(&raw)?;
        Ok(Some(snapshot))
    }

    /// Remove the snapshot after a fully successful run; a later `run`
    /// with the same session then starts fresh. Missing files are fine.
    pub fn cleanup(&self, session: &SessionId) -> Result<(), StoreError> {
        match fs::remove_file(self.path(session)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ProgressStore) {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_dir, store) = store();
        let mut snapshot = ProgressSnapshot::new(SessionId::new());
        snapshot.keyword_index = 2;
        snapshot.search_round = 5;
        snapshot.collected_count = 17;
        snapshot.mark_seen("item:n1");
        snapshot.mark_seen("item:n2");
        snapshot.last_keyword = Some("rust async".into());
        snapshot.last_item_id = Some("n2".into());

        store.save(&snapshot).unwrap();
        let loaded = store.load(&snapshot.session_id).unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn load_missing_session_is_none() {
        let (_dir, store) = store();
        assert!(store.load(&SessionId::new()).unwrap().is_none());
    }

    #[test]
    fn save_overwrites_atomically() {
        let (_dir, store) = store();
        let mut snapshot = ProgressSnapshot::new(SessionId::new());
        store.save(&snapshot).unwrap();

        snapshot.collected_count = 9;
        snapshot.mark_seen("item:n9");
        let path = store.save(&snapshot).unwrap();

        let loaded = store.load(&snapshot.session_id).unwrap().unwrap();
        assert_eq!(loaded.collected_count, 9);
        // No temp file left behind.
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn cleanup_removes_snapshot_and_is_idempotent() {
        let (_dir, store) = store();
        let snapshot = ProgressSnapshot::new(SessionId::new());
        store.save(&snapshot).unwrap();

        store.cleanup(&snapshot.session_id).unwrap();
        assert!(store.load(&snapshot.session_id).unwrap().is_none());
        store.cleanup(&snapshot.session_id).unwrap();
    }

    #[test]
    fn sessions_do_not_share_snapshots() {
        let (_dir, store) = store();
        let a = ProgressSnapshot::new(SessionId::new());
        let mut b = ProgressSnapshot::new(SessionId::new());
        b.collected_count = 3;

        store.save(&a).unwrap();
        store.save(&b).unwrap();

        assert_eq!(store.load(&a.session_id).unwrap().unwrap().collected_count, 0);
        assert_eq!(store.load(&b.session_id).unwrap().unwrap().collected_count, 3);
    }
}
