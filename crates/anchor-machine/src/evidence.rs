//! Best-effort evidence capture
//!
//! Recovery attempts can optionally capture a screenshot and DOM snapshot
//! for offline diagnosis. Capture is strictly best-effort: a failing sink
//! is logged and swallowed, never surfaced to the primary call.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collect_core_types::{CollectError, Stage};
use serde::Serialize;

/// When to capture evidence during an `ensure` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EvidencePolicy {
    #[default]
    Never,
    /// One capture when the call is about to report failure.
    OnFailure,
    /// A capture before every recovery attempt.
    EveryAttempt,
}

/// One capture handed to a sink.
#[derive(Clone, Debug, Serialize)]
pub struct EvidenceContext {
    pub label: String,
    pub stage: Stage,
    pub url: String,
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,
    #[serde(skip)]
    pub dom: Option<String>,
    pub captured_at: DateTime<Utc>,
}

#[async_trait]
pub trait EvidenceSink: Send + Sync {
    async fn capture(&self, evidence: &EvidenceContext) -> Result<(), CollectError>;
}

/// Writes captures under a directory, one pair of files per capture,
/// atomically (temp file then rename) so a crashed run never leaves a
/// torn artifact.
pub struct FsEvidenceSink {
    root: PathBuf,
    seq: AtomicU64,
}

impl FsEvidenceSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            seq: AtomicU64::new(0),
        }
    }

    fn file_stem(&self, evidence: &EvidenceContext) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}-{:04}-{}-{}",
            evidence.captured_at.format("%Y%m%dT%H%M%S"),
            seq,
            evidence.stage,
            evidence.label.replace(['/', ' '], "_"),
        )
    }
}

#[async_trait]
impl EvidenceSink for FsEvidenceSink {
    async fn capture(&self, evidence: &EvidenceContext) -> Result<(), CollectError> {
        let stem = self.file_stem(evidence);
        if let Some(shot) = &evidence.screenshot {
            write_atomic(&self.root.join(format!("{stem}.png")), shot)?;
        }
        if let Some(dom) = &evidence.dom {
            write_atomic(&self.root.join(format!("{stem}.html")), dom.as_bytes())?;
        }
        let meta = serde_json::to_vec_pretty(evidence)?;
        write_atomic(&self.root.join(format!("{stem}.json")), &meta)?;
        Ok(())
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

    #[tokio::test]
    async fn fs_sink_writes_all_artifacts() {
        let dir = TempDir::new().unwrap();
        let sink = FsEvidenceSink::new(dir.path());
        let evidence = EvidenceContext {
            label: "ensure results_ready".into(),
            stage: Stage::Recover,
            url: "https://site.test/search?kw=x".into(),
            screenshot: Some(vec![1, 2, 3]),
            dom: Some("<html></html>".into()),
            captured_at: Utc::now(),
        };

        sink.capture(&evidence).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().any(|p| p.extension().unwrap() == "png"));
        assert!(entries.iter().any(|p| p.extension().unwrap() == "html"));
        assert!(entries.iter().any(|p| p.extension().unwrap() == "json"));
        // No leftover temp files.
        assert!(entries.iter().all(|p| p.extension().unwrap() != "tmp"));
    }

    #[tokio::test]
    async fn captures_get_distinct_names() {
        let dir = TempDir::new().unwrap();
        let sink = FsEvidenceSink::new(dir.path());
        let evidence = EvidenceContext {
            label: "same".into(),
            stage: Stage::Recover,
            url: String::new(),
            screenshot: None,
            dom: None,
            captured_at: Utc::now(),
        };

        sink.capture(&evidence).await.unwrap();
        sink.capture(&evidence).await.unwrap();

        let count = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(count, 2);
    }
}
