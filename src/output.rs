//! Record sinks backed by local files
//!
//! JSONL is the default export; a `.csv` output path switches to a flat
//! CSV with the payload serialized into one column.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use collect_core_types::CollectError;
use collect_loop::{ItemRecord, RecordSink};
use parking_lot::Mutex;

/// One JSON object per line, append-only.
pub struct JsonlSink {
    file: Mutex<File>,
}

impl JsonlSink {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory for {}", path.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening output file {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl RecordSink for JsonlSink {
    async fn emit(&self, record: &ItemRecord) -> Result<(), CollectError> {
        let line = serde_json::to_string(record)?;
        let mut file = self.file.lock();
        writeln!(file, "{line}").map_err(CollectError::from)?;
        file.flush().map_err(CollectError::from)?;
        Ok(())
    }
}

/// Fixed columns; the full payload rides along as a JSON string.
pub struct CsvSink {
    writer: Mutex<csv::Writer<File>>,
}

impl CsvSink {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory for {}", path.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("opening output file {}", path.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        writer
            .write_record(["key", "item_id", "keyword", "degraded", "collected_at", "title", "payload"])
            .context("writing csv header")?;
        writer.flush().context("flushing csv header")?;
        Ok(Self {
            writer: Mutex::new(writer),
        })
    }
}

#[async_trait]
impl RecordSink for CsvSink {
    async fn emit(&self, record: &ItemRecord) -> Result<(), CollectError> {
        let title = record
            .payload
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let payload = serde_json::to_string(&record.payload)?;
        let collected_at = record.collected_at.to_rfc3339();
        let mut writer = self.writer.lock();
        writer
            .write_record([
                record.key.as_str(),
                record.item_id.as_str(),
                record.keyword.as_str(),
                if record.degraded { "true" } else { "false" },
                collected_at.as_str(),
                title.as_str(),
                payload.as_str(),
            ])
            .map_err(|err| CollectError::Io(err.to_string()))?;
        writer
            .flush()
            .map_err(|err| CollectError::Io(err.to_string()))?;
        Ok(())
    }
}

/// Pick a sink implementation from the output path's extension.
pub fn sink_for_path(path: &Path) -> Result<Arc<dyn RecordSink>> {
    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match by_extension.as_deref() {
        Some("csv") => Ok(Arc::new(CsvSink::create(path)?)),
        _ => Ok(Arc::new(JsonlSink::create(path)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(id: &str, degraded: bool) -> ItemRecord {
        ItemRecord {
            key: format!("item:{id}"),
            item_id: id.to_string(),
            keyword: "rust".to_string(),
            payload: json!({"id": id, "title": format!("t {id}"), "body": "b"}),
            degraded,
            collected_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn jsonl_sink_appends_one_line_per_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");
        let sink = JsonlSink::create(&path).unwrap();

        sink.emit(&record("n1", false)).await.unwrap();
        sink.emit(&record("n2", true)).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: ItemRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.item_id, "n2");
        assert!(parsed.degraded);
    }

    #[tokio::test]
    async fn csv_sink_writes_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let sink = CsvSink::create(&path).unwrap();

        sink.emit(&record("n1", false)).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let mut lines = raw.lines();
        assert!(lines.next().unwrap().starts_with("key,item_id,keyword"));
        let row = lines.next().unwrap();
        assert!(row.contains("item:n1"));
        assert!(row.contains("t n1"));
    }

    #[test]
    fn extension_selects_sink() {
        let dir = TempDir::new().unwrap();
        assert!(sink_for_path(&dir.path().join("a.csv")).is_ok());
        assert!(sink_for_path(&dir.path().join("a.jsonl")).is_ok());
    }
}
