// src/stats/mod.rs — Request statistics (CSV)
//
// Rows are buffered in memory and appended to the CSV file on an interval.
// After every flush the whole file is cached so the `stats` command can send
// it without touching the disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::infra::errors::Result;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub struct StatRow {
    pub ts: DateTime<FixedOffset>,
    pub username: String,
    pub backend: String,
    pub request: String,
    pub response: String,
}

impl StatRow {
    /// One CSV line: ts, username, backend, response, request.
    fn to_csv_line(&self) -> String {
        let ts = self.ts.format(TIMESTAMP_FORMAT).to_string();
        let fields = [
            ts.as_str(),
            self.username.as_str(),
            self.backend.as_str(),
            self.response.as_str(),
            self.request.as_str(),
        ];
        let mut line = fields.map(escape_field).join(",");
        line.push('\n');
        line
    }
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub struct StatsRecorder {
    path: PathBuf,
    offset: FixedOffset,
    pending: Mutex<Vec<StatRow>>,
    snapshot: RwLock<Vec<u8>>,
}

impl StatsRecorder {
    pub fn new(path: &Path, utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| {
            tracing::warn!(utc_offset_hours, "Invalid stats UTC offset, using UTC");
            Utc.fix()
        });
        Self {
            path: path.to_path_buf(),
            offset,
            pending: Mutex::new(Vec::new()),
            snapshot: RwLock::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, username: &str, backend: &str, request: &str, response: &str) {
        let row = StatRow {
            ts: Utc::now().with_timezone(&self.offset),
            username: username.to_string(),
            backend: backend.to_string(),
            request: request.to_string(),
            response: response.to_string(),
        };
        self.pending.lock().push(row);
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Append buffered rows to the file and refresh the cached copy.
    /// Returns the number of rows written.
    pub async fn flush(&self) -> Result<usize> {
        let rows = std::mem::take(&mut *self.pending.lock());

        if let Err(e) = self.append(&rows).await {
            // Failed rows go back ahead of anything recorded meanwhile.
            let mut pending = self.pending.lock();
            let newer = std::mem::replace(&mut *pending, rows);
            pending.extend(newer);
            return Err(e);
        }

        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                *self.snapshot.write() = bytes;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(rows.len())
    }

    async fn append(&self, rows: &[StatRow]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if rows.is_empty() {
            return Ok(());
        }
        let content: String = rows.iter().map(StatRow::to_csv_line).collect();
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// CSV content as of the last flush.
    pub fn snapshot(&self) -> Vec<u8> {
        self.snapshot.read().clone()
    }

    /// Flush every `interval` until `shutdown`, then flush once more.
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.flush().await {
                        tracing::error!("Stats flush failed: {}", e);
                    }
                }
            }
        }
        if let Err(e) = self.flush().await {
            tracing::error!("Final stats flush failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_column_order() {
        let row = StatRow {
            ts: DateTime::parse_from_rfc3339("2026-01-02T03:04:05+03:00").unwrap(),
            username: "alice".into(),
            backend: "DreamBooth".into(),
            request: "a red fox".into(),
            response: "fox.png".into(),
        };
        assert_eq!(
            row.to_csv_line(),
            "2026-01-02 03:04:05,alice,DreamBooth,fox.png,a red fox\n"
        );
    }

    #[tokio::test]
    async fn test_flush_appends_and_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("stats.csv");
        let stats = StatsRecorder::new(&path, 0);

        stats.record("alice", "ChatGPT", "hello", "hi there");
        assert_eq!(stats.pending(), 1);
        assert_eq!(stats.flush().await.unwrap(), 1);
        assert_eq!(stats.pending(), 0);

        stats.record("bob", "OpenAI", "draw, a cat", "cat.png");
        stats.flush().await.unwrap();

        let content = String::from_utf8(stats.snapshot()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(",alice,ChatGPT,hi there,hello"));
        assert!(lines[1].ends_with(",bob,OpenAI,cat.png,\"draw, a cat\""));
        assert_eq!(std::fs::read(&path).unwrap(), stats.snapshot());
    }

    #[tokio::test]
    async fn test_flush_without_rows_keeps_missing_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.csv");
        let stats = StatsRecorder::new(&path, 3);
        assert_eq!(stats.flush().await.unwrap(), 0);
        assert!(stats.snapshot().is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let path = blocker.join("stats.csv");
        let stats = StatsRecorder::new(&path, 0);

        stats.record("alice", "ChatGPT", "first", "one");
        stats.record("bob", "OpenAI", "second", "two");
        assert!(stats.flush().await.is_err());
        assert_eq!(stats.pending(), 2);

        stats.record("carol", "ChatGPT", "third", "three");
        std::fs::remove_file(&blocker).unwrap();
        assert_eq!(stats.flush().await.unwrap(), 3);
        assert_eq!(stats.pending(), 0);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with(",alice,ChatGPT,one,first"));
        assert!(lines[1].ends_with(",bob,OpenAI,two,second"));
        assert!(lines[2].ends_with(",carol,ChatGPT,three,third"));
    }
}
