//! Audit log backends.

use super::{AuditEntry, AuditFilter, AuditLog, DEFAULT_CAPACITY};
use crate::error::AuditError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Bounded in-memory log. The oldest entry is evicted once `capacity` is reached.
pub struct MemoryAuditLog {
    entries: RwLock<VecDeque<AuditEntry>>,
    capacity: usize,
}

impl MemoryAuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for MemoryAuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn log_event(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let mut entries = self.entries.write().await;
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        Ok(())
    }

    async fn get_logs(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.entries.read().await;
        Ok(filter.apply(entries.iter()))
    }

    async fn archive_older(
        &self,
        organization_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, AuditError> {
        let archivable = AuditFilter::archivable(organization_id, cutoff);
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| !archivable(e));
        Ok(before - entries.len())
    }
}

/// JSON Lines file log.
///
/// Entries are appended one per line. The file is indexed in memory at open
/// so queries never reparse it. Archiving moves old entries to a sibling
/// `.archive.jsonl` file and rewrites the live file.
pub struct JsonlAuditLog {
    path: PathBuf,
    index: RwLock<Vec<AuditEntry>>,
}

impl JsonlAuditLog {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        let index = if fs::try_exists(&path).await? {
            read_entries(&path).await?
        } else {
            Vec::new()
        };

        debug!("Audit log {} holds {} entries", path.display(), index.len());

        Ok(Self {
            path,
            index: RwLock::new(index),
        })
    }

    pub fn archive_path(&self) -> PathBuf {
        self.path.with_extension("archive.jsonl")
    }
}

async fn read_entries(path: &Path) -> Result<Vec<AuditEntry>, AuditError> {
    let content = fs::read_to_string(path).await?;
    let mut entries = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(
                "Skipping unreadable audit line {} in {}: {}",
                line_no + 1,
                path.display(),
                e
            ),
        }
    }
    Ok(entries)
}

async fn append_lines(path: &Path, entries: &[AuditEntry]) -> Result<(), AuditError> {
    let mut buf = String::new();
    for entry in entries {
        buf.push_str(&serde_json::to_string(entry)?);
        buf.push('\n');
    }
    append_raw(path, &buf).await
}

async fn append_raw(path: &Path, buf: &str) -> Result<(), AuditError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(buf.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

#[async_trait]
impl AuditLog for JsonlAuditLog {
    async fn log_event(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let mut index = self.index.write().await;
        append_lines(&self.path, std::slice::from_ref(&entry)).await?;
        index.push(entry);
        Ok(())
    }

    async fn get_logs(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, AuditError> {
        let index = self.index.read().await;
        Ok(filter.apply(index.iter()))
    }

    async fn archive_older(
        &self,
        organization_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, AuditError> {
        let archivable = AuditFilter::archivable(organization_id, cutoff);
        let mut index = self.index.write().await;
        let (archived, kept): (Vec<&AuditEntry>, Vec<&AuditEntry>) =
            index.iter().partition(|e| archivable(*e));

        if archived.is_empty() {
            return Ok(0);
        }

        let mut moved = String::new();
        for entry in &archived {
            moved.push_str(&serde_json::to_string(entry)?);
            moved.push('\n');
        }
        let mut live = String::new();
        for entry in &kept {
            live.push_str(&serde_json::to_string(entry)?);
            live.push('\n');
        }

        // The index only changes once both files are on disk.
        append_raw(&self.archive_path(), &moved).await?;
        let tmp = self.path.with_extension("jsonl.tmp");
        fs::write(&tmp, live).await?;
        fs::rename(&tmp, &self.path).await?;

        let count = archived.len();
        index.retain(|e| !archivable(e));
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(resource_id: &str, days_ago: i64) -> AuditEntry {
        let mut entry = AuditEntry::new(
            "u1",
            Some("org".to_string()),
            "system.registered",
            "system",
            resource_id,
            json!({}),
        );
        entry.timestamp = Utc::now() - Duration::days(days_ago);
        entry
    }

    #[tokio::test]
    async fn test_memory_log_evicts_oldest() {
        let log = MemoryAuditLog::new(DEFAULT_CAPACITY);
        for i in 0..DEFAULT_CAPACITY + 5 {
            let mut e = entry(&format!("s{}", i), 0);
            e.timestamp = Utc::now() + Duration::milliseconds(i as i64);
            log.log_event(e).await.unwrap();
        }
        assert_eq!(log.len().await, DEFAULT_CAPACITY);

        let all = log.get_logs(&AuditFilter::default()).await.unwrap();
        assert!(all.iter().all(|e| e.resource_id != "s0" && e.resource_id != "s4"));
        assert!(all.iter().any(|e| e.resource_id == "s5"));
    }

    #[tokio::test]
    async fn test_memory_archive_older() {
        let log = MemoryAuditLog::default();
        log.log_event(entry("old", 40)).await.unwrap();
        log.log_event(entry("new", 1)).await.unwrap();

        let removed = log
            .archive_older("org", Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(log.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_archive_leaves_other_organizations() {
        let log = MemoryAuditLog::default();
        log.log_event(entry("ours", 40)).await.unwrap();
        let mut theirs = entry("theirs", 40);
        theirs.organization_id = Some("other".to_string());
        log.log_event(theirs).await.unwrap();

        let removed = log
            .archive_older("org", Utc::now() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let left = log.get_logs(&AuditFilter::default()).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].resource_id, "theirs");
    }

    #[tokio::test]
    async fn test_jsonl_log_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");

        let log = JsonlAuditLog::open(&path).await.unwrap();
        log.log_event(entry("s1", 0)).await.unwrap();
        log.log_event(entry("s2", 0)).await.unwrap();
        drop(log);

        let reopened = JsonlAuditLog::open(&path).await.unwrap();
        let logs = reopened.get_logs(&AuditFilter::default()).await.unwrap();
        assert_eq!(logs.len(), 2);
    }

    #[tokio::test]
    async fn test_jsonl_archive_moves_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");

        let log = JsonlAuditLog::open(&path).await.unwrap();
        log.log_event(entry("old", 100)).await.unwrap();
        log.log_event(entry("new", 1)).await.unwrap();

        let moved = log
            .archive_older("org", Utc::now() - Duration::days(90))
            .await
            .unwrap();
        assert_eq!(moved, 1);

        let archived = std::fs::read_to_string(log.archive_path()).unwrap();
        assert!(archived.contains("\"old\""));

        let reopened = JsonlAuditLog::open(&path).await.unwrap();
        let live = reopened.get_logs(&AuditFilter::default()).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].resource_id, "new");
    }

    #[tokio::test]
    async fn test_jsonl_archive_scoped_to_organization() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");

        let log = JsonlAuditLog::open(&path).await.unwrap();
        log.log_event(entry("ours", 100)).await.unwrap();
        let mut theirs = entry("theirs", 100);
        theirs.organization_id = Some("other".to_string());
        log.log_event(theirs).await.unwrap();

        let moved = log
            .archive_older("org", Utc::now() - Duration::days(90))
            .await
            .unwrap();
        assert_eq!(moved, 1);

        let reopened = JsonlAuditLog::open(&path).await.unwrap();
        let live = reopened.get_logs(&AuditFilter::default()).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].resource_id, "theirs");
    }

    #[tokio::test]
    async fn test_jsonl_failed_archive_keeps_index() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");

        let log = JsonlAuditLog::open(&path).await.unwrap();
        log.log_event(entry("old", 100)).await.unwrap();
        log.log_event(entry("new", 1)).await.unwrap();

        // A directory where the archive file should go makes the append fail.
        std::fs::create_dir(log.archive_path()).unwrap();

        let result = log
            .archive_older("org", Utc::now() - Duration::days(90))
            .await;
        assert!(result.is_err());

        let live = log.get_logs(&AuditFilter::default()).await.unwrap();
        assert_eq!(live.len(), 2);
        let lines = std::fs::read_to_string(&path).unwrap().lines().count();
        assert_eq!(lines, 2);
    }
}
