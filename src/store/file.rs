//! JSON-file store.
//!
//! The whole dataset lives in one JSON document. Every read loads it, every
//! write loads, mutates and rewrites it through a temp file. All file I/O uses
//! `tokio::fs`.

use super::{Dataset, DatasetBackend};
use crate::error::StoreError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

pub struct FileStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    /// Open a store at `path`. The file need not exist until first use.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    /// Create the file with `dataset` if nothing is there yet.
    pub async fn init(path: impl Into<PathBuf>, dataset: &Dataset) -> Result<Self, StoreError> {
        let store = Self::open(path);
        if !fs::try_exists(&store.path).await? {
            store.save(dataset).await?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Dataset, StoreError> {
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    StoreError::Unavailable(format!("{}: {}", self.path.display(), e))
                }
                _ => StoreError::Io(e),
            })?;

        let dataset: Dataset = serde_json::from_str(&content)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", self.path.display(), e)))?;
        dataset.validate()?;

        debug!("Loaded dataset from {}", self.path.display());
        Ok(dataset)
    }

    async fn save(&self, dataset: &Dataset) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(dataset)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DatasetBackend for FileStore {
    async fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Dataset) -> T + Send,
        T: Send,
    {
        let _guard = self.lock.read().await;
        let dataset = self.load().await?;
        Ok(f(&dataset))
    }

    async fn write<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Dataset) -> Result<(), StoreError> + Send,
    {
        let _guard = self.lock.write().await;
        let mut dataset = self.load().await?;
        f(&mut dataset)?;
        self.save(&dataset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AiSystem, RiskLevel, SystemStatus};
    use crate::store::ComplianceStore;
    use chrono::Utc;
    use std::fs;
    use tempfile::TempDir;

    fn system(id: &str) -> AiSystem {
        AiSystem {
            id: id.to_string(),
            organization_id: "org".to_string(),
            name: "Triage bot".to_string(),
            description: String::new(),
            risk_level: RiskLevel::High,
            status: SystemStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("absent.json"));
        assert!(matches!(
            store.systems(None).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_write_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        let store = FileStore::init(&path, &Dataset::default()).await.unwrap();
        store.insert_system(system("s1")).await.unwrap();

        let reopened = FileStore::open(&path);
        let systems = reopened.systems(Some("org")).await.unwrap();
        assert_eq!(systems.len(), 1);
        assert_eq!(systems[0].id, "s1");
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "{ not json").unwrap();
        let store = FileStore::open(&path);
        assert!(matches!(store.courses().await, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        let store = FileStore::init(&path, &Dataset::default()).await.unwrap();
        store.insert_system(system("s1")).await.unwrap();
        let before = fs::read_to_string(&path).unwrap();

        assert!(store.insert_system(system("s1")).await.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_writes_are_serialized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        let store = FileStore::init(&path, &Dataset::default()).await.unwrap();

        let (a, b) = tokio::join!(
            store.insert_system(system("s1")),
            store.insert_system(system("s2"))
        );
        a.unwrap();
        b.unwrap();

        let systems = FileStore::open(&path).systems(None).await.unwrap();
        assert_eq!(systems.len(), 2);
    }
}
