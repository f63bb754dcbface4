//! In-memory store.

use super::{Dataset, DatasetBackend};
use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::RwLock;

/// Dataset held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Dataset>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing data. Rejects invalid datasets.
    pub fn with_dataset(dataset: Dataset) -> Result<Self, StoreError> {
        dataset.validate()?;
        Ok(Self {
            data: RwLock::new(dataset),
        })
    }
}

#[async_trait]
impl DatasetBackend for MemoryStore {
    async fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Dataset) -> T + Send,
        T: Send,
    {
        let data = self
            .data
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
        Ok(f(&data))
    }

    async fn write<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Dataset) -> Result<(), StoreError> + Send,
    {
        let mut data = self
            .data
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
        f(&mut data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregator::tests::assessment_at;
    use crate::models::{
        AiSystem, AssessmentStatus, Framework, RiskLevel, SystemStatus,
    };
    use crate::recommend::InteractionRecord;
    use crate::store::{AssessmentFilter, ComplianceStore};
    use chrono::Utc;

    fn system(id: &str, org: &str) -> AiSystem {
        AiSystem {
            id: id.to_string(),
            organization_id: org.to_string(),
            name: format!("System {}", id),
            description: String::new(),
            risk_level: RiskLevel::Limited,
            status: SystemStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_assessments_scoped_to_organization() {
        let store = MemoryStore::new();
        store.insert_system(system("a", "org-1")).await.unwrap();
        store.insert_system(system("b", "org-2")).await.unwrap();
        store
            .insert_assessment(assessment_at("a", Framework::EuAiAct, 80.0, AssessmentStatus::Completed, 1))
            .await
            .unwrap();
        store
            .insert_assessment(assessment_at("b", Framework::EuAiAct, 20.0, AssessmentStatus::Failed, 1))
            .await
            .unwrap();

        let filter = AssessmentFilter {
            organization_id: Some("org-1".to_string()),
            ..Default::default()
        };
        let found = store.assessments(&filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].system_id, "a");
    }

    #[tokio::test]
    async fn test_rejects_out_of_range_score() {
        let store = MemoryStore::new();
        store.insert_system(system("a", "org")).await.unwrap();
        let result = store
            .insert_assessment(assessment_at("a", Framework::Tc260, 101.0, AssessmentStatus::Completed, 0))
            .await;
        assert!(matches!(result, Err(StoreError::Constraint(_))));
        assert!(store.assessments(&AssessmentFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_unknown_system_and_duplicates() {
        let store = MemoryStore::new();
        let orphan = store
            .insert_assessment(assessment_at("ghost", Framework::Tc260, 50.0, AssessmentStatus::Completed, 0))
            .await;
        assert!(orphan.is_err());

        store.insert_system(system("a", "org")).await.unwrap();
        assert!(store.insert_system(system("a", "org")).await.is_err());
    }

    #[tokio::test]
    async fn test_upsert_interaction_replaces() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut record = InteractionRecord::new("u1", "rec-1", now);
        store.upsert_interaction(record.clone()).await.unwrap();

        record.dismissed_at = Some(now);
        store.upsert_interaction(record).await.unwrap();

        let stored = store.interactions("u1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].dismissed_at.is_some());
        assert!(store.interactions("u2").await.unwrap().is_empty());
    }

    #[test]
    fn test_with_dataset_validates() {
        let mut dataset = Dataset::default();
        dataset.systems.push(system("a", "org"));
        dataset
            .assessments
            .push(assessment_at("a", Framework::EuAiAct, -3.0, AssessmentStatus::Failed, 0));
        assert!(matches!(
            MemoryStore::with_dataset(dataset),
            Err(StoreError::Corrupt(_))
        ));
    }
}
