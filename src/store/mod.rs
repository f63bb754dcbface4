//! Persistence boundary.
//!
//! Services talk to a `ComplianceStore`. The two shipped backends keep the
//! whole `Dataset` in one place (memory or a JSON file) and share their
//! query logic through `DatasetBackend`.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::council::CouncilSession;
use crate::error::StoreError;
use crate::models::{
    validate_score, AiSystem, Assessment, Course, Enrollment, Framework, Incident,
};
use crate::recommend::{CategoryWeights, InteractionRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `general.data_file` value that selects an empty in-process store.
pub const IN_MEMORY: &str = ":memory:";

/// Assessment query.
#[derive(Debug, Clone, Default)]
pub struct AssessmentFilter {
    pub organization_id: Option<String>,
    pub system_id: Option<String>,
    pub framework: Option<Framework>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Everything the platform persists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default)]
    pub systems: Vec<AiSystem>,
    #[serde(default)]
    pub assessments: Vec<Assessment>,
    #[serde(default)]
    pub incidents: Vec<Incident>,
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub enrollments: Vec<Enrollment>,
    #[serde(default)]
    pub council_sessions: Vec<CouncilSession>,
    #[serde(default)]
    pub interactions: Vec<InteractionRecord>,
    #[serde(default)]
    pub weights: Vec<CategoryWeights>,
}

impl Dataset {
    /// Check invariants that must hold for loaded data.
    pub fn validate(&self) -> Result<(), StoreError> {
        for assessment in &self.assessments {
            validate_score(assessment.score).map_err(|_| {
                StoreError::Corrupt(format!(
                    "assessment {} has score {} outside [0, 100]",
                    assessment.id, assessment.score
                ))
            })?;
        }
        for enrollment in &self.enrollments {
            if enrollment.progress > 100 {
                return Err(StoreError::Corrupt(format!(
                    "enrollment of {} in {} has progress {}",
                    enrollment.user_id, enrollment.course_id, enrollment.progress
                )));
            }
        }
        Ok(())
    }

    fn system_ids_in(&self, organization_id: &str) -> Vec<&str> {
        self.systems
            .iter()
            .filter(|s| s.organization_id == organization_id)
            .map(|s| s.id.as_str())
            .collect()
    }

    pub fn systems_in(&self, organization_id: Option<&str>) -> Vec<AiSystem> {
        self.systems
            .iter()
            .filter(|s| organization_id.map_or(true, |org| s.organization_id == org))
            .cloned()
            .collect()
    }

    pub fn assessments_matching(&self, filter: &AssessmentFilter) -> Vec<Assessment> {
        let org_systems = filter
            .organization_id
            .as_deref()
            .map(|org| self.system_ids_in(org));

        self.assessments
            .iter()
            .filter(|a| {
                org_systems
                    .as_ref()
                    .map_or(true, |ids| ids.contains(&a.system_id.as_str()))
                    && filter.system_id.as_ref().map_or(true, |id| &a.system_id == id)
                    && filter.framework.map_or(true, |f| a.framework == f)
                    && filter.since.map_or(true, |t| a.assessed_at >= t)
                    && filter.until.map_or(true, |t| a.assessed_at <= t)
            })
            .cloned()
            .collect()
    }

    pub fn incidents_in(&self, organization_id: Option<&str>) -> Vec<Incident> {
        self.incidents
            .iter()
            .filter(|i| {
                organization_id.map_or(true, |org| i.organization_id.as_deref() == Some(org))
            })
            .cloned()
            .collect()
    }

    pub fn sessions_for(&self, incident_id: Option<&str>) -> Vec<CouncilSession> {
        self.council_sessions
            .iter()
            .filter(|s| incident_id.map_or(true, |id| s.incident_id == id))
            .cloned()
            .collect()
    }

    pub fn insert_assessment(&mut self, assessment: Assessment) -> Result<(), StoreError> {
        validate_score(assessment.score)
            .map_err(|e| StoreError::Constraint(e.to_string()))?;
        if !self.systems.iter().any(|s| s.id == assessment.system_id) {
            return Err(StoreError::Constraint(format!(
                "assessment references unknown system {}",
                assessment.system_id
            )));
        }
        self.assessments.push(assessment);
        Ok(())
    }

    pub fn insert_system(&mut self, system: AiSystem) -> Result<(), StoreError> {
        if self.systems.iter().any(|s| s.id == system.id) {
            return Err(StoreError::Constraint(format!(
                "system {} already exists",
                system.id
            )));
        }
        self.systems.push(system);
        Ok(())
    }

    pub fn update_system(&mut self, system: AiSystem) -> Result<(), StoreError> {
        let slot = self
            .systems
            .iter_mut()
            .find(|s| s.id == system.id)
            .ok_or_else(|| StoreError::Constraint(format!("system {} does not exist", system.id)))?;
        *slot = system;
        Ok(())
    }

    pub fn upsert_interaction(&mut self, record: InteractionRecord) {
        match self.interactions.iter_mut().find(|r| {
            r.user_id == record.user_id && r.recommendation_id == record.recommendation_id
        }) {
            Some(existing) => *existing = record,
            None => self.interactions.push(record),
        }
    }

    pub fn put_weights(&mut self, weights: CategoryWeights) {
        match self.weights.iter_mut().find(|w| w.user_id == weights.user_id) {
            Some(existing) => *existing = weights,
            None => self.weights.push(weights),
        }
    }
}

/// Storage interface consumed by the service layer.
#[async_trait]
pub trait ComplianceStore: Send + Sync {
    async fn systems(&self, organization_id: Option<&str>) -> Result<Vec<AiSystem>, StoreError>;
    async fn system(&self, id: &str) -> Result<Option<AiSystem>, StoreError>;
    async fn assessments(&self, filter: &AssessmentFilter) -> Result<Vec<Assessment>, StoreError>;
    async fn incidents(&self, organization_id: Option<&str>) -> Result<Vec<Incident>, StoreError>;
    async fn incident(&self, id: &str) -> Result<Option<Incident>, StoreError>;
    async fn courses(&self) -> Result<Vec<Course>, StoreError>;
    async fn enrollments(&self, course_id: Option<&str>) -> Result<Vec<Enrollment>, StoreError>;
    async fn council_sessions(
        &self,
        incident_id: Option<&str>,
    ) -> Result<Vec<CouncilSession>, StoreError>;
    async fn council_session(&self, id: &str) -> Result<Option<CouncilSession>, StoreError>;
    async fn interactions(&self, user_id: &str) -> Result<Vec<InteractionRecord>, StoreError>;
    async fn weights(&self, user_id: &str) -> Result<Option<CategoryWeights>, StoreError>;

    async fn insert_system(&self, system: AiSystem) -> Result<(), StoreError>;
    async fn update_system(&self, system: AiSystem) -> Result<(), StoreError>;
    async fn insert_assessment(&self, assessment: Assessment) -> Result<(), StoreError>;
    async fn upsert_interaction(&self, record: InteractionRecord) -> Result<(), StoreError>;
    async fn put_weights(&self, weights: CategoryWeights) -> Result<(), StoreError>;
    async fn insert_council_session(&self, session: CouncilSession) -> Result<(), StoreError>;
}

/// A backend that can lend out the dataset for reading and mutation.
#[async_trait]
pub trait DatasetBackend: Send + Sync {
    async fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Dataset) -> T + Send,
        T: Send;

    async fn write<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Dataset) -> Result<(), StoreError> + Send;
}

#[async_trait]
impl<B: DatasetBackend> ComplianceStore for B {
    async fn systems(&self, organization_id: Option<&str>) -> Result<Vec<AiSystem>, StoreError> {
        self.read(|d| d.systems_in(organization_id)).await
    }

    async fn system(&self, id: &str) -> Result<Option<AiSystem>, StoreError> {
        self.read(|d| d.systems.iter().find(|s| s.id == id).cloned()).await
    }

    async fn assessments(&self, filter: &AssessmentFilter) -> Result<Vec<Assessment>, StoreError> {
        self.read(|d| d.assessments_matching(filter)).await
    }

    async fn incidents(&self, organization_id: Option<&str>) -> Result<Vec<Incident>, StoreError> {
        self.read(|d| d.incidents_in(organization_id)).await
    }

    async fn incident(&self, id: &str) -> Result<Option<Incident>, StoreError> {
        self.read(|d| d.incidents.iter().find(|i| i.id == id).cloned()).await
    }

    async fn courses(&self) -> Result<Vec<Course>, StoreError> {
        self.read(|d| d.courses.clone()).await
    }

    async fn enrollments(&self, course_id: Option<&str>) -> Result<Vec<Enrollment>, StoreError> {
        self.read(|d| {
            d.enrollments
                .iter()
                .filter(|e| course_id.map_or(true, |id| e.course_id == id))
                .cloned()
                .collect()
        })
        .await
    }

    async fn council_sessions(
        &self,
        incident_id: Option<&str>,
    ) -> Result<Vec<CouncilSession>, StoreError> {
        self.read(|d| d.sessions_for(incident_id)).await
    }

    async fn council_session(&self, id: &str) -> Result<Option<CouncilSession>, StoreError> {
        self.read(|d| d.council_sessions.iter().find(|s| s.id == id).cloned()).await
    }

    async fn interactions(&self, user_id: &str) -> Result<Vec<InteractionRecord>, StoreError> {
        self.read(|d| {
            d.interactions
                .iter()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect()
        })
        .await
    }

    async fn weights(&self, user_id: &str) -> Result<Option<CategoryWeights>, StoreError> {
        self.read(|d| d.weights.iter().find(|w| w.user_id == user_id).cloned()).await
    }

    async fn insert_system(&self, system: AiSystem) -> Result<(), StoreError> {
        self.write(|d| d.insert_system(system)).await
    }

    async fn update_system(&self, system: AiSystem) -> Result<(), StoreError> {
        self.write(|d| d.update_system(system)).await
    }

    async fn insert_assessment(&self, assessment: Assessment) -> Result<(), StoreError> {
        self.write(|d| d.insert_assessment(assessment)).await
    }

    async fn upsert_interaction(&self, record: InteractionRecord) -> Result<(), StoreError> {
        self.write(|d| {
            d.upsert_interaction(record);
            Ok(())
        })
        .await
    }

    async fn put_weights(&self, weights: CategoryWeights) -> Result<(), StoreError> {
        self.write(|d| {
            d.put_weights(weights);
            Ok(())
        })
        .await
    }

    async fn insert_council_session(&self, session: CouncilSession) -> Result<(), StoreError> {
        self.write(|d| {
            d.council_sessions.push(session);
            Ok(())
        })
        .await
    }
}
