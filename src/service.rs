//! Procedure implementations.
//!
//! Every procedure takes the caller context first. User-scoped procedures
//! reject anonymous callers, validate input before touching the store, and
//! record an audit entry after each successful mutation.
//!
//! Reads and writes treat an unreachable store differently: reads log a
//! warning and return empty results, writes fail with
//! `ServiceError::DatabaseUnavailable`.

use crate::analysis::{
    compare_frameworks, compute_metrics, predict_scores, FrameworkComparison, MetricsSnapshot,
    ScorePrediction, TrendSettings,
};
use crate::audit::{AuditEntry, AuditFilter, AuditLog};
use crate::catalog::{Catalog, ComplianceGap, IncidentPattern};
use crate::council::{Council, CouncilSession};
use crate::error::{ensure_range, ServiceError, StoreError};
use crate::models::{
    validate_score, AiSystem, Assessment, AssessmentStatus, Caller, Framework, RiskLevel,
    SystemStatus, User,
};
use crate::recommend::{
    apply_action, engine, generate, public_recommendations, select, validate_weights, Category,
    CategoryWeights, InteractionAction, InteractionRecord, OrgData, Recommendation,
    RecommendationQuery,
};
use crate::report::{build_report, Report, ReportFilters, ReportInputs, ReportPeriod, ReportTemplate};
use crate::store::{AssessmentFilter, ComplianceStore};
use crate::training::{completion_rates, CompletionRate};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const MIN_PREDICTION_DAYS: i64 = 7;
pub const MAX_PREDICTION_DAYS: i64 = 365;
pub const MAX_RECOMMENDATION_LIMIT: usize = 50;
pub const MAX_AUDIT_LIMIT: usize = 1000;
pub const MAX_NAME_LEN: usize = 200;
pub const MAX_ARCHIVE_DAYS: i64 = 3650;

/// Tunables the service reads from configuration.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub trend: TrendSettings,
    pub default_prediction_days: i64,
    pub default_limit: usize,
    pub public_limit: usize,
    pub default_audit_limit: usize,
    /// Per-template section overrides keyed by template key.
    pub report_sections: HashMap<String, Vec<String>>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            trend: TrendSettings::default(),
            default_prediction_days: 30,
            default_limit: 10,
            public_limit: 5,
            default_audit_limit: 100,
            report_sections: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsQuery {
    pub framework: Option<Framework>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewSystem {
    pub name: String,
    pub description: String,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone)]
pub struct NewAssessment {
    pub system_id: String,
    pub framework: Framework,
    pub score: f64,
    pub status: AssessmentStatus,
}

#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub template: ReportTemplate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub framework: Option<Framework>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub user: Option<String>,
    pub action: Option<String>,
    pub resource: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// An incident pattern with its occurrence count in the caller's organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternOccurrence {
    #[serde(flatten)]
    pub pattern: IncidentPattern,
    pub occurrences: usize,
}

/// Turn an unavailable store into `None` on the read path.
fn degrade<T>(result: Result<T, StoreError>, what: &str) -> Result<Option<T>, ServiceError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(StoreError::Unavailable(msg)) => {
            warn!("{} unavailable, returning empty result: {}", what, msg);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn validate_limit(limit: usize, max: usize) -> Result<usize, ServiceError> {
    ensure_range("limit", limit, 1, max)?;
    Ok(limit)
}

/// Organization data loaded for recommendation and report generation.
struct OrgSnapshot {
    systems: Vec<AiSystem>,
    assessments: Vec<Assessment>,
    incidents: Vec<crate::models::Incident>,
    sessions: Vec<CouncilSession>,
}

pub struct ComplianceService {
    store: Arc<dyn ComplianceStore>,
    audit: Arc<dyn AuditLog>,
    catalog: Arc<Catalog>,
    council: Council,
    settings: ServiceSettings,
}

impl ComplianceService {
    pub fn new(
        store: Arc<dyn ComplianceStore>,
        audit: Arc<dyn AuditLog>,
        catalog: Arc<Catalog>,
        council: Council,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            store,
            audit,
            catalog,
            council,
            settings,
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    async fn record(
        &self,
        user: &User,
        action: &str,
        resource: &str,
        resource_id: &str,
        changes: serde_json::Value,
    ) -> Result<(), ServiceError> {
        self.audit
            .log_event(AuditEntry::new(
                user.id.clone(),
                Some(user.organization_id.clone()),
                action,
                resource,
                resource_id,
                changes,
            ))
            .await?;
        Ok(())
    }

    async fn org_snapshot(&self, user: &User) -> Result<OrgSnapshot, ServiceError> {
        let org = user.organization_id.as_str();

        let systems = degrade(self.store.systems(Some(org)).await, "systems")?.unwrap_or_default();
        let filter = AssessmentFilter {
            organization_id: Some(org.to_string()),
            ..Default::default()
        };
        let assessments =
            degrade(self.store.assessments(&filter).await, "assessments")?.unwrap_or_default();
        let incidents =
            degrade(self.store.incidents(Some(org)).await, "incidents")?.unwrap_or_default();

        let system_ids: HashSet<&str> = systems.iter().map(|s| s.id.as_str()).collect();
        let sessions = degrade(self.store.council_sessions(None).await, "council sessions")?
            .unwrap_or_default()
            .into_iter()
            .filter(|s| {
                s.system_id
                    .as_deref()
                    .map_or(false, |id| system_ids.contains(id))
            })
            .collect();

        Ok(OrgSnapshot {
            systems,
            assessments,
            incidents,
            sessions,
        })
    }

    async fn user_weights(&self, user: &User) -> Result<CategoryWeights, ServiceError> {
        Ok(degrade(self.store.weights(&user.id).await, "weights")?
            .flatten()
            .unwrap_or_else(|| CategoryWeights {
                user_id: user.id.clone(),
                weights: BTreeMap::new(),
            }))
    }

    fn org_recommendations(&self, snapshot: &OrgSnapshot, now: DateTime<Utc>) -> Vec<Recommendation> {
        generate(&OrgData {
            systems: &snapshot.systems,
            assessments: &snapshot.assessments,
            incidents: &snapshot.incidents,
            sessions: &snapshot.sessions,
            catalog: &self.catalog,
            trend: self.settings.trend,
            now,
        })
    }

    // ---- analytics ----

    pub async fn get_metrics_snapshot(
        &self,
        caller: &Caller,
        query: MetricsQuery,
    ) -> Result<MetricsSnapshot, ServiceError> {
        let user = caller.require_user()?;
        let filter = AssessmentFilter {
            organization_id: Some(user.organization_id.clone()),
            framework: query.framework,
            since: query.since,
            until: query.until,
            ..Default::default()
        };
        let assessments =
            degrade(self.store.assessments(&filter).await, "assessments")?.unwrap_or_default();
        Ok(compute_metrics(&assessments, self.settings.trend))
    }

    pub async fn get_framework_comparison(
        &self,
        caller: &Caller,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<FrameworkComparison>, ServiceError> {
        let user = caller.require_user()?;
        let filter = AssessmentFilter {
            organization_id: Some(user.organization_id.clone()),
            since,
            until,
            ..Default::default()
        };
        let assessments =
            degrade(self.store.assessments(&filter).await, "assessments")?.unwrap_or_default();
        let mut rows = compare_frameworks(&assessments);
        self.catalog.label_frameworks(&mut rows);
        Ok(rows)
    }

    /// Catalog gaps. Static reference data, so no caller is required.
    pub fn get_compliance_gaps(&self, framework: Option<Framework>) -> Vec<ComplianceGap> {
        self.catalog
            .gaps_for(framework)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn get_incident_patterns(
        &self,
        caller: &Caller,
    ) -> Result<Vec<PatternOccurrence>, ServiceError> {
        let user = caller.require_user()?;
        let incidents = degrade(
            self.store.incidents(Some(&user.organization_id)).await,
            "incidents",
        )?
        .unwrap_or_default();

        let mut patterns: Vec<PatternOccurrence> = self
            .catalog
            .incident_patterns
            .iter()
            .map(|p| PatternOccurrence {
                occurrences: incidents
                    .iter()
                    .filter(|i| i.category.eq_ignore_ascii_case(&p.category))
                    .count(),
                pattern: p.clone(),
            })
            .collect();
        patterns.sort_by(|a, b| {
            b.occurrences
                .cmp(&a.occurrences)
                .then_with(|| b.pattern.severity.cmp(&a.pattern.severity))
                .then_with(|| a.pattern.id.cmp(&b.pattern.id))
        });
        Ok(patterns)
    }

    pub async fn get_predictions(
        &self,
        caller: &Caller,
        system_id: &str,
        days_ahead: i64,
    ) -> Result<Vec<ScorePrediction>, ServiceError> {
        let user = caller.require_user()?;
        ensure_range("daysAhead", days_ahead, MIN_PREDICTION_DAYS, MAX_PREDICTION_DAYS)?;

        let Some(system) = degrade(self.store.system(system_id).await, "systems")? else {
            return Ok(Vec::new());
        };
        match system {
            Some(s) if s.organization_id == user.organization_id => {}
            _ => return Err(ServiceError::not_found("system", system_id)),
        }

        let filter = AssessmentFilter {
            system_id: Some(system_id.to_string()),
            ..Default::default()
        };
        let history =
            degrade(self.store.assessments(&filter).await, "assessments")?.unwrap_or_default();
        Ok(predict_scores(system_id, &history, days_ahead))
    }

    // ---- recommendations ----

    pub async fn get_recommendations(
        &self,
        caller: &Caller,
        mut query: RecommendationQuery,
    ) -> Result<Vec<Recommendation>, ServiceError> {
        let user = caller.require_user()?;
        query.limit = validate_limit(query.limit, MAX_RECOMMENDATION_LIMIT)?;

        let now = Utc::now();
        let snapshot = self.org_snapshot(user).await?;
        let recs = self.org_recommendations(&snapshot, now);
        let interactions =
            degrade(self.store.interactions(&user.id).await, "interactions")?.unwrap_or_default();
        let weights = self.user_weights(user).await?;

        debug!(
            "Generated {} recommendations for {} before filtering",
            recs.len(),
            user.id
        );

        Ok(select(recs, &query, &interactions, &weights, now))
    }

    /// Incident-prevention advice for anonymous visitors.
    pub async fn get_public_recommendations(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<Recommendation>, ServiceError> {
        let limit = validate_limit(
            limit.unwrap_or(self.settings.public_limit),
            MAX_RECOMMENDATION_LIMIT,
        )?;
        let incidents = degrade(self.store.incidents(None).await, "incidents")?.unwrap_or_default();
        Ok(public_recommendations(&self.catalog, &incidents, limit))
    }

    async fn interact(
        &self,
        caller: &Caller,
        recommendation_id: &str,
        action: InteractionAction,
    ) -> Result<InteractionRecord, ServiceError> {
        let user = caller.require_user()?;
        action.validate()?;

        let existing = self
            .store
            .interactions(&user.id)
            .await?
            .into_iter()
            .find(|r| r.recommendation_id == recommendation_id);

        let record = apply_action(existing, &user.id, recommendation_id, &action, Utc::now())?;
        self.store.upsert_interaction(record.clone()).await?;

        let changes = match &action {
            InteractionAction::Snooze { days } => json!({ "snoozeDays": days }),
            InteractionAction::Feedback { feedback, comment } => {
                json!({ "feedback": feedback, "comment": comment })
            }
            _ => json!({}),
        };
        self.record(user, action.name(), "recommendation", recommendation_id, changes)
            .await?;

        info!("{} {} by {}", action.name(), recommendation_id, user.id);
        Ok(record)
    }

    pub async fn mark_viewed(
        &self,
        caller: &Caller,
        recommendation_id: &str,
    ) -> Result<InteractionRecord, ServiceError> {
        self.interact(caller, recommendation_id, InteractionAction::View)
            .await
    }

    pub async fn dismiss(
        &self,
        caller: &Caller,
        recommendation_id: &str,
    ) -> Result<InteractionRecord, ServiceError> {
        self.interact(caller, recommendation_id, InteractionAction::Dismiss)
            .await
    }

    pub async fn snooze(
        &self,
        caller: &Caller,
        recommendation_id: &str,
        days: i64,
    ) -> Result<InteractionRecord, ServiceError> {
        self.interact(caller, recommendation_id, InteractionAction::Snooze { days })
            .await
    }

    pub async fn submit_feedback(
        &self,
        caller: &Caller,
        recommendation_id: &str,
        feedback: crate::recommend::Feedback,
        comment: Option<String>,
    ) -> Result<InteractionRecord, ServiceError> {
        self.interact(
            caller,
            recommendation_id,
            InteractionAction::Feedback { feedback, comment },
        )
        .await
    }

    /// Merge `weights` into the caller's stored weights.
    pub async fn update_weights(
        &self,
        caller: &Caller,
        weights: BTreeMap<Category, i64>,
    ) -> Result<BTreeMap<Category, u8>, ServiceError> {
        let user = caller.require_user()?;
        let validated = validate_weights(&weights)?;

        let mut stored = self
            .store
            .weights(&user.id)
            .await?
            .unwrap_or_else(|| CategoryWeights {
                user_id: user.id.clone(),
                weights: BTreeMap::new(),
            });
        stored.weights.extend(validated.iter().map(|(c, w)| (*c, *w)));
        self.store.put_weights(stored.clone()).await?;

        self.record(
            user,
            "recommendation.weights_updated",
            "weights",
            &user.id,
            json!(validated),
        )
        .await?;

        Ok(stored.resolved())
    }

    pub async fn get_weights(&self, caller: &Caller) -> Result<BTreeMap<Category, u8>, ServiceError> {
        let user = caller.require_user()?;
        Ok(self.user_weights(user).await?.resolved())
    }

    // ---- systems ----

    pub async fn register_system(
        &self,
        caller: &Caller,
        input: NewSystem,
    ) -> Result<AiSystem, ServiceError> {
        let user = caller.require_user()?;
        let name = input.name.trim();
        if name.is_empty() {
            return Err(ServiceError::Validation("name must not be empty".to_string()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(ServiceError::Validation(format!(
                "name must be at most {} characters",
                MAX_NAME_LEN
            )));
        }

        let system = AiSystem {
            id: Uuid::new_v4().to_string(),
            organization_id: user.organization_id.clone(),
            name: name.to_string(),
            description: input.description,
            risk_level: input.risk_level,
            status: SystemStatus::Active,
            created_at: Utc::now(),
        };
        self.store.insert_system(system.clone()).await?;

        self.record(
            user,
            "system.registered",
            "system",
            &system.id,
            json!({ "name": system.name, "riskLevel": system.risk_level }),
        )
        .await?;

        info!("Registered system {} ({})", system.name, system.id);
        Ok(system)
    }

    async fn owned_system(&self, user: &User, system_id: &str) -> Result<AiSystem, ServiceError> {
        match self.store.system(system_id).await? {
            Some(system) if system.organization_id == user.organization_id => Ok(system),
            _ => Err(ServiceError::not_found("system", system_id)),
        }
    }

    /// Systems are never deleted; archiving hides them from recommendations.
    pub async fn archive_system(
        &self,
        caller: &Caller,
        system_id: &str,
    ) -> Result<AiSystem, ServiceError> {
        let user = caller.require_user()?;
        let mut system = self.owned_system(user, system_id).await?;
        if system.status == SystemStatus::Archived {
            return Ok(system);
        }

        let previous = system.status;
        system.status = SystemStatus::Archived;
        self.store.update_system(system.clone()).await?;

        self.record(
            user,
            "system.archived",
            "system",
            system_id,
            json!({ "status": { "from": previous, "to": system.status } }),
        )
        .await?;
        Ok(system)
    }

    pub async fn record_assessment(
        &self,
        caller: &Caller,
        input: NewAssessment,
    ) -> Result<Assessment, ServiceError> {
        let user = caller.require_user()?;
        validate_score(input.score)?;

        let system = self.owned_system(user, &input.system_id).await?;
        if system.status == SystemStatus::Archived {
            return Err(ServiceError::Validation(format!(
                "system {} is archived",
                system.id
            )));
        }

        let assessment = Assessment {
            id: Uuid::new_v4().to_string(),
            system_id: input.system_id,
            framework: input.framework,
            score: input.score,
            status: input.status,
            assessed_at: Utc::now(),
        };
        self.store.insert_assessment(assessment.clone()).await?;

        self.record(
            user,
            "assessment.recorded",
            "assessment",
            &assessment.id,
            json!({
                "systemId": assessment.system_id,
                "framework": assessment.framework,
                "score": assessment.score,
                "status": assessment.status,
            }),
        )
        .await?;
        Ok(assessment)
    }

    // ---- council ----

    pub async fn convene_council(
        &self,
        caller: &Caller,
        incident_id: &str,
    ) -> Result<CouncilSession, ServiceError> {
        let user = caller.require_user()?;
        let incident = match self.store.incident(incident_id).await? {
            Some(i) if i.organization_id.as_deref() == Some(user.organization_id.as_str()) => i,
            _ => return Err(ServiceError::not_found("incident", incident_id)),
        };

        let session = self.council.deliberate(&incident).await;
        self.store.insert_council_session(session.clone()).await?;

        self.record(
            user,
            "council.convened",
            "council_session",
            &session.id,
            json!({
                "incidentId": incident.id,
                "outcome": session.decision.as_ref().map(|d| d.outcome),
                "agents": session.votes.len(),
            }),
        )
        .await?;
        Ok(session)
    }

    pub async fn get_council_session(
        &self,
        caller: &Caller,
        session_id: &str,
    ) -> Result<Option<CouncilSession>, ServiceError> {
        let user = caller.require_user()?;
        let Some(found) = degrade(self.store.council_session(session_id).await, "council sessions")?
        else {
            return Ok(None);
        };
        let Some(session) = found else {
            return Err(ServiceError::not_found("council session", session_id));
        };

        let incident = degrade(self.store.incident(&session.incident_id).await, "incidents")?
            .flatten();
        match incident {
            Some(i) if i.organization_id.as_deref() == Some(user.organization_id.as_str()) => {
                Ok(Some(session))
            }
            _ => Err(ServiceError::not_found("council session", session_id)),
        }
    }

    // ---- training ----

    pub async fn get_completion_rates(
        &self,
        caller: &Caller,
        course_id: Option<&str>,
    ) -> Result<Vec<CompletionRate>, ServiceError> {
        caller.require_user()?;

        let Some(courses) = degrade(self.store.courses().await, "courses")? else {
            return Ok(Vec::new());
        };
        let courses: Vec<_> = match course_id {
            Some(id) => {
                let course = courses
                    .into_iter()
                    .find(|c| c.id == id)
                    .ok_or_else(|| ServiceError::not_found("course", id))?;
                vec![course]
            }
            None => courses,
        };

        let enrollments =
            degrade(self.store.enrollments(course_id).await, "enrollments")?.unwrap_or_default();
        Ok(completion_rates(&courses, &enrollments))
    }

    // ---- reports ----

    pub async fn generate_report(
        &self,
        caller: &Caller,
        request: ReportRequest,
    ) -> Result<Report, ServiceError> {
        let user = caller.require_user()?;
        if request.start > request.end {
            return Err(ServiceError::Validation(
                "startDate must not be after endDate".to_string(),
            ));
        }

        let now = Utc::now();
        let snapshot = self.org_snapshot(user).await?;
        let mut recs = self.org_recommendations(&snapshot, now);
        engine::rank(&mut recs, &self.user_weights(user).await?);

        let inputs = ReportInputs {
            systems: &snapshot.systems,
            assessments: &snapshot.assessments,
            incidents: &snapshot.incidents,
            recommendations: &recs,
            catalog: &self.catalog,
            trend: self.settings.trend,
        };
        let overrides = self
            .settings
            .report_sections
            .get(request.template.key())
            .map(Vec::as_slice);

        let report = build_report(
            request.template,
            ReportPeriod {
                start: request.start,
                end: request.end,
            },
            ReportFilters {
                framework: request.framework,
            },
            overrides,
            &inputs,
            now,
        );

        info!(
            "Generated {} report with {} sections for {}",
            report.template,
            report.sections.len(),
            user.organization_id
        );
        Ok(report)
    }

    // ---- audit ----

    /// Audit entries for the caller's organization, newest first.
    pub async fn get_audit_logs(
        &self,
        caller: &Caller,
        query: AuditQuery,
    ) -> Result<Vec<AuditEntry>, ServiceError> {
        let user = caller.require_user()?;
        let limit = validate_limit(
            query.limit.unwrap_or(self.settings.default_audit_limit),
            MAX_AUDIT_LIMIT,
        )?;

        let filter = AuditFilter {
            user: query.user,
            organization_id: Some(user.organization_id.clone()),
            action: query.action,
            resource: query.resource,
            since: query.since,
            until: query.until,
            limit: Some(limit),
        };
        Ok(self.audit.get_logs(&filter).await?)
    }

    /// Move the caller's organization's entries older than `days` out of
    /// the live log. Returns the count.
    pub async fn archive_audit_logs(&self, caller: &Caller, days: i64) -> Result<usize, ServiceError> {
        let user = caller.require_user()?;
        ensure_range("olderThanDays", days, 1, MAX_ARCHIVE_DAYS)?;

        let cutoff = Utc::now() - Duration::days(days);
        let archived = self
            .audit
            .archive_older(&user.organization_id, cutoff)
            .await?;

        self.record(
            user,
            "audit.archived",
            "audit_log",
            &user.organization_id,
            json!({ "olderThanDays": days, "archived": archived }),
        )
        .await?;

        info!(
            "Archived {} audit entries of {} older than {} days",
            archived, user.organization_id, days
        );
        Ok(archived)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::council::{roster, strategy_for, Outcome, RuleVoter, StrategyKind};
    use crate::models::{Incident, IncidentStatus, Severity};
    use crate::recommend::{Feedback, Priority};
    use crate::store::{FileStore, MemoryStore};
    use tokio_test::{assert_err, assert_ok};

    pub(crate) struct Fixture {
        pub service: ComplianceService,
        pub store: Arc<MemoryStore>,
        pub audit: Arc<MemoryAuditLog>,
    }

    fn council() -> Council {
        Council::new(
            roster(33),
            Arc::new(RuleVoter),
            strategy_for(StrategyKind::Majority, 2.0 / 3.0),
            8,
        )
    }

    pub(crate) fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let audit = Arc::new(MemoryAuditLog::default());
        let service = ComplianceService::new(
            store.clone(),
            audit.clone(),
            Arc::new(Catalog::builtin().unwrap()),
            council(),
            ServiceSettings::default(),
        );
        Fixture {
            service,
            store,
            audit,
        }
    }

    pub(crate) fn alice() -> Caller {
        Caller::user("alice", "org-a")
    }

    pub(crate) async fn register(service: &ComplianceService, risk_level: RiskLevel) -> AiSystem {
        service
            .register_system(
                &alice(),
                NewSystem {
                    name: "Resume screener".to_string(),
                    description: String::new(),
                    risk_level,
                },
            )
            .await
            .unwrap()
    }

    async fn assess(service: &ComplianceService, system_id: &str, score: f64, status: AssessmentStatus) {
        service
            .record_assessment(
                &alice(),
                NewAssessment {
                    system_id: system_id.to_string(),
                    framework: Framework::EuAiAct,
                    score,
                    status,
                },
            )
            .await
            .unwrap();
    }

    fn incident(id: &str, org: Option<&str>, system_id: Option<&str>, severity: Severity, category: &str) -> Incident {
        Incident {
            id: id.to_string(),
            organization_id: org.map(str::to_string),
            system_id: system_id.map(str::to_string),
            title: format!("Incident {}", id),
            severity,
            category: category.to_string(),
            reported_at: Utc::now(),
            status: IncidentStatus::Open,
        }
    }

    fn unavailable_service() -> ComplianceService {
        let dir = std::env::temp_dir().join(format!("complianceiq-missing-{}", Uuid::new_v4()));
        ComplianceService::new(
            Arc::new(FileStore::open(dir.join("data.json"))),
            Arc::new(MemoryAuditLog::default()),
            Arc::new(Catalog::builtin().unwrap()),
            council(),
            ServiceSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_anonymous_callers_are_rejected() {
        let fx = fixture();
        let anon = Caller::anonymous();

        assert!(matches!(
            fx.service.get_metrics_snapshot(&anon, MetricsQuery::default()).await,
            Err(ServiceError::Unauthenticated)
        ));
        assert!(matches!(
            fx.service.dismiss(&anon, "rec").await,
            Err(ServiceError::Unauthenticated)
        ));
        assert!(matches!(
            fx.service.update_weights(&anon, BTreeMap::new()).await,
            Err(ServiceError::Unauthenticated)
        ));
        assert_eq!(fx.audit.len().await, 0);
    }

    #[tokio::test]
    async fn test_metrics_end_to_end() {
        let fx = fixture();
        let system = register(&fx.service, RiskLevel::Limited).await;
        let scores = [85.0, 90.0, 40.0, 20.0, 35.0, 72.0, 65.0, 39.0, 100.0, 0.0, 55.0, 70.0];
        for (i, score) in scores.iter().enumerate() {
            let status = if i % 3 == 0 {
                AssessmentStatus::InProgress
            } else {
                AssessmentStatus::Completed
            };
            assess(&fx.service, &system.id, *score, status).await;
        }

        let snapshot = fx
            .service
            .get_metrics_snapshot(
                &alice(),
                MetricsQuery {
                    framework: Some(Framework::EuAiAct),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(snapshot.total_assessments, 12);
        assert_eq!(snapshot.high_risk_count, 4);
        assert_eq!(snapshot.medium_risk_count, 3);
        assert_eq!(snapshot.compliant_count, 8);
        assert_eq!(
            snapshot.high_risk_count + snapshot.medium_risk_count + snapshot.low_risk_count,
            12
        );

        let other_org = fx
            .service
            .get_metrics_snapshot(&Caller::user("bob", "org-b"), MetricsQuery::default())
            .await
            .unwrap();
        assert!(!other_org.has_data);
    }

    #[tokio::test]
    async fn test_reads_degrade_and_writes_fail_when_store_unavailable() {
        let service = unavailable_service();

        let snapshot = assert_ok!(
            service
                .get_metrics_snapshot(&alice(), MetricsQuery::default())
                .await
        );
        assert!(!snapshot.has_data);
        assert!(assert_ok!(
            service
                .get_recommendations(&alice(), RecommendationQuery::default())
                .await
        )
        .iter()
        .any(|r| r.id == "best-practice-register-systems"));

        let result = service
            .register_system(
                &alice(),
                NewSystem {
                    name: "Chatbot".to_string(),
                    description: String::new(),
                    risk_level: RiskLevel::Minimal,
                },
            )
            .await;
        assert!(matches!(result, Err(ServiceError::DatabaseUnavailable(_))));
        assert!(matches!(
            service.dismiss(&alice(), "rec").await,
            Err(ServiceError::DatabaseUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_validation_precedes_persistence() {
        let fx = fixture();
        let system = register(&fx.service, RiskLevel::Limited).await;
        let entries_before = fx.audit.len().await;

        assert!(matches!(
            fx.service.snooze(&alice(), "rec-1", 91).await,
            Err(ServiceError::Validation(_))
        ));
        let result = fx
            .service
            .record_assessment(
                &alice(),
                NewAssessment {
                    system_id: system.id.clone(),
                    framework: Framework::Tc260,
                    score: 100.5,
                    status: AssessmentStatus::Completed,
                },
            )
            .await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));

        let mut weights = BTreeMap::new();
        weights.insert(Category::BestPractice, 101);
        assert_err!(fx.service.update_weights(&alice(), weights).await);

        assert!(fx.store.interactions("alice").await.unwrap().is_empty());
        assert!(fx
            .store
            .assessments(&AssessmentFilter::default())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(fx.audit.len().await, entries_before);
    }

    #[tokio::test]
    async fn test_snooze_boundaries_accepted() {
        let fx = fixture();
        assert_ok!(fx.service.snooze(&alice(), "rec-1", 1).await);
        assert_ok!(fx.service.snooze(&alice(), "rec-2", 90).await);
        assert_err!(fx.service.snooze(&alice(), "rec-3", 0).await);
    }

    #[tokio::test]
    async fn test_dismissed_recommendations_are_hidden() {
        let fx = fixture();
        let system = register(&fx.service, RiskLevel::Limited).await;
        let target = format!("assess-{}", system.id);

        let recs = fx
            .service
            .get_recommendations(&alice(), RecommendationQuery::default())
            .await
            .unwrap();
        assert!(recs.iter().any(|r| r.id == target));

        fx.service.dismiss(&alice(), &target).await.unwrap();

        let recs = fx
            .service
            .get_recommendations(&alice(), RecommendationQuery::default())
            .await
            .unwrap();
        assert!(recs.iter().all(|r| r.id != target));

        let recs = fx
            .service
            .get_recommendations(
                &alice(),
                RecommendationQuery {
                    include_dismissed: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(recs.iter().any(|r| r.id == target));

        let logs = fx
            .service
            .get_audit_logs(
                &alice(),
                AuditQuery {
                    action: Some("recommendation.dismissed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].resource_id, target);
    }

    #[tokio::test]
    async fn test_recommendations_sorted_by_priority() {
        let fx = fixture();
        let failing = register(&fx.service, RiskLevel::High).await;
        assess(&fx.service, &failing.id, 20.0, AssessmentStatus::Failed).await;
        let medium = register(&fx.service, RiskLevel::Limited).await;
        assess(&fx.service, &medium.id, 55.0, AssessmentStatus::InProgress).await;

        let recs = fx
            .service
            .get_recommendations(
                &alice(),
                RecommendationQuery {
                    limit: 50,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(recs.len() >= 3);
        assert!(recs.windows(2).all(|w| w[0].priority >= w[1].priority));
        assert_eq!(recs[0].priority, Priority::Critical);

        assert_err!(
            fx.service
                .get_recommendations(
                    &alice(),
                    RecommendationQuery {
                        limit: 51,
                        ..Default::default()
                    },
                )
                .await
        );
    }

    #[tokio::test]
    async fn test_weights_merge_and_boundaries() {
        let fx = fixture();
        let mut weights = BTreeMap::new();
        weights.insert(Category::RiskMitigation, 0);
        weights.insert(Category::BestPractice, 100);
        let resolved = fx.service.update_weights(&alice(), weights).await.unwrap();
        assert_eq!(resolved[&Category::RiskMitigation], 0);
        assert_eq!(resolved[&Category::BestPractice], 100);
        assert_eq!(resolved[&Category::ComplianceGap], 50);

        let mut more = BTreeMap::new();
        more.insert(Category::ComplianceGap, 80);
        fx.service.update_weights(&alice(), more).await.unwrap();

        let current = fx.service.get_weights(&alice()).await.unwrap();
        assert_eq!(current[&Category::BestPractice], 100);
        assert_eq!(current[&Category::ComplianceGap], 80);
    }

    #[tokio::test]
    async fn test_feedback_recorded() {
        let fx = fixture();
        let record = fx
            .service
            .submit_feedback(
                &alice(),
                "best-practice-reassessment",
                Feedback::AlreadyImplemented,
                Some("Quarterly already".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(record.feedback, Some(Feedback::AlreadyImplemented));

        let viewed = fx.service.mark_viewed(&alice(), "best-practice-reassessment").await.unwrap();
        assert!(viewed.viewed_at.is_some());
        assert_eq!(viewed.feedback, Some(Feedback::AlreadyImplemented));
    }

    #[tokio::test]
    async fn test_public_recommendations_are_incident_prevention_only() {
        let fx = fixture();
        {
            use crate::store::DatasetBackend;
            fx.store
                .write(|d| {
                    d.incidents.push(incident("i1", None, None, Severity::Critical, "privacy"));
                    d.incidents.push(incident("i2", Some("org-b"), None, Severity::High, "privacy"));
                    Ok(())
                })
                .await
                .unwrap();
        }

        let recs = fx.service.get_public_recommendations(Some(10)).await.unwrap();
        assert!(!recs.is_empty());
        assert!(recs.iter().all(|r| r.category == Category::IncidentPrevention));
        assert_eq!(recs[0].id, "public-pattern-privacy");
        assert_err!(fx.service.get_public_recommendations(Some(0)).await);
    }

    #[tokio::test]
    async fn test_predictions() {
        let fx = fixture();
        let system = register(&fx.service, RiskLevel::Limited).await;
        assess(&fx.service, &system.id, 50.0, AssessmentStatus::Completed).await;
        assess(&fx.service, &system.id, 60.0, AssessmentStatus::Completed).await;

        let few = fx.service.get_predictions(&alice(), &system.id, 30).await.unwrap();
        assert!(few.is_empty());

        assess(&fx.service, &system.id, 70.0, AssessmentStatus::Completed).await;
        let predictions = fx.service.get_predictions(&alice(), &system.id, 30).await.unwrap();
        assert_eq!(predictions.len(), 4);

        assert_err!(fx.service.get_predictions(&alice(), &system.id, 6).await);
        assert!(matches!(
            fx.service
                .get_predictions(&Caller::user("bob", "org-b"), &system.id, 30)
                .await,
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_archive_system_hides_it_from_recommendations() {
        let fx = fixture();
        let system = register(&fx.service, RiskLevel::Limited).await;
        let archived = fx.service.archive_system(&alice(), &system.id).await.unwrap();
        assert_eq!(archived.status, SystemStatus::Archived);

        let recs = fx
            .service
            .get_recommendations(&alice(), RecommendationQuery::default())
            .await
            .unwrap();
        assert!(recs.iter().all(|r| r.related_system_id.as_deref() != Some(system.id.as_str())));

        let result = fx
            .service
            .record_assessment(
                &alice(),
                NewAssessment {
                    system_id: system.id.clone(),
                    framework: Framework::NistAiRmf,
                    score: 80.0,
                    status: AssessmentStatus::Completed,
                },
            )
            .await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_convene_council_clears_governance_recommendation() {
        let fx = fixture();
        let system = register(&fx.service, RiskLevel::High).await;
        {
            use crate::store::DatasetBackend;
            let inc = incident("inc-9", Some("org-a"), Some(&system.id), Severity::Critical, "safety");
            fx.store
                .write(|d| {
                    d.incidents.push(inc);
                    Ok(())
                })
                .await
                .unwrap();
        }

        let governance = format!("council-{}", system.id);
        let before = fx
            .service
            .get_recommendations(&alice(), RecommendationQuery { limit: 50, ..Default::default() })
            .await
            .unwrap();
        assert!(before.iter().any(|r| r.id == governance));

        let session = fx.service.convene_council(&alice(), "inc-9").await.unwrap();
        assert_eq!(session.votes.len(), 33);
        assert_eq!(session.decision.as_ref().map(|d| d.outcome), Some(Outcome::Approved));

        let after = fx
            .service
            .get_recommendations(&alice(), RecommendationQuery { limit: 50, ..Default::default() })
            .await
            .unwrap();
        assert!(after.iter().all(|r| r.id != governance));

        let fetched = fx.service.get_council_session(&alice(), &session.id).await.unwrap();
        assert_eq!(fetched.map(|s| s.id), Some(session.id.clone()));
        assert!(matches!(
            fx.service
                .get_council_session(&Caller::user("bob", "org-b"), &session.id)
                .await,
            Err(ServiceError::NotFound { .. })
        ));
        assert!(matches!(
            fx.service.convene_council(&Caller::user("bob", "org-b"), "inc-9").await,
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_completion_rates_unknown_course() {
        let fx = fixture();
        assert!(matches!(
            fx.service.get_completion_rates(&alice(), Some("nope")).await,
            Err(ServiceError::NotFound { resource: "course", .. })
        ));
        assert!(fx
            .service
            .get_completion_rates(&alice(), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_generate_report_validates_period() {
        let fx = fixture();
        let now = Utc::now();
        let result = fx
            .service
            .generate_report(
                &alice(),
                ReportRequest {
                    template: ReportTemplate::ExecutiveSummary,
                    start: now,
                    end: now - Duration::days(1),
                    framework: None,
                },
            )
            .await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));

        let report = fx
            .service
            .generate_report(
                &alice(),
                ReportRequest {
                    template: ReportTemplate::IncidentAnalysis,
                    start: now - Duration::days(30),
                    end: now,
                    framework: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(report.sections.len(), 3);
    }

    #[tokio::test]
    async fn test_report_section_overrides() {
        let mut fx = fixture();
        fx.service.settings.report_sections.insert(
            "executive_summary".to_string(),
            vec!["metrics".to_string(), "unknown_block".to_string()],
        );
        let now = Utc::now();
        let report = fx
            .service
            .generate_report(
                &alice(),
                ReportRequest {
                    template: ReportTemplate::ExecutiveSummary,
                    start: now - Duration::days(7),
                    end: now,
                    framework: None,
                },
            )
            .await
            .unwrap();
        let names: Vec<_> = report.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["metrics", "unknown_block"]);
    }

    #[tokio::test]
    async fn test_audit_logs_scoped_and_archived() {
        let fx = fixture();
        register(&fx.service, RiskLevel::Minimal).await;
        fx.service
            .register_system(
                &Caller::user("bob", "org-b"),
                NewSystem {
                    name: "Other".to_string(),
                    description: String::new(),
                    risk_level: RiskLevel::Minimal,
                },
            )
            .await
            .unwrap();

        let logs = fx
            .service
            .get_audit_logs(&alice(), AuditQuery::default())
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, "system.registered");

        assert_err!(fx.service.archive_audit_logs(&alice(), 0).await);
        let archived = fx.service.archive_audit_logs(&alice(), 30).await.unwrap();
        assert_eq!(archived, 0);

        let logs = fx
            .service
            .get_audit_logs(
                &alice(),
                AuditQuery {
                    action: Some("audit.archived".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
    }

    #[tokio::test]
    async fn test_archive_cannot_reach_another_organization() {
        let fx = fixture();
        let mut entry = AuditEntry::new(
            "alice",
            Some("org-a".to_string()),
            "system.registered",
            "system",
            "sys-1",
            json!({}),
        );
        entry.timestamp = Utc::now() - Duration::days(10);
        fx.audit.log_event(entry).await.unwrap();

        let archived = fx
            .service
            .archive_audit_logs(&Caller::user("mallory", "org-b"), 1)
            .await
            .unwrap();
        assert_eq!(archived, 0);

        let logs = fx
            .service
            .get_audit_logs(
                &alice(),
                AuditQuery {
                    action: Some("system.registered".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);

        let archived = fx.service.archive_audit_logs(&alice(), 1).await.unwrap();
        assert_eq!(archived, 1);
    }
}
