//! Named procedure dispatch.
//!
//! Each procedure takes a camelCase JSON object. Unknown fields are
//! rejected. Results come back as JSON values so a transport (or the
//! `rpc` subcommand) can pass them through untouched.

use crate::error::ServiceError;
use crate::models::{AssessmentStatus, Caller, Framework, RiskLevel};
use crate::recommend::{Category, Feedback, Priority, RecommendationQuery};
use crate::report::ReportTemplate;
use crate::service::{
    AuditQuery, ComplianceService, MetricsQuery, NewAssessment, NewSystem, ReportRequest,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

pub const METHODS: [&str; 22] = [
    "analytics.getMetricsSnapshot",
    "analytics.getFrameworkComparison",
    "analytics.getComplianceGaps",
    "analytics.getIncidentPatterns",
    "analytics.getPredictions",
    "recommendations.getRecommendations",
    "recommendations.getPublicRecommendations",
    "recommendations.markViewed",
    "recommendations.dismiss",
    "recommendations.snooze",
    "recommendations.submitFeedback",
    "recommendations.updateWeights",
    "recommendations.getWeights",
    "systems.register",
    "systems.archive",
    "systems.recordAssessment",
    "council.convene",
    "council.getSession",
    "studentAnalytics.getCompletionRates",
    "reports.generate",
    "audit.getLogs",
    "audit.archiveOlder",
];

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("invalid params for {method}: {source}")]
    InvalidParams {
        method: String,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("failed to encode result: {0}")]
    Encode(serde_json::Error),
}

impl RpcError {
    /// Transport-level error code.
    pub fn code(&self) -> &'static str {
        match self {
            RpcError::UnknownMethod(_) => "METHOD_NOT_FOUND",
            RpcError::InvalidParams { .. } => "BAD_REQUEST",
            RpcError::Service(err) => match err {
                ServiceError::Unauthenticated => "UNAUTHORIZED",
                ServiceError::Validation(_) => "BAD_REQUEST",
                ServiceError::NotFound { .. } => "NOT_FOUND",
                ServiceError::DatabaseUnavailable(_) => "SERVICE_UNAVAILABLE",
                ServiceError::Storage(_) | ServiceError::Audit(_) => "INTERNAL_SERVER_ERROR",
            },
            RpcError::Encode(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

/// Identity attached to an RPC request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequestUser {
    pub user_id: String,
    pub organization_id: String,
}

/// One RPC request as read by the `rpc` subcommand.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub user: Option<RequestUser>,
}

impl RpcRequest {
    pub fn caller(&self) -> Caller {
        match &self.user {
            Some(u) => Caller::user(u.user_id.clone(), u.organization_id.clone()),
            None => Caller::anonymous(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcErrorBody {
    pub code: &'static str,
    pub message: String,
}

/// Response envelope: exactly one of `result` or `error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

impl From<Result<Value, RpcError>> for RpcResponse {
    fn from(outcome: Result<Value, RpcError>) -> Self {
        match outcome {
            Ok(result) => Self {
                result: Some(result),
                error: None,
            },
            Err(err) => Self {
                result: None,
                error: Some(RpcErrorBody {
                    code: err.code(),
                    message: err.to_string(),
                }),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoParams {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct MetricsParams {
    #[serde(default)]
    framework: Option<Framework>,
    #[serde(default)]
    start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct DateRangeParams {
    #[serde(default)]
    start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FrameworkParams {
    #[serde(default)]
    framework: Option<Framework>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PredictionParams {
    system_id: String,
    #[serde(default)]
    days_ahead: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RecommendationParams {
    #[serde(default)]
    category: Option<Category>,
    #[serde(default)]
    priority: Option<Priority>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    include_dismissed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct LimitParams {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RecommendationIdParams {
    recommendation_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SnoozeParams {
    recommendation_id: String,
    snooze_days: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FeedbackParams {
    recommendation_id: String,
    feedback: Feedback,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WeightsParams {
    weights: BTreeMap<Category, i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RegisterParams {
    name: String,
    #[serde(default)]
    description: String,
    risk_level: RiskLevel,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SystemIdParams {
    system_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AssessmentParams {
    system_id: String,
    framework: Framework,
    score: f64,
    status: AssessmentStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct IncidentIdParams {
    incident_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SessionIdParams {
    session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CompletionParams {
    #[serde(default)]
    course_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ReportParams {
    template: ReportTemplate,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    #[serde(default)]
    framework: Option<Framework>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AuditLogParams {
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    resource: Option<String>,
    #[serde(default)]
    start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ArchiveParams {
    older_than_days: i64,
}

fn parse<T: DeserializeOwned>(method: &str, params: Value) -> Result<T, RpcError> {
    let params = if params.is_null() { json!({}) } else { params };
    serde_json::from_value(params).map_err(|source| RpcError::InvalidParams {
        method: method.to_string(),
        source,
    })
}

fn encode<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(RpcError::Encode)
}

/// Run one procedure.
pub async fn dispatch(
    service: &ComplianceService,
    caller: &Caller,
    method: &str,
    params: Value,
) -> Result<Value, RpcError> {
    debug!("Dispatching {}", method);

    match method {
        "analytics.getMetricsSnapshot" => {
            let p: MetricsParams = parse(method, params)?;
            let query = MetricsQuery {
                framework: p.framework,
                since: p.start_date,
                until: p.end_date,
            };
            encode(service.get_metrics_snapshot(caller, query).await?)
        }
        "analytics.getFrameworkComparison" => {
            let p: DateRangeParams = parse(method, params)?;
            encode(
                service
                    .get_framework_comparison(caller, p.start_date, p.end_date)
                    .await?,
            )
        }
        "analytics.getComplianceGaps" => {
            let p: FrameworkParams = parse(method, params)?;
            encode(service.get_compliance_gaps(p.framework))
        }
        "analytics.getIncidentPatterns" => {
            let _: NoParams = parse(method, params)?;
            encode(service.get_incident_patterns(caller).await?)
        }
        "analytics.getPredictions" => {
            let p: PredictionParams = parse(method, params)?;
            let days = p
                .days_ahead
                .unwrap_or(service.settings().default_prediction_days);
            encode(service.get_predictions(caller, &p.system_id, days).await?)
        }
        "recommendations.getRecommendations" => {
            let p: RecommendationParams = parse(method, params)?;
            let query = RecommendationQuery {
                category: p.category,
                priority: p.priority,
                limit: p.limit.unwrap_or(service.settings().default_limit),
                include_dismissed: p.include_dismissed,
            };
            encode(service.get_recommendations(caller, query).await?)
        }
        "recommendations.getPublicRecommendations" => {
            let p: LimitParams = parse(method, params)?;
            encode(service.get_public_recommendations(p.limit).await?)
        }
        "recommendations.markViewed" => {
            let p: RecommendationIdParams = parse(method, params)?;
            encode(service.mark_viewed(caller, &p.recommendation_id).await?)
        }
        "recommendations.dismiss" => {
            let p: RecommendationIdParams = parse(method, params)?;
            encode(service.dismiss(caller, &p.recommendation_id).await?)
        }
        "recommendations.snooze" => {
            let p: SnoozeParams = parse(method, params)?;
            encode(service.snooze(caller, &p.recommendation_id, p.snooze_days).await?)
        }
        "recommendations.submitFeedback" => {
            let p: FeedbackParams = parse(method, params)?;
            encode(
                service
                    .submit_feedback(caller, &p.recommendation_id, p.feedback, p.comment)
                    .await?,
            )
        }
        "recommendations.updateWeights" => {
            let p: WeightsParams = parse(method, params)?;
            encode(service.update_weights(caller, p.weights).await?)
        }
        "recommendations.getWeights" => {
            let _: NoParams = parse(method, params)?;
            encode(service.get_weights(caller).await?)
        }
        "systems.register" => {
            let p: RegisterParams = parse(method, params)?;
            let input = NewSystem {
                name: p.name,
                description: p.description,
                risk_level: p.risk_level,
            };
            encode(service.register_system(caller, input).await?)
        }
        "systems.archive" => {
            let p: SystemIdParams = parse(method, params)?;
            encode(service.archive_system(caller, &p.system_id).await?)
        }
        "systems.recordAssessment" => {
            let p: AssessmentParams = parse(method, params)?;
            let input = NewAssessment {
                system_id: p.system_id,
                framework: p.framework,
                score: p.score,
                status: p.status,
            };
            encode(service.record_assessment(caller, input).await?)
        }
        "council.convene" => {
            let p: IncidentIdParams = parse(method, params)?;
            encode(service.convene_council(caller, &p.incident_id).await?)
        }
        "council.getSession" => {
            let p: SessionIdParams = parse(method, params)?;
            encode(service.get_council_session(caller, &p.session_id).await?)
        }
        "studentAnalytics.getCompletionRates" => {
            let p: CompletionParams = parse(method, params)?;
            encode(
                service
                    .get_completion_rates(caller, p.course_id.as_deref())
                    .await?,
            )
        }
        "reports.generate" => {
            let p: ReportParams = parse(method, params)?;
            let request = ReportRequest {
                template: p.template,
                start: p.start_date,
                end: p.end_date,
                framework: p.framework,
            };
            encode(service.generate_report(caller, request).await?)
        }
        "audit.getLogs" => {
            let p: AuditLogParams = parse(method, params)?;
            let query = AuditQuery {
                user: p.user,
                action: p.action,
                resource: p.resource,
                since: p.start_date,
                until: p.end_date,
                limit: p.limit,
            };
            encode(service.get_audit_logs(caller, query).await?)
        }
        "audit.archiveOlder" => {
            let p: ArchiveParams = parse(method, params)?;
            let archived = service.archive_audit_logs(caller, p.older_than_days).await?;
            Ok(json!({ "archived": archived }))
        }
        other => Err(RpcError::UnknownMethod(other.to_string())),
    }
}
