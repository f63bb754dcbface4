//! Data models for the compliance platform.
//!
//! This module contains the core entities (AI systems, assessments,
//! incidents, training enrollments) and the caller context used for
//! authentication at the procedure boundary.

use crate::error::ServiceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lowest valid assessment score.
pub const MIN_SCORE: f64 = 0.0;
/// Highest valid assessment score.
pub const MAX_SCORE: f64 = 100.0;

/// A regulatory framework an AI system is assessed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framework {
    EuAiAct,
    NistAiRmf,
    Tc260,
}

impl Framework {
    pub const ALL: [Framework; 3] = [Framework::EuAiAct, Framework::NistAiRmf, Framework::Tc260];

    /// Stable key used in catalogs and serialized data.
    pub fn key(&self) -> &'static str {
        match self {
            Framework::EuAiAct => "eu_ai_act",
            Framework::NistAiRmf => "nist_ai_rmf",
            Framework::Tc260 => "tc260",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framework::EuAiAct => write!(f, "EU AI Act"),
            Framework::NistAiRmf => write!(f, "NIST AI RMF"),
            Framework::Tc260 => write!(f, "TC260"),
        }
    }
}

impl FromStr for Framework {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "eu_ai_act" | "euaiact" => Ok(Framework::EuAiAct),
            "nist_ai_rmf" | "nist" | "nistairmf" => Ok(Framework::NistAiRmf),
            "tc260" => Ok(Framework::Tc260),
            other => Err(format!("unknown framework: {}", other)),
        }
    }
}

/// Score band of an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBucket {
    High,
    Medium,
    Low,
}

impl RiskBucket {
    /// Bucket a score: below 40 is high risk, 40 to 69 medium, 70 and above low.
    pub fn from_score(score: f64) -> Self {
        if score < 40.0 {
            RiskBucket::High
        } else if score < 70.0 {
            RiskBucket::Medium
        } else {
            RiskBucket::Low
        }
    }
}

/// Declared risk classification of an AI system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Minimal,
    Limited,
    High,
    Unacceptable,
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minimal" => Ok(RiskLevel::Minimal),
            "limited" => Ok(RiskLevel::Limited),
            "high" => Ok(RiskLevel::High),
            "unacceptable" => Ok(RiskLevel::Unacceptable),
            other => Err(format!("unknown risk level: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    Active,
    UnderReview,
    Archived,
}

/// A registered AI system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSystem {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub risk_level: RiskLevel,
    pub status: SystemStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Completed,
    InProgress,
    Failed,
}

impl FromStr for AssessmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "completed" => Ok(AssessmentStatus::Completed),
            "in_progress" => Ok(AssessmentStatus::InProgress),
            "failed" => Ok(AssessmentStatus::Failed),
            other => Err(format!("unknown assessment status: {}", other)),
        }
    }
}

/// A scored evaluation of one system against one framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    pub system_id: String,
    pub framework: Framework,
    /// Overall score in `[0, 100]`.
    pub score: f64,
    pub status: AssessmentStatus,
    pub assessed_at: DateTime<Utc>,
}

impl Assessment {
    pub fn is_compliant(&self) -> bool {
        self.status == AssessmentStatus::Completed
    }

    pub fn risk_bucket(&self) -> RiskBucket {
        RiskBucket::from_score(self.score)
    }
}

/// Reject scores outside `[0, 100]` (and NaN).
pub fn validate_score(score: f64) -> Result<(), ServiceError> {
    if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(ServiceError::Validation(format!(
            "score must be between 0 and 100 (got {})",
            score
        )));
    }
    Ok(())
}

/// Severity of a reported incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Investigating,
    Resolved,
}

/// An incident filed through the public Watchdog hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    /// Absent for anonymous public reports.
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub system_id: Option<String>,
    pub title: String,
    pub severity: Severity,
    /// Free-form category key, matched against catalog incident patterns.
    pub category: String,
    pub reported_at: DateTime<Utc>,
    pub status: IncidentStatus,
}

impl Incident {
    pub fn is_open(&self) -> bool {
        self.status != IncidentStatus::Resolved
    }
}

/// A training course.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub framework: Option<Framework>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Enrolled,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub user_id: String,
    pub course_id: String,
    pub status: EnrollmentStatus,
    /// Progress percentage in `[0, 100]`.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub organization_id: String,
}

/// Call context handed to every procedure.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub user: Option<User>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn user(id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        Self {
            user: Some(User {
                id: id.into(),
                organization_id: organization_id.into(),
            }),
        }
    }

    /// The authenticated user, or `Unauthenticated`.
    pub fn require_user(&self) -> Result<&User, ServiceError> {
        self.user.as_ref().ok_or(ServiceError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_bucket_thresholds() {
        assert_eq!(RiskBucket::from_score(0.0), RiskBucket::High);
        assert_eq!(RiskBucket::from_score(39.9), RiskBucket::High);
        assert_eq!(RiskBucket::from_score(40.0), RiskBucket::Medium);
        assert_eq!(RiskBucket::from_score(69.0), RiskBucket::Medium);
        assert_eq!(RiskBucket::from_score(70.0), RiskBucket::Low);
        assert_eq!(RiskBucket::from_score(100.0), RiskBucket::Low);
    }

    #[test]
    fn test_framework_from_str() {
        assert_eq!("EU AI Act".parse::<Framework>(), Ok(Framework::EuAiAct));
        assert_eq!("nist-ai-rmf".parse::<Framework>(), Ok(Framework::NistAiRmf));
        assert_eq!("TC260".parse::<Framework>(), Ok(Framework::Tc260));
        assert!("iso42001".parse::<Framework>().is_err());
    }

    #[test]
    fn test_validate_score() {
        assert!(validate_score(0.0).is_ok());
        assert!(validate_score(100.0).is_ok());
        assert!(validate_score(-0.5).is_err());
        assert!(validate_score(100.1).is_err());
        assert!(validate_score(f64::NAN).is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_require_user() {
        assert!(matches!(
            Caller::anonymous().require_user(),
            Err(ServiceError::Unauthenticated)
        ));
        let caller = Caller::user("u1", "org1");
        assert_eq!(caller.require_user().map(|u| u.id.as_str()).ok(), Some("u1"));
    }
}
