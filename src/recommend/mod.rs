//! Recommendation types, generation and per-user interaction state.

pub mod engine;
pub mod interactions;

use crate::models::{Framework, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub use engine::{generate, public_recommendations, select, OrgData, RecommendationQuery};
pub use interactions::{apply_action, validate_weights, InteractionAction};

/// Recommendation category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ComplianceGap,
    IncidentPrevention,
    GovernanceImprovement,
    RiskMitigation,
    BestPractice,
    RegulatoryUpdate,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::ComplianceGap,
        Category::IncidentPrevention,
        Category::GovernanceImprovement,
        Category::RiskMitigation,
        Category::BestPractice,
        Category::RegulatoryUpdate,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Category::ComplianceGap => "compliance_gap",
            Category::IncidentPrevention => "incident_prevention",
            Category::GovernanceImprovement => "governance_improvement",
            Category::RiskMitigation => "risk_mitigation",
            Category::BestPractice => "best_practice",
            Category::RegulatoryUpdate => "regulatory_update",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.key() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}

/// Recommendation priority. Ordering is `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Returns an emoji representation of the priority.
    pub fn emoji(&self) -> &'static str {
        match self {
            Priority::Low => "🟢",
            Priority::Medium => "🟡",
            Priority::High => "🟠",
            Priority::Critical => "🔴",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "Low"),
            Priority::Medium => write!(f, "Medium"),
            Priority::High => write!(f, "High"),
            Priority::Critical => write!(f, "Critical"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

impl From<Severity> for Priority {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Low => Priority::Low,
            Severity::Medium => Priority::Medium,
            Severity::High => Priority::High,
            Severity::Critical => Priority::Critical,
        }
    }
}

/// Rough effort or impact estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Estimate {
    Low,
    Medium,
    High,
}

/// A derived, prioritized suggested action. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// Stable across runs for the same rule and subject, so interaction
    /// state keyed on it survives regeneration.
    pub id: String,
    pub category: Category,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub action_items: Vec<String>,
    pub estimated_effort: Estimate,
    pub estimated_impact: Estimate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_system_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<Framework>,
}

/// Closed set of feedback answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Helpful,
    NotHelpful,
    AlreadyImplemented,
    NotApplicable,
}

impl FromStr for Feedback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "helpful" => Ok(Feedback::Helpful),
            "not_helpful" => Ok(Feedback::NotHelpful),
            "already_implemented" => Ok(Feedback::AlreadyImplemented),
            "not_applicable" => Ok(Feedback::NotApplicable),
            other => Err(format!("unknown feedback: {}", other)),
        }
    }
}

/// Persisted interaction state for one user and one recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    pub user_id: String,
    pub recommendation_id: String,
    #[serde(default)]
    pub viewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub dismissed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub snoozed_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub feedback: Option<Feedback>,
    #[serde(default)]
    pub feedback_comment: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl InteractionRecord {
    pub fn new(user_id: &str, recommendation_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_string(),
            recommendation_id: recommendation_id.to_string(),
            viewed_at: None,
            dismissed_at: None,
            snoozed_until: None,
            feedback: None,
            feedback_comment: None,
            updated_at: now,
        }
    }

    /// Dismissed, or snoozed past `now`.
    pub fn is_hidden(&self, now: DateTime<Utc>) -> bool {
        self.dismissed_at.is_some() || self.snoozed_until.map_or(false, |until| until > now)
    }
}

/// Weight given to a category when none is stored.
pub const DEFAULT_WEIGHT: u8 = 50;

/// Per-user category weights in `[0, 100]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryWeights {
    pub user_id: String,
    pub weights: BTreeMap<Category, u8>,
}

impl CategoryWeights {
    pub fn weight(&self, category: Category) -> u8 {
        self.weights.get(&category).copied().unwrap_or(DEFAULT_WEIGHT)
    }

    /// Every category with its effective weight.
    pub fn resolved(&self) -> BTreeMap<Category, u8> {
        Category::ALL
            .into_iter()
            .map(|c| (c, self.weight(c)))
            .collect()
    }
}
