//! Rule-based recommendation generation and ranking.

use super::{
    Category, CategoryWeights, Estimate, InteractionRecord, Priority, Recommendation,
};
use crate::analysis::{compute_trend, latest_by_system, Trend, TrendSettings};
use crate::catalog::Catalog;
use crate::council::{CouncilSession, SessionStatus};
use crate::models::{AiSystem, Assessment, Incident, RiskBucket, RiskLevel, Severity, SystemStatus};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Incidents newer than this feed incident-prevention recommendations.
const RECENT_INCIDENT_DAYS: i64 = 30;
/// Regulatory updates older than this are no longer surfaced.
const UPDATE_LOOKBACK_DAYS: i64 = 90;
/// Updates taking effect within this many days are raised to medium.
const UPDATE_URGENT_DAYS: i64 = 180;

/// Everything the engine reads for one organization.
pub struct OrgData<'a> {
    pub systems: &'a [AiSystem],
    pub assessments: &'a [Assessment],
    pub incidents: &'a [Incident],
    pub sessions: &'a [CouncilSession],
    pub catalog: &'a Catalog,
    pub trend: TrendSettings,
    pub now: DateTime<Utc>,
}

/// Listing options for `select`.
#[derive(Debug, Clone)]
pub struct RecommendationQuery {
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub limit: usize,
    pub include_dismissed: bool,
}

impl Default for RecommendationQuery {
    fn default() -> Self {
        Self {
            category: None,
            priority: None,
            limit: 10,
            include_dismissed: false,
        }
    }
}

/// Derive the full, unranked recommendation set for an organization.
pub fn generate(data: &OrgData<'_>) -> Vec<Recommendation> {
    let mut recs = Vec::new();

    let active: Vec<&AiSystem> = data
        .systems
        .iter()
        .filter(|s| s.status != SystemStatus::Archived)
        .collect();

    if active.is_empty() {
        recs.push(Recommendation {
            id: "best-practice-register-systems".to_string(),
            category: Category::BestPractice,
            priority: Priority::Medium,
            title: "Register your AI systems".to_string(),
            description: "No active AI systems are registered, so compliance cannot be tracked."
                .to_string(),
            action_items: vec![
                "Inventory AI systems in use across the organization".to_string(),
                "Register each system with its risk classification".to_string(),
            ],
            estimated_effort: Estimate::Low,
            estimated_impact: Estimate::High,
            related_system_id: None,
            framework: None,
        });
    }

    let latest = latest_by_system(data.assessments);
    for system in &active {
        recs.extend(system_recommendation(system, latest.get(&system.id), data.catalog));
    }

    recs.extend(incident_recommendations(data));
    recs.extend(council_recommendations(&active, data));

    if compute_trend(data.assessments, data.trend) == Trend::Declining {
        recs.push(Recommendation {
            id: "risk-declining-trend".to_string(),
            category: Category::RiskMitigation,
            priority: Priority::High,
            title: "Reverse the declining compliance trend".to_string(),
            description: "Recent assessment scores are materially lower than the preceding period."
                .to_string(),
            action_items: vec![
                "Compare the latest assessments with the previous period to locate regressions"
                    .to_string(),
                "Review changes deployed since the last stable assessment".to_string(),
            ],
            estimated_effort: Estimate::Medium,
            estimated_impact: Estimate::High,
            related_system_id: None,
            framework: None,
        });
    }

    recs.extend(regulatory_recommendations(data));

    recs.push(Recommendation {
        id: "best-practice-reassessment".to_string(),
        category: Category::BestPractice,
        priority: Priority::Low,
        title: "Schedule quarterly re-assessments".to_string(),
        description: "Regular assessments keep trend analysis and forecasts meaningful.".to_string(),
        action_items: vec![
            "Set a quarterly assessment cadence per system".to_string(),
            "Re-assess after every major model update".to_string(),
        ],
        estimated_effort: Estimate::Low,
        estimated_impact: Estimate::Medium,
        related_system_id: None,
        framework: None,
    });

    recs
}

fn system_recommendation(
    system: &AiSystem,
    latest: Option<&Assessment>,
    catalog: &Catalog,
) -> Option<Recommendation> {
    let Some(assessment) = latest else {
        return Some(Recommendation {
            id: format!("assess-{}", system.id),
            category: Category::ComplianceGap,
            priority: Priority::High,
            title: format!("Run a first compliance assessment for {}", system.name),
            description: format!("{} has never been assessed against any framework.", system.name),
            action_items: vec![
                "Pick the framework that applies to the system's market".to_string(),
                "Complete a baseline assessment".to_string(),
            ],
            estimated_effort: Estimate::Medium,
            estimated_impact: Estimate::High,
            related_system_id: Some(system.id.clone()),
            framework: None,
        });
    };

    let mut gaps = catalog.gaps_for(Some(assessment.framework));
    gaps.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.id.cmp(&b.id)));

    match assessment.risk_bucket() {
        RiskBucket::High => Some(Recommendation {
            id: format!("gap-{}", system.id),
            category: Category::ComplianceGap,
            priority: Priority::Critical,
            title: format!("Close critical compliance gaps in {}", system.name),
            description: format!(
                "{} scored {:.0} against the {}, inside the high-risk band.",
                system.name, assessment.score, assessment.framework
            ),
            action_items: gaps.iter().take(3).map(|g| g.remediation.clone()).collect(),
            estimated_effort: Estimate::High,
            estimated_impact: Estimate::High,
            related_system_id: Some(system.id.clone()),
            framework: Some(assessment.framework),
        }),
        RiskBucket::Medium => {
            let mut action_items: Vec<String> = gaps
                .iter()
                .filter(|g| g.severity <= Severity::High)
                .take(2)
                .map(|g| g.remediation.clone())
                .collect();
            action_items.push("Re-assess once remediation is complete".to_string());

            Some(Recommendation {
                id: format!("risk-{}", system.id),
                category: Category::RiskMitigation,
                priority: Priority::Medium,
                title: format!("Move {} out of the medium-risk band", system.name),
                description: format!(
                    "{} scored {:.0} against the {}.",
                    system.name, assessment.score, assessment.framework
                ),
                action_items,
                estimated_effort: Estimate::Medium,
                estimated_impact: Estimate::Medium,
                related_system_id: Some(system.id.clone()),
                framework: Some(assessment.framework),
            })
        }
        RiskBucket::Low => None,
    }
}

fn incident_recommendations(data: &OrgData<'_>) -> Vec<Recommendation> {
    let cutoff = data.now - Duration::days(RECENT_INCIDENT_DAYS);

    let mut by_category: BTreeMap<String, Vec<&Incident>> = BTreeMap::new();
    for incident in data
        .incidents
        .iter()
        .filter(|i| i.is_open() && i.reported_at >= cutoff)
    {
        by_category
            .entry(incident.category.to_lowercase())
            .or_default()
            .push(incident);
    }

    by_category
        .into_iter()
        .map(|(category, incidents)| {
            let worst = incidents
                .iter()
                .map(|i| i.severity)
                .max()
                .unwrap_or(Severity::Low);
            let priority = if worst == Severity::Critical {
                Priority::Critical
            } else {
                Priority::High
            };
            let pattern = data.catalog.pattern_for_category(&category);

            Recommendation {
                id: format!("incident-prevention-{}", category),
                category: Category::IncidentPrevention,
                priority,
                title: match pattern {
                    Some(p) => format!("Prevent recurrence: {}", p.title),
                    None => format!("Prevent recurrence of {} incidents", category),
                },
                description: format!(
                    "{} open {} incident(s) reported in the last {} days.",
                    incidents.len(),
                    category,
                    RECENT_INCIDENT_DAYS
                ),
                action_items: pattern
                    .map(|p| p.prevention.clone())
                    .filter(|items| !items.is_empty())
                    .unwrap_or_else(|| {
                        vec!["Run a root-cause review of the reported incidents".to_string()]
                    }),
                estimated_effort: Estimate::Medium,
                estimated_impact: Estimate::High,
                related_system_id: None,
                framework: None,
            }
        })
        .collect()
}

fn council_recommendations(active: &[&AiSystem], data: &OrgData<'_>) -> Vec<Recommendation> {
    let reviewed: HashSet<&str> = data
        .sessions
        .iter()
        .filter(|s| s.status == SessionStatus::Decided)
        .filter_map(|s| s.system_id.as_deref())
        .collect();

    active
        .iter()
        .filter(|s| s.risk_level >= RiskLevel::High && !reviewed.contains(s.id.as_str()))
        .map(|system| Recommendation {
            id: format!("council-{}", system.id),
            category: Category::GovernanceImprovement,
            priority: Priority::Medium,
            title: format!("Convene a council review for {}", system.name),
            description: format!(
                "{} is classified {:?} risk and has no decided council session.",
                system.name, system.risk_level
            ),
            action_items: vec![
                "Open a council session on the system's most recent incident".to_string(),
                "Record the decision and assign follow-up owners".to_string(),
            ],
            estimated_effort: Estimate::Low,
            estimated_impact: Estimate::Medium,
            related_system_id: Some(system.id.clone()),
            framework: None,
        })
        .collect()
}

fn regulatory_recommendations(data: &OrgData<'_>) -> Vec<Recommendation> {
    let frameworks: BTreeSet<_> = data.assessments.iter().map(|a| a.framework).collect();
    let today = data.now.date_naive();

    frameworks
        .into_iter()
        .flat_map(|framework| data.catalog.updates_for(framework))
        .filter(|u| (u.effective_date - today).num_days() >= -UPDATE_LOOKBACK_DAYS)
        .map(|update| {
            let days_until = (update.effective_date - today).num_days();
            let priority = if (0..=UPDATE_URGENT_DAYS).contains(&days_until) {
                Priority::Medium
            } else {
                Priority::Low
            };

            Recommendation {
                id: format!("reg-{}", update.id),
                category: Category::RegulatoryUpdate,
                priority,
                title: update.title.clone(),
                description: format!("{} (effective {})", update.summary, update.effective_date),
                action_items: vec![format!(
                    "Review {} obligations affected by this change",
                    update.framework
                )],
                estimated_effort: Estimate::Medium,
                estimated_impact: Estimate::Medium,
                related_system_id: None,
                framework: Some(update.framework),
            }
        })
        .collect()
}

/// Filter, hide, rank and truncate.
///
/// Ranking is priority first (critical to low), then the caller's category
/// weight, then id so output is stable.
pub fn select(
    mut recs: Vec<Recommendation>,
    query: &RecommendationQuery,
    interactions: &[InteractionRecord],
    weights: &CategoryWeights,
    now: DateTime<Utc>,
) -> Vec<Recommendation> {
    let state: HashMap<&str, &InteractionRecord> = interactions
        .iter()
        .map(|r| (r.recommendation_id.as_str(), r))
        .collect();

    recs.retain(|r| {
        query.category.map_or(true, |c| r.category == c)
            && query.priority.map_or(true, |p| r.priority == p)
            && (query.include_dismissed
                || !state.get(r.id.as_str()).map_or(false, |s| s.is_hidden(now)))
    });

    rank(&mut recs, weights);
    recs.truncate(query.limit);
    recs
}

pub fn rank(recs: &mut [Recommendation], weights: &CategoryWeights) {
    recs.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| weights.weight(b.category).cmp(&weights.weight(a.category)))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Unauthenticated variant: incident-prevention advice from catalog
/// patterns, ordered by how often each pattern occurs across all reports.
pub fn public_recommendations(
    catalog: &Catalog,
    incidents: &[Incident],
    limit: usize,
) -> Vec<Recommendation> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for incident in incidents {
        *counts.entry(incident.category.to_lowercase()).or_default() += 1;
    }

    let mut patterns: Vec<_> = catalog
        .incident_patterns
        .iter()
        .map(|p| (p, counts.get(&p.category.to_lowercase()).copied().unwrap_or(0)))
        .collect();

    patterns.sort_by(|(pa, ca), (pb, cb)| {
        cb.cmp(ca)
            .then_with(|| pb.severity.cmp(&pa.severity))
            .then_with(|| pa.id.cmp(&pb.id))
    });

    patterns
        .into_iter()
        .take(limit)
        .map(|(pattern, count)| Recommendation {
            id: format!("public-{}", pattern.id),
            category: Category::IncidentPrevention,
            priority: pattern.severity.into(),
            title: pattern.title.clone(),
            description: format!("{} Reported {} time(s).", pattern.description, count),
            action_items: pattern.prevention.clone(),
            estimated_effort: Estimate::Medium,
            estimated_impact: Estimate::High,
            related_system_id: None,
            framework: None,
        })
        .collect()
}
