//! Section assembly for report templates.

use super::{Report, ReportFilters, ReportPeriod, ReportTemplate, Section};
use crate::analysis::{
    compare_frameworks, compute_metrics, group_by_system, latest_by_system, predict_scores,
    Trend, TrendSettings,
};
use crate::catalog::Catalog;
use crate::models::{AiSystem, Assessment, Incident, RiskBucket, Severity};
use crate::recommend::Recommendation;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

/// Forecast horizon used by the predictions section.
const PREDICTION_DAYS: i64 = 30;
/// Recommendations listed in the recommendations section.
const TOP_RECOMMENDATIONS: usize = 5;

/// Data a report is built from. Assessments and incidents are narrowed to
/// the report period and framework before any section sees them.
pub struct ReportInputs<'a> {
    pub systems: &'a [AiSystem],
    pub assessments: &'a [Assessment],
    pub incidents: &'a [Incident],
    pub recommendations: &'a [Recommendation],
    pub catalog: &'a Catalog,
    pub trend: TrendSettings,
}

struct Scope<'a> {
    inputs: &'a ReportInputs<'a>,
    filters: &'a ReportFilters,
    assessments: Vec<Assessment>,
    incidents: Vec<&'a Incident>,
}

/// Build `template` over `period`. `sections` overrides the template's
/// built-in section list when given.
pub fn build_report(
    template: ReportTemplate,
    period: ReportPeriod,
    filters: ReportFilters,
    sections: Option<&[String]>,
    inputs: &ReportInputs<'_>,
    generated_at: DateTime<Utc>,
) -> Report {
    let names: Vec<String> = match sections {
        Some(names) => names.to_vec(),
        None => template
            .default_sections()
            .iter()
            .map(|s| s.to_string())
            .collect(),
    };

    let scope = Scope {
        inputs,
        filters: &filters,
        assessments: inputs
            .assessments
            .iter()
            .filter(|a| period.contains(a.assessed_at))
            .filter(|a| filters.framework.map_or(true, |f| a.framework == f))
            .cloned()
            .collect(),
        incidents: inputs
            .incidents
            .iter()
            .filter(|i| period.contains(i.reported_at))
            .collect(),
    };

    debug!(
        "Building {} report: {} sections, {} assessments in period",
        template,
        names.len(),
        scope.assessments.len()
    );

    let built: Vec<Section> = names.iter().map(|name| build_section(name, &scope)).collect();

    let title = match filters.framework {
        Some(framework) => format!("{} ({})", template.title(), framework),
        None => template.title().to_string(),
    };

    Report {
        title,
        template,
        framework: filters.framework,
        generated_at,
        period,
        filters,
        sections: built,
    }
}

fn build_section(name: &str, scope: &Scope<'_>) -> Section {
    match name {
        "overview" => overview(scope),
        "metrics" => metrics(scope),
        "framework_comparison" => framework_comparison(scope),
        "system_scores" => system_scores(scope),
        "risk_distribution" => risk_distribution(scope),
        "compliance_gaps" => compliance_gaps(scope),
        "regulatory_updates" => regulatory_updates(scope),
        "predictions" => predictions(scope),
        "incident_summary" => incident_summary(scope),
        "incident_patterns" => incident_patterns(scope),
        "recommendations" => recommendations(scope),
        other => placeholder(other),
    }
}

fn section(name: &str, title: &str, content: String, data: serde_json::Value) -> Section {
    Section {
        name: name.to_string(),
        title: title.to_string(),
        content,
        data,
    }
}

/// Stand-in for a section name no builder knows.
fn placeholder(name: &str) -> Section {
    let title = name
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    section(
        name,
        &title,
        format!("No data is available for the \"{}\" section.", name),
        serde_json::Value::Null,
    )
}

fn overview(scope: &Scope<'_>) -> Section {
    let systems = scope.inputs.systems.len();
    let assessed = latest_by_system(&scope.assessments).len();
    let metrics = compute_metrics(&scope.assessments, scope.inputs.trend);

    let content = if metrics.has_data {
        format!(
            "{} of {} registered AI systems were assessed in this period ({} assessments, \
             average score {}).",
            assessed, systems, metrics.total_assessments, metrics.average_score
        )
    } else {
        format!(
            "{} AI systems are registered. No assessments were recorded in this period.",
            systems
        )
    };

    section(
        "overview",
        "Overview",
        content,
        json!({
            "registeredSystems": systems,
            "assessedSystems": assessed,
            "openIncidents": scope.incidents.iter().filter(|i| i.is_open()).count(),
        }),
    )
}

fn metrics(scope: &Scope<'_>) -> Section {
    let snapshot = compute_metrics(&scope.assessments, scope.inputs.trend);
    let content = if snapshot.has_data {
        format!(
            "Average score {} across {} assessments; {} compliant, {} high risk. Trend is {}.",
            snapshot.average_score,
            snapshot.total_assessments,
            snapshot.compliant_count,
            snapshot.high_risk_count,
            trend_label(snapshot.trend)
        )
    } else {
        "No assessments in this period.".to_string()
    };

    section(
        "metrics",
        "Compliance Metrics",
        content,
        serde_json::to_value(&snapshot).unwrap_or_default(),
    )
}

fn trend_label(trend: Trend) -> &'static str {
    match trend {
        Trend::Improving => "improving",
        Trend::Stable => "stable",
        Trend::Declining => "declining",
    }
}

fn framework_comparison(scope: &Scope<'_>) -> Section {
    let mut rows = compare_frameworks(&scope.assessments);
    scope.inputs.catalog.label_frameworks(&mut rows);
    let content = match rows.first() {
        Some(best) => format!(
            "{} frameworks assessed. Highest average: {} ({:.1}).",
            rows.len(),
            best.framework_name,
            best.average_score
        ),
        None => "No framework has assessments in this period.".to_string(),
    };

    section(
        "framework_comparison",
        "Framework Comparison",
        content,
        serde_json::to_value(&rows).unwrap_or_default(),
    )
}

fn system_scores(scope: &Scope<'_>) -> Section {
    let latest = latest_by_system(&scope.assessments);
    let mut rows: Vec<serde_json::Value> = scope
        .inputs
        .systems
        .iter()
        .filter_map(|system| {
            latest.get(&system.id).map(|a| {
                json!({
                    "systemId": system.id,
                    "name": system.name,
                    "framework": a.framework.key(),
                    "score": a.score,
                    "risk": a.risk_bucket(),
                })
            })
        })
        .collect();
    rows.sort_by(|a, b| a["systemId"].as_str().cmp(&b["systemId"].as_str()));

    section(
        "system_scores",
        "System Scores",
        format!("Latest score for {} assessed systems.", rows.len()),
        serde_json::Value::Array(rows),
    )
}

fn risk_distribution(scope: &Scope<'_>) -> Section {
    let mut buckets = BTreeMap::new();
    for (label, bucket) in [
        ("high", RiskBucket::High),
        ("medium", RiskBucket::Medium),
        ("low", RiskBucket::Low),
    ] {
        let count = scope
            .assessments
            .iter()
            .filter(|a| a.risk_bucket() == bucket)
            .count();
        buckets.insert(label, count);
    }

    let mut declared: BTreeMap<String, usize> = BTreeMap::new();
    for system in scope.inputs.systems {
        let key = serde_json::to_value(system.risk_level)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        *declared.entry(key).or_default() += 1;
    }

    section(
        "risk_distribution",
        "Risk Distribution",
        format!(
            "{} high, {} medium and {} low risk assessments.",
            buckets["high"], buckets["medium"], buckets["low"]
        ),
        json!({ "scoreBands": buckets, "declaredRiskLevels": declared }),
    )
}

fn compliance_gaps(scope: &Scope<'_>) -> Section {
    let gaps: Vec<_> = scope
        .inputs
        .catalog
        .gaps_for(scope.filters.framework)
        .into_iter()
        .map(|g| {
            json!({
                "id": g.id,
                "framework": g.framework.key(),
                "title": g.title,
                "severity": g.severity,
                "remediation": g.remediation,
            })
        })
        .collect();

    section(
        "compliance_gaps",
        "Known Compliance Gaps",
        format!("{} known gaps apply.", gaps.len()),
        serde_json::Value::Array(gaps),
    )
}

fn regulatory_updates(scope: &Scope<'_>) -> Section {
    let mut updates: Vec<_> = scope
        .inputs
        .catalog
        .regulatory_updates
        .iter()
        .filter(|u| scope.filters.framework.map_or(true, |f| u.framework == f))
        .collect();
    updates.sort_by_key(|u| u.effective_date);

    let data: Vec<_> = updates
        .iter()
        .map(|u| {
            json!({
                "id": u.id,
                "framework": u.framework.key(),
                "title": u.title,
                "effectiveDate": u.effective_date.to_string(),
            })
        })
        .collect();

    section(
        "regulatory_updates",
        "Regulatory Updates",
        format!("{} regulatory milestones tracked.", data.len()),
        serde_json::Value::Array(data),
    )
}

fn predictions(scope: &Scope<'_>) -> Section {
    let mut by_system: Vec<_> = group_by_system(&scope.assessments).into_iter().collect();
    by_system.sort_by(|a, b| a.0.cmp(&b.0));

    let mut data = serde_json::Map::new();
    for (system_id, history) in &by_system {
        let forecast = predict_scores(system_id, history, PREDICTION_DAYS);
        if !forecast.is_empty() {
            data.insert(
                system_id.clone(),
                serde_json::to_value(&forecast).unwrap_or_default(),
            );
        }
    }

    let content = if data.is_empty() {
        "Not enough history to forecast any system.".to_string()
    } else {
        format!(
            "{}-day forecast for {} systems. Naive linear extrapolation; treat as indicative.",
            PREDICTION_DAYS,
            data.len()
        )
    };

    section(
        "predictions",
        "Score Predictions",
        content,
        serde_json::Value::Object(data),
    )
}

fn incident_summary(scope: &Scope<'_>) -> Section {
    let mut by_severity: BTreeMap<String, usize> = BTreeMap::new();
    for severity in [Severity::Critical, Severity::High, Severity::Medium, Severity::Low] {
        let count = scope
            .incidents
            .iter()
            .filter(|i| i.severity == severity)
            .count();
        by_severity.insert(severity.to_string().to_lowercase(), count);
    }
    let open = scope.incidents.iter().filter(|i| i.is_open()).count();

    section(
        "incident_summary",
        "Incident Summary",
        format!(
            "{} incidents reported in this period, {} still open.",
            scope.incidents.len(),
            open
        ),
        json!({
            "total": scope.incidents.len(),
            "open": open,
            "bySeverity": by_severity,
        }),
    )
}

fn incident_patterns(scope: &Scope<'_>) -> Section {
    let mut rows: Vec<(String, String, usize)> = scope
        .inputs
        .catalog
        .incident_patterns
        .iter()
        .map(|p| {
            let count = scope
                .incidents
                .iter()
                .filter(|i| i.category.eq_ignore_ascii_case(&p.category))
                .count();
            (p.id.clone(), p.title.clone(), count)
        })
        .filter(|(_, _, count)| *count > 0)
        .collect();
    rows.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));

    let data: Vec<_> = rows
        .iter()
        .map(|(id, title, count)| json!({ "pattern": id, "title": title, "incidents": count }))
        .collect();

    let content = match rows.first() {
        Some((_, title, count)) => format!("Most frequent pattern: {} ({} incidents).", title, count),
        None => "No reported incident matches a known pattern.".to_string(),
    };

    section(
        "incident_patterns",
        "Incident Patterns",
        content,
        serde_json::Value::Array(data),
    )
}

fn recommendations(scope: &Scope<'_>) -> Section {
    let top: Vec<_> = scope
        .inputs
        .recommendations
        .iter()
        .take(TOP_RECOMMENDATIONS)
        .map(|r| {
            json!({
                "id": r.id,
                "priority": r.priority,
                "category": r.category,
                "title": r.title,
            })
        })
        .collect();

    section(
        "recommendations",
        "Recommendations",
        format!("Top {} recommended actions.", top.len()),
        serde_json::Value::Array(top),
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analysis::aggregator::tests::assessment_at;
    use crate::models::{AssessmentStatus, Framework, RiskLevel, SystemStatus};
    use chrono::{Duration, TimeZone};

    pub(crate) fn sample_report(template: ReportTemplate) -> Report {
        let catalog = Catalog::builtin().unwrap();
        let systems = vec![AiSystem {
            id: "sys-1".to_string(),
            organization_id: "org".to_string(),
            name: "Credit scoring".to_string(),
            description: String::new(),
            risk_level: RiskLevel::High,
            status: SystemStatus::Active,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }];
        let assessments = vec![
            assessment_at("sys-1", Framework::EuAiAct, 35.0, AssessmentStatus::Failed, 20),
            assessment_at("sys-1", Framework::EuAiAct, 55.0, AssessmentStatus::InProgress, 10),
            assessment_at("sys-1", Framework::EuAiAct, 80.0, AssessmentStatus::Completed, 1),
        ];
        let inputs = ReportInputs {
            systems: &systems,
            assessments: &assessments,
            incidents: &[],
            recommendations: &[],
            catalog: &catalog,
            trend: TrendSettings::default(),
        };
        let end = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        build_report(
            template,
            ReportPeriod {
                start: end - Duration::days(90),
                end,
            },
            ReportFilters {
                framework: Some(Framework::EuAiAct),
            },
            None,
            &inputs,
            end,
        )
    }

    #[test]
    fn test_sections_follow_template_order() {
        for template in ReportTemplate::ALL {
            let report = sample_report(template);
            let names: Vec<_> = report.sections.iter().map(|s| s.name.as_str()).collect();
            assert_eq!(names, template.default_sections());
        }
    }

    #[test]
    fn test_unknown_section_is_placeholder() {
        let catalog = Catalog::default();
        let inputs = ReportInputs {
            systems: &[],
            assessments: &[],
            incidents: &[],
            recommendations: &[],
            catalog: &catalog,
            trend: TrendSettings::default(),
        };
        let now = Utc::now();
        let overrides = vec!["metrics".to_string(), "board_minutes".to_string()];
        let report = build_report(
            ReportTemplate::ExecutiveSummary,
            ReportPeriod { start: now, end: now },
            ReportFilters::default(),
            Some(overrides.as_slice()),
            &inputs,
            now,
        );

        assert_eq!(report.sections.len(), 2);
        let placeholder = &report.sections[1];
        assert_eq!(placeholder.title, "Board Minutes");
        assert!(placeholder.data.is_null());
        assert_eq!(report.sections[0].content, "No assessments in this period.");
    }

    #[test]
    fn test_period_and_framework_narrow_assessments() {
        let report = sample_report(ReportTemplate::ComplianceDetailed);
        assert_eq!(report.title, "Detailed Compliance Report (EU AI Act)");

        let metrics = &report.sections[1];
        assert_eq!(metrics.data["totalAssessments"], 3);
        assert_eq!(metrics.data["highRiskCount"], 1);
        assert_eq!(metrics.data["compliantCount"], 1);

        let gaps = report.sections[4].data.as_array().unwrap();
        assert!(gaps.iter().all(|g| g["framework"] == "eu_ai_act"));
    }

    #[test]
    fn test_predictions_section() {
        let report = sample_report(ReportTemplate::RiskAssessment);
        let predictions = &report.sections[2];
        assert_eq!(predictions.name, "predictions");
        let forecast = predictions.data["sys-1"].as_array().unwrap();
        assert_eq!(forecast.len(), 4);
    }
}
