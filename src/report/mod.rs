//! Report assembly and export.
//!
//! A report is a template's ordered list of named sections, each built
//! independently from the organization's data. Exporters serialize the
//! finished report; they never query anything themselves.

pub mod builder;
pub mod generator;
pub mod pdf;

pub use builder::{build_report, ReportInputs};
pub use generator::write_report;

use crate::models::Framework;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of report templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportTemplate {
    ExecutiveSummary,
    ComplianceDetailed,
    RiskAssessment,
    FrameworkComparison,
    IncidentAnalysis,
}

impl ReportTemplate {
    pub const ALL: [ReportTemplate; 5] = [
        ReportTemplate::ExecutiveSummary,
        ReportTemplate::ComplianceDetailed,
        ReportTemplate::RiskAssessment,
        ReportTemplate::FrameworkComparison,
        ReportTemplate::IncidentAnalysis,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ReportTemplate::ExecutiveSummary => "executive_summary",
            ReportTemplate::ComplianceDetailed => "compliance_detailed",
            ReportTemplate::RiskAssessment => "risk_assessment",
            ReportTemplate::FrameworkComparison => "framework_comparison",
            ReportTemplate::IncidentAnalysis => "incident_analysis",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ReportTemplate::ExecutiveSummary => "Executive Summary",
            ReportTemplate::ComplianceDetailed => "Detailed Compliance Report",
            ReportTemplate::RiskAssessment => "Risk Assessment",
            ReportTemplate::FrameworkComparison => "Framework Comparison",
            ReportTemplate::IncidentAnalysis => "Incident Analysis",
        }
    }

    /// Built-in section order.
    pub fn default_sections(&self) -> &'static [&'static str] {
        match self {
            ReportTemplate::ExecutiveSummary => {
                &["overview", "metrics", "framework_comparison", "recommendations"]
            }
            ReportTemplate::ComplianceDetailed => &[
                "overview",
                "metrics",
                "system_scores",
                "framework_comparison",
                "compliance_gaps",
                "regulatory_updates",
            ],
            ReportTemplate::RiskAssessment => &[
                "metrics",
                "risk_distribution",
                "predictions",
                "incident_summary",
                "recommendations",
            ],
            ReportTemplate::FrameworkComparison => {
                &["framework_comparison", "compliance_gaps", "regulatory_updates"]
            }
            ReportTemplate::IncidentAnalysis => {
                &["incident_summary", "incident_patterns", "recommendations"]
            }
        }
    }
}

impl fmt::Display for ReportTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for ReportTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        ReportTemplate::ALL
            .into_iter()
            .find(|t| t.key() == normalized)
            .ok_or_else(|| format!("unknown report template: {}", s))
    }
}

/// Output format for a generated report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Csv,
    Json,
    Markdown,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Markdown => "md",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportPeriod {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFilters {
    #[serde(default)]
    pub framework: Option<Framework>,
}

/// One rendered block of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub title: String,
    pub template: ReportTemplate,
    pub framework: Option<Framework>,
    pub generated_at: DateTime<Utc>,
    pub period: ReportPeriod,
    pub filters: ReportFilters,
    #[serde(rename = "content")]
    pub sections: Vec<Section>,
}

/// Flatten a JSON value into `(key, value)` pairs.
///
/// Object keys are joined with `.` and array items indexed as `[i]`.
/// Strings are emitted without quotes; null becomes an empty string.
pub fn flatten_data(data: &serde_json::Value) -> Vec<(String, String)> {
    let mut rows = Vec::new();
    flatten_into(String::new(), data, &mut rows);
    rows
}

fn flatten_into(prefix: String, value: &serde_json::Value, rows: &mut Vec<(String, String)>) {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(path, child, rows);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten_into(format!("{}[{}]", prefix, i), child, rows);
            }
        }
        Value::Null => {
            if !prefix.is_empty() {
                rows.push((prefix, String::new()));
            }
        }
        Value::String(s) => rows.push((prefix, s.clone())),
        other => rows.push((prefix, other.to_string())),
    }
}
