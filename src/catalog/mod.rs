//! Static compliance content: framework metadata, known gaps, incident
//! patterns and regulatory updates.
//!
//! The catalog is configuration data. A built-in copy is compiled in and
//! can be replaced with a TOML file at runtime.

use crate::analysis::FrameworkComparison;
use crate::models::{Framework, Severity};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

const BUILTIN_CATALOG: &str = include_str!("default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkInfo {
    pub framework: Framework,
    pub name: String,
    pub code: String,
    pub requirements: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceGap {
    pub id: String,
    pub framework: Framework,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub remediation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentPattern {
    pub id: String,
    /// Matched against `Incident::category`.
    pub category: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub prevention: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegulatoryUpdate {
    pub id: String,
    pub framework: Framework,
    pub title: String,
    pub effective_date: NaiveDate,
    pub summary: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub frameworks: Vec<FrameworkInfo>,
    #[serde(default)]
    pub gaps: Vec<ComplianceGap>,
    #[serde(default)]
    pub incident_patterns: Vec<IncidentPattern>,
    #[serde(default)]
    pub regulatory_updates: Vec<RegulatoryUpdate>,
}

impl Catalog {
    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::parse(BUILTIN_CATALOG).context("Failed to parse built-in catalog")
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a catalog from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse catalog: {}", path.display()))
    }

    pub fn framework(&self, framework: Framework) -> Option<&FrameworkInfo> {
        self.frameworks.iter().find(|f| f.framework == framework)
    }

    /// Use the catalog's display names for comparison rows.
    pub fn label_frameworks(&self, rows: &mut [FrameworkComparison]) {
        for row in rows {
            if let Some(info) = self.framework(row.framework) {
                row.framework_name = info.name.clone();
            }
        }
    }

    /// Known gaps, optionally restricted to one framework.
    pub fn gaps_for(&self, framework: Option<Framework>) -> Vec<&ComplianceGap> {
        self.gaps
            .iter()
            .filter(|g| framework.map_or(true, |f| g.framework == f))
            .collect()
    }

    pub fn pattern_for_category(&self, category: &str) -> Option<&IncidentPattern> {
        self.incident_patterns
            .iter()
            .find(|p| p.category.eq_ignore_ascii_case(category))
    }

    pub fn updates_for(&self, framework: Framework) -> Vec<&RegulatoryUpdate> {
        self.regulatory_updates
            .iter()
            .filter(|u| u.framework == framework)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_parses() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.frameworks.len(), 3);
        for framework in Framework::ALL {
            assert!(catalog.framework(framework).is_some(), "{}", framework);
            assert!(!catalog.gaps_for(Some(framework)).is_empty(), "{}", framework);
        }
        assert!(!catalog.incident_patterns.is_empty());
    }

    #[test]
    fn test_label_frameworks() {
        use crate::analysis::aggregator::tests::assessment_at;
        use crate::analysis::compare_frameworks;
        use crate::models::AssessmentStatus;

        let catalog = Catalog::builtin().unwrap();
        let mut rows = compare_frameworks(&[assessment_at(
            "a",
            Framework::Tc260,
            50.0,
            AssessmentStatus::Completed,
            1,
        )]);
        catalog.label_frameworks(&mut rows);
        assert_eq!(rows[0].framework_name, "TC260 AI Safety Governance");
    }

    #[test]
    fn test_gaps_filter() {
        let catalog = Catalog::builtin().unwrap();
        let all = catalog.gaps_for(None).len();
        let eu = catalog.gaps_for(Some(Framework::EuAiAct));
        assert!(eu.len() < all);
        assert!(eu.iter().all(|g| g.framework == Framework::EuAiAct));
    }

    #[test]
    fn test_pattern_lookup_is_case_insensitive() {
        let catalog = Catalog::builtin().unwrap();
        assert!(catalog.pattern_for_category("PRIVACY").is_some());
        assert!(catalog.pattern_for_category("weather").is_none());
    }

    #[test]
    fn test_custom_catalog() {
        let content = r#"
[[gaps]]
id = "custom"
framework = "tc260"
title = "Custom gap"
description = "d"
severity = "low"
remediation = "r"
"#;
        let catalog = Catalog::parse(content).unwrap();
        assert_eq!(catalog.gaps.len(), 1);
        assert!(catalog.frameworks.is_empty());
    }
}
