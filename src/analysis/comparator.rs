//! Per-framework comparison.
//!
//! Groups assessments by framework and ranks frameworks by average score.
//! Both the average score and the compliant percentage are maintained as
//! incremental means, `(avg * n + x) / (n + 1)`, with `n` the number of
//! assessments folded in before `x`.

use crate::models::{Assessment, Framework};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// One ranked row of the framework comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkComparison {
    pub framework: Framework,
    pub framework_name: String,
    pub assessment_count: usize,
    pub systems_assessed: usize,
    pub average_score: f64,
    pub compliant_percentage: f64,
}

#[derive(Default)]
struct RunningStats {
    count: usize,
    average: f64,
    compliant_pct: f64,
    systems: HashSet<String>,
}

impl RunningStats {
    fn push(&mut self, assessment: &Assessment) {
        let n = self.count as f64;
        let compliant = if assessment.is_compliant() { 100.0 } else { 0.0 };

        self.average = (self.average * n + assessment.score) / (n + 1.0);
        self.compliant_pct = (self.compliant_pct * n + compliant) / (n + 1.0);
        self.count += 1;
        self.systems.insert(assessment.system_id.clone());
    }
}

/// Compare frameworks, best average score first.
pub fn compare_frameworks(assessments: &[Assessment]) -> Vec<FrameworkComparison> {
    let mut stats: BTreeMap<Framework, RunningStats> = BTreeMap::new();

    for assessment in assessments {
        stats.entry(assessment.framework).or_default().push(assessment);
    }

    let mut rows: Vec<FrameworkComparison> = stats
        .into_iter()
        .map(|(framework, s)| FrameworkComparison {
            framework,
            framework_name: framework.to_string(),
            assessment_count: s.count,
            systems_assessed: s.systems.len(),
            average_score: round2(s.average),
            compliant_percentage: round2(s.compliant_pct),
        })
        .collect();

    rows.sort_by(|a, b| {
        b.average_score
            .partial_cmp(&a.average_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.framework.cmp(&b.framework))
    });

    rows
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
