//! Assessment aggregation and statistics.
//!
//! This module computes the metrics snapshot (average score, risk buckets,
//! compliance counts, trend direction) and a few grouping helpers reused by
//! the recommendation engine and report sections.

use crate::models::{Assessment, RiskBucket};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Direction of recent scores relative to the preceding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    #[default]
    Stable,
    Declining,
}

/// Parameters of the trend comparison.
#[derive(Debug, Clone, Copy)]
pub struct TrendSettings {
    /// Number of scores in each comparison window.
    pub window: usize,
    /// Minimum mean difference before a trend is reported.
    pub threshold: f64,
}

impl Default for TrendSettings {
    fn default() -> Self {
        Self {
            window: 10,
            threshold: 5.0,
        }
    }
}

/// Aggregate metrics over a set of assessments.
///
/// An empty snapshot has `has_data == false`; zero counts then mean
/// "nothing assessed", not "fully compliant".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub has_data: bool,
    pub total_assessments: usize,
    pub average_score: u32,
    pub high_risk_count: usize,
    pub medium_risk_count: usize,
    pub low_risk_count: usize,
    pub compliant_count: usize,
    pub non_compliant_count: usize,
    pub trend: Trend,
}

/// Compute the metrics snapshot for a set of assessments.
pub fn compute_metrics(assessments: &[Assessment], settings: TrendSettings) -> MetricsSnapshot {
    if assessments.is_empty() {
        return MetricsSnapshot::default();
    }

    let mut snapshot = MetricsSnapshot {
        has_data: true,
        total_assessments: assessments.len(),
        ..Default::default()
    };

    let mut sum = 0.0;
    for assessment in assessments {
        sum += assessment.score;
        match assessment.risk_bucket() {
            RiskBucket::High => snapshot.high_risk_count += 1,
            RiskBucket::Medium => snapshot.medium_risk_count += 1,
            RiskBucket::Low => snapshot.low_risk_count += 1,
        }
        if assessment.is_compliant() {
            snapshot.compliant_count += 1;
        }
    }

    snapshot.non_compliant_count = snapshot.total_assessments - snapshot.compliant_count;
    snapshot.average_score = (sum / assessments.len() as f64).round() as u32;
    snapshot.trend = compute_trend(assessments, settings);

    snapshot
}

/// Compare the mean of the newest `window` scores against the `window`
/// scores before them.
pub fn compute_trend(assessments: &[Assessment], settings: TrendSettings) -> Trend {
    let mut ordered: Vec<&Assessment> = assessments.iter().collect();
    ordered.sort_by(|a, b| b.assessed_at.cmp(&a.assessed_at));

    let window = settings.window.max(1);
    let recent: Vec<f64> = ordered.iter().take(window).map(|a| a.score).collect();
    let prior: Vec<f64> = ordered
        .iter()
        .skip(window)
        .take(window)
        .map(|a| a.score)
        .collect();

    if recent.is_empty() || prior.is_empty() {
        return Trend::Stable;
    }

    let delta = mean(&recent) - mean(&prior);
    if delta > settings.threshold {
        Trend::Improving
    } else if delta < -settings.threshold {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Group assessments by system, oldest first within each system.
pub fn group_by_system(assessments: &[Assessment]) -> HashMap<String, Vec<Assessment>> {
    let mut grouped: HashMap<String, Vec<Assessment>> = HashMap::new();

    for assessment in assessments {
        grouped
            .entry(assessment.system_id.clone())
            .or_default()
            .push(assessment.clone());
    }

    for history in grouped.values_mut() {
        history.sort_by_key(|a| a.assessed_at);
    }

    grouped
}

/// Most recent assessment per system.
pub fn latest_by_system(assessments: &[Assessment]) -> HashMap<String, Assessment> {
    let mut latest: HashMap<String, Assessment> = HashMap::new();

    for assessment in assessments {
        match latest.get(&assessment.system_id) {
            Some(existing) if existing.assessed_at >= assessment.assessed_at => {}
            _ => {
                latest.insert(assessment.system_id.clone(), assessment.clone());
            }
        }
    }

    latest
}
