//! Naive score forecasting.
//!
//! A linear extrapolation from the first and last historical scores. It is
//! not a statistical model; confidence simply decays with the horizon.

use crate::models::{Assessment, MAX_SCORE, MIN_SCORE};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Fewest historical points that produce a forecast.
pub const MIN_HISTORY: usize = 3;
/// Forecast step in days.
pub const STEP_DAYS: i64 = 7;
/// Confidence never drops below this.
pub const CONFIDENCE_FLOOR: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorePrediction {
    pub system_id: String,
    pub date: DateTime<Utc>,
    pub days_ahead: i64,
    pub predicted_score: u32,
    pub confidence: f64,
}

/// Project one system's score forward in 7-day steps up to `days_ahead`.
///
/// Returns an empty list when fewer than three points are available.
pub fn predict_scores(system_id: &str, history: &[Assessment], days_ahead: i64) -> Vec<ScorePrediction> {
    if history.len() < MIN_HISTORY || days_ahead < STEP_DAYS {
        return Vec::new();
    }

    let mut ordered: Vec<&Assessment> = history.iter().collect();
    ordered.sort_by_key(|a| a.assessed_at);

    let n = ordered.len() as f64;
    let average = ordered.iter().map(|a| a.score).sum::<f64>() / n;
    let first = ordered[0].score;
    let last_point = ordered[ordered.len() - 1];
    let trend = (last_point.score - first) / n;

    let mut predictions = Vec::new();
    let mut day = STEP_DAYS;
    while day <= days_ahead {
        let steps = (day / STEP_DAYS) as f64;
        let projected = (average + trend * steps).clamp(MIN_SCORE, MAX_SCORE);
        let decay = 1.0 - (day as f64 / days_ahead as f64) * 0.5;
        let confidence = (decay.max(CONFIDENCE_FLOOR) * 100.0).round() / 100.0;

        predictions.push(ScorePrediction {
            system_id: system_id.to_string(),
            date: last_point.assessed_at + Duration::days(day),
            days_ahead: day,
            predicted_score: projected.round() as u32,
            confidence,
        });

        day += STEP_DAYS;
    }

    predictions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregator::tests::assessment_at;
    use crate::models::{AssessmentStatus, Framework};

    fn history(scores_oldest_first: &[f64]) -> Vec<Assessment> {
        let len = scores_oldest_first.len() as i64;
        scores_oldest_first
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                assessment_at(
                    "sys",
                    Framework::EuAiAct,
                    s,
                    AssessmentStatus::Completed,
                    (len - i as i64) * 7,
                )
            })
            .collect()
    }

    #[test]
    fn test_too_little_history() {
        assert!(predict_scores("sys", &[], 30).is_empty());
        assert!(predict_scores("sys", &history(&[50.0, 60.0]), 30).is_empty());
    }

    #[test]
    fn test_linear_projection() {
        // avg 60, trend (70 - 50) / 3
        let predictions = predict_scores("sys", &history(&[50.0, 60.0, 70.0]), 28);
        assert_eq!(predictions.len(), 4);
        assert_eq!(predictions[0].days_ahead, 7);
        assert_eq!(predictions[0].predicted_score, 67);
        assert_eq!(predictions[3].days_ahead, 28);
        assert_eq!(predictions[3].predicted_score, 87);
    }

    #[test]
    fn test_confidence_decay() {
        let predictions = predict_scores("sys", &history(&[50.0, 60.0, 70.0]), 28);
        assert_eq!(predictions[0].confidence, 0.88);
        assert_eq!(predictions[1].confidence, 0.75);
        assert_eq!(predictions[3].confidence, 0.5);
        for window in predictions.windows(2) {
            assert!(window[0].confidence >= window[1].confidence);
        }
    }

    #[test]
    fn test_projection_is_clamped() {
        let predictions = predict_scores("sys", &history(&[10.0, 60.0, 100.0]), 90);
        assert!(predictions.iter().all(|p| p.predicted_score <= 100));
        assert_eq!(predictions.last().map(|p| p.predicted_score), Some(100));

        let predictions = predict_scores("sys", &history(&[100.0, 40.0, 0.0]), 90);
        assert_eq!(predictions.last().map(|p| p.predicted_score), Some(0));
    }

    #[test]
    fn test_dates_follow_last_point() {
        let points = history(&[50.0, 60.0, 70.0]);
        let last = points.iter().map(|a| a.assessed_at).max().unwrap();
        let predictions = predict_scores("sys", &points, 14);
        assert_eq!(predictions[1].date, last + Duration::days(14));
    }
}
