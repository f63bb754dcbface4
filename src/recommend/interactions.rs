//! Per-user interaction tracking and preference validation.
//!
//! Every function here validates before it builds a new record, so a
//! rejected input never reaches the store.

use super::{Category, Feedback, InteractionRecord};
use crate::error::{ensure_range, ServiceError};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

pub const MIN_SNOOZE_DAYS: i64 = 1;
pub const MAX_SNOOZE_DAYS: i64 = 90;
pub const MAX_COMMENT_LEN: usize = 1000;

/// A user action on one recommendation.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionAction {
    View,
    Dismiss,
    Snooze { days: i64 },
    Feedback {
        feedback: Feedback,
        comment: Option<String>,
    },
}

impl InteractionAction {
    pub fn name(&self) -> &'static str {
        match self {
            InteractionAction::View => "recommendation.viewed",
            InteractionAction::Dismiss => "recommendation.dismissed",
            InteractionAction::Snooze { .. } => "recommendation.snoozed",
            InteractionAction::Feedback { .. } => "recommendation.feedback",
        }
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        match self {
            InteractionAction::Snooze { days } => {
                ensure_range("snoozeDays", *days, MIN_SNOOZE_DAYS, MAX_SNOOZE_DAYS)
            }
            InteractionAction::Feedback {
                comment: Some(comment),
                ..
            } if comment.chars().count() > MAX_COMMENT_LEN => Err(ServiceError::Validation(
                format!("comment must be at most {} characters", MAX_COMMENT_LEN),
            )),
            _ => Ok(()),
        }
    }
}

/// Fold `action` into the existing record (or a fresh one).
pub fn apply_action(
    existing: Option<InteractionRecord>,
    user_id: &str,
    recommendation_id: &str,
    action: &InteractionAction,
    now: DateTime<Utc>,
) -> Result<InteractionRecord, ServiceError> {
    action.validate()?;

    if recommendation_id.trim().is_empty() {
        return Err(ServiceError::Validation(
            "recommendationId must not be empty".to_string(),
        ));
    }

    let mut record =
        existing.unwrap_or_else(|| InteractionRecord::new(user_id, recommendation_id, now));

    match action {
        InteractionAction::View => {
            record.viewed_at.get_or_insert(now);
        }
        InteractionAction::Dismiss => {
            record.dismissed_at = Some(now);
        }
        InteractionAction::Snooze { days } => {
            record.snoozed_until = Some(now + Duration::days(*days));
        }
        InteractionAction::Feedback { feedback, comment } => {
            record.feedback = Some(*feedback);
            record.feedback_comment = comment.clone();
        }
    }
    record.updated_at = now;

    Ok(record)
}

/// Check every weight lies in `[0, 100]`.
pub fn validate_weights(
    weights: &BTreeMap<Category, i64>,
) -> Result<BTreeMap<Category, u8>, ServiceError> {
    if weights.is_empty() {
        return Err(ServiceError::Validation(
            "at least one category weight is required".to_string(),
        ));
    }

    let mut validated = BTreeMap::new();
    for (category, &weight) in weights {
        ensure_range(category.key(), weight, 0, 100)?;
        validated.insert(*category, weight as u8);
    }

    Ok(validated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_snooze_bounds() {
        assert_ok!(InteractionAction::Snooze { days: 1 }.validate());
        assert_ok!(InteractionAction::Snooze { days: 90 }.validate());
        assert_err!(InteractionAction::Snooze { days: 0 }.validate());
        assert_err!(InteractionAction::Snooze { days: 91 }.validate());
    }

    #[test]
    fn test_snooze_sets_deadline() {
        let now = Utc::now();
        let record = apply_action(None, "u", "r", &InteractionAction::Snooze { days: 7 }, now)
            .unwrap();
        assert_eq!(record.snoozed_until, Some(now + Duration::days(7)));
        assert!(record.is_hidden(now));
    }

    #[test]
    fn test_view_keeps_first_timestamp() {
        let first = Utc::now();
        let record = apply_action(None, "u", "r", &InteractionAction::View, first).unwrap();
        let later = first + Duration::hours(1);
        let record = apply_action(Some(record), "u", "r", &InteractionAction::View, later).unwrap();
        assert_eq!(record.viewed_at, Some(first));
        assert_eq!(record.updated_at, later);
    }

    #[test]
    fn test_feedback_comment_length() {
        let action = InteractionAction::Feedback {
            feedback: Feedback::NotHelpful,
            comment: Some("x".repeat(MAX_COMMENT_LEN + 1)),
        };
        assert_err!(apply_action(None, "u", "r", &action, Utc::now()));

        let action = InteractionAction::Feedback {
            feedback: Feedback::Helpful,
            comment: Some("useful".to_string()),
        };
        let record = assert_ok!(apply_action(None, "u", "r", &action, Utc::now()));
        assert_eq!(record.feedback, Some(Feedback::Helpful));
    }

    #[test]
    fn test_weight_bounds() {
        let mut weights = BTreeMap::new();
        weights.insert(Category::ComplianceGap, 0);
        weights.insert(Category::BestPractice, 100);
        let validated = assert_ok!(validate_weights(&weights));
        assert_eq!(validated[&Category::BestPractice], 100);

        weights.insert(Category::RiskMitigation, 101);
        assert_err!(validate_weights(&weights));

        let mut weights = BTreeMap::new();
        weights.insert(Category::RiskMitigation, -1);
        assert_err!(validate_weights(&weights));

        assert_err!(validate_weights(&BTreeMap::new()));
    }
}
