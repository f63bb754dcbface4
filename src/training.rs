//! Course completion analytics.

use crate::models::{Course, Enrollment, EnrollmentStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRate {
    pub course_id: String,
    pub course_title: String,
    pub enrolled: usize,
    pub completed: usize,
    pub in_progress: usize,
    /// Percentage of enrollments completed, one decimal.
    pub completion_rate: f64,
    /// Mean progress across enrollments, one decimal.
    pub average_progress: f64,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Completion figures for `course` over the given enrollments.
///
/// Enrollments for other courses are ignored. A course with no enrollments
/// reports zero rates.
pub fn completion_rate(course: &Course, enrollments: &[Enrollment]) -> CompletionRate {
    let mut enrolled = 0;
    let mut completed = 0;
    let mut in_progress = 0;
    let mut progress_total = 0u64;

    for enrollment in enrollments.iter().filter(|e| e.course_id == course.id) {
        enrolled += 1;
        match enrollment.status {
            EnrollmentStatus::Completed => completed += 1,
            EnrollmentStatus::InProgress => in_progress += 1,
            EnrollmentStatus::Enrolled => {}
        }
        // A completed enrollment counts as full progress even if the stored
        // percentage lags behind.
        progress_total += if enrollment.status == EnrollmentStatus::Completed {
            100
        } else {
            u64::from(enrollment.progress.min(100))
        };
    }

    let (completion_rate, average_progress) = if enrolled == 0 {
        (0.0, 0.0)
    } else {
        (
            round1(completed as f64 / enrolled as f64 * 100.0),
            round1(progress_total as f64 / enrolled as f64),
        )
    };

    CompletionRate {
        course_id: course.id.clone(),
        course_title: course.title.clone(),
        enrolled,
        completed,
        in_progress,
        completion_rate,
        average_progress,
    }
}

/// Completion figures for every course, sorted by course id.
pub fn completion_rates(courses: &[Course], enrollments: &[Enrollment]) -> Vec<CompletionRate> {
    let mut rates: Vec<CompletionRate> = courses
        .iter()
        .map(|course| completion_rate(course, enrollments))
        .collect();
    rates.sort_by(|a, b| a.course_id.cmp(&b.course_id));
    rates
}
