//! Append-only audit trail.
//!
//! Every successful mutation in the service layer records an `AuditEntry`.
//! Backends implement `AuditLog`; see `storage` for the shipped ones.

pub mod storage;

pub use storage::{JsonlAuditLog, MemoryAuditLog};

use crate::error::AuditError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default number of entries the in-memory log retains.
pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub user: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Dotted action name, e.g. `recommendation.dismissed`.
    pub action: String,
    pub resource: String,
    pub resource_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub changes: serde_json::Value,
}

impl AuditEntry {
    pub fn new(
        user: impl Into<String>,
        organization_id: Option<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
        resource_id: impl Into<String>,
        changes: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user: user.into(),
            organization_id,
            action: action.into(),
            resource: resource.into(),
            resource_id: resource_id.into(),
            timestamp: Utc::now(),
            changes,
        }
    }
}

/// Query over the audit trail. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub user: Option<String>,
    pub organization_id: Option<String>,
    pub action: Option<String>,
    pub resource: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    /// Entries of one organization logged before `cutoff`.
    pub fn archivable(
        organization_id: &str,
        cutoff: DateTime<Utc>,
    ) -> impl Fn(&AuditEntry) -> bool + '_ {
        move |entry: &AuditEntry| {
            entry.organization_id.as_deref() == Some(organization_id) && entry.timestamp < cutoff
        }
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(ref user) = self.user {
            if &entry.user != user {
                return false;
            }
        }
        if let Some(ref org) = self.organization_id {
            if entry.organization_id.as_ref() != Some(org) {
                return false;
            }
        }
        if let Some(ref action) = self.action {
            if &entry.action != action {
                return false;
            }
        }
        if let Some(ref resource) = self.resource {
            if &entry.resource != resource {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp > until {
                return false;
            }
        }
        true
    }

    /// Matching entries, newest first, truncated to `limit`.
    pub fn apply<'a>(&self, entries: impl Iterator<Item = &'a AuditEntry>) -> Vec<AuditEntry> {
        let mut results: Vec<AuditEntry> = entries.filter(|e| self.matches(e)).cloned().collect();
        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = self.limit {
            results.truncate(limit);
        }
        results
    }
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn log_event(&self, entry: AuditEntry) -> Result<(), AuditError>;

    async fn get_logs(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, AuditError>;

    /// Remove `organization_id`'s entries older than `cutoff`; returns how
    /// many were removed. Other organizations' entries are never touched.
    async fn archive_older(
        &self,
        organization_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, AuditError>;
}

/// Render entries as CSV with every field quoted.
pub fn export_csv(entries: &[AuditEntry]) -> Result<String, AuditError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(vec![]);

    writer.write_record([
        "ID",
        "Timestamp",
        "User",
        "Organization",
        "Action",
        "Resource",
        "Resource ID",
        "Changes",
    ])?;

    for entry in entries {
        writer.write_record([
            entry.id.to_string(),
            entry.timestamp.to_rfc3339(),
            entry.user.clone(),
            entry.organization_id.clone().unwrap_or_default(),
            entry.action.clone(),
            entry.resource.clone(),
            entry.resource_id.clone(),
            entry.changes.to_string(),
        ])?;
    }

    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn entry(user: &str, action: &str, minutes_ago: i64) -> AuditEntry {
        let mut entry = AuditEntry::new(
            user,
            Some("org".to_string()),
            action,
            "recommendation",
            "rec-1",
            json!({"snoozeDays": 7}),
        );
        entry.timestamp = Utc::now() - Duration::minutes(minutes_ago);
        entry
    }

    #[test]
    fn test_filter_matches_and_orders_newest_first() {
        let entries = vec![
            entry("u1", "recommendation.viewed", 30),
            entry("u2", "recommendation.viewed", 20),
            entry("u1", "recommendation.dismissed", 10),
        ];

        let filter = AuditFilter {
            user: Some("u1".to_string()),
            ..Default::default()
        };
        let results = filter.apply(entries.iter());
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].action, "recommendation.dismissed");

        let filter = AuditFilter {
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(filter.apply(entries.iter())[0].user, "u1");
    }

    #[test]
    fn test_filter_by_organization() {
        let mut other = entry("u3", "system.registered", 5);
        other.organization_id = Some("other".to_string());
        let filter = AuditFilter {
            organization_id: Some("org".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&other));
        assert!(filter.matches(&entry("u1", "system.registered", 5)));
    }

    #[test]
    fn test_export_csv_quotes_every_field() {
        let csv = export_csv(&[entry("u1", "recommendation.snoozed", 0)]).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("\"ID\",\"Timestamp\""));
        let row = lines.next().unwrap();
        assert!(row.contains("\"recommendation.snoozed\""));
        assert!(row.contains("\"{\"\"snoozeDays\"\":7}\""));
    }
}
