//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values. Every procedure subcommand
//! is translated into the same method name and JSON params an RPC
//! transport would carry.

use crate::config::VoterKind;
use crate::council::StrategyKind;
use crate::models::{AssessmentStatus, Framework, RiskLevel};
use crate::recommend::{Category, Feedback, Priority};
use crate::report::{ExportFormat, ReportTemplate};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::path::PathBuf;

/// ComplianceIQ - compliance analytics for AI systems
///
/// Track assessments against the EU AI Act, NIST AI RMF and TC260, get
/// prioritized recommendations, convene council reviews and export reports.
///
/// Examples:
///   complianceiq init-config
///   complianceiq --user alice --org acme register "Resume screener" --risk-level high
///   complianceiq --user alice --org acme metrics --framework eu_ai_act
///   complianceiq --user alice --org acme recommend --fail-on critical
///   complianceiq --user alice --org acme report executive_summary --format pdf
///   echo '{"method":"analytics.getComplianceGaps"}' | complianceiq rpc
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Acting user id
    #[arg(long, global = true, env = "COMPLIANCEIQ_USER", requires = "org")]
    pub user: Option<String>,

    /// Organization of the acting user
    #[arg(long, global = true, env = "COMPLIANCEIQ_ORG", requires = "user")]
    pub org: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .complianceiq.toml in the current directory
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// JSON dataset file (overrides general.data_file)
    #[arg(long, global = true, value_name = "FILE")]
    pub data: Option<PathBuf>,

    /// Gap/pattern catalog (overrides the built-in catalog)
    #[arg(long, global = true, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// JSONL audit log file (overrides audit.path)
    #[arg(long, global = true, value_name = "FILE")]
    pub audit_log: Option<PathBuf>,

    /// How council votes are produced
    #[arg(long, global = true, value_name = "VOTER")]
    pub voter: Option<VoterKind>,

    /// Council voting strategy
    #[arg(long, global = true, value_name = "STRATEGY")]
    pub strategy: Option<StrategyKind>,

    /// Ollama model used by the ollama voter
    #[arg(long, global = true, env = "COMPLIANCEIQ_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, global = true, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Aggregate metrics for the organization
    Metrics {
        #[arg(long)]
        framework: Option<Framework>,
        /// First day included (YYYY-MM-DD)
        #[arg(long)]
        since: Option<NaiveDate>,
        /// Last day included (YYYY-MM-DD)
        #[arg(long)]
        until: Option<NaiveDate>,
    },

    /// Rank frameworks by average score
    Compare {
        #[arg(long)]
        since: Option<NaiveDate>,
        #[arg(long)]
        until: Option<NaiveDate>,
    },

    /// List known compliance gaps
    Gaps {
        #[arg(long)]
        framework: Option<Framework>,
    },

    /// Incident patterns with occurrence counts
    Patterns,

    /// Forecast a system's scores
    Predict {
        system_id: String,
        /// Horizon in days (7-365)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Prioritized recommendations
    Recommend {
        #[arg(long)]
        category: Option<Category>,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long)]
        limit: Option<usize>,
        /// Include dismissed and snoozed items
        #[arg(long)]
        include_dismissed: bool,
        /// Incident-prevention advice without signing in
        #[arg(long, conflicts_with_all = ["category", "priority", "include_dismissed"])]
        public: bool,
        /// Exit with code 2 when a recommendation at or above this priority is returned
        #[arg(long, value_name = "LEVEL")]
        fail_on: Option<FailOnLevel>,
    },

    /// Mark a recommendation as viewed
    View { recommendation_id: String },

    /// Dismiss a recommendation
    Dismiss { recommendation_id: String },

    /// Hide a recommendation for a number of days (1-90)
    Snooze {
        recommendation_id: String,
        #[arg(long)]
        days: i64,
    },

    /// Leave feedback on a recommendation
    Feedback {
        recommendation_id: String,
        #[arg(long)]
        feedback: Feedback,
        #[arg(long)]
        comment: Option<String>,
    },

    /// Show or update category weights
    ///
    /// Example: complianceiq weights --set risk_mitigation=80 --set best_practice=20
    Weights {
        #[arg(long = "set", value_name = "CATEGORY=WEIGHT", value_parser = parse_weight)]
        set: Vec<(Category, i64)>,
    },

    /// Register an AI system
    Register {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        risk_level: RiskLevel,
    },

    /// Archive an AI system
    Archive { system_id: String },

    /// Record an assessment result
    Assess {
        system_id: String,
        #[arg(long)]
        framework: Framework,
        #[arg(long)]
        score: f64,
        #[arg(long, default_value = "completed")]
        status: AssessmentStatus,
    },

    /// Convene the council on an incident
    Convene { incident_id: String },

    /// Show a council session
    Session { session_id: String },

    /// Training completion rates
    Completion {
        #[arg(long)]
        course: Option<String>,
    },

    /// Generate and export a report
    Report {
        template: ReportTemplate,
        /// First day of the period (YYYY-MM-DD)
        #[arg(long)]
        since: Option<NaiveDate>,
        /// Last day of the period (YYYY-MM-DD, default today)
        #[arg(long)]
        until: Option<NaiveDate>,
        /// Period length when --since is not given
        #[arg(long, default_value = "90")]
        days: i64,
        #[arg(long)]
        framework: Option<Framework>,
        /// Export format (default from config)
        #[arg(long)]
        format: Option<ExportFormat>,
        /// Output file (default derived from template and date)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Query the audit log
    Audit {
        /// Only entries by this user
        #[arg(long)]
        by: Option<String>,
        #[arg(long)]
        action: Option<String>,
        #[arg(long)]
        resource: Option<String>,
        #[arg(long)]
        since: Option<NaiveDate>,
        #[arg(long)]
        limit: Option<usize>,
        /// Write the entries as CSV instead of printing JSON
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
    },

    /// Archive audit entries older than a number of days
    ArchiveAudit {
        #[arg(long)]
        older_than_days: i64,
    },

    /// Read one JSON request from a file or stdin and print the response
    Rpc {
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// List procedure names
    Methods,

    /// Generate a default .complianceiq.toml and an empty dataset
    InitConfig,
}

/// Priority threshold for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FailOnLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl From<FailOnLevel> for Priority {
    fn from(level: FailOnLevel) -> Self {
        match level {
            FailOnLevel::Low => Priority::Low,
            FailOnLevel::Medium => Priority::Medium,
            FailOnLevel::High => Priority::High,
            FailOnLevel::Critical => Priority::Critical,
        }
    }
}

fn parse_weight(s: &str) -> Result<(Category, i64), String> {
    let (category, weight) = s
        .split_once('=')
        .ok_or_else(|| format!("expected CATEGORY=WEIGHT, got {}", s))?;
    let weight = weight
        .trim()
        .parse::<i64>()
        .map_err(|e| format!("invalid weight {}: {}", weight, e))?;
    Ok((category.parse()?, weight))
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

fn end_of(day: NaiveDate) -> DateTime<Utc> {
    start_of(day) + Duration::days(1) - Duration::seconds(1)
}

/// Insert `value` under `key` unless it is null.
fn put(params: &mut Map<String, Value>, key: &str, value: Value) {
    if !value.is_null() {
        params.insert(key.to_string(), value);
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        match &self.command {
            Command::Report {
                since: Some(since),
                until: Some(until),
                ..
            } if since > until => Err("--since must not be after --until".to_string()),
            Command::Report { days, .. } if *days < 1 => {
                Err("--days must be at least 1".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Returns the log level based on verbosity settings.
    /// Log level from the flags. `verbose_by_default` is `general.verbose`
    /// from the config file; `--quiet` still wins over it.
    pub fn log_level(&self, verbose_by_default: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || verbose_by_default {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// The procedure call a subcommand stands for, if it maps onto one.
    ///
    /// `today` anchors relative report periods.
    pub fn procedure(&self, today: NaiveDate) -> Option<(&'static str, Value)> {
        let mut p = Map::new();

        let method = match &self.command {
            Command::Metrics {
                framework,
                since,
                until,
            } => {
                put(&mut p, "framework", json!(framework));
                put(&mut p, "startDate", json!(since.map(start_of)));
                put(&mut p, "endDate", json!(until.map(end_of)));
                "analytics.getMetricsSnapshot"
            }
            Command::Compare { since, until } => {
                put(&mut p, "startDate", json!(since.map(start_of)));
                put(&mut p, "endDate", json!(until.map(end_of)));
                "analytics.getFrameworkComparison"
            }
            Command::Gaps { framework } => {
                put(&mut p, "framework", json!(framework));
                "analytics.getComplianceGaps"
            }
            Command::Patterns => "analytics.getIncidentPatterns",
            Command::Predict { system_id, days } => {
                put(&mut p, "systemId", json!(system_id));
                put(&mut p, "daysAhead", json!(days));
                "analytics.getPredictions"
            }
            Command::Recommend {
                category,
                priority,
                limit,
                include_dismissed,
                public,
                ..
            } => {
                put(&mut p, "limit", json!(limit));
                if *public {
                    "recommendations.getPublicRecommendations"
                } else {
                    put(&mut p, "category", json!(category));
                    put(&mut p, "priority", json!(priority));
                    put(&mut p, "includeDismissed", json!(include_dismissed));
                    "recommendations.getRecommendations"
                }
            }
            Command::View { recommendation_id } => {
                put(&mut p, "recommendationId", json!(recommendation_id));
                "recommendations.markViewed"
            }
            Command::Dismiss { recommendation_id } => {
                put(&mut p, "recommendationId", json!(recommendation_id));
                "recommendations.dismiss"
            }
            Command::Snooze {
                recommendation_id,
                days,
            } => {
                put(&mut p, "recommendationId", json!(recommendation_id));
                put(&mut p, "snoozeDays", json!(days));
                "recommendations.snooze"
            }
            Command::Feedback {
                recommendation_id,
                feedback,
                comment,
            } => {
                put(&mut p, "recommendationId", json!(recommendation_id));
                put(&mut p, "feedback", json!(feedback));
                put(&mut p, "comment", json!(comment));
                "recommendations.submitFeedback"
            }
            Command::Weights { set } if set.is_empty() => "recommendations.getWeights",
            Command::Weights { set } => {
                let weights: Map<String, Value> = set
                    .iter()
                    .map(|(category, weight)| (category.key().to_string(), json!(weight)))
                    .collect();
                put(&mut p, "weights", Value::Object(weights));
                "recommendations.updateWeights"
            }
            Command::Register {
                name,
                description,
                risk_level,
            } => {
                put(&mut p, "name", json!(name));
                put(&mut p, "description", json!(description));
                put(&mut p, "riskLevel", json!(risk_level));
                "systems.register"
            }
            Command::Archive { system_id } => {
                put(&mut p, "systemId", json!(system_id));
                "systems.archive"
            }
            Command::Assess {
                system_id,
                framework,
                score,
                status,
            } => {
                put(&mut p, "systemId", json!(system_id));
                put(&mut p, "framework", json!(framework));
                put(&mut p, "score", json!(score));
                put(&mut p, "status", json!(status));
                "systems.recordAssessment"
            }
            Command::Convene { incident_id } => {
                put(&mut p, "incidentId", json!(incident_id));
                "council.convene"
            }
            Command::Session { session_id } => {
                put(&mut p, "sessionId", json!(session_id));
                "council.getSession"
            }
            Command::Completion { course } => {
                put(&mut p, "courseId", json!(course));
                "studentAnalytics.getCompletionRates"
            }
            Command::Report {
                template,
                since,
                until,
                days,
                framework,
                ..
            } => {
                let end = until.unwrap_or(today);
                let start = since.unwrap_or(end - Duration::days(*days - 1));
                put(&mut p, "template", json!(template));
                put(&mut p, "startDate", json!(start_of(start)));
                put(&mut p, "endDate", json!(end_of(end)));
                put(&mut p, "framework", json!(framework));
                "reports.generate"
            }
            Command::Audit {
                by,
                action,
                resource,
                since,
                limit,
                ..
            } => {
                put(&mut p, "user", json!(by));
                put(&mut p, "action", json!(action));
                put(&mut p, "resource", json!(resource));
                put(&mut p, "startDate", json!(since.map(start_of)));
                put(&mut p, "limit", json!(limit));
                "audit.getLogs"
            }
            Command::ArchiveAudit { older_than_days } => {
                put(&mut p, "olderThanDays", json!(older_than_days));
                "audit.archiveOlder"
            }
            Command::Rpc { .. } | Command::Methods | Command::InitConfig => return None,
        };

        Some((method, Value::Object(p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("complianceiq").chain(argv.iter().copied())).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = parse(&["patterns"]);
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_ollama_url() {
        let args = parse(&["--ollama-url", "localhost:11434", "patterns"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = parse(&["patterns"]);
        assert_eq!(args.log_level(false), tracing::Level::INFO);
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(false), tracing::Level::ERROR);
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }

    #[test]
    fn test_user_requires_org() {
        let result = Args::try_parse_from(["complianceiq", "--user", "alice", "patterns"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_snooze_maps_to_procedure() {
        let args = parse(&["snooze", "assess-1", "--days", "14"]);
        let (method, params) = args.procedure(today()).unwrap();
        assert_eq!(method, "recommendations.snooze");
        assert_eq!(params, json!({ "recommendationId": "assess-1", "snoozeDays": 14 }));
    }

    #[test]
    fn test_weights_parse() {
        let args = parse(&["weights", "--set", "risk_mitigation=80", "--set", "best_practice=0"]);
        let (method, params) = args.procedure(today()).unwrap();
        assert_eq!(method, "recommendations.updateWeights");
        assert_eq!(
            params,
            json!({ "weights": { "risk_mitigation": 80, "best_practice": 0 } })
        );

        let (method, _) = parse(&["weights"]).procedure(today()).unwrap();
        assert_eq!(method, "recommendations.getWeights");
        assert!(parse_weight("risk_mitigation").is_err());
    }

    #[test]
    fn test_report_period_defaults() {
        let args = parse(&["report", "executive_summary", "--days", "30"]);
        let (method, params) = args.procedure(today()).unwrap();
        assert_eq!(method, "reports.generate");
        assert_eq!(params["template"], "executive_summary");
        assert_eq!(params["startDate"], "2026-05-03T00:00:00Z");
        assert_eq!(params["endDate"], "2026-06-01T23:59:59Z");
        assert!(params.get("framework").is_none());
    }

    #[test]
    fn test_public_recommendations() {
        let args = parse(&["recommend", "--public", "--limit", "3"]);
        let (method, params) = args.procedure(today()).unwrap();
        assert_eq!(method, "recommendations.getPublicRecommendations");
        assert_eq!(params, json!({ "limit": 3 }));
        assert!(Args::try_parse_from(["complianceiq", "recommend", "--public", "--category", "best_practice"]).is_err());
    }

    #[test]
    fn test_local_commands_have_no_procedure() {
        assert!(parse(&["methods"]).procedure(today()).is_none());
        assert!(parse(&["init-config"]).procedure(today()).is_none());
    }
}
