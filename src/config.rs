//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.complianceiq.toml` files.

use crate::council::StrategyKind;
use crate::report::ExportFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = ".complianceiq.toml";

/// Audit trail written by configs that `init-config` creates.
pub const DEFAULT_AUDIT_FILE: &str = "complianceiq-audit.jsonl";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub analytics: AnalyticsConfig,

    #[serde(default)]
    pub recommendations: RecommendationsConfig,

    #[serde(default)]
    pub council: CouncilConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub audit: AuditConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// JSON dataset backing the store, or `:memory:` for a throwaway one.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// Alternative gap/pattern catalog. The built-in catalog is used when unset.
    #[serde(default)]
    pub catalog: Option<PathBuf>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            catalog: None,
            verbose: false,
        }
    }
}

fn default_data_file() -> PathBuf {
    PathBuf::from("complianceiq-data.json")
}

/// Metrics and forecasting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Scores per trend comparison window.
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,

    /// Mean difference needed to report improving/declining.
    #[serde(default = "default_trend_threshold")]
    pub trend_threshold: f64,

    /// Forecast horizon when none is given.
    #[serde(default = "default_prediction_days")]
    pub prediction_days: i64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            trend_window: default_trend_window(),
            trend_threshold: default_trend_threshold(),
            prediction_days: default_prediction_days(),
        }
    }
}

fn default_trend_window() -> usize {
    10
}

fn default_trend_threshold() -> f64 {
    5.0
}

fn default_prediction_days() -> i64 {
    30
}

/// Recommendation list settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationsConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Entries returned to anonymous callers.
    #[serde(default = "default_public_limit")]
    pub public_limit: usize,
}

impl Default for RecommendationsConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            public_limit: default_public_limit(),
        }
    }
}

fn default_limit() -> usize {
    10
}

fn default_public_limit() -> usize {
    5
}

/// How council votes are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VoterKind {
    /// Deterministic votes from incident severity and role
    #[default]
    Rule,
    /// Ask an Ollama model for each vote
    Ollama,
}

/// Council settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilConfig {
    /// Number of seats; roles are assigned round-robin.
    #[serde(default = "default_agents")]
    pub agents: usize,

    #[serde(default)]
    pub strategy: StrategyKind,

    /// Approval share required by the supermajority strategy.
    #[serde(default = "default_supermajority")]
    pub threshold: f64,

    /// Votes collected in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub voter: VoterKind,

    #[serde(default = "default_model")]
    pub model_name: String,

    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-vote request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            agents: default_agents(),
            strategy: StrategyKind::default(),
            threshold: default_supermajority(),
            concurrency: default_concurrency(),
            voter: VoterKind::default(),
            model_name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_agents() -> usize {
    33
}

fn default_supermajority() -> f64 {
    2.0 / 3.0
}

fn default_concurrency() -> usize {
    4
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout() -> u64 {
    120
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_format")]
    pub format: ExportFormat,

    /// Default output directory for exported reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Section lists replacing a template's defaults, keyed by template.
    #[serde(default)]
    pub sections: HashMap<String, Vec<String>>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            output_dir: default_output_dir(),
            sections: HashMap::new(),
        }
    }
}

fn default_format() -> ExportFormat {
    ExportFormat::Pdf
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Audit log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// JSONL audit file. Entries stay in memory when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Capacity of the in-memory log.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default = "default_audit_limit")]
    pub default_limit: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: None,
            capacity: default_capacity(),
            default_limit: default_audit_limit(),
        }
    }
}

fn default_capacity() -> usize {
    crate::audit::DEFAULT_CAPACITY
}

fn default_audit_limit() -> usize {
    100
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values the user passed explicitly override the file.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref data) = args.data {
            self.general.data_file = data.clone();
        }
        if let Some(ref catalog) = args.catalog {
            self.general.catalog = Some(catalog.clone());
        }
        if let Some(ref audit_log) = args.audit_log {
            self.audit.path = Some(audit_log.clone());
        }

        if let Some(voter) = args.voter {
            self.council.voter = voter;
        }
        if let Some(strategy) = args.strategy {
            self.council.strategy = strategy;
        }
        if let Some(ref model) = args.model {
            self.council.model_name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.council.ollama_url = url.clone();
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Configuration written by `init-config`: the defaults plus a durable
    /// audit trail next to the dataset.
    pub fn starter() -> Self {
        let mut config = Config::default();
        config.audit.path = Some(PathBuf::from(DEFAULT_AUDIT_FILE));
        config
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::starter()).unwrap_or_else(|_| String::new())
    }

    pub fn trend(&self) -> crate::analysis::TrendSettings {
        crate::analysis::TrendSettings {
            window: self.analytics.trend_window.max(1),
            threshold: self.analytics.trend_threshold,
        }
    }
}
