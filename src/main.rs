//! ComplianceIQ - compliance analytics for AI systems
//!
//! A CLI tool that aggregates assessment data, ranks recommendations,
//! convenes a multi-agent council on incidents and exports reports.
//!
//! Exit codes:
//!   0 - Success (no recommendations above threshold, or no --fail-on set)
//!   1 - Runtime error (config, storage, invalid input, etc.)
//!   2 - Recommendations found at or above the --fail-on priority

mod analysis;
mod audit;
mod catalog;
mod cli;
mod config;
mod council;
mod error;
mod models;
mod recommend;
mod report;
mod rpc;
mod service;
mod store;
mod training;

use anyhow::{Context, Result};
use audit::{AuditEntry, AuditLog, JsonlAuditLog, MemoryAuditLog};
use catalog::Catalog;
use chrono::Utc;
use cli::{Args, Command};
use config::{Config, VoterKind, DEFAULT_CONFIG_FILE};
use council::{roster, strategy_for, Council, OllamaSettings, OllamaVoter, RuleVoter, Voter};
use recommend::{Priority, Recommendation};
use report::{ExportFormat, Report};
use rpc::{RpcRequest, RpcResponse};
use service::{ComplianceService, ServiceSettings};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use store::{ComplianceStore, Dataset, FileStore, MemoryStore, IN_MEMORY};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle commands that need no logging or service
    match args.command {
        Command::InitConfig => return handle_init_config(&args).await,
        Command::Methods => {
            for method in rpc::METHODS {
                println!("{}", method);
            }
            return Ok(());
        }
        _ => {}
    }

    // Load config first: it can turn on verbose logging
    let (mut config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(args.log_level(config.general.verbose));

    info!("ComplianceIQ v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    match source {
        ConfigSource::File(path) => info!("Loaded config from {}", path.display()),
        ConfigSource::Defaults => debug!("No config file found, using defaults"),
        ConfigSource::Unreadable(e) => warn!("Failed to load config: {:#}", e),
    }

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: write a default .complianceiq.toml and an empty dataset.
async fn handle_init_config(args: &Args) -> Result<()> {
    let path = args
        .config
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            path.display()
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    tokio::fs::write(path, &content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let mut config = Config::starter();
    config.merge_with_args(args);
    if config.general.data_file != Path::new(IN_MEMORY) {
        FileStore::init(&config.general.data_file, &Dataset::default())
            .await
            .with_context(|| {
                format!(
                    "Failed to create dataset {}",
                    config.general.data_file.display()
                )
            })?;
    }

    println!("✅ Created {} with default settings.", path.display());
    println!(
        "   Dataset: {} (edit it or register systems with `complianceiq register`).",
        config.general.data_file.display()
    );
    Ok(())
}

/// Initialize logging at `level`.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run one subcommand. Returns the exit code (0 or 2).
async fn run(args: Args, config: Config) -> Result<i32> {
    let audit = build_audit_log(&config).await?;
    let service = build_service(&config, audit, !args.quiet)?;

    let caller = match (&args.user, &args.org) {
        (Some(user), Some(org)) => models::Caller::user(user.clone(), org.clone()),
        _ => models::Caller::anonymous(),
    };

    if let Command::Rpc { ref input } = args.command {
        return handle_rpc(&service, input.as_deref()).await;
    }

    let Some((method, params)) = args.procedure(Utc::now().date_naive()) else {
        return Ok(0);
    };

    let result = rpc::dispatch(&service, &caller, method, params).await?;

    match &args.command {
        // Reports are always exported to a file from the CLI.
        Command::Report {
            template,
            format,
            output,
            ..
        } => {
            let format = format.unwrap_or(config.report.format);
            let path = output.clone().unwrap_or_else(|| {
                config.report.output_dir.join(format!(
                    "{}_{}.{}",
                    template.key(),
                    Utc::now().format("%Y%m%d"),
                    format.extension()
                ))
            });

            let report: Report = serde_json::from_value(result)?;
            report::write_report(&report, format, &path).await?;
            println!(
                "✅ {} report saved to: {}",
                format_label(format),
                path.display()
            );
            Ok(0)
        }
        Command::Audit { csv: Some(path), .. } => {
            let entries: Vec<AuditEntry> = serde_json::from_value(result)?;
            let csv = audit::export_csv(&entries)?;
            tokio::fs::write(path, csv)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✅ Exported {} audit entries to: {}", entries.len(), path.display());
            Ok(0)
        }
        Command::Recommend { fail_on, .. } => {
            let recs: Vec<Recommendation> = serde_json::from_value(result)?;
            print_recommendations(&recs, args.quiet);

            if let Some(level) = fail_on {
                let threshold: Priority = (*level).into();
                if recs.iter().any(|r| r.priority >= threshold) {
                    eprintln!(
                        "\n⛔ Recommendations found at or above {} priority. Failing (exit code 2).",
                        threshold
                    );
                    return Ok(2);
                }
            }
            Ok(0)
        }
        _ => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(0)
        }
    }
}

fn format_label(format: ExportFormat) -> &'static str {
    match format {
        ExportFormat::Pdf => "PDF",
        ExportFormat::Csv => "CSV",
        ExportFormat::Json => "JSON",
        ExportFormat::Markdown => "Markdown",
    }
}

fn print_recommendations(recs: &[Recommendation], quiet: bool) {
    if recs.is_empty() {
        println!("✅ No open recommendations.");
        return;
    }

    println!("📋 {} recommendation(s):\n", recs.len());
    for rec in recs {
        println!("{} [{}] {}", rec.priority.emoji(), rec.priority, rec.title);
        if !quiet {
            println!("   id: {}  category: {}", rec.id, rec.category.key());
            println!("   {}", rec.description);
            for item in &rec.action_items {
                println!("   - {}", item);
            }
            println!();
        }
    }
}

/// Handle the rpc subcommand: one request in, one response envelope out.
async fn handle_rpc(service: &ComplianceService, input: Option<&Path>) -> Result<i32> {
    let raw = match input {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read request: {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read request from stdin")?;
            buf
        }
    };

    let request: RpcRequest = serde_json::from_str(&raw).context("Invalid RPC request")?;
    let caller = request.caller();
    let outcome = rpc::dispatch(service, &caller, &request.method, request.params).await;
    let failed = outcome.is_err();

    println!("{}", serde_json::to_string_pretty(&RpcResponse::from(outcome))?);
    Ok(if failed { 1 } else { 0 })
}

/// Where the configuration came from. Reported once logging is up.
enum ConfigSource {
    File(PathBuf),
    Defaults,
    Unreadable(anyhow::Error),
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::File(config_path.clone())));
    }

    // Try default location
    Ok(match Config::load_default() {
        Ok(Some(config)) => (config, ConfigSource::File(PathBuf::from(DEFAULT_CONFIG_FILE))),
        Ok(None) => (Config::default(), ConfigSource::Defaults),
        Err(e) => (Config::default(), ConfigSource::Unreadable(e)),
    })
}

async fn build_audit_log(config: &Config) -> Result<Arc<dyn AuditLog>> {
    Ok(match config.audit.path {
        Some(ref path) => {
            info!("Audit log: {}", path.display());
            Arc::new(JsonlAuditLog::open(path.clone()).await?)
        }
        None => {
            debug!("Audit log kept in memory (capacity {})", config.audit.capacity);
            Arc::new(MemoryAuditLog::new(config.audit.capacity))
        }
    })
}

/// Wire store, catalog and council into a service.
fn build_service(
    config: &Config,
    audit: Arc<dyn AuditLog>,
    show_progress: bool,
) -> Result<ComplianceService> {
    let catalog = match config.general.catalog {
        Some(ref path) => Catalog::load(path)?,
        None => Catalog::builtin()?,
    };

    let voter: Arc<dyn Voter> = match config.council.voter {
        VoterKind::Rule => Arc::new(RuleVoter),
        VoterKind::Ollama => {
            info!(
                "Council voter: {} via {}",
                config.council.model_name, config.council.ollama_url
            );
            Arc::new(OllamaVoter::new(OllamaSettings {
                ollama_url: config.council.ollama_url.clone(),
                model_name: config.council.model_name.clone(),
                temperature: config.council.temperature,
                timeout_seconds: config.council.timeout_seconds,
            })?)
        }
    };

    let council = Council::new(
        roster(config.council.agents),
        voter,
        strategy_for(config.council.strategy, config.council.threshold),
        config.council.concurrency,
    )
    .with_progress(show_progress);

    let settings = ServiceSettings {
        trend: config.trend(),
        default_prediction_days: config.analytics.prediction_days,
        default_limit: config.recommendations.default_limit,
        public_limit: config.recommendations.public_limit,
        default_audit_limit: config.audit.default_limit,
        report_sections: config.report.sections.clone(),
    };

    let store: Arc<dyn ComplianceStore> = if config.general.data_file == Path::new(IN_MEMORY) {
        debug!("Dataset kept in memory");
        Arc::new(MemoryStore::new())
    } else {
        let store = FileStore::open(config.general.data_file.clone());
        debug!("Dataset: {}", store.path().display());
        Arc::new(store)
    };

    Ok(ComplianceService::new(
        store,
        audit,
        Arc::new(catalog),
        council,
        settings,
    ))
}
