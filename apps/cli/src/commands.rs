//! CLI command definitions, routing, and tracing setup.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tracing::{info, warn};

use objectivedb_core::catalog::{SampleCatalog, all_units, select_units};
use objectivedb_core::export::export_all;
use objectivedb_core::pipeline::{
    BatchSummary, Orchestrator, OrchestratorOptions, ProgressReporter, TestSource, UnitReport,
};
use objectivedb_discovery::{DiscoveryEngine, DiscoveryOptions};
use objectivedb_fetcher::{HttpFetcher, HttpSearchProvider, PdfValidator, SourceUrlValidator};
use objectivedb_shared::{
    AppConfig, AuditStatus, ObjectiveDbError, ProcessingUnit, RunConfig, RunMode, init_config,
    load_config, load_reference_data,
};
use objectivedb_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// objectivedb: certification test objectives, verified or inferred.
#[derive(Parser)]
#[command(
    name = "objectivedb",
    version,
    about = "Build a database of teacher-certification test objectives with confidence-scored inference.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Test sourcing mode.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum ModeArg {
    /// Search the web for authoritative test listings.
    Discover,
    /// Offline: each unit's sample tests, inference only.
    Demo,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Discover => RunMode::Discover,
            ModeArg::Demo => RunMode::Demo,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Process units: discover tests, gather objectives, record audits.
    Run {
        /// Unit short codes (comma-separated). Defaults to all 50 states.
        #[arg(long, value_delimiter = ',')]
        units: Vec<String>,

        /// Process at most this many units.
        #[arg(long)]
        limit: Option<usize>,

        /// Test sourcing mode (overrides config).
        #[arg(long)]
        mode: Option<ModeArg>,

        /// Database path (overrides config).
        #[arg(long)]
        db: Option<PathBuf>,

        /// Minimum confidence for inferred objectives, 0.0–1.0.
        #[arg(long)]
        threshold: Option<f64>,

        /// Export JSONL/JSON into this directory after the run.
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Check candidate PDF links, in order.
    PdfCheck {
        /// URLs to check.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Stop at the first valid PDF.
        #[arg(long)]
        first: bool,
    },

    /// Check that test source URLs are authoritative and reachable.
    SourceCheck {
        /// URLs to check.
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Show database statistics.
    Stats {
        /// Database path (overrides config).
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// List recorded audits, newest first.
    Audits {
        /// Only audits of this unit (short code).
        #[arg(long)]
        unit: Option<String>,

        /// Show at most this many audits.
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Database path (overrides config).
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Export stored objectives as per-unit JSONL plus an aggregate JSON.
    Export {
        /// Output directory (defaults to config `output_dir`).
        #[arg(long)]
        out: Option<PathBuf>,

        /// Database path (overrides config).
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "objectivedb=info",
        1 => "objectivedb=debug",
        _ => "objectivedb=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            units,
            limit,
            mode,
            db,
            threshold,
            export,
        } => cmd_run(RunArgs {
            units,
            limit,
            mode,
            db,
            threshold,
            export,
        })
        .await,
        Command::PdfCheck { urls, first } => cmd_pdf_check(&urls, first).await,
        Command::SourceCheck { urls } => cmd_source_check(&urls).await,
        Command::Stats { db } => cmd_stats(db).await,
        Command::Audits { unit, limit, db } => cmd_audits(unit.as_deref(), limit, db).await,
        Command::Export { out, db } => cmd_export(out, db).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Resolve the run config from the config file and an optional `--db`.
fn resolve_config(db: Option<PathBuf>) -> Result<(AppConfig, RunConfig)> {
    let app = load_config()?;
    let mut run = RunConfig::from(&app);
    if let Some(db) = db {
        run.db_path = db;
    }
    Ok((app, run))
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

struct RunArgs {
    units: Vec<String>,
    limit: Option<usize>,
    mode: Option<ModeArg>,
    db: Option<PathBuf>,
    threshold: Option<f64>,
    export: Option<PathBuf>,
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let (app, mut config) = resolve_config(args.db)?;
    if let Some(mode) = args.mode {
        config.mode = mode.into();
    }
    if let Some(threshold) = args.threshold {
        config.confidence_threshold = threshold;
    }
    config.validate()?;

    let mut units: Vec<ProcessingUnit> = if args.units.is_empty() {
        all_units()
    } else {
        select_units(&args.units)?
    };
    if let Some(limit) = args.limit {
        units.truncate(limit);
    }
    if units.is_empty() {
        return Err(eyre!("no units selected"));
    }

    let refs = Arc::new(load_reference_data(&app)?);
    let source: Arc<dyn TestSource> = match config.mode {
        RunMode::Discover => {
            let search = HttpSearchProvider::new(
                &config.search_endpoint,
                config.search_api_key(),
                config.max_search_results,
                config.request_timeout_secs,
            )?;
            let fetcher = HttpFetcher::new(config.request_timeout_secs)?;
            Arc::new(DiscoveryEngine::new(
                Arc::new(search),
                Arc::new(fetcher),
                Arc::clone(&refs),
                DiscoveryOptions::from(&config),
            ))
        }
        RunMode::Demo => Arc::new(SampleCatalog),
    };

    info!(
        units = units.len(),
        mode = %config.mode,
        threshold = config.confidence_threshold,
        db = %config.db_path.display(),
        "starting run"
    );

    let storage = Storage::open(&config.db_path).await?;
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling current unit");
            let _ = cancel_tx.send(true);
        }
    });

    let orchestrator = Orchestrator::new(
        storage,
        source,
        Arc::clone(&refs),
        OrchestratorOptions::from(&config),
    )
    .with_cancel(cancel_rx);

    let reporter = CliProgress::new();
    let summary = orchestrator.run_batch(&units, &reporter).await?;
    reporter.finish();
    print_summary(&summary);

    if let Some(out) = args.export {
        let exported = export_all(orchestrator.storage(), &out).await?;
        println!(
            "  Exported {} units, {} tests, {} objectives to {}",
            exported.units,
            exported.tests,
            exported.objectives,
            out.display()
        );
        println!();
    }

    if summary.cancelled {
        return Err(eyre!("run cancelled"));
    }
    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    println!();
    println!("  Units processed:  {}", summary.units_processed);
    println!("  Tests:            {}", summary.total_tests);
    println!("  Objectives:       {}", summary.total_objectives);
    println!(
        "    verified:       {} ({:.1}%)",
        summary.total_verified,
        summary.verified_pct()
    );
    println!("    inferred:       {}", summary.total_inferred);
    if !summary.error_units.is_empty() {
        println!("  Errors:           {}", summary.error_units.join(", "));
    }
    if summary.cancelled {
        println!("  Cancelled before all units were processed.");
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn unit_started(&self, unit: &ProcessingUnit, current: usize, total: usize) {
        self.spinner
            .set_prefix(format!("[{current}/{total}] {}", unit.name));
        self.spinner.set_message("starting");
    }

    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn test_started(&self, name: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("test {current}/{total}: {name}"));
    }

    fn unit_done(&self, report: &UnitReport) {
        let counts = report.audit.counts;
        let mut line = format!(
            "  {:<16} {:<9} tests {:>2}  verified {:>3}  inferred {:>3}",
            report.unit.name,
            report.audit.status.as_str(),
            counts.tests_found,
            counts.objectives_found,
            counts.objectives_inferred,
        );
        if report.audit.status == AuditStatus::Error {
            if let Some(notes) = &report.audit.notes {
                line.push_str(&format!("  ({notes})"));
            }
        }
        self.spinner.println(line);
    }

    fn unit_failed(&self, unit: &ProcessingUnit, error: &ObjectiveDbError) {
        self.spinner
            .println(format!("  {:<16} {:<9} ({error})", unit.name, "failed"));
    }
}

// ---------------------------------------------------------------------------
// pdf-check / source-check
// ---------------------------------------------------------------------------

async fn cmd_pdf_check(urls: &[String], first: bool) -> Result<()> {
    let (_, config) = resolve_config(None)?;
    let validator = PdfValidator::new(config.pdf_timeout_secs, config.pdf_max_redirects)?;

    let checks = if first {
        let result = validator.first_valid(urls).await;
        match &result.found {
            Some(url) => println!("Found: {url}"),
            None => println!("No valid PDF found"),
        }
        result.checked
    } else {
        let mut checks = Vec::with_capacity(urls.len());
        for url in urls {
            checks.push(validator.is_valid(url).await);
        }
        checks
    };

    for check in &checks {
        let mark = if check.valid { "ok " } else { "bad" };
        println!("  [{mark}] {}  {}", check.url, check.reason);
    }
    Ok(())
}

async fn cmd_source_check(urls: &[String]) -> Result<()> {
    let app = load_config()?;
    let config = RunConfig::from(&app);
    let refs = Arc::new(load_reference_data(&app)?);
    let validator =
        SourceUrlValidator::new(refs, config.request_timeout_secs, config.pdf_max_redirects)?;

    for url in urls {
        let check = validator.check(url).await;
        let mark = if check.valid { "ok " } else { "bad" };
        println!("  [{mark}] {}  {}", check.url, check.reason);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// stats / audits / export
// ---------------------------------------------------------------------------

async fn cmd_stats(db: Option<PathBuf>) -> Result<()> {
    let (_, config) = resolve_config(db)?;
    let storage = Storage::open_readonly(&config.db_path).await?;
    let stats = storage.statistics().await?;

    println!();
    println!("  Database:   {}", config.db_path.display());
    println!("  Units:      {}", stats.units);
    println!("  Tests:      {}", stats.tests);
    println!("  Objectives: {}", stats.objectives);
    println!("    verified: {}", stats.verified);
    println!("    partial:  {}", stats.partial);
    println!("    inferred: {}", stats.inferred);
    println!(
        "  Audits:     {} complete, {} partial, {} error, {} running",
        stats.audits_complete, stats.audits_partial, stats.audits_error, stats.audits_running
    );
    println!();
    Ok(())
}

async fn cmd_audits(unit: Option<&str>, limit: usize, db: Option<PathBuf>) -> Result<()> {
    let (_, config) = resolve_config(db)?;
    let storage = Storage::open_readonly(&config.db_path).await?;

    let units: HashMap<String, ProcessingUnit> = storage.list_units().await?.into_iter().collect();
    let unit_id = match unit {
        Some(code) => Some(
            units
                .iter()
                .find(|(_, u)| u.short_code.eq_ignore_ascii_case(code))
                .map(|(id, _)| id.clone())
                .ok_or_else(|| eyre!("no unit with code '{code}' in the database"))?,
        ),
        None => None,
    };

    let audits = storage.list_audits(unit_id.as_deref()).await?;
    if audits.is_empty() {
        println!("No audits recorded.");
        return Ok(());
    }

    for audit in audits.iter().take(limit) {
        let name = units
            .get(&audit.unit_id)
            .map(|u| u.name.as_str())
            .unwrap_or("?");
        println!(
            "{}  {:<16} {:<9} tests {:>2}  verified {:>3}  inferred {:>3}  queries {:>2}{}",
            audit.started_at.format("%Y-%m-%d %H:%M:%S"),
            name,
            audit.status.as_str(),
            audit.counts.tests_found,
            audit.counts.objectives_found,
            audit.counts.objectives_inferred,
            audit.counts.queries_run,
            audit
                .notes
                .as_deref()
                .map(|n| format!("  {n}"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

async fn cmd_export(out: Option<PathBuf>, db: Option<PathBuf>) -> Result<()> {
    let (_, config) = resolve_config(db)?;
    let out = out.unwrap_or_else(|| config.output_dir.clone());
    let storage = Storage::open_readonly(&config.db_path).await?;

    let summary = export_all(&storage, &out).await?;
    println!(
        "Exported {} units, {} tests, {} objectives to {}",
        summary.units,
        summary.tests,
        summary.objectives,
        out.display()
    );
    for file in &summary.files {
        println!("  {}", file.display());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_parses_unit_list_and_overrides() {
        let cli = Cli::parse_from([
            "objectivedb",
            "run",
            "--units",
            "AL,AK",
            "--mode",
            "demo",
            "--threshold",
            "0.6",
            "--limit",
            "1",
        ]);
        match cli.command {
            Command::Run {
                units,
                limit,
                mode,
                threshold,
                ..
            } => {
                assert_eq!(units, vec!["AL", "AK"]);
                assert_eq!(limit, Some(1));
                assert!(matches!(mode, Some(ModeArg::Demo)));
                assert_eq!(threshold, Some(0.6));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["objectivedb", "stats", "-vv", "--log-format", "json"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.log_format, LogFormat::Json));
    }

    #[test]
    fn pdf_check_requires_urls() {
        assert!(Cli::try_parse_from(["objectivedb", "pdf-check"]).is_err());
    }

    #[test]
    fn source_check_takes_url_list() {
        assert!(Cli::try_parse_from(["objectivedb", "source-check"]).is_err());
        let cli = Cli::parse_from([
            "objectivedb",
            "source-check",
            "https://www.ets.org/praxis",
            "https://www.nysed.gov/tests",
        ]);
        match cli.command {
            Command::SourceCheck { urls } => assert_eq!(urls.len(), 2),
            _ => panic!("expected source-check"),
        }
    }
}
