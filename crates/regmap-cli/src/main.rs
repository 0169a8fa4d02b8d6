//! # regmap CLI entry point
//!
//! Parses arguments, installs logging, selects the store backend and
//! dispatches to the subcommand handlers.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use regmap_engine::CoreConfig;
use regmap_store::{AuditTrail, EvaluationCache, PolicyVersionRegistry};
use tracing_subscriber::EnvFilter;

use regmap_cli::context::{load_catalog, load_config, Backend, Stores};
use regmap_cli::evaluate::{run_evaluate, EvaluateArgs};
use regmap_cli::history::{run_history, HistoryArgs};
use regmap_cli::maintenance::{run_cleanup, run_verify_audit, CleanupArgs, VerifyAuditArgs};
use regmap_cli::policy::{run_ingest_policy, IngestPolicyArgs};

/// Compliance evaluation core: coverage of policy controls by vendor
/// capabilities, cached and audited.
#[derive(Parser, Debug)]
#[command(name = "regmap", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// YAML configuration file. Defaults to environment variables.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// YAML mapping catalog.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a mapping, serving a valid cached result when present.
    Evaluate(EvaluateArgs),

    /// Show audit history for a mapping.
    History(HistoryArgs),

    /// Register a policy document version.
    IngestPolicy(IngestPolicyArgs),

    /// Delete audit records and cache entries past the retention window.
    Cleanup(CleanupArgs),

    /// Verify the audit hash chain.
    VerifyAudit(VerifyAuditArgs),
}

fn init_tracing(verbose: u8, json: bool) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn dispatch<C, A, R>(
    cli: &Cli,
    stores: &Stores<C, A, R>,
    config: &CoreConfig,
    out: &mut impl Write,
) -> Result<u8>
where
    C: EvaluationCache,
    A: AuditTrail,
    R: PolicyVersionRegistry,
{
    match &cli.command {
        Commands::Evaluate(args) => {
            let catalog = load_catalog(cli.catalog.as_deref())?;
            run_evaluate(args, stores, config, catalog, out).await
        }
        Commands::History(args) => run_history(args, stores, config, out).await,
        Commands::IngestPolicy(args) => run_ingest_policy(args, stores, out).await,
        Commands::Cleanup(args) => run_cleanup(args, stores, config, out).await,
        Commands::VerifyAudit(args) => run_verify_audit(args, stores, out).await,
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let config = load_config(cli.config.as_deref())?;
    tracing::debug!(?config, "configuration loaded");
    let mut out = std::io::stdout().lock();
    match Backend::open(&config).await? {
        Backend::Memory(stores) => dispatch(&cli, &stores, &config, &mut out).await,
        Backend::Postgres(stores) => dispatch(&cli, &stores, &config, &mut out).await,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to start async runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
