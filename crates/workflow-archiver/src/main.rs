//! Command-line interface for workflow-archiver.
//!
//! ## What
//!
//! - `run` archives one batch of finished workflows and exits with a status code
//!   describing the outcome (0 clean, 1 fatal, 2 partial, 3 halted).
//! - `candidates` lists the units that are ready to archive, without writing.
//!
//! ## How
//!
//! Run from cron or by hand. See `--help` for usage details.
//!
//! ### Example
//!
//! ```sh
//! workflow-archiver --dsn postgresql://wf@db/workflow --service-uri https://dor.example.edu run
//! workflow-archiver --format json candidates
//! ```
use clap::{Parser, Subcommand};
use workflow_archiver::config::Config;
use workflow_archiver::store::{AnyStore, ArchiveStore};
use workflow_archiver::WorkflowArchiver;

use std::fs::{File, OpenOptions};
use std::process;

mod output;

use crate::output::OutputWriter;

#[derive(Parser)]
#[command(name = "workflow-archiver")]
#[command(about = "Moves finished workflow rows into the workflow archive table")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database URL (highest priority, overrides all other config sources)
    #[arg(long, short = 'd')]
    dsn: Option<String>,

    /// Config file path (overrides environment variables and defaults)
    #[arg(long, short = 'c')]
    config: Option<String>,

    /// Base URI of the object registry that reports current versions
    #[arg(long)]
    service_uri: Option<String>,

    /// Log destination: stderr or file path
    #[arg(long, default_value = "stderr")]
    log_dest: String,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output format: json, table
    #[arg(long, default_value = "table")]
    format: String,

    /// Output destination: stdout or file path
    #[arg(long, default_value = "stdout")]
    out: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive one batch of completed workflows
    Run {
        /// Seconds to wait between attempts on one unit
        #[arg(long)]
        retry_delay: Option<u64>,

        /// Maximum number of units to archive in this run
        #[arg(long)]
        batch_limit: Option<usize>,
    },
    /// List units ready to be archived
    Candidates,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        other => {
            eprintln!("Unknown log level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let writer: Box<dyn Fn() -> Box<dyn std::io::Write + Send> + Send + Sync> =
        if cli.log_dest == "stderr" {
            Box::new(|| Box::new(std::io::stderr()))
        } else {
            let file = match open_log_file(&cli.log_dest) {
                Ok(file) => file,
                Err(e) => {
                    eprintln!("Failed to create log file {}: {}", cli.log_dest, e);
                    process::exit(1);
                }
            };
            Box::new(move || match file.try_clone() {
                Ok(file) => Box::new(file) as Box<dyn std::io::Write + Send>,
                Err(_) => Box::new(std::io::stderr()) as Box<dyn std::io::Write + Send>,
            })
        };

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(writer)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Setting default subscriber failed: {}", e);
    }

    match run_cli(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            tracing::error!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Load configuration, apply CLI overrides and dispatch the subcommand.
///
/// Returns the process exit code.
/// Open the log file for appending so earlier runs are kept.
fn open_log_file(path: &str) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

async fn run_cli(cli: Cli) -> anyhow::Result<i32> {
    // Priority order:
    // 1. --dsn CLI argument (if provided)
    // 2. --config CLI argument (if provided)
    // 3. WORKFLOW_ARCHIVER_CONFIG_FILE environment variable
    // 4. WORKFLOW_ARCHIVER_DSN and other environment variables
    // 5. Default config files (workflow-archiver.yaml, workflow-archiver.yml)
    let mut config = Config::load_with_options(cli.dsn, cli.config)
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    if let Some(uri) = cli.service_uri {
        config = config.with_service_uri(uri);
    }

    let writer = OutputWriter::for_format(&cli.format);
    let mut out_writer: Box<dyn std::io::Write> = match cli.out.as_str() {
        "stdout" => Box::new(std::io::stdout()),
        _ => Box::new(File::create(&cli.out)?),
    };
    let out: &mut dyn std::io::Write = out_writer.as_mut();

    match cli.command {
        Commands::Run {
            retry_delay,
            batch_limit,
        } => {
            if let Some(seconds) = retry_delay {
                config = config.with_retry_delay(seconds);
            }
            if let Some(limit) = batch_limit {
                config = config.with_batch_limit(limit);
            }

            tracing::info!("Starting workflow-archiver {}", env!("CARGO_PKG_VERSION"));
            let archiver = WorkflowArchiver::connect(&config).await?;
            let report = archiver.run().await?;
            writer.write_item(&report, out)?;
            out.flush()?;
            Ok(report.status().exit_code())
        }

        Commands::Candidates => {
            let store = AnyStore::connect(&config).await?;
            let units = store.find_completed_units().await;
            store.close().await;
            writer.write_list(&units?, out)?;
            out.flush()?;
            Ok(0)
        }
    }
}
