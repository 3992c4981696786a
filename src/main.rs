//! wide-toolchain - Main Entry Point
//!
//! Runs compile and minimize workflows against the configured toolchain
//! executables and prints the terminal response as JSON on stdout. Logs go to
//! stderr and, with `--log-dir`, to a daily rolling file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wide_toolchain::{
    config::OrchestratorConfig,
    types::{CompileRequest, MinimizeRequest, TerminalResponse},
    Orchestrator,
};

/// Extra time on top of the shutdown grace period for killing and cleanup
const TEARDOWN_MARGIN: Duration = Duration::from_secs(2);

/// Toolchain orchestration for the web design environment
#[derive(Parser, Debug)]
#[command(name = "wide-toolchain", version, about)]
struct Cli {
    /// Path to an `orchestrator.toml` configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Enable debug-level output for this crate
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a project described by a JSON compile request
    Compile {
        /// Request file (`-` reads stdin)
        request: PathBuf,
    },
    /// Minimize one equation, e.g. "y = a & b + a & !b;"
    Minimize {
        equation: String,
        /// Session id to use instead of an allocated one
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn init_logging(verbose: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let default_filter = if verbose {
        "info,wide_toolchain=trace"
    } else {
        "info,wide_toolchain=debug"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {:?}", dir))?;
            let appender = tracing_appender::rolling::daily(dir, "wide-toolchain.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn read_request(path: &Path) -> Result<CompileRequest> {
    let content = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("Failed to read request from stdin")?
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file {:?}", path))?
    };
    serde_json::from_str(&content).context("Failed to parse compile request")
}

fn print_response(response: &TerminalResponse) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

/// Run one subcommand; `Ok(false)` means the session failed
fn run(command: Command, config: OrchestratorConfig) -> Result<bool> {
    let grace = config.timeouts.shutdown_grace() + TEARDOWN_MARGIN;
    let orchestrator = Orchestrator::new(config.clone());

    let response = match command {
        Command::Config => {
            print!("{}", config.to_toml()?);
            return Ok(true);
        }
        Command::Compile { request } => orchestrator.compile(read_request(&request)?)?,
        Command::Minimize {
            equation,
            session_id,
        } => orchestrator.minimize(MinimizeRequest {
            content: equation,
            session_id,
        })?,
    };
    print_response(&response)?;

    // The response arrives before teardown; let the processes go down first
    if !orchestrator.registry().wait_until_empty(grace) {
        tracing::warn!("Toolchain processes still shutting down at exit");
    }
    Ok(response.success)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_guard = init_logging(cli.verbose, cli.log_dir.as_deref())?;

    let config = OrchestratorConfig::load_or_default(cli.config.as_deref());
    tracing::debug!("Toolchain directory: {:?}", config.toolchain.directory);

    let success = run(cli.command, config)?;

    // Flush the file writer before a non-zero exit skips destructors
    drop(log_guard);
    if !success {
        std::process::exit(1);
    }
    Ok(())
}
