//! repcheck CLI: verify that two training runs produced equivalent checkpoints.
//!
//! Exit status: 0 when the checkpoints match, 1 when any parameter differs
//! beyond tolerance, 2 when a checkpoint can't be loaded or paired.

mod commands;

use clap::Parser;
use repcheck_core::OutputFormat;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// repcheck: training reproducibility verifier
#[derive(Parser, Debug)]
#[command(name = "repcheck", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (for `.repcheck/config.toml`)
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress everything but errors on stderr
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Compare two checkpoints and report every divergent parameter
    Compare(CompareArgs),
    /// Print a content digest for each checkpoint
    Fingerprint {
        /// Checkpoint files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Summarize a checkpoint's contents
    Inspect {
        /// Checkpoint file
        path: PathBuf,

        /// Output format (text, json)
        #[arg(long)]
        format: Option<OutputFormat>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug, Default)]
struct CompareArgs {
    /// Checkpoint from the first run
    checkpoint_a: PathBuf,

    /// Checkpoint from the second run
    checkpoint_b: PathBuf,

    /// Absolute tolerance for floating-point values
    #[arg(short, long, alias = "atol")]
    tolerance: Option<f64>,

    /// Relative tolerance for floating-point values
    #[arg(long)]
    rtol: Option<f64>,

    /// Treat NaN at the same position in both checkpoints as a difference
    #[arg(long)]
    no_equal_nan: bool,

    /// Compare model parameters only
    #[arg(long)]
    skip_optimizer: bool,

    /// Allow checkpoints saved at different iterations
    #[arg(long)]
    allow_iteration_mismatch: bool,

    /// Allow differing embedded training configurations
    #[arg(long)]
    allow_config_mismatch: bool,

    /// Output format (text, json)
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Also write the JSON report to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default config to `.repcheck/config.toml`
    Init,
    /// Print the effective configuration
    Show,
}

fn init_tracing(verbose: u8, quiet: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    // stdout carries the report, so the stderr layer stays at warn unless asked.
    let filter = match verbose {
        0 if quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "repcheck", "repcheck")
        .map(|d| d.data_dir().join("logs"))
        .filter(|dir| std::fs::create_dir_all(dir).is_ok());
    let (json_layer, guard) = match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "repcheck.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();
    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.quiet);

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());

    match commands::handle_command(cli.command, &workspace, cli.config.as_deref()).await {
        Ok(status) => status.into(),
        Err(e) => {
            tracing::debug!(error = %e, "repcheck failed");
            eprintln!("error: {e:#}");
            ExitCode::from(commands::EXIT_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_compare() {
        let cli = Cli::try_parse_from([
            "repcheck",
            "compare",
            "run1/ckpt.json",
            "run2/ckpt.json",
            "--tolerance",
            "1e-6",
            "--format",
            "json",
            "--skip-optimizer",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Compare(args) = cli.command else {
            panic!("expected compare");
        };
        assert_eq!(args.tolerance, Some(1e-6));
        assert_eq!(args.format, Some(OutputFormat::Json));
        assert!(args.skip_optimizer);
        assert!(!args.allow_config_mismatch);
    }

    #[test]
    fn test_fingerprint_requires_paths() {
        assert!(Cli::try_parse_from(["repcheck", "fingerprint"]).is_err());
    }

    #[test]
    fn test_bad_format_rejected() {
        assert!(
            Cli::try_parse_from(["repcheck", "inspect", "a.json", "--format", "yaml"]).is_err()
        );
    }
}
