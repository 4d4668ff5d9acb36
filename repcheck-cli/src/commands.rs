//! CLI subcommand handlers.

use crate::{Commands, CompareArgs, ConfigAction};
use repcheck_core::config::workspace_config_path;
use repcheck_core::{
    Checkpoint, OutputFormat, Verifier, VerifierConfig, VerifyError, load_config, persistence,
};
use serde_json::json;
use std::path::Path;
use std::process::ExitCode;

/// Some parameter differs beyond tolerance.
pub const EXIT_DIVERGED: u8 = 1;
/// Load error, structural mismatch, bad configuration or I/O failure.
pub const EXIT_ERROR: u8 = 2;

/// How a subcommand finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Diverged,
    LoadFailed,
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        match status {
            Status::Ok => ExitCode::SUCCESS,
            Status::Diverged => ExitCode::from(EXIT_DIVERGED),
            Status::LoadFailed => ExitCode::from(EXIT_ERROR),
        }
    }
}

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<Status> {
    match command {
        Commands::Compare(args) => handle_compare(args, workspace, config_file).await,
        Commands::Fingerprint { paths } => handle_fingerprint(&paths),
        Commands::Inspect { path, format } => {
            let config = load_config(Some(workspace), config_file)?;
            handle_inspect(&path, format.unwrap_or(config.output.format))
        }
        Commands::Config { action } => handle_config(action, workspace, config_file),
    }
}

/// Fold CLI flags over the layered configuration.
fn apply_overrides(config: &mut VerifierConfig, args: &CompareArgs) {
    if let Some(atol) = args.tolerance {
        config.tolerance.absolute = atol;
    }
    if let Some(rtol) = args.rtol {
        config.tolerance.relative = rtol;
    }
    if args.no_equal_nan {
        config.tolerance.equal_nan = false;
    }
    if args.skip_optimizer {
        config.compare.include_optimizer = false;
    }
    if args.allow_iteration_mismatch {
        config.compare.require_same_iteration = false;
    }
    if args.allow_config_mismatch {
        config.compare.require_same_config = false;
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }
}

async fn handle_compare(
    args: CompareArgs,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<Status> {
    let mut config = load_config(Some(workspace), config_file)?;
    apply_overrides(&mut config, &args);
    let verifier = Verifier::from_config(&config)?;

    let result = match verifier
        .verify(args.checkpoint_a.clone(), args.checkpoint_b.clone())
        .await
    {
        Ok(result) => result,
        Err(VerifyError::Load(e)) => {
            tracing::debug!(error = %e, "Checkpoints could not be compared");
            if config.output.format == OutputFormat::Json {
                let body = json!({ "verdict": "error", "error": e.to_string() });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                eprintln!("LOAD ERROR: {e}");
            }
            return Ok(Status::LoadFailed);
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(report) = &args.report {
        persistence::atomic_write_json(report, &result)?;
        tracing::info!(path = %report.display(), "Wrote comparison report");
    }

    match config.output.format {
        OutputFormat::Json => println!("{}", result.to_json()?),
        OutputFormat::Text => print!("{}", result.render_text()),
    }

    Ok(if result.passed() {
        Status::Ok
    } else {
        Status::Diverged
    })
}

fn handle_fingerprint(paths: &[std::path::PathBuf]) -> anyhow::Result<Status> {
    for path in paths {
        let checkpoint = Checkpoint::load(path)?;
        println!("{}  {}", checkpoint.fingerprint()?, path.display());
    }
    Ok(Status::Ok)
}

fn handle_inspect(path: &Path, format: OutputFormat) -> anyhow::Result<Status> {
    let checkpoint = Checkpoint::load(path)?;
    let fingerprint = checkpoint.fingerprint()?;

    match format {
        OutputFormat::Json => {
            let parameters: serde_json::Map<String, serde_json::Value> = checkpoint
                .parameters
                .iter()
                .map(|(id, t)| {
                    (
                        id.clone(),
                        json!({ "dtype": t.dtype(), "shape": t.shape() }),
                    )
                })
                .collect();
            let body = json!({
                "name": checkpoint.name,
                "iteration": checkpoint.iteration,
                "parameters": parameters,
                "total_elements": checkpoint.total_elements(),
                "optimizer_step": checkpoint.optimizer.as_ref().map(|o| o.step),
                "config": checkpoint.config,
                "fingerprint": fingerprint,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => print!("{}", inspect_text(&checkpoint, &fingerprint)),
    }
    Ok(Status::Ok)
}

fn inspect_text(checkpoint: &Checkpoint, fingerprint: &str) -> String {
    let mut out = format!("Checkpoint: {}\n", checkpoint.name);
    match checkpoint.iteration {
        Some(iter) => out.push_str(&format!("Iteration:  {iter}\n")),
        None => out.push_str("Iteration:  unknown\n"),
    }
    out.push_str(&format!(
        "Parameters: {} ({} elements)\n",
        checkpoint.parameters.len(),
        checkpoint.total_elements()
    ));
    for (id, tensor) in &checkpoint.parameters {
        out.push_str(&format!(
            "  {id}: {} {:?}\n",
            tensor.dtype(),
            tensor.shape()
        ));
    }
    match &checkpoint.optimizer {
        Some(opt) => out.push_str(&format!(
            "Optimizer:  step {}, {} buffers\n",
            opt.step,
            opt.state.len()
        )),
        None => out.push_str("Optimizer:  none\n"),
    }
    if let Some(config) = &checkpoint.config {
        out.push_str(&format!(
            "Config:     seed {}, max_iters {}, precision {}\n",
            config.seed, config.max_iters, config.precision
        ));
    }
    out.push_str(&format!("Fingerprint: {fingerprint}\n"));
    out
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<Status> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(Status::Ok);
            }
            let toml_str = toml::to_string_pretty(&VerifierConfig::default())?;
            persistence::atomic_write(&config_path, toml_str.as_bytes())?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(Status::Ok)
        }
        ConfigAction::Show => {
            let config = load_config(Some(workspace), config_file)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(Status::Ok)
        }
    }
}
