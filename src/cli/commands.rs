//! CLI command definitions for gen-forge.
//!
//! The CLI is a thin transport over [`JobOrchestrator`]: it collects a prompt
//! and mode, runs one job, and maps the outcome to stdout/stderr and an exit
//! code.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing::{debug, info};

use crate::job::{FailureKind, JobConfig, JobOrchestrator, Mode, Outcome};
use crate::metrics;

/// Default config file looked up when `--config` is not given.
const DEFAULT_CONFIG_FILE: &str = "gen-forge.yaml";

/// Run an external generation engine on a prompt and collect its result.
#[derive(Parser, Debug)]
#[command(name = "gen-forge")]
#[command(about = "Run an external generation engine on a prompt and collect its text or artifact")]
#[command(version)]
#[command(
    long_about = "gen-forge launches an external engine with a prompt, bounds its run time and returns either the text it prints or the artifact it renders.\n\nExample usage:\n  gen-forge run --mode artifact --output circle.mp4 \"a circle turning into a square\""
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML configuration file (defaults to ./gen-forge.yaml when present).
    #[arg(short, long, env = "GEN_FORGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run one generation job.
    #[command(alias = "generate")]
    Run(RunArgs),

    /// Print the effective configuration as YAML.
    Config(OverrideArgs),
}

/// Arguments for `gen-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Prompt handed to the engine verbatim.
    pub prompt: String,

    /// Result kind: text (alias: code) or artifact (alias: video).
    #[arg(short, long, default_value = "text")]
    pub mode: Mode,

    /// Where to copy the artifact (default: ./<artifact file name>).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the result as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Print Prometheus metrics to stderr after the job.
    #[arg(long)]
    pub metrics: bool,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

/// Settings that override the config file.
#[derive(clap::Args, Debug, Default)]
pub struct OverrideArgs {
    /// Directory under which per-job workspaces are created.
    #[arg(long, env = "GEN_FORGE_JOBS_ROOT")]
    pub jobs_root: Option<PathBuf>,

    /// Directory engine scripts are resolved against.
    #[arg(long, env = "GEN_FORGE_ENGINE_DIR")]
    pub engine_dir: Option<PathBuf>,

    /// Budget for text jobs, in seconds.
    #[arg(long)]
    pub text_timeout_secs: Option<u64>,

    /// Budget for artifact jobs, in seconds.
    #[arg(long)]
    pub artifact_timeout_secs: Option<u64>,

    /// Keep job workspaces on disk for inspection.
    #[arg(long)]
    pub keep_workspaces: bool,
}

impl OverrideArgs {
    fn apply(&self, mut config: JobConfig) -> JobConfig {
        if let Some(root) = &self.jobs_root {
            config.jobs_root = root.clone();
        }
        if let Some(dir) = &self.engine_dir {
            config = config.with_engine_dir(dir);
        }
        if let Some(secs) = self.text_timeout_secs {
            config = config.with_timeout(Mode::Text, Duration::from_secs(secs));
        }
        if let Some(secs) = self.artifact_timeout_secs {
            config = config.with_timeout(Mode::Artifact, Duration::from_secs(secs));
        }
        if self.keep_workspaces {
            config = config.retaining_workspaces(true);
        }
        config
    }
}

/// Exit code for a failed job, distinct per failure kind.
pub fn exit_code_for(kind: FailureKind) -> i32 {
    match kind {
        FailureKind::SpawnFailure => 3,
        FailureKind::Timeout => 4,
        FailureKind::EngineError => 5,
        FailureKind::ArtifactNotFound => 6,
    }
}

/// Parses CLI arguments from the process environment.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses arguments and runs the selected command.
pub async fn run() -> anyhow::Result<i32> {
    run_with_cli(parse_cli()).await
}

/// Runs the selected command and returns the process exit code.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Run(args) => {
            let config = load_config(cli.config.as_deref(), &args.overrides)?;
            run_job_command(config, args).await
        }
        Commands::Config(overrides) => {
            let config = load_config(cli.config.as_deref(), &overrides)?;
            print!("{}", config.to_yaml()?);
            Ok(0)
        }
    }
}

/// Loads the config file (explicit, or the default if it exists) and applies
/// overrides.
fn load_config(path: Option<&Path>, overrides: &OverrideArgs) -> anyhow::Result<JobConfig> {
    let config = match path {
        Some(path) => JobConfig::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            JobConfig::from_file(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => JobConfig::default(),
    };

    let config = overrides.apply(config);
    config.validate()?;
    debug!("Effective configuration: {:?}", config);
    Ok(config)
}

#[derive(Debug, Serialize)]
struct TextResponse<'a> {
    result: &'a str,
}

#[derive(Debug, Serialize)]
struct ArtifactResponse<'a> {
    artifact: &'a Path,
    media_type: &'a str,
    bytes: u64,
}

async fn run_job_command(config: JobConfig, args: RunArgs) -> anyhow::Result<i32> {
    if args.metrics {
        metrics::init_metrics()?;
    }

    let orchestrator = JobOrchestrator::new(config)?;
    let outcome = orchestrator.run_generation_job(&args.prompt, args.mode).await;

    let code = match outcome {
        Outcome::Text(text) => {
            if args.json {
                println!("{}", serde_json::to_string(&TextResponse { result: &text })?);
            } else {
                print!("{}", text);
            }
            0
        }
        Outcome::Artifact(artifact) => {
            let dest = match args.output {
                Some(dest) => dest,
                None => PathBuf::from(artifact.path.file_name().unwrap_or_default()),
            };
            let bytes = artifact.copy_to(&dest).await.map_err(|e| {
                anyhow::anyhow!(
                    "Failed to copy artifact {} to {}: {}",
                    artifact.path.display(),
                    dest.display(),
                    e
                )
            })?;
            info!("Wrote {} ({} bytes, {})", dest.display(), bytes, artifact.media_type);

            if args.json {
                let response = ArtifactResponse {
                    artifact: &dest,
                    media_type: &artifact.media_type,
                    bytes,
                };
                println!("{}", serde_json::to_string(&response)?);
            } else {
                println!("{}", dest.display());
            }
            0
        }
        Outcome::Failure(failure) => {
            eprintln!("{}", failure.to_json());
            exit_code_for(failure.kind)
        }
    };

    if args.metrics {
        eprint!("{}", metrics::export_metrics());
    }

    Ok(code)
}
