//! Orchestration facade - the single entry point transports call.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use super::artifact::ArtifactResolver;
use super::config::JobConfig;
use super::invoker::{EngineInvoker, Invocation, ProcessInvoker, JOB_ID_ENV, OUTPUT_DIR_ENV};
use super::outcome::{FailureKind, JobFailure, Outcome, OutcomeClassifier};
use super::workspace::JobWorkspace;
use super::{GenerationRequest, JobId, Mode};
use crate::error::ConfigError;
use crate::metrics;

/// Runs generation jobs.
///
/// Cheap to clone and safe to share between concurrent callers; each job
/// gets its own workspace, so jobs never see each other's artifacts.
#[derive(Clone)]
pub struct JobOrchestrator {
    config: Arc<JobConfig>,
    invoker: Arc<dyn ProcessInvoker>,
    classifier: OutcomeClassifier,
}

impl JobOrchestrator {
    /// Creates an orchestrator that launches the configured engine.
    pub fn new(config: JobConfig) -> Result<Self, ConfigError> {
        let invoker = EngineInvoker::new(config.engine.clone());
        Self::with_invoker(config, Arc::new(invoker))
    }

    /// Creates an orchestrator with a custom invoker.
    pub fn with_invoker(
        config: JobConfig,
        invoker: Arc<dyn ProcessInvoker>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let classifier = OutcomeClassifier::new(ArtifactResolver::for_naming(&config.artifact)?);
        Ok(Self {
            config: Arc::new(config),
            invoker,
            classifier,
        })
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Runs one job and returns exactly one outcome. Never retries.
    pub async fn run_generation_job(&self, prompt: &str, mode: Mode) -> Outcome {
        let job_id = JobId::generate();
        let start = Instant::now();

        info!(
            "Starting {} job {} ({} chars of prompt)",
            mode,
            job_id,
            prompt.chars().count()
        );
        metrics::job_started();

        let outcome = self.execute(&job_id, prompt, mode).await;
        let duration = start.elapsed();
        metrics::job_finished(mode, &outcome, duration);

        match &outcome {
            Outcome::Text(text) => {
                info!("Job {} produced {} bytes of text in {:?}", job_id, text.len(), duration)
            }
            Outcome::Artifact(artifact) => match artifact.produced_at() {
                Some(stamp) => info!(
                    "Job {} produced {} (stamped {}) in {:?}",
                    job_id,
                    artifact.path.display(),
                    stamp,
                    duration
                ),
                None => info!(
                    "Job {} produced {} in {:?}",
                    job_id,
                    artifact.path.display(),
                    duration
                ),
            },
            Outcome::Failure(failure) => {
                error!("Job {} failed after {:?}: {}", job_id, duration, failure)
            }
        }

        outcome
    }

    /// Runs a request. Same as [`Self::run_generation_job`].
    pub async fn run(&self, request: &GenerationRequest) -> Outcome {
        self.run_generation_job(&request.prompt, request.mode).await
    }

    async fn execute(&self, job_id: &JobId, prompt: &str, mode: Mode) -> Outcome {
        let workspace = match JobWorkspace::create(
            &self.config.jobs_root,
            job_id,
            self.config.retain_workspaces,
        ) {
            Ok(workspace) => Arc::new(workspace),
            Err(e) => {
                return Outcome::Failure(JobFailure::new(
                    FailureKind::SpawnFailure,
                    format!("could not prepare job workspace: {}", e),
                    String::new(),
                ));
            }
        };

        let work_dir = workspace.path().to_path_buf();
        let invocation = Invocation::new(
            prompt,
            mode,
            &work_dir,
            self.config.timeouts.for_mode(mode),
        )
        .with_env(JOB_ID_ENV, job_id.as_str())
        .with_env(OUTPUT_DIR_ENV, work_dir.to_string_lossy());

        let result = self.invoker.invoke(&invocation).await;

        let fallback_dir = work_dir.join(&self.config.fallback_subdir);
        let outcome = self
            .classifier
            .classify(mode, result, &work_dir, &fallback_dir);

        match outcome {
            Outcome::Artifact(artifact) => Outcome::Artifact(artifact.with_workspace(workspace)),
            other => {
                if workspace.is_retained() {
                    warn!("Keeping workspace {} for inspection", work_dir.display());
                }
                other
            }
        }
    }
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
