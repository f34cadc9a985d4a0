//! Generation job orchestration.
//!
//! A job hands a prompt to an external engine and collects either the text it
//! prints or the artifact file it writes.
//!
//! # Architecture
//!
//! ```text
//! transport → JobOrchestrator → JobWorkspace (fresh dir per job)
//!                             → ProcessInvoker (spawn engine, bounded wait)
//!                             → OutcomeClassifier → ArtifactResolver
//!                             → Outcome
//! ```
//!
//! The orchestrator:
//! 1. Assigns a job id and creates `<jobs_root>/<job-id>/`
//! 2. Runs the mode's engine entrypoint there, prompt as one argv element
//! 3. Kills the engine if it outlives the mode's budget
//! 4. Returns the captured stdout (text mode) or the newest artifact found in
//!    the workspace or its fallback subtree (artifact mode)
//!
//! # Example
//!
//! ```ignore
//! use gen_forge::job::{JobConfig, JobOrchestrator, Mode, Outcome};
//!
//! let orchestrator = JobOrchestrator::new(JobConfig::new("./jobs"))?;
//! match orchestrator.run_generation_job("a circle turning into a square", Mode::Artifact).await {
//!     Outcome::Artifact(artifact) => println!("{}", artifact.path.display()),
//!     Outcome::Text(text) => print!("{}", text),
//!     Outcome::Failure(failure) => eprintln!("{}", failure.to_json()),
//! }
//! ```

pub mod artifact;
pub mod config;
pub mod invoker;
pub mod orchestrator;
pub mod outcome;
pub mod request;
pub mod workspace;

pub use artifact::{resolve_artifact, ArtifactCandidate, ArtifactPattern, ArtifactResolver};
pub use config::{ArtifactNaming, EngineConfig, EngineEntry, JobConfig, TimeoutConfig};
pub use invoker::{EngineInvoker, Invocation, ProcessInvoker, ProcessResult, ProcessStatus};
pub use orchestrator::JobOrchestrator;
pub use outcome::{ArtifactOutput, FailureKind, JobFailure, Outcome, OutcomeClassifier};
pub use request::{GenerationRequest, JobId, Mode};
pub use workspace::JobWorkspace;
