//! gen-forge: generation job orchestrator.
//!
//! This library launches an external generation engine on a prompt, bounds
//! its execution time, and returns either the text it prints or the artifact
//! file it produces.

pub mod cli;
pub mod error;
pub mod job;
pub mod metrics;

// Re-export commonly used types
pub use error::{ConfigError, MetricsError, WorkspaceError};
pub use job::{GenerationRequest, JobConfig, JobOrchestrator, Mode, Outcome};
