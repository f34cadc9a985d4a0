//! Error types for gen-forge infrastructure.
//!
//! Job-level failures (engine timeouts, non-zero exits, missing artifacts) are
//! not errors: they are reported as [`crate::job::Outcome::Failure`] values.
//! The types here cover what happens around a job:
//! - Loading and validating configuration
//! - Creating and removing per-job workspaces
//! - Metrics registration

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid timeout for {mode} mode: must be greater than zero")]
    ZeroTimeout { mode: String },

    #[error("Engine entrypoint for {mode} mode has an empty program")]
    EmptyProgram { mode: String },

    #[error("Invalid artifact naming: {0}")]
    InvalidArtifactPattern(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur while managing a job workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to create jobs root '{path}': {source}")]
    CreateRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create workspace '{path}': {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove workspace '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while setting up metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}
