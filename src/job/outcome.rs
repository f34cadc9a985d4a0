//! Job outcomes and the classifier that produces them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::artifact::{media_type_for, parse_sort_key, ArtifactCandidate, ArtifactResolver};
use super::invoker::{ProcessResult, ProcessStatus};
use super::workspace::JobWorkspace;
use super::Mode;

/// Why a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The engine could not be started (or its workspace could not be made).
    SpawnFailure,
    /// The engine ran past its budget and was killed.
    Timeout,
    /// The engine exited unsuccessfully.
    EngineError,
    /// The engine exited cleanly but no artifact was found.
    ArtifactNotFound,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::SpawnFailure => "spawn_failure",
            FailureKind::Timeout => "timeout",
            FailureKind::EngineError => "engine_error",
            FailureKind::ArtifactNotFound => "artifact_not_found",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured failure payload handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
    pub diagnostics: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            diagnostics: diagnostics.into(),
        }
    }

    /// Serializes the payload as `{ kind, message, diagnostics }`.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| {
            format!(
                "{{\"kind\":\"{}\",\"message\":\"failed to encode failure: {}\"}}",
                self.kind, e
            )
        })
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A produced artifact.
///
/// Holds on to the job workspace: the file stays on disk until every clone
/// of this value is dropped.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactOutput {
    pub path: PathBuf,
    pub media_type: String,
    /// `YYYYMMDD_HHMMSS` from the filename.
    pub sort_key: String,
    #[serde(skip)]
    workspace: Option<Arc<JobWorkspace>>,
}

impl ArtifactOutput {
    pub fn new(candidate: ArtifactCandidate) -> Self {
        let media_type = candidate
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(media_type_for)
            .unwrap_or("application/octet-stream")
            .to_string();
        Self {
            path: candidate.path,
            media_type,
            sort_key: candidate.sort_key,
            workspace: None,
        }
    }

    /// Ties the workspace's lifetime to this artifact.
    pub fn with_workspace(mut self, workspace: Arc<JobWorkspace>) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the engine stamped the artifact, if the stamp is a real time.
    pub fn produced_at(&self) -> Option<NaiveDateTime> {
        parse_sort_key(&self.sort_key)
    }

    /// Reads the artifact into memory.
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    /// Copies the artifact to `dest`, returning the number of bytes copied.
    pub async fn copy_to(&self, dest: &Path) -> std::io::Result<u64> {
        tokio::fs::copy(&self.path, dest).await
    }
}

impl PartialEq for ArtifactOutput {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.media_type == other.media_type
            && self.sort_key == other.sort_key
    }
}

/// Terminal result of one generation job.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Entire engine stdout, untrimmed.
    Text(String),
    Artifact(ArtifactOutput),
    Failure(JobFailure),
}

impl Outcome {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Text(_) => "text",
            Outcome::Artifact(_) => "artifact",
            Outcome::Failure(failure) => failure.kind.as_str(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failure(_))
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        match self {
            Outcome::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    fn fail(kind: FailureKind, message: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Outcome::Failure(JobFailure::new(kind, message, diagnostics))
    }
}

/// Maps an engine run to an [`Outcome`].
#[derive(Debug, Clone)]
pub struct OutcomeClassifier {
    resolver: ArtifactResolver,
}

impl OutcomeClassifier {
    pub fn new(resolver: ArtifactResolver) -> Self {
        Self { resolver }
    }

    /// Classifies `result`. In artifact mode the resolver is consulted only
    /// after a clean exit.
    pub fn classify(
        &self,
        mode: Mode,
        result: ProcessResult,
        primary_dir: &Path,
        fallback_dir: &Path,
    ) -> Outcome {
        match result.status {
            ProcessStatus::SpawnFailed { reason } => {
                return Outcome::fail(FailureKind::SpawnFailure, reason, result.stderr);
            }
            ProcessStatus::TimedOut => {
                return Outcome::fail(
                    FailureKind::Timeout,
                    format!("execution exceeded budget after {:?}", result.duration),
                    result.stderr,
                );
            }
            ProcessStatus::WaitFailed { reason } => {
                return Outcome::fail(
                    FailureKind::EngineError,
                    format!("lost track of engine process: {}", reason),
                    result.stderr,
                );
            }
            ProcessStatus::Exited { code: None } => {
                return Outcome::fail(
                    FailureKind::EngineError,
                    "engine terminated by signal",
                    result.stderr,
                );
            }
            ProcessStatus::Exited { code: Some(code) } if code != 0 => {
                return Outcome::fail(
                    FailureKind::EngineError,
                    format!("engine exited with status {}", code),
                    result.stderr,
                );
            }
            ProcessStatus::Exited { .. } => {}
        }

        match mode {
            Mode::Text => Outcome::Text(result.stdout),
            Mode::Artifact => match self.resolver.resolve(primary_dir, fallback_dir) {
                Some(candidate) => Outcome::Artifact(ArtifactOutput::new(candidate)),
                None => Outcome::fail(
                    FailureKind::ArtifactNotFound,
                    format!(
                        "engine exited successfully but no artifact matching {} was found",
                        self.resolver.pattern().describe()
                    ),
                    combined_diagnostics(&result.stdout, &result.stderr),
                ),
            },
        }
    }

}

fn combined_diagnostics(stdout: &str, stderr: &str) -> String {
    format!("--- stdout ---\n{}\n--- stderr ---\n{}", stdout, stderr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::config::ArtifactNaming;
    use std::time::Duration;
    use tempfile::TempDir;

    fn classifier() -> OutcomeClassifier {
        OutcomeClassifier::new(ArtifactResolver::for_naming(&ArtifactNaming::default()).unwrap())
    }

    fn empty_dirs() -> TempDir {
        TempDir::new().unwrap()
    }

    #[test]
    fn test_text_success_is_verbatim() {
        let dir = empty_dirs();
        let outcome = classifier().classify(
            Mode::Text,
            ProcessResult::exited(0, "hello\n  \n", ""),
            dir.path(),
            dir.path(),
        );
        assert_eq!(outcome, Outcome::Text("hello\n  \n".to_string()));
    }

    #[test]
    fn test_timeout_beats_exit_code() {
        let dir = empty_dirs();
        let result = ProcessResult::new(
            ProcessStatus::TimedOut,
            "partial".into(),
            "still rendering".into(),
            Duration::from_secs(3),
        );

        let outcome = classifier().classify(Mode::Artifact, result, dir.path(), dir.path());

        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert!(failure.message.contains("exceeded budget"));
        assert_eq!(failure.diagnostics, "still rendering");
    }

    #[test]
    fn test_non_zero_exit_is_engine_error() {
        let dir = empty_dirs();
        let outcome = classifier().classify(
            Mode::Text,
            ProcessResult::exited(1, "", "boom"),
            dir.path(),
            dir.path(),
        );

        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::EngineError);
        assert!(failure.message.contains("status 1"));
        assert!(failure.diagnostics.contains("boom"));
    }

    #[test]
    fn test_engine_error_skips_artifact_lookup() {
        let dir = empty_dirs();
        std::fs::write(dir.path().join("output_20240101_120000.mp4"), b"x").unwrap();

        let outcome = classifier().classify(
            Mode::Artifact,
            ProcessResult::exited(2, "", "render failed"),
            dir.path(),
            dir.path(),
        );

        assert_eq!(outcome.label(), "engine_error");
    }

    #[test]
    fn test_signal_exit_is_engine_error() {
        let dir = empty_dirs();
        let result = ProcessResult::new(
            ProcessStatus::Exited { code: None },
            String::new(),
            String::new(),
            Duration::ZERO,
        );
        let outcome = classifier().classify(Mode::Text, result, dir.path(), dir.path());
        assert_eq!(outcome.failure().unwrap().kind, FailureKind::EngineError);
    }

    #[test]
    fn test_spawn_failure() {
        let dir = empty_dirs();
        let outcome = classifier().classify(
            Mode::Text,
            ProcessResult::spawn_failed("No such file or directory", Duration::ZERO),
            dir.path(),
            dir.path(),
        );
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::SpawnFailure);
        assert!(failure.message.contains("No such file"));
    }

    #[test]
    fn test_artifact_found() {
        let dir = empty_dirs();
        let path = dir.path().join("output_20240101_120000.mp4");
        std::fs::write(&path, b"x").unwrap();

        let outcome = classifier().classify(
            Mode::Artifact,
            ProcessResult::exited(0, "Video generated", ""),
            dir.path(),
            &dir.path().join("media"),
        );

        match outcome {
            Outcome::Artifact(artifact) => {
                assert_eq!(artifact.path, path);
                assert_eq!(artifact.media_type, "video/mp4");
                assert_eq!(artifact.sort_key, "20240101_120000");
                let stamp = artifact.produced_at().unwrap();
                assert_eq!(stamp.to_string(), "2024-01-01 12:00:00");
            }
            other => panic!("expected artifact, got {:?}", other),
        }
    }

    #[test]
    fn test_clean_exit_without_artifact_is_failure() {
        let dir = empty_dirs();
        let outcome = classifier().classify(
            Mode::Artifact,
            ProcessResult::exited(0, "Error: LLM did not return valid code", "warn"),
            dir.path(),
            &dir.path().join("media"),
        );

        let failure = outcome.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::ArtifactNotFound);
        assert!(failure.diagnostics.contains("did not return valid code"));
        assert!(failure.diagnostics.contains("warn"));
        assert!(failure.message.contains("output_YYYYMMDD_HHMMSS.mp4"));
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_failure_payload_shape() {
        let failure = JobFailure::new(FailureKind::ArtifactNotFound, "missing", "logs");
        let value: serde_json::Value = serde_json::from_str(&failure.to_json()).unwrap();

        assert_eq!(value["kind"], "artifact_not_found");
        assert_eq!(value["message"], "missing");
        assert_eq!(value["diagnostics"], "logs");
        assert_eq!(failure.to_string(), "artifact_not_found: missing");
    }
}
