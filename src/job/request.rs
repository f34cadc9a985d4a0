//! Generation requests and job identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of result a job is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// The engine writes its result to standard output.
    Text,
    /// The engine writes a file named after the artifact pattern.
    Artifact,
}

impl Mode {
    /// Returns the lowercase label used in logs, metrics and config keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Text => "text",
            Mode::Artifact => "artifact",
        }
    }

    /// Returns true if this mode produces a file artifact.
    pub fn produces_artifact(&self) -> bool {
        matches!(self, Mode::Artifact)
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::Text
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "code" => Ok(Mode::Text),
            "artifact" | "video" => Ok(Mode::Artifact),
            other => Err(format!("Unknown mode: {}", other)),
        }
    }
}

/// A single request handed to the orchestrator by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Free-text prompt, passed to the engine verbatim.
    pub prompt: String,
    /// Expected result kind.
    pub mode: Mode,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, mode: Mode) -> Self {
        Self {
            prompt: prompt.into(),
            mode,
        }
    }

    pub fn text(prompt: impl Into<String>) -> Self {
        Self::new(prompt, Mode::Text)
    }

    pub fn artifact(prompt: impl Into<String>) -> Self {
        Self::new(prompt, Mode::Artifact)
    }
}

/// Correlation identifier assigned to every job at facade entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Generates a fresh random job id.
    pub fn generate() -> Self {
        Self(format!("job-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
