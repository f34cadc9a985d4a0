//! Configuration for generation jobs.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Mode;
use crate::error::ConfigError;

/// Default budget for text jobs.
pub const DEFAULT_TEXT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default budget for artifact jobs; renders are slow.
pub const DEFAULT_ARTIFACT_TIMEOUT: Duration = Duration::from_secs(300);

/// Configuration shared by every job an orchestrator runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Engine entrypoints.
    pub engine: EngineConfig,
    /// Directory under which each job gets its own workspace.
    pub jobs_root: PathBuf,
    /// Subtree of a job workspace searched recursively when the workspace
    /// itself holds no artifact.
    pub fallback_subdir: PathBuf,
    /// Artifact filename convention.
    pub artifact: ArtifactNaming,
    /// Wall-clock budgets per mode.
    pub timeouts: TimeoutConfig,
    /// Keep job workspaces on disk after the outcome is dropped.
    pub retain_workspaces: bool,
}

impl JobConfig {
    /// Creates a configuration with defaults rooted at `jobs_root`.
    pub fn new(jobs_root: impl Into<PathBuf>) -> Self {
        Self {
            engine: EngineConfig::default(),
            jobs_root: jobs_root.into(),
            fallback_subdir: PathBuf::from("media"),
            artifact: ArtifactNaming::default(),
            timeouts: TimeoutConfig::default(),
            retain_workspaces: false,
        }
    }

    /// Loads a configuration from a YAML file. Missing keys take defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Renders the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for mode in [Mode::Text, Mode::Artifact] {
            if self.timeouts.for_mode(mode).is_zero() {
                return Err(ConfigError::ZeroTimeout {
                    mode: mode.to_string(),
                });
            }
            if self.engine.entry(mode).program.trim().is_empty() {
                return Err(ConfigError::EmptyProgram {
                    mode: mode.to_string(),
                });
            }
        }
        self.artifact.validate()
    }

    /// Sets the engine directory.
    pub fn with_engine_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.engine.dir = dir.into();
        self
    }

    /// Sets the entrypoint for a mode.
    pub fn with_entry(mut self, mode: Mode, entry: EngineEntry) -> Self {
        match mode {
            Mode::Text => self.engine.text = entry,
            Mode::Artifact => self.engine.artifact = entry,
        }
        self
    }

    /// Sets the budget for a mode.
    pub fn with_timeout(mut self, mode: Mode, timeout: Duration) -> Self {
        let ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        match mode {
            Mode::Text => self.timeouts.text_ms = ms,
            Mode::Artifact => self.timeouts.artifact_ms = ms,
        }
        self
    }

    /// Sets the fallback subtree, relative to each job workspace.
    pub fn with_fallback_subdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_subdir = dir.into();
        self
    }

    /// Sets the artifact naming convention.
    pub fn with_artifact_naming(mut self, naming: ArtifactNaming) -> Self {
        self.artifact = naming;
        self
    }

    /// Keeps workspaces on disk after jobs complete.
    pub fn retaining_workspaces(mut self, retain: bool) -> Self {
        self.retain_workspaces = retain;
        self
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self::new("./jobs")
    }
}

/// Engine entrypoints, one per mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory relative scripts and programs are resolved against.
    pub dir: PathBuf,
    /// Entrypoint for text jobs.
    pub text: EngineEntry,
    /// Entrypoint for artifact jobs.
    pub artifact: EngineEntry,
}

impl EngineConfig {
    /// Returns the entrypoint for `mode`.
    pub fn entry(&self, mode: Mode) -> &EngineEntry {
        match mode {
            Mode::Text => &self.text,
            Mode::Artifact => &self.artifact,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            text: EngineEntry::script("python3", "inference.py"),
            artifact: EngineEntry::script("python3", "generate_video.py"),
        }
    }
}

/// How to launch the engine for one mode.
///
/// The process is started as `<program> [<script>] [<args>...] <prompt>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEntry {
    /// Executable name (looked up on `PATH`) or path.
    pub program: String,
    /// Optional script handed to the program as its first argument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<PathBuf>,
    /// Fixed arguments placed before the prompt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl EngineEntry {
    /// Creates an entry that runs `program` directly.
    pub fn program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            script: None,
            args: Vec::new(),
        }
    }

    /// Creates an entry that runs `script` through `program`.
    pub fn script(program: impl Into<String>, script: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            script: Some(script.into()),
            args: Vec::new(),
        }
    }

    /// Adds a fixed argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Resolves the program path against `engine_dir`.
    ///
    /// Bare names stay untouched so `PATH` lookup still applies; relative
    /// paths with a separator are anchored at the engine directory because
    /// jobs run with their own working directory.
    pub fn resolved_program(&self, engine_dir: &Path) -> PathBuf {
        let program = Path::new(&self.program);
        if program.is_absolute() || program.components().count() <= 1 {
            program.to_path_buf()
        } else {
            absolutize(&engine_dir.join(program))
        }
    }

    /// Builds the argument vector, prompt last and as a single element.
    pub fn argv(&self, engine_dir: &Path, prompt: &str) -> Vec<OsString> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        if let Some(script) = &self.script {
            let script = if script.is_absolute() {
                script.clone()
            } else {
                absolutize(&engine_dir.join(script))
            };
            argv.push(script.into_os_string());
        }
        argv.extend(self.args.iter().map(OsString::from));
        argv.push(OsString::from(prompt));
        argv
    }
}

/// Artifact filename convention: `<prefix><YYYYMMDD>_<HHMMSS>.<extension>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactNaming {
    pub prefix: String,
    pub extension: String,
}

impl ArtifactNaming {
    pub fn new(prefix: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.extension.is_empty() {
            return Err(ConfigError::InvalidArtifactPattern(
                "extension must not be empty".to_string(),
            ));
        }
        if self.extension.contains(['.', '/', '\\']) || self.prefix.contains(['/', '\\']) {
            return Err(ConfigError::InvalidArtifactPattern(format!(
                "prefix '{}' and extension '{}' must be plain filename fragments",
                self.prefix, self.extension
            )));
        }
        Ok(())
    }
}

impl Default for ArtifactNaming {
    fn default() -> Self {
        Self::new("output_", "mp4")
    }
}

/// Per-mode wall-clock budgets in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub text_ms: u64,
    pub artifact_ms: u64,
}

impl TimeoutConfig {
    /// Returns the budget for `mode`.
    pub fn for_mode(&self, mode: Mode) -> Duration {
        match mode {
            Mode::Text => Duration::from_millis(self.text_ms),
            Mode::Artifact => Duration::from_millis(self.artifact_ms),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            text_ms: DEFAULT_TEXT_TIMEOUT.as_millis() as u64,
            artifact_ms: DEFAULT_ARTIFACT_TIMEOUT.as_millis() as u64,
        }
    }
}

fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
