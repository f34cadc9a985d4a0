//! Process invoker - launches the engine and bounds its run time.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::EngineConfig;
use super::Mode;

/// How long to keep draining stdout/stderr after the engine is gone.
/// Descendants that inherited the pipes can hold them open indefinitely.
const STREAM_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Environment variable carrying the job id to the engine.
pub const JOB_ID_ENV: &str = "GEN_FORGE_JOB_ID";

/// Environment variable carrying the job workspace to the engine.
pub const OUTPUT_DIR_ENV: &str = "GEN_FORGE_OUTPUT_DIR";

/// Everything needed to launch the engine once.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Prompt, passed as the last argv element.
    pub prompt: String,
    /// Selects the engine entrypoint.
    pub mode: Mode,
    /// Working directory of the engine process.
    pub work_dir: PathBuf,
    /// Wall-clock budget.
    pub timeout: Duration,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(
        prompt: impl Into<String>,
        mode: Mode,
        work_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            mode,
            work_dir: work_dir.into(),
            timeout,
            env: Vec::new(),
        }
    }

    /// Adds an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// How the engine process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessStatus {
    /// The process exited on its own. `code` is `None` when killed by a signal.
    Exited { code: Option<i32> },
    /// The budget expired and the process was killed.
    TimedOut,
    /// The process could not be started.
    SpawnFailed { reason: String },
    /// Waiting on the process failed after it started.
    WaitFailed { reason: String },
}

/// Captured result of one engine run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub status: ProcessStatus,
    /// Full standard output (partial when timed out).
    pub stdout: String,
    /// Full standard error (partial when timed out).
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessResult {
    pub fn new(status: ProcessStatus, stdout: String, stderr: String, duration: Duration) -> Self {
        Self {
            status,
            stdout,
            stderr,
            duration,
        }
    }

    /// A process that exited with `code`.
    pub fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::new(
            ProcessStatus::Exited { code: Some(code) },
            stdout.into(),
            stderr.into(),
            Duration::ZERO,
        )
    }

    /// A process that could not be started.
    pub fn spawn_failed(reason: impl Into<String>, duration: Duration) -> Self {
        Self::new(
            ProcessStatus::SpawnFailed {
                reason: reason.into(),
            },
            String::new(),
            String::new(),
            duration,
        )
    }

    /// Returns true if the budget expired.
    pub fn timed_out(&self) -> bool {
        matches!(self.status, ProcessStatus::TimedOut)
    }

    /// Exit code, if the process exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            ProcessStatus::Exited { code } => code,
            _ => None,
        }
    }

    /// Returns true if the process exited with status 0.
    pub fn is_success(&self) -> bool {
        self.exit_code() == Some(0)
    }
}

/// Launches the engine. Implementations never return errors: every way a run
/// can end is a [`ProcessStatus`].
#[async_trait]
pub trait ProcessInvoker: Send + Sync {
    async fn invoke(&self, invocation: &Invocation) -> ProcessResult;
}

/// Invoker that runs the configured engine as a child process.
#[derive(Debug, Clone)]
pub struct EngineInvoker {
    engine: EngineConfig,
}

impl EngineInvoker {
    pub fn new(engine: EngineConfig) -> Self {
        Self { engine }
    }

    /// Builds the command for an invocation without spawning it.
    fn command(&self, invocation: &Invocation) -> Command {
        let entry = self.engine.entry(invocation.mode);
        let program = entry.resolved_program(&self.engine.dir);
        let argv = entry.argv(&self.engine.dir, &invocation.prompt);

        debug!(
            "Engine argv for {} mode: {} {:?}",
            invocation.mode,
            program.display(),
            argv
        );

        let mut cmd = Command::new(program);
        cmd.args(&argv)
            .current_dir(&invocation.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }

        // Own process group so a timeout can take down the engine's children too
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

#[async_trait]
impl ProcessInvoker for EngineInvoker {
    async fn invoke(&self, invocation: &Invocation) -> ProcessResult {
        let start = Instant::now();
        let program = self.engine.entry(invocation.mode).program.clone();

        let mut child = match self.command(invocation).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn engine {}: {}", program, e);
                return ProcessResult::spawn_failed(
                    format!("Failed to spawn {}: {}", program, e),
                    start.elapsed(),
                );
            }
        };

        info!(
            "Started engine {} (pid {:?}) in {} with a {:?} budget",
            program,
            child.id(),
            invocation.work_dir.display(),
            invocation.timeout
        );

        let stdout = child.stdout.take().map(StreamCapture::spawn);
        let stderr = child.stderr.take().map(StreamCapture::spawn);

        let status = match tokio::time::timeout(invocation.timeout, child.wait()).await {
            Ok(Ok(status)) => ProcessStatus::Exited {
                code: status.code(),
            },
            Ok(Err(e)) => {
                warn!("Lost track of engine {}: {}", program, e);
                terminate(&mut child).await;
                ProcessStatus::WaitFailed {
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                warn!(
                    "Engine {} exceeded its {:?} budget; killing it",
                    program, invocation.timeout
                );
                terminate(&mut child).await;
                ProcessStatus::TimedOut
            }
        };

        let (stdout, stderr) =
            tokio::join!(StreamCapture::finish(stdout), StreamCapture::finish(stderr));
        let duration = start.elapsed();

        debug!(
            "Engine {} finished with {:?} after {:?} ({} bytes stdout, {} bytes stderr)",
            program,
            status,
            duration,
            stdout.len(),
            stderr.len()
        );

        ProcessResult::new(status, stdout, stderr, duration)
    }
}

/// Kills the engine and its process group, then reaps it.
async fn terminate(child: &mut Child) {
    signal_group(child).await;

    if let Err(e) = child.kill().await {
        // Already reaped if the group kill got there first
        debug!("kill after group signal: {}", e);
    }
    if let Err(e) = child.wait().await {
        warn!("Failed to reap engine process: {}", e);
    }
}

#[cfg(unix)]
async fn signal_group(child: &Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    // The engine leads its own group, so its pid is the pgid
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        warn!("Failed to signal process group {}: {}", pid, e);
    }
}

#[cfg(not(unix))]
async fn signal_group(_child: &Child) {}

/// Background reader that accumulates a child stream.
///
/// The buffer is shared so that whatever was read survives if the reader has
/// to be abandoned.
struct StreamCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl StreamCapture {
    fn spawn<R>(mut stream: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let task = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match stream.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .extend_from_slice(&chunk[..n]),
                    Err(e) => {
                        debug!("Stopped reading engine stream: {}", e);
                        break;
                    }
                }
            }
        });
        Self { buffer, task }
    }

    async fn finish(capture: Option<Self>) -> String {
        let Some(capture) = capture else {
            return String::new();
        };

        let mut task = capture.task;
        if tokio::time::timeout(STREAM_DRAIN_GRACE, &mut task).await.is_err() {
            warn!("Engine stream still open after exit; keeping partial output");
            task.abort();
        }

        let bytes = capture
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::config::EngineEntry;

    #[test]
    fn test_process_result_states() {
        let ok = ProcessResult::exited(0, "out", "");
        assert!(ok.is_success());
        assert!(!ok.timed_out());
        assert_eq!(ok.exit_code(), Some(0));

        let failed = ProcessResult::exited(1, "", "boom");
        assert!(!failed.is_success());
        assert_eq!(failed.exit_code(), Some(1));

        let spawn = ProcessResult::spawn_failed("missing", Duration::ZERO);
        assert!(!spawn.is_success());
        assert_eq!(spawn.exit_code(), None);

        let timeout = ProcessResult::new(
            ProcessStatus::TimedOut,
            String::new(),
            String::new(),
            Duration::from_secs(1),
        );
        assert!(timeout.timed_out());
        assert!(!timeout.is_success());
    }

    #[test]
    fn test_invocation_builder() {
        let invocation = Invocation::new("p", Mode::Text, "/tmp", Duration::from_secs(1))
            .with_env(JOB_ID_ENV, "job-1");
        assert_eq!(invocation.env, vec![(JOB_ID_ENV.to_string(), "job-1".to_string())]);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_failure() {
        let engine = EngineConfig {
            dir: PathBuf::from("."),
            text: EngineEntry::program("gen-forge-definitely-missing-engine"),
            artifact: EngineEntry::program("gen-forge-definitely-missing-engine"),
        };
        let invoker = EngineInvoker::new(engine);
        let dir = std::env::temp_dir();

        let result = invoker
            .invoke(&Invocation::new("hi", Mode::Text, dir, Duration::from_secs(5)))
            .await;

        assert!(matches!(result.status, ProcessStatus::SpawnFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_both_streams() {
        let engine = EngineConfig {
            dir: PathBuf::from("."),
            text: EngineEntry::program("sh")
                .with_arg("-c")
                .with_arg("printf 'out:%s' \"$0\"; printf err >&2"),
            artifact: EngineEntry::program("false"),
        };
        let invoker = EngineInvoker::new(engine);

        let result = invoker
            .invoke(&Invocation::new(
                "a b",
                Mode::Text,
                std::env::temp_dir(),
                Duration::from_secs(10),
            ))
            .await;

        assert!(result.is_success(), "unexpected result: {:?}", result);
        assert_eq!(result.stdout, "out:a b");
        assert_eq!(result.stderr, "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_drain_grace_is_shared_by_both_streams() {
        let engine = EngineConfig {
            dir: PathBuf::from("."),
            text: EngineEntry::program("sh")
                .with_arg("-c")
                .with_arg("(sleep 5; printf late) & printf early"),
            artifact: EngineEntry::program("false"),
        };
        let invoker = EngineInvoker::new(engine);

        let start = Instant::now();
        let result = invoker
            .invoke(&Invocation::new(
                "x",
                Mode::Text,
                std::env::temp_dir(),
                Duration::from_secs(10),
            ))
            .await;

        assert!(result.is_success(), "unexpected result: {:?}", result);
        assert_eq!(result.stdout, "early");
        assert!(
            start.elapsed() < STREAM_DRAIN_GRACE + Duration::from_millis(1500),
            "drain took {:?}",
            start.elapsed()
        );
    }
}
