// src/harness/runner.rs: Run a synthesized project under forge
//
// Each run gets a fresh temp directory that is removed on every exit path
// (the TempDir guard is dropped even on early return or panic). The test
// process is started in its own process group so a timeout can take solc
// and anvil children down with it.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use super::synthesizer::{HarnessProject, TEST_NAME};
use crate::infra::config::HarnessConfig;
use crate::infra::errors::VeriteError;
use crate::infra::paths;

const WORKSPACE_PREFIX: &str = "verite_exploit_";

/// Sample files `forge init` creates that would otherwise be compiled too.
const INIT_SAMPLES: &[&str] = &["src/Counter.sol", "test/Counter.t.sol", "script/Counter.s.sol"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompileFailure,
    Timeout,
    ProcessError,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::CompileFailure => "compile_failure",
            RunStatus::Timeout => "timeout",
            RunStatus::ProcessError => "process_error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RawOutput {
    /// stdout followed by stderr.
    pub output: String,
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
    pub status: RunStatus,
    /// Set only when the workspace was kept for debugging.
    pub kept_workspace: Option<PathBuf>,
}

impl RawOutput {
    /// Terminal error for statuses the caller should surface as-is.
    pub fn to_error(&self, timeout: Duration) -> Option<VeriteError> {
        match self.status {
            RunStatus::Completed => None,
            RunStatus::CompileFailure => Some(VeriteError::CompileFailure {
                message: compile_errors(&self.output),
            }),
            RunStatus::Timeout => Some(VeriteError::ExecutionTimeout {
                seconds: timeout.as_secs(),
            }),
            RunStatus::ProcessError => Some(VeriteError::ProcessError {
                exit_code: self.exit_code,
                message: tail(&self.output, 20),
            }),
        }
    }
}

pub fn is_compile_failure(output: &str) -> bool {
    output.contains("Compiler run failed") || output.contains("Compilation failed")
}

/// Compiler error lines, or the output tail when none can be picked out.
fn compile_errors(output: &str) -> String {
    let errors: Vec<&str> = output
        .lines()
        .filter(|l| l.trim_start().starts_with("Error"))
        .take(10)
        .collect();
    if errors.is_empty() {
        tail(output, 20)
    } else {
        errors.join("\n")
    }
}

fn tail(output: &str, lines: usize) -> String {
    let all: Vec<&str> = output.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

fn classify(exit_code: Option<i32>, output: &str) -> RunStatus {
    if is_compile_failure(output) {
        RunStatus::CompileFailure
    } else if exit_code == Some(0) {
        RunStatus::Completed
    } else {
        RunStatus::ProcessError
    }
}

struct CommandOutput {
    output: String,
    exit_code: Option<i32>,
    timed_out: bool,
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // SAFETY: plain syscall on a pgid we created; failure only means the
        // group is already gone.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

/// How long to wait for the pipes to close once the group has been killed.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Read a child pipe to EOF in the background. Bytes that arrived before a
/// read error or a kill are kept.
fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                tracing::debug!("Child pipe closed with error after {} bytes: {e}", buf.len());
            }
        }
        buf
    })
}

async fn collect(reader: JoinHandle<Vec<u8>>) -> String {
    match tokio::time::timeout(DRAIN_GRACE, reader).await {
        Ok(Ok(buf)) => String::from_utf8_lossy(&buf).into_owned(),
        Ok(Err(e)) => {
            tracing::debug!("Pipe reader task failed: {e}");
            String::new()
        }
        Err(_) => {
            tracing::debug!("Pipe still open {}s after kill", DRAIN_GRACE.as_secs());
            String::new()
        }
    }
}

async fn run_command(mut cmd: Command, timeout: Duration) -> Result<CommandOutput, std::io::Error> {
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn()?;
    let pid = child.id();
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => (status?.code(), false),
        Err(_) => {
            kill_group(pid);
            (None, true)
        }
    };

    let stdout = collect(stdout).await;
    let stderr = collect(stderr).await;
    Ok(CommandOutput {
        output: format!("{stdout}\n{stderr}"),
        exit_code,
        timed_out,
    })
}

pub struct HarnessRunner {
    forge_path: String,
    keep_workspace: bool,
}

impl HarnessRunner {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            forge_path: config.forge_path.clone(),
            keep_workspace: config.keep_workspace,
        }
    }

    /// Initialize a workspace, write the project, run the exploit test.
    pub async fn run(&self, project: &HarnessProject, timeout: Duration) -> Result<RawOutput, VeriteError> {
        let workspace = tempfile::Builder::new().prefix(WORKSPACE_PREFIX).tempdir()?;
        let started = Instant::now();
        let result = self.run_in(workspace.path(), project, timeout, started).await;
        let kept = self.finish(workspace);
        result.map(|mut raw| {
            raw.kept_workspace = kept;
            raw
        })
    }

    async fn run_in(
        &self,
        dir: &Path,
        project: &HarnessProject,
        timeout: Duration,
        started: Instant,
    ) -> Result<RawOutput, VeriteError> {
        let mut init = Command::new(&self.forge_path);
        init.arg("init").arg(dir).args(["--no-git", "--quiet", "--force"]);
        let init_out = match run_command(init, timeout).await {
            Ok(out) => out,
            Err(e) => return Ok(spawn_failure(&self.forge_path, e, started)),
        };
        if init_out.timed_out || init_out.exit_code != Some(0) {
            tracing::warn!(exit_code = ?init_out.exit_code, "forge init failed");
            return Ok(RawOutput {
                output: init_out.output,
                exit_code: init_out.exit_code,
                elapsed: started.elapsed(),
                status: if init_out.timed_out {
                    RunStatus::Timeout
                } else {
                    RunStatus::ProcessError
                },
                kept_workspace: None,
            });
        }

        for sample in INIT_SAMPLES {
            let _ = std::fs::remove_file(dir.join(sample));
        }
        project.write_to(dir)?;

        let remaining = timeout.saturating_sub(started.elapsed());
        let mut test = Command::new(&self.forge_path);
        test.current_dir(dir)
            .args(["test", "--match-test", TEST_NAME, "-vv"])
            .args(["--fork-url", &project.fork_url])
            .args(["--fork-block-number", &project.fork_block.to_string()])
            .env("NO_COLOR", "1");

        tracing::info!(
            chain_id = project.chain_id,
            fork_block = project.fork_block,
            "Running forge test"
        );
        let out = match run_command(test, remaining).await {
            Ok(out) => out,
            Err(e) => return Ok(spawn_failure(&self.forge_path, e, started)),
        };

        let status = if out.timed_out {
            tracing::warn!(timeout_secs = timeout.as_secs(), "forge test timed out, process group killed");
            RunStatus::Timeout
        } else {
            classify(out.exit_code, &out.output)
        };
        tracing::debug!(status = status.as_str(), exit_code = ?out.exit_code, "forge test finished");

        Ok(RawOutput {
            output: out.output,
            exit_code: out.exit_code,
            elapsed: started.elapsed(),
            status,
            kept_workspace: None,
        })
    }

    /// Drop the workspace, or move it aside when keeping is enabled.
    fn finish(&self, workspace: TempDir) -> Option<PathBuf> {
        if !self.keep_workspace {
            return None;
        }
        let path = workspace.keep();
        let dest_root = paths::kept_workspaces_dir();
        let Some(name) = path.file_name() else {
            return Some(path);
        };
        let dest = dest_root.join(name);
        match std::fs::create_dir_all(&dest_root).and_then(|_| std::fs::rename(&path, &dest)) {
            Ok(()) => {
                tracing::info!("Kept harness workspace at {}", dest.display());
                Some(dest)
            }
            Err(e) => {
                tracing::warn!("Could not move workspace, left at {}: {e}", path.display());
                Some(path)
            }
        }
    }
}

fn spawn_failure(forge: &str, e: std::io::Error, started: Instant) -> RawOutput {
    tracing::warn!("Could not start {forge}: {e}");
    RawOutput {
        output: format!("failed to start {forge}: {e}"),
        exit_code: None,
        elapsed: started.elapsed(),
        status: RunStatus::ProcessError,
        kept_workspace: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(Some(0), "[PASS] testExploit()"), RunStatus::Completed);
        assert_eq!(
            classify(Some(1), "Error: Compiler run failed:\nError (2314): Expected ';'"),
            RunStatus::CompileFailure
        );
        assert_eq!(classify(Some(1), "[FAIL. Reason: setup failed]"), RunStatus::ProcessError);
        assert_eq!(classify(None, ""), RunStatus::ProcessError);
    }

    #[test]
    fn test_to_error_reasons() {
        let raw = RawOutput {
            output: "Compiler run failed:\nError (7576): Undeclared identifier.".into(),
            exit_code: Some(1),
            elapsed: Duration::ZERO,
            status: RunStatus::CompileFailure,
            kept_workspace: None,
        };
        let err = raw.to_error(Duration::from_secs(300)).unwrap();
        assert_eq!(err.reason(), "compile_failure");
        assert!(err.to_string().contains("Undeclared identifier"));

        let timeout = RawOutput {
            status: RunStatus::Timeout,
            ..raw.clone()
        };
        assert!(matches!(
            timeout.to_error(Duration::from_secs(300)),
            Some(VeriteError::ExecutionTimeout { seconds: 300 })
        ));
        let ok = RawOutput {
            status: RunStatus::Completed,
            ..raw
        };
        assert!(ok.to_error(Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("a\nb\nc", 2), "b\nc");
        assert_eq!(tail("a", 5), "a");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo 'GAS_USED: 4242'; echo warming >&2; sleep 30"]);
        let out = run_command(cmd, Duration::from_millis(500)).await.unwrap();
        assert!(out.timed_out);
        assert_eq!(out.exit_code, None);
        assert!(out.output.contains("GAS_USED: 4242"));
        assert!(out.output.contains("warming"));
    }
}
