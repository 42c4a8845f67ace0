// Subprocess analysis pipeline
// One child process per job: request JSON on stdin, report on stdout
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

use findoc_core::port::{AnalysisError, AnalysisPipeline, AnalysisReport, AnalysisRequest};

/// Characters of stderr kept in a failure message
const STDERR_TAIL_CHARS: usize = 2000;

/// Grace period between SIGTERM and SIGKILL (5 seconds)
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Pipeline command configuration
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,

    /// Hard limit for one analysis; `None` waits indefinitely
    pub timeout: Option<Duration>,
    pub kill_grace: Duration,

    /// Parent environment variables passed through to the child
    pub env_allowlist: Vec<String>,
}

impl PipelineSettings {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: None,
            kill_grace: DEFAULT_KILL_GRACE,
            env_allowlist: vec!["PATH".to_string(), "HOME".to_string(), "LANG".to_string()],
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env_allowlist(mut self, env_allowlist: Vec<String>) -> Self {
        self.env_allowlist = env_allowlist;
        self
    }
}

/// Structured stdout form
#[derive(Debug, Deserialize)]
struct RawReport {
    raw: String,
}

/// Subprocess pipeline
/// Spawns an isolated child per call with an allowlisted environment
pub struct SubprocessPipeline {
    settings: PipelineSettings,
}

impl SubprocessPipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        Self { settings }
    }

    /// Keep only allowlisted variables
    fn filter_env<I>(&self, vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter()
            .filter(|(k, _)| self.settings.env_allowlist.contains(k))
            .collect()
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.settings.program);
        cmd.args(&self.settings.args)
            .env_clear()
            .envs(self.filter_env(std::env::vars()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.settings.working_dir {
            cmd.current_dir(dir);
        }

        // Own process group, so a timeout reaches grandchildren too
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }

    /// Wait for the child, honoring the configured timeout
    async fn wait_for_exit(&self, child: &mut Child) -> Result<ExitStatus, AnalysisError> {
        let Some(limit) = self.settings.timeout else {
            return child.wait().await.map_err(|e| AnalysisError::Io(e.to_string()));
        };

        match timeout(limit, child.wait()).await {
            Ok(status) => status.map_err(|e| AnalysisError::Io(e.to_string())),
            Err(_) => {
                warn!(
                    timeout_ms = limit.as_millis() as u64,
                    "Pipeline timed out, terminating"
                );
                self.terminate(child).await;
                Err(AnalysisError::Timeout(limit.as_millis() as u64))
            }
        }
    }

    /// SIGTERM first, then SIGKILL once the grace period is over
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            info!(pid, "Sending SIGTERM to pipeline process group");
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(pid, error = %e, "SIGTERM failed");
            }

            if timeout(self.settings.kill_grace, child.wait()).await.is_ok() {
                info!(pid, "Pipeline exited after SIGTERM");
                return;
            }

            warn!(pid, "Pipeline did not exit after SIGTERM, sending SIGKILL");
            let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }

        if let Err(e) = child.kill().await {
            warn!(error = %e, "Failed to kill pipeline process");
        }
    }
}

fn spawn_reader<R>(mut reader: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf).await;
        buf
    })
}

async fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    }
}

/// stdout is either `{"raw": "..."}` or the report as plain text
fn parse_report(stdout: &[u8]) -> Result<AnalysisReport, AnalysisError> {
    let text = std::str::from_utf8(stdout)
        .map_err(|e| AnalysisError::InvalidOutput(format!("stdout is not UTF-8: {}", e)))?;

    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        if let Ok(report) = serde_json::from_str::<RawReport>(trimmed) {
            return Ok(AnalysisReport { raw: report.raw });
        }
    }

    Ok(AnalysisReport {
        raw: text.trim_end().to_string(),
    })
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let count = text.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return text.to_string();
    }
    text.chars().skip(count - STDERR_TAIL_CHARS).collect()
}

#[async_trait]
impl AnalysisPipeline for SubprocessPipeline {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisReport, AnalysisError> {
        let started = Instant::now();
        info!(
            program = %self.settings.program,
            file_path = %request.file_path,
            timeout_ms = ?self.settings.timeout.map(|t| t.as_millis() as u64),
            "Starting analysis pipeline"
        );

        let mut child = self
            .build_command()
            .spawn()
            .map_err(|e| AnalysisError::SpawnFailed(format!("{}: {}", self.settings.program, e)))?;

        // Drain both pipes while the child runs so it never blocks on a full pipe
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let input = serde_json::to_vec(&request)
            .map_err(|e| AnalysisError::Io(format!("Failed to encode request: {}", e)))?;
        if let Some(mut stdin) = child.stdin.take() {
            // A pipeline that ignores stdin may exit before reading it
            if let Err(e) = stdin.write_all(&input).await {
                warn!(error = %e, "Failed to write pipeline stdin");
            }
            drop(stdin);
        }

        let status = match self.wait_for_exit(&mut child).await {
            Ok(status) => status,
            Err(e) => {
                for handle in [stdout, stderr].into_iter().flatten() {
                    handle.abort();
                }
                return Err(e);
            }
        };

        let stdout = collect(stdout).await;
        let stderr = collect(stderr).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        if !status.success() {
            warn!(
                exit_code = ?status.code(),
                duration_ms,
                "Analysis pipeline failed"
            );
            return Err(AnalysisError::Failed {
                exit_code: status.code(),
                message: stderr_tail(&stderr),
            });
        }

        let report = parse_report(&stdout)?;
        info!(
            duration_ms,
            report_len = report.raw.len(),
            "Analysis pipeline completed"
        );
        Ok(report)
    }
}
