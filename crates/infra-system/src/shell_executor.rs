// Shell subprocess executor
//
// Commands run through the platform shell (`sh -c`, `cmd.exe /c`) so shell
// syntax behaves identically to typing the command by hand. Each child is
// tracked by job id while it runs; timeout and cancel-running both terminate
// gracefully first and forcefully after the grace period.

use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{info, warn};

use jobq_core::application::worker::constants::GRACEFUL_KILL_TIMEOUT_MS;
use jobq_core::domain::Job;
use jobq_core::port::command_executor::{CommandExecutor, ExecutionError, ExecutionOutput};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

pub struct ShellExecutor {
    /// job id -> child pid, for cancel-running and shutdown.
    active: Arc<Mutex<HashMap<String, u32>>>,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self {
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn shell_command(command: &str) -> Command {
        #[cfg(windows)]
        {
            let mut cmd = Command::new("cmd.exe");
            cmd.arg("/c").arg(command);
            cmd.creation_flags(CREATE_NO_WINDOW);
            cmd
        }
        #[cfg(not(windows))]
        {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        }
    }

    async fn wait_with_timeout(
        &self,
        child: &mut Child,
        timeout_ms: u64,
    ) -> Result<ExecutionOutput, ExecutionError> {
        let started = Instant::now();

        // Drain both pipes concurrently so a chatty child cannot deadlock
        // against a full pipe buffer while we wait on it.
        let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_task = tokio::spawn(read_stream(child.stderr.take()));

        let status = match tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait())
            .await
        {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(ExecutionError::Io(e.to_string())),
            Err(_) => {
                self.terminate(child).await;
                return Err(ExecutionError::Timeout(timeout_ms));
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if status.success() {
            return Ok(ExecutionOutput {
                stdout,
                stderr,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        match status.code() {
            Some(code) => Err(ExecutionError::NonZeroExit {
                code,
                output: diagnostic_output(&stderr, &stdout),
            }),
            // No exit code means a signal took the child down, e.g. through
            // cancel-running.
            None => Err(ExecutionError::Killed("terminated by signal".to_string())),
        }
    }

    /// Graceful-then-forceful termination of a child we still own.
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            let grace = Duration::from_millis(GRACEFUL_KILL_TIMEOUT_MS);
            if tokio::time::timeout(grace, child.wait()).await.is_ok() {
                return;
            }
            warn!(pid, "child ignored SIGTERM, sending SIGKILL");
        }

        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, job: &Job) -> Result<ExecutionOutput, ExecutionError> {
        let mut cmd = Self::shell_command(&job.command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| ExecutionError::Spawn(e.to_string()))?;

        if let Some(pid) = child.id() {
            self.active.lock().unwrap().insert(job.id.clone(), pid);
        }

        let result = self.wait_with_timeout(&mut child, job.timeout_ms).await;
        self.active.lock().unwrap().remove(&job.id);
        result
    }

    async fn kill(&self, job_id: &str) -> Result<bool, ExecutionError> {
        let pid = self.active.lock().unwrap().get(job_id).copied();
        let Some(pid) = pid else {
            return Ok(false);
        };

        info!(job_id, pid, "terminating running job");
        kill_pid_graceful(pid).await?;
        Ok(true)
    }

    fn active_jobs(&self) -> Vec<String> {
        self.active.lock().unwrap().keys().cloned().collect()
    }
}

async fn read_stream(stream: Option<impl AsyncReadExt + Unpin + Send + 'static>) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

/// stderr when the child wrote any, stdout otherwise.
fn diagnostic_output(stderr: &str, stdout: &str) -> String {
    let picked = if stderr.trim().is_empty() {
        stdout
    } else {
        stderr
    };
    picked.trim_end().to_string()
}

/// Terminate a child we only know by pid (cancel-running): graceful signal,
/// grace period, then the forceful kill.
#[cfg(unix)]
async fn kill_pid_graceful(pid: u32) -> Result<(), ExecutionError> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(pid as i32);
    kill(pid, Signal::SIGTERM)
        .map_err(|e| ExecutionError::Killed(format!("SIGTERM failed: {e}")))?;

    let deadline = Instant::now() + Duration::from_millis(GRACEFUL_KILL_TIMEOUT_MS);
    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Signal 0 probes for existence without delivering anything.
        if kill(pid, None).is_err() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            warn!(pid = %pid, "process ignored SIGTERM, sending SIGKILL");
            kill(pid, Signal::SIGKILL)
                .map_err(|e| ExecutionError::Killed(format!("SIGKILL failed: {e}")))?;
            return Ok(());
        }
    }
}

#[cfg(windows)]
async fn kill_pid_graceful(pid: u32) -> Result<(), ExecutionError> {
    let output = std::process::Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .output()
        .map_err(|e| ExecutionError::Killed(e.to_string()))?;

    if !output.status.success() {
        return Err(ExecutionError::Killed(format!(
            "taskkill failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}
