// worker start/stop - foreground worker pool with pid-file handoff
//
// `start` runs the pool until SIGINT/SIGTERM and records its pid under the
// data dir; `stop` signals that pid from another process so the same
// shutdown coordinator runs there.

use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use jobq_core::application::WorkerPool;
use jobq_infra_store::{paths, FileJobStore};
use jobq_infra_system::ShellExecutor;

fn pid_path(data_dir: &Path) -> PathBuf {
    data_dir.join(paths::PID_FILE)
}

pub async fn start(data_dir: &Path, count: usize) -> Result<()> {
    anyhow::ensure!(count >= 1, "--count must be at least 1");

    if let Some(pid) = running_worker(data_dir) {
        anyhow::bail!("a worker process is already running (pid {pid})");
    }

    let store = Arc::new(FileJobStore::open(data_dir)?);
    let executor = Arc::new(ShellExecutor::new());

    let pid_file = pid_path(data_dir);
    fs::write(&pid_file, std::process::id().to_string())?;

    let mut pool = WorkerPool::new(store, executor);
    pool.start(count);

    println!(
        "{} {count} worker(s), data dir {}; Ctrl+C to stop",
        "Running".green().bold(),
        data_dir.display()
    );

    wait_for_shutdown_signal().await?;
    info!("shutdown signal received");

    let report = pool.stop().await;
    let _ = fs::remove_file(&pid_file);

    for snapshot in &report.workers {
        info!(
            worker = %snapshot.id,
            processed = snapshot.processed,
            failed = snapshot.failed,
            "final worker counters"
        );
    }

    if report.is_clean() {
        println!("{}", "✓ All workers stopped".green().bold());
    } else {
        println!(
            "{} {} worker(s) still busy at the deadline; their jobs will be \
             reclaimed through the stale-lock horizon",
            "warning:".yellow().bold(),
            report.orphaned.len()
        );
    }
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r.context("failed to listen for SIGINT")?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl+C")?;
    }
    Ok(())
}

pub fn stop(data_dir: &Path) -> Result<()> {
    let pid_file = pid_path(data_dir);
    let contents = fs::read_to_string(&pid_file)
        .with_context(|| "no running worker found (worker.pid missing)")?;
    let pid: u32 = contents
        .trim()
        .parse()
        .with_context(|| "worker.pid is corrupt")?;

    if !process_alive(pid) {
        let _ = fs::remove_file(&pid_file);
        anyhow::bail!("worker process {pid} is not running (removed stale worker.pid)");
    }

    signal_shutdown(pid)?;
    println!(
        "{} sent shutdown signal to worker process {pid}",
        "✓".green()
    );
    Ok(())
}

/// Pid of a live worker process recorded in the data dir, if any.
pub fn running_worker(data_dir: &Path) -> Option<u32> {
    let pid: u32 = fs::read_to_string(pid_path(data_dir))
        .ok()?
        .trim()
        .parse()
        .ok()?;
    process_alive(pid).then_some(pid)
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[cfg(unix)]
fn signal_shutdown(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .with_context(|| format!("failed to signal worker process {pid}"))
}

#[cfg(windows)]
fn process_alive(pid: u32) -> bool {
    std::process::Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/NH"])
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).contains(&pid.to_string()))
        .unwrap_or(false)
}

#[cfg(windows)]
fn signal_shutdown(pid: u32) -> Result<()> {
    let output = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string()])
        .output()
        .with_context(|| format!("failed to signal worker process {pid}"))?;
    anyhow::ensure!(
        output.status.success(),
        "taskkill failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(())
}
