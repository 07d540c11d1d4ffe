//! Process supervisor
//!
//! Runs one child under a wall-clock deadline while a `ResourceMonitor`
//! samples its memory. The foreground path waits on whichever comes first:
//! a memory breach, natural exit, or the deadline. A breach always wins
//! over an exit observed in the same wake-up.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Instant;

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::monitor::{MemoryProbe, ProcfsProbe, ResourceMonitor};
use super::{split_lines, CommandSpec, ResourceLimits, RunReport, RunnerState};
use crate::config::EngineConfig;
use crate::error::{JudgeError, Result};

/// What woke the foreground path
enum Wake {
    Breach(u64),
    Exited(io::Result<ExitStatus>),
    Deadline,
}

/// Spawns and supervises one process per `run` call
#[derive(Clone)]
pub struct ProcessSupervisor {
    config: EngineConfig,
    probe: Arc<dyn MemoryProbe>,
}

impl ProcessSupervisor {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_probe(config, Arc::new(ProcfsProbe))
    }

    pub fn with_probe(config: EngineConfig, probe: Arc<dyn MemoryProbe>) -> Self {
        Self { config, probe }
    }

    /// Run `cmd` with `input` on stdin under `limits`.
    ///
    /// On every return path the child (and its process group) has been
    /// killed or has exited, and has been reaped. An `Err` means the run is
    /// indeterminate: the process never started or supervision itself failed.
    pub async fn run(
        &self,
        cmd: &CommandSpec,
        limits: &ResourceLimits,
        input: &str,
    ) -> Result<RunReport> {
        if cmd.program.is_empty() {
            return Err(JudgeError::EmptyCommand);
        }

        debug!("Running program: {:?} with args: {:?}", cmd.program, cmd.args);

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = command.spawn().map_err(|source| JudgeError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;
        let pid = child.id();

        let Some(pid) = pid else {
            // Already reaped, nothing left to supervise
            return Err(JudgeError::TaskFailed(
                "child exited before supervision started".into(),
            ));
        };

        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (Some(stdin), Some(stdout), Some(stderr)) = pipes else {
            terminate(&mut child, pid).await?;
            return Err(JudgeError::MissingPipe("standard streams"));
        };

        // stdin is closed when the writer finishes, signalling EOF
        let input = input.as_bytes().to_vec();
        let writer = tokio::spawn(async move {
            let mut stdin = stdin;
            if let Err(e) = stdin.write_all(&input).await {
                debug!("Failed to write stdin of pid {}: {}", pid, e);
            }
        });
        let stdout_reader = tokio::spawn(read_to_end(stdout));
        let stderr_reader = tokio::spawn(read_to_end(stderr));

        let mut state = RunnerState::Running;

        let (breach_tx, mut breach_rx) = oneshot::channel();
        let monitor = ResourceMonitor::spawn(
            pid,
            limits.memory_limit(),
            self.config.sample_interval,
            self.probe.clone(),
            breach_tx,
        );

        let deadline = tokio::time::sleep(limits.time_limit());
        tokio::pin!(deadline);

        let wake = tokio::select! {
            biased;
            Ok(footprint) = &mut breach_rx => Wake::Breach(footprint),
            status = child.wait() => Wake::Exited(status),
            _ = &mut deadline => Wake::Deadline,
        };

        let waited = match wake {
            Wake::Breach(footprint) => {
                debug!("Killing pid {} after memory breach ({} bytes)", pid, footprint);
                state = RunnerState::OutOfMemory;
                terminate(&mut child, pid).await.map(|_| None)
            }
            Wake::Deadline => {
                debug!("Killing pid {} after deadline", pid);
                state = RunnerState::OutOfTime;
                terminate(&mut child, pid).await.map(|_| None)
            }
            Wake::Exited(Ok(status)) => {
                // Leftover members of the group must not outlive the run
                kill_group(pid);
                if breach_rx.try_recv().is_ok() {
                    state = RunnerState::OutOfMemory;
                    Ok(None)
                } else {
                    state = RunnerState::Ended;
                    Ok(Some(status))
                }
            }
            Wake::Exited(Err(e)) => terminate(&mut child, pid).await.and(Err(e)),
        };
        let elapsed = start.elapsed();

        // The sampler must be gone before any output is collected
        let peak_memory = monitor.stop().await;
        writer.abort();

        let status = match waited {
            Ok(status) => status,
            Err(e) => {
                stdout_reader.abort();
                stderr_reader.abort();
                return Err(e.into());
            }
        };

        let (exit_code, signal, stdout, stderr) = match status {
            Some(status) if state == RunnerState::Ended => {
                let stdout = self.drain(stdout_reader, "stdout").await?;
                let stderr = self.drain(stderr_reader, "stderr").await?;
                (
                    status.code(),
                    status.signal(),
                    Some(split_lines(&stdout)),
                    Some(split_lines(&stderr)),
                )
            }
            _ => {
                stdout_reader.abort();
                stderr_reader.abort();
                (None, None, None, None)
            }
        };

        debug!(
            "Run finished: pid={}, state={:?}, exit_code={:?}, elapsed={:?}, peak_memory={}",
            pid, state, exit_code, elapsed, peak_memory
        );

        Ok(RunReport {
            state,
            exit_code,
            signal,
            stdout,
            stderr,
            elapsed,
            peak_memory,
            pid: Some(pid),
        })
    }

    /// Wait for a reader task, bounded by the drain timeout
    async fn drain(
        &self,
        mut reader: JoinHandle<io::Result<Vec<u8>>>,
        stream: &'static str,
    ) -> Result<Vec<u8>> {
        match tokio::time::timeout(self.config.drain_timeout, &mut reader).await {
            Ok(Ok(bytes)) => Ok(bytes?),
            Ok(Err(e)) => Err(JudgeError::TaskFailed(format!(
                "{} reader failed: {}",
                stream, e
            ))),
            Err(_) => {
                warn!("Timed out draining {}; a descendant still holds it open", stream);
                reader.abort();
                Err(JudgeError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("timed out draining {}", stream),
                )))
            }
        }
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

async fn read_to_end<R: AsyncRead + Unpin>(mut stream: R) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// SIGKILL the whole process group led by `pid`
fn kill_group(pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to kill process group {}: {}", pid, e),
    }
}

/// Kill the child and its group, then reap it
async fn terminate(child: &mut Child, pid: u32) -> io::Result<ExitStatus> {
    kill_group(pid);
    if let Err(e) = child.start_kill() {
        debug!("start_kill on pid {}: {}", pid, e);
    }
    child.wait().await
}
