//! Runner module - process supervision layer
//!
//! This module runs one program under a resource envelope:
//! - `ProcessSupervisor`: spawns the child, feeds stdin, enforces the deadline
//! - `ResourceMonitor`: samples memory in the background and signals a breach
//!
//! The runner module does NOT:
//! - Compare outputs or determine verdicts
//! - Produce human-facing issues

pub mod monitor;
pub mod supervisor;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{JudgeError, Result};

/// Command specification for execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|a| a.into()).collect();
        self
    }

    /// Create from a command vector (first element is program, rest are args)
    pub fn from_vec(cmd: &[String]) -> Result<Self> {
        let (program, args) = cmd.split_first().ok_or(JudgeError::EmptyCommand)?;
        if program.is_empty() {
            return Err(JudgeError::EmptyCommand);
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// Convert to a vector of strings (program + args)
    pub fn to_vec(&self) -> Vec<String> {
        let mut v = vec![self.program.clone()];
        v.extend(self.args.iter().cloned());
        v
    }
}

/// Resource envelope for one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    time_limit: Duration,
    memory_limit: u64,
}

impl ResourceLimits {
    /// Both limits must be positive
    pub fn new(time_limit: Duration, memory_limit: u64) -> Result<Self> {
        if time_limit.is_zero() {
            return Err(JudgeError::InvalidLimits("time limit must be positive".into()));
        }
        if memory_limit == 0 {
            return Err(JudgeError::InvalidLimits(
                "memory limit must be positive".into(),
            ));
        }
        Ok(Self {
            time_limit,
            memory_limit,
        })
    }

    /// Build limits from a problem profile: time in seconds, memory in MiB
    pub fn from_profile(time_secs: f64, memory_mb: u64) -> Result<Self> {
        if !(time_secs.is_finite() && time_secs > 0.0) {
            return Err(JudgeError::InvalidLimits(format!(
                "time limit must be positive, got {} seconds",
                time_secs
            )));
        }
        let memory = memory_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            JudgeError::InvalidLimits(format!("memory limit of {} MiB overflows", memory_mb))
        })?;
        let time_limit = Duration::try_from_secs_f64(time_secs).map_err(|e| {
            JudgeError::InvalidLimits(format!("time limit of {} seconds: {}", time_secs, e))
        })?;
        Self::new(time_limit, memory)
    }

    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }

    /// Memory limit in bytes
    pub fn memory_limit(&self) -> u64 {
        self.memory_limit
    }
}

/// Lifecycle of the supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Pending,
    Running,
    /// Exited on its own before the deadline and before any breach
    Ended,
    OutOfMemory,
    OutOfTime,
}

/// Outcome of supervising one process (raw, no verdict interpretation)
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: RunnerState,
    /// Exit code; `None` unless the state is `Ended` and the process exited normally
    pub exit_code: Option<i32>,
    /// Signal that terminated the process on its own, if any
    pub signal: Option<i32>,
    /// Stdout lines; present only when the state is `Ended`
    pub stdout: Option<Vec<String>>,
    /// Stderr lines; present only when the state is `Ended`
    pub stderr: Option<Vec<String>>,
    /// Wall-clock time from spawn until the process was reaped
    pub elapsed: Duration,
    /// Largest memory footprint observed by the monitor, in bytes
    pub peak_memory: u64,
    /// OS process id of the child
    pub pid: Option<u32>,
}

/// Split captured bytes into lines, normalizing `\r\n` terminators
pub fn split_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

pub use monitor::{MemoryProbe, MemorySample, ProcfsProbe, ResourceMonitor};
pub use supervisor::ProcessSupervisor;
