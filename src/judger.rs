//! Judger module for local judging of a standard program
//!
//! This module drives one invocation at a time: it runs the program through
//! a `ProcessSupervisor`, maps the runner state to a `JudgeState`, compares
//! output on a clean exit and collects human-facing issues.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{get_config, EngineConfig};
use crate::core::{issues_pass, Issue, JudgeState};
use crate::differ::{self, Discrepancy};
use crate::error::JudgeError;
use crate::runner::{
    CommandSpec, MemoryProbe, ProcessSupervisor, ResourceLimits, RunReport, RunnerState,
};

/// One request to run a program against one input
#[derive(Debug, Clone)]
pub struct JudgeRequest {
    /// Used in issue messages
    pub name: String,
    pub command: Vec<String>,
    pub limits: ResourceLimits,
    pub input: String,
    pub expected_output: Vec<String>,
}

impl JudgeRequest {
    pub fn new(
        name: impl Into<String>,
        command: impl IntoIterator<Item = impl Into<String>>,
        limits: ResourceLimits,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into_iter().map(Into::into).collect(),
            limits,
            input: String::new(),
            expected_output: Vec::new(),
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    pub fn with_expected(mut self, lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.expected_output = lines.into_iter().map(Into::into).collect();
        self
    }
}

/// Resource usage of a finished run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunMetrics {
    pub elapsed: Duration,
    /// Peak memory in bytes
    pub peak_memory: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl From<&RunReport> for RunMetrics {
    fn from(report: &RunReport) -> Self {
        Self {
            elapsed: report.elapsed,
            peak_memory: report.peak_memory,
            exit_code: report.exit_code,
            pid: report.pid,
        }
    }
}

/// Result of judging one invocation
#[derive(Debug, Clone, Serialize)]
pub struct JudgeResult {
    state: JudgeState,
    issues: Vec<Issue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    captured_output: Option<Vec<String>>,
    metrics: RunMetrics,
}

impl JudgeResult {
    fn new(
        state: JudgeState,
        issues: Vec<Issue>,
        captured_output: Option<Vec<String>>,
        metrics: RunMetrics,
    ) -> Self {
        Self {
            state,
            issues,
            captured_output,
            metrics,
        }
    }

    fn system_error(name: &str, cause: impl std::fmt::Display) -> Self {
        Self::new(
            JudgeState::SystemError,
            vec![Issue::error(format!("system error for {}: {}", name, cause))],
            None,
            RunMetrics::default(),
        )
    }

    pub fn state(&self) -> JudgeState {
        self.state
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// Stdout lines, present only when the program ran to completion
    pub fn captured_output(&self) -> Option<&[String]> {
        self.captured_output.as_deref()
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// No error-level issues
    pub fn passed(&self) -> bool {
        issues_pass(&self.issues)
    }
}

/// Judging engine. Cheap to clone; independent calls share no mutable state.
#[derive(Clone)]
pub struct Judge {
    supervisor: ProcessSupervisor,
    tight_limit_ratio: f64,
}

impl Judge {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            tight_limit_ratio: config.tight_limit_ratio,
            supervisor: ProcessSupervisor::new(config),
        }
    }

    pub fn with_probe(config: EngineConfig, probe: Arc<dyn MemoryProbe>) -> Self {
        Self {
            tight_limit_ratio: config.tight_limit_ratio,
            supervisor: ProcessSupervisor::with_probe(config, probe),
        }
    }

    /// Judge one invocation. Never fails: every failure is a `JudgeState`.
    pub async fn judge(&self, request: &JudgeRequest) -> JudgeResult {
        let command = match CommandSpec::from_vec(&request.command) {
            Ok(command) => command,
            Err(e) => return JudgeResult::system_error(&request.name, e),
        };

        // Supervision runs in its own task so a panic surfaces as a JoinError
        let supervisor = self.supervisor.clone();
        let limits = request.limits;
        let input = request.input.clone();
        let handle =
            tokio::spawn(async move { supervisor.run(&command, &limits, &input).await });

        let report = match handle.await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => return JudgeResult::system_error(&request.name, e),
            Err(e) => {
                return JudgeResult::system_error(
                    &request.name,
                    JudgeError::TaskFailed(e.to_string()),
                )
            }
        };

        let result = self.classify(request, report);
        debug!("Judged {}: {}", request.name, result.state);
        result
    }

    /// Run the standard program to produce reference output.
    ///
    /// Returns the captured stdout when the program exited cleanly, otherwise
    /// the result describing why it did not.
    pub async fn generate(
        &self,
        name: &str,
        command: &[String],
        limits: ResourceLimits,
        input: &str,
    ) -> std::result::Result<Vec<String>, JudgeResult> {
        let request = JudgeRequest {
            name: name.to_string(),
            command: command.to_vec(),
            limits,
            input: input.to_string(),
            expected_output: Vec::new(),
        };
        let result = self.judge(&request).await;
        match (&result.captured_output, result.metrics.exit_code) {
            (Some(output), Some(0)) => Ok(output.clone()),
            _ => Err(result),
        }
    }

    /// Judge all sample cases, then all test cases, in order
    pub async fn judge_cases(
        &self,
        command: &[String],
        limits: ResourceLimits,
        samples: &[TestCase],
        tests: &[TestCase],
    ) -> Vec<CaseReport> {
        let cases = samples
            .iter()
            .map(|c| (CaseKind::Sample, c))
            .chain(tests.iter().map(|c| (CaseKind::Test, c)));

        let mut reports = Vec::with_capacity(samples.len() + tests.len());
        for (kind, case) in cases {
            let name = format!("{} {}", kind, case.name);
            let request = JudgeRequest {
                name: name.clone(),
                command: command.to_vec(),
                limits,
                input: case.input.clone(),
                expected_output: case.output.clone(),
            };
            let result = self.judge(&request).await;
            info!("{}: {}", name, result.state);
            reports.push(CaseReport { kind, name, result });
        }
        reports
    }

    fn classify(&self, request: &JudgeRequest, report: RunReport) -> JudgeResult {
        let name = &request.name;
        let limits = &request.limits;
        let metrics = RunMetrics::from(&report);
        let mut issues = Vec::new();

        match report.state {
            RunnerState::OutOfMemory => {
                issues.push(Issue::error(format!(
                    "memory limit exceeded for {}: used {} bytes, limit {} bytes",
                    name,
                    report.peak_memory,
                    limits.memory_limit()
                )));
                JudgeResult::new(JudgeState::MemoryLimitExceeded, issues, None, metrics)
            }
            RunnerState::OutOfTime => {
                issues.push(Issue::error(format!(
                    "time limit exceeded for {}: used {:.3} seconds, limit {} seconds",
                    name,
                    report.elapsed.as_secs_f64(),
                    limits.time_limit().as_secs_f64()
                )));
                JudgeResult::new(JudgeState::TimeLimitExceeded, issues, None, metrics)
            }
            RunnerState::Pending | RunnerState::Running => JudgeResult::system_error(
                name,
                format!("process did not stop (state {:?})", report.state),
            ),
            RunnerState::Ended => {
                let Some(output) = report.stdout else {
                    return JudgeResult::system_error(name, "output was not captured");
                };

                let state = match (report.exit_code, report.signal) {
                    (Some(0), _) => self.compare(request, &metrics, &output, &mut issues),
                    (Some(code), _) => {
                        issues.push(Issue::error(format!(
                            "runtime error for {}: exited with {}",
                            name, code
                        )));
                        JudgeState::RuntimeError
                    }
                    (None, signal) => {
                        let signal = signal
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "unknown".into());
                        issues.push(Issue::error(format!(
                            "runtime error for {}: killed by signal {}",
                            name, signal
                        )));
                        JudgeState::RuntimeError
                    }
                };
                JudgeResult::new(state, issues, Some(output), metrics)
            }
        }
    }

    /// Diff a clean run's output and add advisories on an accept
    fn compare(
        &self,
        request: &JudgeRequest,
        metrics: &RunMetrics,
        output: &[String],
        issues: &mut Vec<Issue>,
    ) -> JudgeState {
        let name = &request.name;
        let discrepancies = differ::diff(request.expected_output.as_slice(), output);

        if !discrepancies.is_empty() {
            for d in &discrepancies {
                let issue = Issue::warning(format!("diff for {}: {}", name, d));
                issues.push(match d {
                    Discrepancy::Line(line) => issue.with_addendum(format!("line {}", line)),
                    Discrepancy::LineCount { .. } => issue,
                });
            }
            issues.push(Issue::error(format!("wrong answer for {}", name)));
            return JudgeState::WrongAnswer;
        }

        let limits = &request.limits;
        let used_secs = metrics.elapsed.as_secs_f64();
        let time_limit = limits.time_limit().as_secs_f64();
        if used_secs > 0.0 && time_limit / used_secs < self.tight_limit_ratio {
            issues.push(Issue::warning(format!(
                "the time limit is too tight for {}: used {:.3} seconds, limit {} seconds",
                name, used_secs, time_limit
            )));
        }
        let used_bytes = metrics.peak_memory;
        if used_bytes > 0
            && limits.memory_limit() as f64 / (used_bytes as f64) < self.tight_limit_ratio
        {
            issues.push(Issue::warning(format!(
                "the memory limit is too tight for {}: used {} bytes, limit {} bytes",
                name,
                used_bytes,
                limits.memory_limit()
            )));
        }

        JudgeState::Accept
    }
}

impl Default for Judge {
    fn default() -> Self {
        Self::new(get_config().clone())
    }
}

/// Judge one invocation with the globally configured engine
pub async fn judge(
    name: &str,
    command: &[String],
    limits: ResourceLimits,
    input: &str,
    expected_output: &[String],
) -> JudgeResult {
    let request = JudgeRequest {
        name: name.to_string(),
        command: command.to_vec(),
        limits,
        input: input.to_string(),
        expected_output: expected_output.to_vec(),
    };
    Judge::default().judge(&request).await
}

/// One sample or test case, already loaded into memory
#[derive(Debug, Clone, Default)]
pub struct TestCase {
    pub name: String,
    pub input: String,
    pub output: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    Sample,
    Test,
}

impl std::fmt::Display for CaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaseKind::Sample => write!(f, "sample"),
            CaseKind::Test => write!(f, "test"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub kind: CaseKind,
    pub name: String,
    pub result: JudgeResult,
}

/// Count of results per state
#[derive(Debug, Default, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: bool,
    pub states: BTreeMap<JudgeState, usize>,
}

impl Summary {
    pub fn from_reports(reports: &[CaseReport]) -> Self {
        let mut states: BTreeMap<JudgeState, usize> =
            JudgeState::ALL.iter().map(|s| (*s, 0)).collect();
        for report in reports {
            *states.entry(report.result.state).or_default() += 1;
        }
        Self {
            total: reports.len(),
            passed: reports.iter().all(|r| r.result.passed()),
            states,
        }
    }

    pub fn count(&self, state: JudgeState) -> usize {
        self.states.get(&state).copied().unwrap_or(0)
    }
}
