//! Local judging engine
//!
//! Runs a standard program against an input under a wall-clock time limit
//! and a memory limit, captures its output and classifies the outcome.
//!
//! ```no_run
//! use std::time::Duration;
//! use local_judge::{Judge, JudgeRequest, ResourceLimits};
//!
//! # async fn run() -> Result<(), local_judge::JudgeError> {
//! let limits = ResourceLimits::new(Duration::from_secs(1), 256 * 1024 * 1024)?;
//! let request = JudgeRequest::new("sample 1", ["./std"], limits)
//!     .with_input("1 2\n")
//!     .with_expected(["3"]);
//! let result = Judge::default().judge(&request).await;
//! println!("{}", result.state());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod differ;
pub mod error;
pub mod judger;
pub mod manifest;
pub mod runner;

pub use crate::config::EngineConfig;
pub use crate::core::{issues_pass, Issue, IssueLevel, JudgeState};
pub use crate::differ::{diff, Discrepancy};
pub use crate::error::JudgeError;
pub use crate::judger::{
    judge, CaseKind, CaseReport, Judge, JudgeRequest, JudgeResult, RunMetrics, Summary, TestCase,
};
pub use crate::runner::{CommandSpec, ResourceLimits, RunReport, RunnerState};
