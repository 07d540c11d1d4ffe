use serde::{Deserialize, Serialize};
use std::fmt;

/// Final classification of one judging invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeState {
    Accept,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    SystemError,
}

impl JudgeState {
    pub const ALL: [JudgeState; 6] = [
        JudgeState::Accept,
        JudgeState::WrongAnswer,
        JudgeState::TimeLimitExceeded,
        JudgeState::MemoryLimitExceeded,
        JudgeState::RuntimeError,
        JudgeState::SystemError,
    ];

    /// Short human label
    pub fn label(&self) -> &'static str {
        match self {
            JudgeState::Accept => "Accept",
            JudgeState::WrongAnswer => "Wrong Answer",
            JudgeState::TimeLimitExceeded => "Time Limit Exceeded",
            JudgeState::MemoryLimitExceeded => "Memory Limit Exceeded",
            JudgeState::RuntimeError => "Runtime Error",
            JudgeState::SystemError => "System Error",
        }
    }
}

impl fmt::Display for JudgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
