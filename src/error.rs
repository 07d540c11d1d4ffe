//! Error types for the judging engine
//!
//! These errors never escape `Judge::judge`; they are folded into
//! `JudgeState::SystemError` at the judge boundary.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("invalid resource limits: {0}")]
    InvalidLimits(String),

    #[error("no command specified for execution")]
    EmptyCommand,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to open {0} of child process")]
    MissingPipe(&'static str),

    #[error("i/o failure while supervising: {0}")]
    Io(#[from] io::Error),

    #[error("supervision task failed: {0}")]
    TaskFailed(String),

    #[error("invalid engine configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, JudgeError>;
