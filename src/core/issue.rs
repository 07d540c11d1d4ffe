//! Leveled diagnostics attached to a judging step

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for IssueLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssueLevel::Info => "info",
            IssueLevel::Warning => "warning",
            IssueLevel::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub level: IssueLevel,
    pub message: String,
    /// Affected file or line, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addendum: Option<String>,
}

impl Issue {
    pub fn new(level: IssueLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            addendum: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(IssueLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(IssueLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(IssueLevel::Error, message)
    }

    pub fn with_addendum(mut self, addendum: impl Into<String>) -> Self {
        self.addendum = Some(addendum.into());
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)?;
        if let Some(addendum) = &self.addendum {
            write!(f, " ({})", addendum)?;
        }
        Ok(())
    }
}

/// A set of issues passes when none of them is an error
pub fn issues_pass<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> bool {
    !issues.into_iter().any(|i| i.level == IssueLevel::Error)
}
