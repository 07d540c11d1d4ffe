pub mod issue;
pub mod verdict;

pub use issue::{issues_pass, Issue, IssueLevel};
pub use verdict::JudgeState;
