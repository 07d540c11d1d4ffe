//! Line-oriented output comparison
//!
//! Both sides are canonicalized first: line terminators are normalized and
//! trailing blank lines are dropped. Lines are then compared ignoring
//! trailing whitespace; everything else is exact and case-sensitive.

use std::fmt;

/// A single difference between expected and actual output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discrepancy {
    /// Line counts differ after canonicalization
    LineCount { expected: usize, actual: usize },
    /// Contents differ at a 1-based line number
    Line(usize),
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discrepancy::LineCount { expected, actual } => write!(
                f,
                "the count of lines are not equal: expected {}, but actual {}",
                expected, actual
            ),
            Discrepancy::Line(n) => write!(f, "contents at line {} are not equal", n),
        }
    }
}

/// Strip line terminators from every line and drop trailing blank lines
fn canonicalize<S: AsRef<str>>(lines: &[S]) -> Vec<&str> {
    let mut lines: Vec<&str> = lines
        .iter()
        .map(|line| line.as_ref().trim_end_matches(['\r', '\n']))
        .collect();
    while lines.last().map(|s| s.trim().is_empty()).unwrap_or(false) {
        lines.pop();
    }
    lines
}

/// Compare expected and actual output; an empty result means they match
pub fn diff<E: AsRef<str>, A: AsRef<str>>(expected: &[E], actual: &[A]) -> Vec<Discrepancy> {
    let expected = canonicalize(expected);
    let actual = canonicalize(actual);

    if expected.len() != actual.len() {
        return vec![Discrepancy::LineCount {
            expected: expected.len(),
            actual: actual.len(),
        }];
    }

    expected
        .iter()
        .zip(actual.iter())
        .enumerate()
        .filter(|(_, (e, a))| e.trim_end() != a.trim_end())
        .map(|(i, _)| Discrepancy::Line(i + 1))
        .collect()
}

/// Split raw text into lines for comparison
pub fn text_lines(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}
