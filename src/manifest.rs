//! Problem manifest for the local judge binary
//!
//! A manifest names the standard program, its limits and the sample/test
//! case files. Case paths are relative to the manifest's directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::differ::text_lines;
use crate::judger::{CaseKind, TestCase};
use crate::runner::ResourceLimits;

/// Raw TOML manifest
#[derive(Debug, Deserialize)]
struct RawManifest {
    name: String,
    command: Vec<String>,
    /// Seconds
    time_limit: f64,
    /// MiB
    memory_limit: u64,
    #[serde(default)]
    samples: Vec<RawCase>,
    #[serde(default)]
    tests: Vec<RawCase>,
}

#[derive(Debug, Deserialize)]
struct RawCase {
    name: String,
    input: PathBuf,
    output: PathBuf,
}

/// Location of one case's files
#[derive(Debug, Clone, PartialEq)]
pub struct CaseFiles {
    pub kind: CaseKind,
    pub name: String,
    pub input: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub name: String,
    pub command: Vec<String>,
    pub limits: ResourceLimits,
    pub cases: Vec<CaseFiles>,
}

impl Manifest {
    /// Parse a manifest; `base` is the directory case paths are relative to
    pub fn from_toml(content: &str, base: &Path) -> Result<Self> {
        let raw: RawManifest = toml::from_str(content).context("Invalid manifest")?;

        if raw.command.is_empty() {
            anyhow::bail!("Manifest for {} has an empty command", raw.name);
        }
        let limits = ResourceLimits::from_profile(raw.time_limit, raw.memory_limit)
            .with_context(|| format!("Invalid limits for {}", raw.name))?;

        let resolve = |kind: CaseKind, case: RawCase| CaseFiles {
            kind,
            name: case.name,
            input: base.join(case.input),
            output: base.join(case.output),
        };
        let cases = raw
            .samples
            .into_iter()
            .map(|c| resolve(CaseKind::Sample, c))
            .chain(raw.tests.into_iter().map(|c| resolve(CaseKind::Test, c)))
            .collect();

        Ok(Self {
            name: raw.name,
            command: raw.command,
            limits,
            cases,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let base = path.parent().unwrap_or(Path::new("."));
        Self::from_toml(&content, base)
            .with_context(|| format!("Failed to load manifest: {}", path.display()))
    }

    /// Read every case into memory, split into samples and tests
    pub fn load_cases(&self) -> Result<(Vec<TestCase>, Vec<TestCase>)> {
        let mut samples = Vec::new();
        let mut tests = Vec::new();

        for files in &self.cases {
            let input = fs::read_to_string(&files.input)
                .with_context(|| format!("Failed to read input: {}", files.input.display()))?;
            let output = fs::read_to_string(&files.output)
                .with_context(|| format!("Failed to read output: {}", files.output.display()))?;

            let case = TestCase {
                name: files.name.clone(),
                input,
                output: text_lines(&output),
            };
            match files.kind {
                CaseKind::Sample => samples.push(case),
                CaseKind::Test => tests.push(case),
            }
        }

        Ok((samples, tests))
    }
}

/// Replace `path` with `lines`, LF-terminated, via a temp file in the same directory
pub fn write_output(path: &Path, lines: &[String]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    for line in lines {
        writeln!(file, "{}", line)?;
    }
    file.persist(path)
        .with_context(|| format!("Failed to write output: {}", path.display()))?;
    Ok(())
}
