use anyhow::{Context, Result};
use tracing::{error, info, warn};

use local_judge::config::{get_config, init_config};
use local_judge::manifest::{write_output, Manifest};
use local_judge::{EngineConfig, Issue, IssueLevel, Judge, Summary};

/// What the binary does with the manifest's cases
#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    /// Judge every case against its expected output
    Check,
    /// Run the standard program and write each case's output file
    Generate,
}

impl Mode {
    fn from_env() -> Result<Self> {
        match std::env::var("JUDGE_MODE").as_deref() {
            Err(_) | Ok("check") => Ok(Mode::Check),
            Ok("generate") => Ok(Mode::Generate),
            Ok(other) => anyhow::bail!("Unknown JUDGE_MODE: {}", other),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("local_judge=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    if let Ok(path) = std::env::var("JUDGE_ENGINE_CONFIG") {
        init_config(EngineConfig::load(&path)?)?;
        info!("Loaded engine configuration from {}", path);
    }

    let manifest_path =
        std::env::var("JUDGE_MANIFEST").unwrap_or_else(|_| "./problem.toml".into());
    let manifest = Manifest::load(&manifest_path)?;
    let mode = Mode::from_env()?;
    info!(
        "Loaded {} ({} cases) from {}, mode {:?}",
        manifest.name,
        manifest.cases.len(),
        manifest_path,
        mode
    );

    let judge = Judge::new(get_config().clone());

    match mode {
        Mode::Check => check(&judge, &manifest).await,
        Mode::Generate => generate(&judge, &manifest).await,
    }
}

async fn check(judge: &Judge, manifest: &Manifest) -> Result<()> {
    let (samples, tests) = manifest.load_cases()?;
    let reports = judge
        .judge_cases(&manifest.command, manifest.limits, &samples, &tests)
        .await;

    for report in &reports {
        for issue in report.result.issues() {
            log_issue(issue);
        }
    }

    let summary = Summary::from_reports(&reports);
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !summary.passed {
        anyhow::bail!("Local judging failed for {}", manifest.name);
    }
    Ok(())
}

async fn generate(judge: &Judge, manifest: &Manifest) -> Result<()> {
    let mut failed = 0usize;

    for files in &manifest.cases {
        let name = format!("{} {}", files.kind, files.name);
        let input = std::fs::read_to_string(&files.input)
            .with_context(|| format!("Failed to read input: {}", files.input.display()))?;

        match judge
            .generate(&name, &manifest.command, manifest.limits, &input)
            .await
        {
            Ok(lines) => {
                write_output(&files.output, &lines)?;
                info!("Generated {} ({} lines)", name, lines.len());
            }
            Err(result) => {
                failed += 1;
                warn!("Failed to generate {}: {}", name, result.state());
                for issue in result.issues() {
                    log_issue(issue);
                }
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} cases failed to generate", failed, manifest.cases.len());
    }
    Ok(())
}

fn log_issue(issue: &Issue) {
    match issue.level {
        IssueLevel::Info => info!("{}", issue),
        IssueLevel::Warning => warn!("{}", issue),
        IssueLevel::Error => error!("{}", issue),
    }
}
