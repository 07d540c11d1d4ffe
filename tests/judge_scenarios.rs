use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use local_judge::runner::{MemoryProbe, MemorySample, ProcessSupervisor};
use local_judge::{
    CommandSpec, EngineConfig, IssueLevel, Judge, JudgeRequest, JudgeState, ResourceLimits,
    RunnerState, TestCase,
};

const MIB: u64 = 1024 * 1024;

fn ample() -> ResourceLimits {
    ResourceLimits::new(Duration::from_secs(5), 512 * MIB).unwrap()
}

fn sh(script: &str) -> Vec<String> {
    vec!["sh".into(), "-c".into(), script.into()]
}

fn has_program(name: &str) -> bool {
    std::process::Command::new(name)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// A process is gone once its procfs entry disappears or it is a zombie
/// waiting for init; a running or sleeping process fails the check.
fn is_terminated(pid: u32) -> bool {
    for _ in 0..50 {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Err(_) => return true,
            Ok(stat) => {
                let state = stat
                    .rsplit_once(')')
                    .and_then(|(_, rest)| rest.split_whitespace().next());
                if matches!(state, Some("Z") | Some("X")) {
                    return true;
                }
            }
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

/// Reports a fixed footprint for every sample
struct FixedProbe(u64);

#[async_trait]
impl MemoryProbe for FixedProbe {
    async fn sample(&self, _pid: u32) -> io::Result<MemorySample> {
        Ok(MemorySample {
            current: self.0,
            peak: self.0,
        })
    }
}

struct PanickingProbe;

#[async_trait]
impl MemoryProbe for PanickingProbe {
    async fn sample(&self, _pid: u32) -> io::Result<MemorySample> {
        panic!("probe exploded");
    }
}

#[tokio::test]
async fn accept_when_echo_matches() {
    let judge = Judge::new(EngineConfig::default());
    let request = JudgeRequest::new("sample 1", ["cat"], ample())
        .with_input("1 2\n")
        .with_expected(["1 2"]);

    let result = judge.judge(&request).await;

    assert_eq!(result.state(), JudgeState::Accept);
    assert!(result.issues().is_empty(), "{:?}", result.issues());
    assert_eq!(result.captured_output(), Some(&["1 2".to_string()][..]));
    assert_eq!(result.metrics().exit_code, Some(0));
}

#[tokio::test]
async fn runtime_error_on_nonzero_exit() {
    let judge = Judge::new(EngineConfig::default());
    let request = JudgeRequest::new("test 1", sh("exit 1"), ample()).with_expected(["never"]);

    let result = judge.judge(&request).await;

    assert_eq!(result.state(), JudgeState::RuntimeError);
    assert_eq!(result.issues().len(), 1);
    assert_eq!(result.issues()[0].level, IssueLevel::Error);
    assert!(result.issues()[0].message.contains("exited with 1"));
}

#[tokio::test]
async fn time_limit_kills_sleeper() {
    let judge = Judge::new(EngineConfig::default());
    let limits = ResourceLimits::new(Duration::from_secs(1), 512 * MIB).unwrap();
    let request = JudgeRequest::new("test 2", ["sleep", "10"], limits);

    let result = judge.judge(&request).await;

    assert_eq!(result.state(), JudgeState::TimeLimitExceeded);
    assert!(result.captured_output().is_none());
    let elapsed = result.metrics().elapsed;
    assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(4));
    assert!(result.issues()[0].message.contains("limit 1 seconds"));

    let pid = result.metrics().pid.expect("pid recorded");
    assert!(is_terminated(pid));
}

#[tokio::test]
async fn memory_limit_on_real_allocation() {
    if !has_program("python3") || !Path::new("/proc/self/status").exists() {
        eprintln!("skipping: python3 or procfs unavailable");
        return;
    }
    let judge = Judge::new(EngineConfig::default());
    let limits = ResourceLimits::new(Duration::from_secs(10), 64 * MIB).unwrap();
    let script = "import time\nb = b'x' * (256 * 1024 * 1024)\ntime.sleep(5)\n";
    let request = JudgeRequest::new("test 3", ["python3", "-c", script], limits);

    let result = judge.judge(&request).await;

    assert_eq!(result.state(), JudgeState::MemoryLimitExceeded);
    assert!(result.metrics().peak_memory > 64 * MIB);
    assert!(result.issues()[0].message.contains("limit 67108864 bytes"));
    assert!(is_terminated(result.metrics().pid.unwrap()));
}

#[tokio::test]
async fn wrong_answer_reports_line() {
    let judge = Judge::new(EngineConfig::default());
    let request = JudgeRequest::new("sample 2", ["cat"], ample())
        .with_input("x\n")
        .with_expected(["y"]);

    let result = judge.judge(&request).await;

    assert_eq!(result.state(), JudgeState::WrongAnswer);
    let issues = result.issues();
    assert_eq!(issues.len(), 2);
    assert_eq!(issues[0].level, IssueLevel::Warning);
    assert!(issues[0].message.contains("line 1"));
    assert_eq!(issues[0].addendum.as_deref(), Some("line 1"));
    assert_eq!(issues[1].level, IssueLevel::Error);
    assert_eq!(result.captured_output(), Some(&["x".to_string()][..]));
}

#[tokio::test]
async fn system_error_when_program_is_missing() {
    let judge = Judge::new(EngineConfig::default());
    let request = JudgeRequest::new("test 4", ["/no/such/standard-program"], ample());

    let result = judge.judge(&request).await;

    assert_eq!(result.state(), JudgeState::SystemError);
    assert_eq!(result.issues().len(), 1);
    assert!(result.issues()[0].message.contains("failed to spawn"));
    assert!(result.captured_output().is_none());
}

#[tokio::test]
async fn breach_wins_over_clean_exit() {
    let judge = Judge::with_probe(EngineConfig::default(), Arc::new(FixedProbe(MIB * 1024)));
    let request = JudgeRequest::new("test 5", sh("cat; sleep 0.2"), ample())
        .with_input("1 2\n")
        .with_expected(["1 2"]);

    let result = judge.judge(&request).await;

    assert_eq!(result.state(), JudgeState::MemoryLimitExceeded);
    assert_eq!(result.metrics().peak_memory, MIB * 1024);
    assert!(result.captured_output().is_none());
}

#[tokio::test]
async fn breach_wins_over_deadline_race() {
    let supervisor =
        ProcessSupervisor::with_probe(EngineConfig::default(), Arc::new(FixedProbe(MIB * 1024)));
    let limits = ResourceLimits::new(Duration::from_millis(500), 512 * MIB).unwrap();

    let report = supervisor
        .run(&CommandSpec::new("sleep").with_args(["10"]), &limits, "")
        .await
        .unwrap();

    assert_eq!(report.state, RunnerState::OutOfMemory);
    assert!(report.elapsed < Duration::from_millis(500));
}

#[tokio::test]
async fn failing_probe_does_not_affect_outcome() {
    let judge = Judge::with_probe(EngineConfig::default(), Arc::new(PanickingProbe));
    let request = JudgeRequest::new("sample 3", ["cat"], ample())
        .with_input("ok\n")
        .with_expected(["ok"]);

    let result = judge.judge(&request).await;

    assert_eq!(result.state(), JudgeState::Accept);
    assert_eq!(result.metrics().peak_memory, 0);
}

#[tokio::test]
async fn deterministic_program_is_stable() {
    let judge = Judge::new(EngineConfig::default());
    let request = JudgeRequest::new("sample 4", sh("read a b; echo $((a + b))"), ample())
        .with_input("20 22\n")
        .with_expected(["42"]);

    for _ in 0..3 {
        assert_eq!(judge.judge(&request).await.state(), JudgeState::Accept);
    }
}

#[tokio::test]
async fn program_reading_to_eof_terminates() {
    let judge = Judge::new(EngineConfig::default());
    let request = JudgeRequest::new("sample 5", ["wc", "-l"], ample())
        .with_input("a\nb\nc\n")
        .with_expected(["3"]);

    let result = judge.judge(&request).await;

    assert_eq!(result.state(), JudgeState::Accept);
}

#[tokio::test]
async fn timeout_reaps_whole_process_group() {
    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("worker.pid");
    let script = format!("sleep 30 & echo $! > {}; wait", pidfile.display());
    let judge = Judge::new(EngineConfig::default());
    let limits = ResourceLimits::new(Duration::from_millis(500), 512 * MIB).unwrap();
    let request = JudgeRequest::new("test 6", sh(&script), limits);

    let result = judge.judge(&request).await;

    assert_eq!(result.state(), JudgeState::TimeLimitExceeded);
    assert!(is_terminated(result.metrics().pid.unwrap()));
    let worker: u32 = std::fs::read_to_string(&pidfile)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(is_terminated(worker));
}

#[tokio::test]
async fn clean_exit_reaps_background_worker() {
    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("worker.pid");
    let script = format!(
        "sleep 30 >/dev/null 2>&1 & echo $! > {}; echo hi",
        pidfile.display()
    );
    let judge = Judge::new(EngineConfig::default());
    let request = JudgeRequest::new("test 9", sh(&script), ample()).with_expected(["hi"]);

    let result = judge.judge(&request).await;

    assert_eq!(result.state(), JudgeState::Accept);
    assert!(is_terminated(result.metrics().pid.unwrap()));
    let worker: u32 = std::fs::read_to_string(&pidfile)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(is_terminated(worker));
}

#[tokio::test]
async fn drain_timeout_is_system_error() {
    if !has_program("setsid") {
        eprintln!("skipping: setsid unavailable");
        return;
    }
    let config = EngineConfig {
        drain_timeout: Duration::from_millis(200),
        ..EngineConfig::default()
    };
    let judge = Judge::new(config);
    let request = JudgeRequest::new("test 10", sh("setsid sleep 2 & echo done"), ample())
        .with_expected(["done"]);

    let result = judge.judge(&request).await;

    assert_eq!(result.state(), JudgeState::SystemError);
    assert!(result.issues()[0].message.contains("timed out draining stdout"));
    assert!(result.captured_output().is_none());
}

#[tokio::test]
async fn batch_continues_past_failures() {
    let judge = Judge::new(EngineConfig::default());
    let samples = vec![TestCase {
        name: "1".into(),
        input: "a\n".into(),
        output: vec!["a".into()],
    }];
    let tests = vec![
        TestCase {
            name: "1".into(),
            input: "b\n".into(),
            output: vec!["c".into()],
        },
        TestCase {
            name: "2".into(),
            input: "d\n".into(),
            output: vec!["d".into(), "".into()],
        },
    ];

    let reports = judge
        .judge_cases(&["cat".to_string()], ample(), &samples, &tests)
        .await;

    let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["sample 1", "test 1", "test 2"]);
    let states: Vec<JudgeState> = reports.iter().map(|r| r.result.state()).collect();
    assert_eq!(
        states,
        vec![JudgeState::Accept, JudgeState::WrongAnswer, JudgeState::Accept]
    );
}

#[tokio::test]
async fn generate_returns_reference_output() {
    let judge = Judge::new(EngineConfig::default());
    let command = sh("read a b; echo $((a * b))");

    let output = judge
        .generate("test 7", &command, ample(), "6 7\n")
        .await
        .unwrap();
    assert_eq!(output, vec!["42"]);

    let failed = judge
        .generate("test 8", &sh("exit 2"), ample(), "")
        .await
        .unwrap_err();
    assert_eq!(failed.state(), JudgeState::RuntimeError);
}
