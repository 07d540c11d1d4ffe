//! Background memory sampler
//!
//! Samples the footprint of a running child on a fixed interval and signals
//! a breach the first time a sample exceeds the memory limit. Sampling is
//! best-effort: a failed sample (the process is exiting, its procfs entry is
//! gone) is discarded and the loop keeps going until it is stopped.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// One memory reading, in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySample {
    /// Current resident set size
    pub current: u64,
    /// High-water mark reported by the OS, 0 if unknown
    pub peak: u64,
}

impl MemorySample {
    pub fn footprint(&self) -> u64 {
        self.current.max(self.peak)
    }
}

/// Source of memory readings for a process
#[async_trait]
pub trait MemoryProbe: Send + Sync {
    async fn sample(&self, pid: u32) -> io::Result<MemorySample>;
}

/// Reads `VmRSS` and `VmHWM` from `/proc/<pid>/status`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcfsProbe;

impl ProcfsProbe {
    /// Parse the memory fields of a procfs status file
    pub fn parse_status(content: &str) -> io::Result<MemorySample> {
        let mut current = None;
        let mut peak = None;

        for line in content.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let slot = match key.trim() {
                "VmRSS" => &mut current,
                "VmHWM" => &mut peak,
                _ => continue,
            };
            let kb = value
                .trim()
                .trim_end_matches("kB")
                .trim()
                .parse::<u64>()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            *slot = Some(kb * 1024);
        }

        match (current, peak) {
            (None, None) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "no memory fields in status (process exiting?)",
            )),
            (current, peak) => Ok(MemorySample {
                current: current.unwrap_or(0),
                peak: peak.unwrap_or(0),
            }),
        }
    }
}

#[async_trait]
impl MemoryProbe for ProcfsProbe {
    async fn sample(&self, pid: u32) -> io::Result<MemorySample> {
        let content = tokio::fs::read_to_string(format!("/proc/{}/status", pid)).await?;
        Self::parse_status(&content)
    }
}

/// Handle to a running sampler task
pub struct ResourceMonitor {
    alive: Arc<AtomicBool>,
    peak: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl ResourceMonitor {
    /// Start sampling `pid`. The first sample is taken immediately; a
    /// breach is sent once through `breach_tx` and ends sampling.
    pub fn spawn(
        pid: u32,
        memory_limit: u64,
        interval: Duration,
        probe: Arc<dyn MemoryProbe>,
        breach_tx: oneshot::Sender<u64>,
    ) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        let peak = Arc::new(AtomicU64::new(0));

        let handle = tokio::spawn(sample_loop(
            pid,
            memory_limit,
            interval,
            probe,
            breach_tx,
            alive.clone(),
            peak.clone(),
        ));

        Self {
            alive,
            peak,
            handle,
        }
    }

    /// Largest footprint observed so far
    pub fn peak_memory(&self) -> u64 {
        self.peak.load(Ordering::Acquire)
    }

    /// Stop sampling and wait for the task to finish. Returns the peak.
    pub async fn stop(self) -> u64 {
        self.alive.store(false, Ordering::Release);
        self.handle.abort();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                debug!("Memory sampler panicked: {}", e);
            }
        }
        self.peak.load(Ordering::Acquire)
    }
}

async fn sample_loop(
    pid: u32,
    memory_limit: u64,
    interval: Duration,
    probe: Arc<dyn MemoryProbe>,
    breach_tx: oneshot::Sender<u64>,
    alive: Arc<AtomicBool>,
    peak: Arc<AtomicU64>,
) {
    while alive.load(Ordering::Acquire) {
        match probe.sample(pid).await {
            Ok(sample) => {
                let footprint = sample.footprint();
                peak.fetch_max(footprint, Ordering::AcqRel);

                if footprint > memory_limit {
                    debug!(
                        "Memory breach for pid {}: {} bytes > {} bytes",
                        pid, footprint, memory_limit
                    );
                    let _ = breach_tx.send(footprint);
                    return;
                }
            }
            Err(e) => trace!("Discarding memory sample for pid {}: {}", pid, e),
        }

        tokio::time::sleep(interval).await;
    }
}
