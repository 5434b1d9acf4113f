//! Heap usage sampling, trend tracking and the optional monitor task.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

const BYTES_PER_MB: u64 = 1024 * 1024;
const HISTORY_LEN: usize = 10;
const MIN_TREND_SAMPLES: usize = 3;
const TREND_TOLERANCE: f64 = 0.05;

/// Source of the current process memory usage
pub trait MemorySampler: Send + Sync {
    /// Bytes in use right now; zero when unknown
    fn used_bytes(&self) -> u64;
}

/// Resident set size from `/proc/self/status`.
///
/// Best effort: reports zero where procfs is unavailable, which keeps the
/// guard in the normal tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcMemorySampler;

impl MemorySampler for ProcMemorySampler {
    fn used_bytes(&self) -> u64 {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|status| parse_status_kb(&status, "VmRSS:"))
            .map_or(0, |kb| kb.saturating_mul(1024))
    }
}

fn parse_status_kb(status: &str, key: &str) -> Option<u64> {
    status
        .lines()
        .map(str::trim_start)
        .find(|line| line.starts_with(key))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
}

/// Sampler returning whatever was last set
#[derive(Debug, Default)]
pub struct FixedMemorySampler {
    bytes: AtomicU64,
}

impl FixedMemorySampler {
    pub fn new(bytes: u64) -> Self {
        Self {
            bytes: AtomicU64::new(bytes),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn from_mb(mb: f64) -> Self {
        Self::new((mb * BYTES_PER_MB as f64) as u64)
    }

    pub fn set(&self, bytes: u64) {
        self.bytes.store(bytes, Ordering::SeqCst);
    }
}

impl MemorySampler for FixedMemorySampler {
    fn used_bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTrend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryState {
    pub used_bytes: u64,
    pub limit_bytes: u64,
    /// `used / limit`
    pub usage_ratio: f64,
    pub over_limit: bool,
    pub trend: MemoryTrend,
}

/// Pull-based memory checks against a megabyte limit.
///
/// Every [`MemoryMonitor::check`] records a sample in a bounded history used
/// for the trend. The background interval started by
/// [`MemoryMonitor::start_interval`] only logs; fallback decisions are made
/// from the check performed at request time.
pub struct MemoryMonitor {
    sampler: Arc<dyn MemorySampler>,
    limit_bytes: u64,
    warning_ratio: f64,
    history: Mutex<VecDeque<u64>>,
    interval: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryMonitor {
    pub fn new(sampler: Arc<dyn MemorySampler>, limit_mb: u64, warning_ratio: f64) -> Self {
        Self {
            sampler,
            limit_bytes: limit_mb.saturating_mul(BYTES_PER_MB),
            warning_ratio,
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LEN)),
            interval: Mutex::new(None),
        }
    }

    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }

    /// Sample now and report usage against the limit
    pub fn check(&self) -> MemoryState {
        let used_bytes = self.sampler.used_bytes();
        let trend = {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            if history.len() == HISTORY_LEN {
                history.pop_front();
            }
            history.push_back(used_bytes);
            trend_of(history.make_contiguous())
        };

        #[allow(clippy::cast_precision_loss)]
        let usage_ratio = if self.limit_bytes == 0 {
            0.0
        } else {
            used_bytes as f64 / self.limit_bytes as f64
        };

        MemoryState {
            used_bytes,
            limit_bytes: self.limit_bytes,
            usage_ratio,
            over_limit: self.limit_bytes > 0 && used_bytes > self.limit_bytes,
            trend,
        }
    }

    /// Start periodic sampling on the current runtime; replaces a running one.
    /// The task only holds a weak reference and ends once the monitor is dropped.
    pub fn start_interval(self: &Arc<Self>, period: Duration) {
        let monitor = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                let state = monitor.check();
                if state.over_limit {
                    log::error!(
                        "Memory usage {} MB exceeds the {} MB limit",
                        state.used_bytes / BYTES_PER_MB,
                        state.limit_bytes / BYTES_PER_MB
                    );
                } else if state.usage_ratio >= monitor.warning_ratio {
                    log::warn!(
                        "Memory usage at {:.0}% of limit ({:?})",
                        state.usage_ratio * 100.0,
                        state.trend
                    );
                }
            }
        });

        let previous = self
            .interval
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.interval
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn stop(&self) {
        if let Some(handle) = self.interval.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}

impl Drop for MemoryMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for MemoryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMonitor")
            .field("limit_bytes", &self.limit_bytes)
            .field("warning_ratio", &self.warning_ratio)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Compare the mean of the older half of the samples with the newer half
fn trend_of(samples: &[u64]) -> MemoryTrend {
    if samples.len() < MIN_TREND_SAMPLES {
        return MemoryTrend::Stable;
    }
    let (older, newer) = samples.split_at(samples.len() / 2);
    let older = mean(older);
    let newer = mean(newer);
    if older == 0.0 {
        return if newer > 0.0 { MemoryTrend::Increasing } else { MemoryTrend::Stable };
    }
    let change = (newer - older) / older;
    if change > TREND_TOLERANCE {
        MemoryTrend::Increasing
    } else if change < -TREND_TOLERANCE {
        MemoryTrend::Decreasing
    } else {
        MemoryTrend::Stable
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}
