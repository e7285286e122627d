use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

/// Rolling latency samples per processing stage (pipeline, decision, ledger).
pub struct LatencyTracker {
    histograms: dashmap::DashMap<&'static str, VecDeque<Duration>>,
    max_samples: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageLatency {
    pub stage: &'static str,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            histograms: dashmap::DashMap::new(),
            max_samples: max_samples.max(1),
        }
    }

    pub fn record(&self, stage: &'static str, duration: Duration) {
        let max = self.max_samples;
        let mut hist = self
            .histograms
            .entry(stage)
            .or_insert_with(|| VecDeque::with_capacity(max));
        if hist.len() >= max {
            hist.pop_front();
        }
        hist.push_back(duration);
    }

    /// Timer that records into `stage` when dropped.
    pub fn start_timer(&self, stage: &'static str) -> Timer<'_> {
        Timer {
            stage,
            start: Instant::now(),
            tracker: self,
        }
    }

    /// p50, p95, p99 for one stage.
    pub fn percentiles(&self, stage: &str) -> Option<(Duration, Duration, Duration)> {
        let hist = self.histograms.get(stage)?;
        if hist.is_empty() {
            return None;
        }

        let mut sorted: Vec<Duration> = hist.iter().copied().collect();
        sorted.sort();

        let len = sorted.len();
        let at = |q: f64| sorted[((len as f64 * q) as usize).min(len - 1)];
        Some((at(0.50), at(0.95), at(0.99)))
    }

    pub fn snapshot(&self) -> Vec<StageLatency> {
        // Collect keys first; holding an iterator guard while calling `get`
        // on the same shard can deadlock.
        let keys: Vec<&'static str> = self.histograms.iter().map(|e| *e.key()).collect();
        let mut stages: Vec<StageLatency> = keys
            .into_iter()
            .filter_map(|stage| {
                let samples = self.histograms.get(stage)?.len();
                let (p50, p95, p99) = self.percentiles(stage)?;
                Some(StageLatency {
                    stage,
                    p50_ms: p50.as_secs_f64() * 1000.0,
                    p95_ms: p95.as_secs_f64() * 1000.0,
                    p99_ms: p99.as_secs_f64() * 1000.0,
                    samples,
                })
            })
            .collect();
        stages.sort_by_key(|s| s.stage);
        stages
    }

    pub fn log_summary(&self) {
        for s in self.snapshot() {
            info!(
                "Latency [{}]: p50={:.1}ms p95={:.1}ms p99={:.1}ms samples={}",
                s.stage, s.p50_ms, s.p95_ms, s.p99_ms, s.samples,
            );
        }
    }
}

pub struct Timer<'a> {
    stage: &'static str,
    start: Instant,
    tracker: &'a LatencyTracker,
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.tracker.record(self.stage, self.start.elapsed());
    }
}
