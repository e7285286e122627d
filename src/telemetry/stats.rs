use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::info;

use crate::models::ledger::LedgerStatus;

/// Outcome counters since process start.
#[derive(Default)]
pub struct IntakeStats {
    received: AtomicU64,
    rejected: AtomicU64, // malformed payloads, never reach the ledger
    skipped: AtomicU64,
    executed: AtomicU64,
    held: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub rejected: u64,
    pub skipped: u64,
    pub executed: u64,
    pub held: u64,
    pub errors: u64,
}

impl IntakeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_outcome(&self, status: LedgerStatus) {
        let counter = match status {
            LedgerStatus::Skipped => &self.skipped,
            LedgerStatus::Executed => &self.executed,
            LedgerStatus::Hold => &self.held,
            LedgerStatus::Error => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            held: self.held.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!(
            "=== INTAKE SUMMARY === received={} rejected={} skipped={} executed={} held={} errors={}",
            s.received, s.rejected, s.skipped, s.executed, s.held, s.errors,
        );
    }
}
