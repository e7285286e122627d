use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::decision::DecisionClient;
use crate::error::{panic_message, InternalError, LedgerError};
use crate::filters::pipeline::FilterPipeline;
use crate::ledger::TradeLedger;
use crate::models::decision::Decision;
use crate::models::gate::GateResult;
use crate::models::ledger::{LedgerEntry, LedgerStatus};
use crate::models::signal::Signal;
use crate::store::ConfigStore;
use crate::telemetry::latency::LatencyTracker;
use crate::telemetry::stats::IntakeStats;

/// Lifecycle of one signal through the intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeStage {
    Received,
    Validated,
    PipelineRun,
    Skipped,
    Decided,
    Logged,
    Responded,
}

#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    Skipped {
        failed: GateResult,
        results: Vec<GateResult>,
    },
    Decided {
        decision: Decision,
        results: Vec<GateResult>,
    },
}

impl ProcessOutcome {
    pub fn message(&self) -> String {
        match self {
            ProcessOutcome::Skipped { failed, .. } => {
                format!("Signal skipped: {} check failed", failed.gate)
            }
            ProcessOutcome::Decided { decision, .. } => {
                format!("Signal processed. Decision: {}", decision.action.as_str())
            }
        }
    }

    pub fn results(&self) -> &[GateResult] {
        match self {
            ProcessOutcome::Skipped { results, .. } | ProcessOutcome::Decided { results, .. } => {
                results
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    /// The outcome was reached but could not be recorded.
    #[error("ledger write failed: {source}")]
    Ledger {
        outcome: ProcessOutcome,
        #[source]
        source: LedgerError,
    },
    /// Processing faulted; an ERROR entry has already been attempted.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// Drives one validated signal through pipeline, decision and ledger.
pub struct SignalProcessor {
    pipeline: FilterPipeline,
    decision: Arc<dyn DecisionClient>,
    ledger: Arc<TradeLedger>,
    store: Arc<ConfigStore>,
    stats: Arc<IntakeStats>,
    latency: Arc<LatencyTracker>,
}

impl SignalProcessor {
    pub fn new(
        pipeline: FilterPipeline,
        decision: Arc<dyn DecisionClient>,
        ledger: Arc<TradeLedger>,
        store: Arc<ConfigStore>,
    ) -> Self {
        Self {
            pipeline,
            decision,
            ledger,
            store,
            stats: Arc::new(IntakeStats::new()),
            latency: Arc::new(LatencyTracker::new(1000)),
        }
    }

    pub fn pipeline(&self) -> &FilterPipeline {
        &self.pipeline
    }

    pub fn decision_client(&self) -> &dyn DecisionClient {
        self.decision.as_ref()
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn stats(&self) -> &Arc<IntakeStats> {
        &self.stats
    }

    pub fn latency(&self) -> &Arc<LatencyTracker> {
        &self.latency
    }

    /// Run the signal to a recorded outcome.
    ///
    /// The decision client is called at most once, and only when every
    /// blocking gate passed. Exactly one ledger append is attempted.
    pub async fn process(&self, signal: &Signal) -> Result<ProcessOutcome, ProcessError> {
        advance(signal, IntakeStage::Validated);
        let config = self.store.current().await;

        let pipeline = {
            let _timer = self.latency.start_timer("pipeline");
            self.pipeline.run(signal, &config)
        };
        advance(signal, IntakeStage::PipelineRun);

        let (entry, outcome) = match pipeline.first_failure().cloned() {
            Some(failed) => {
                info!(
                    "Signal {} ({}) skipped: {} failed ({})",
                    signal.id,
                    signal.display_symbol(),
                    failed.gate,
                    failed.detail
                );
                advance(signal, IntakeStage::Skipped);
                (
                    LedgerEntry::skipped(signal, &failed),
                    ProcessOutcome::Skipped {
                        failed,
                        results: pipeline.results,
                    },
                )
            }
            None => {
                let advisory = pipeline.advisory();
                for flagged in advisory.iter().filter(|r| !r.passed) {
                    info!(
                        "Advisory gate {} flagged {}: {}; forwarding anyway",
                        flagged.gate,
                        signal.display_symbol(),
                        flagged.detail
                    );
                }

                let decision = {
                    let _timer = self.latency.start_timer("decision");
                    self.decision.decide(signal, &advisory, &config).await
                };
                info!(
                    "Final decision for {} ({}): {} [{:?}] {}",
                    signal.id,
                    signal.display_symbol(),
                    decision.action.as_str(),
                    decision.source,
                    decision.reason
                );
                advance(signal, IntakeStage::Decided);

                let quantity = Decimal::from_f64_retain(config.trading.order_quantity)
                    .unwrap_or(Decimal::ONE);
                (
                    LedgerEntry::decided(signal, &decision, quantity),
                    ProcessOutcome::Decided {
                        decision,
                        results: pipeline.results,
                    },
                )
            }
        };

        let appended = {
            let _timer = self.latency.start_timer("ledger");
            self.ledger.append(&entry)
        };
        match appended {
            Ok(()) => {
                self.stats.on_outcome(entry.status);
                advance(signal, IntakeStage::Logged);
                Ok(outcome)
            }
            Err(source) => {
                error!(
                    "Ledger write failed for signal {} ({}): {source}; unrecorded outcome: {:?} {}",
                    signal.id,
                    signal.display_symbol(),
                    entry.status,
                    entry.notes
                );
                self.stats.on_outcome(LedgerStatus::Error);
                Err(ProcessError::Ledger { outcome, source })
            }
        }
    }

    /// `process`, with a panic turned into a recorded ERROR entry.
    ///
    /// The failure is recorded before this returns, so a caller holding an
    /// intake permit keeps ledger rows in arrival order.
    pub async fn process_guarded(&self, signal: &Signal) -> Result<ProcessOutcome, ProcessError> {
        match AssertUnwindSafe(self.process(signal)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let err = InternalError::Panicked(panic_message(payload.as_ref()));
                error!(
                    "Signal {} ({}) failed: {err}",
                    signal.id,
                    signal.display_symbol()
                );
                self.record_failure(signal, &err.to_string());
                Err(ProcessError::Internal(err))
            }
        }
    }

    /// Record an unexpected fault for an accepted signal.
    pub fn record_failure(&self, signal: &Signal, message: &str) {
        self.stats.on_outcome(LedgerStatus::Error);
        if let Err(e) = self.ledger.append(&LedgerEntry::error(signal, message)) {
            error!(
                "Could not record failure for signal {} in ledger: {e}; failure was: {message}",
                signal.id
            );
        }
    }
}

pub(crate) fn advance(signal: &Signal, stage: IntakeStage) {
    debug!(signal_id = %signal.id, stage = ?stage, "intake stage");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::LocalDefault;
    use crate::filters::{Gate, GateVerdict};
    use crate::models::decision::{DecisionAction, DecisionSource};
    use crate::models::gate::GateKind;
    use crate::models::params::ConfigSnapshot;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Decision client that counts calls and always answers BUY.
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DecisionClient for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn decide(&self, _: &Signal, advisory: &[GateResult], _: &ConfigSnapshot) -> Decision {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Decision {
                action: DecisionAction::Buy,
                reason: format!("{} advisory results", advisory.len()),
                source: DecisionSource::RemoteAuthority,
            }
        }
    }

    struct Always(&'static str, GateKind, bool);

    impl Gate for Always {
        fn name(&self) -> &str {
            self.0
        }

        fn kind(&self) -> GateKind {
            self.1
        }

        fn evaluate(&self, _: &Signal, _: &ConfigSnapshot) -> anyhow::Result<GateVerdict> {
            Ok(if self.2 {
                GateVerdict::pass("ok")
            } else {
                GateVerdict::fail("failed")
            })
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        ledger_path: std::path::PathBuf,
        processor: SignalProcessor,
    }

    async fn fixture(pipeline: FilterPipeline, decision: Arc<dyn DecisionClient>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let ledger_path = dir.path().join("trading_log.csv");
        let ledger = Arc::new(TradeLedger::open(&ledger_path).unwrap());
        let store = Arc::new(ConfigStore::open(dir.path().join("config")).await);
        Fixture {
            processor: SignalProcessor::new(pipeline, decision, ledger, store),
            ledger_path,
            _dir: dir,
        }
    }

    fn btc() -> Signal {
        Signal::from_payload(br#"{"symbol":"BTCUSD","action":"BUY","price":65000}"#).unwrap()
    }

    #[tokio::test]
    async fn test_blocking_failure_never_reaches_decision() {
        let client = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let pipeline = FilterPipeline::new()
            .with_gate(Always("G1", GateKind::Blocking, false))
            .with_gate(Always("G2", GateKind::Advisory, true));
        let fx = fixture(pipeline, client.clone()).await;

        let outcome = fx.processor.process(&btc()).await.unwrap();
        assert!(matches!(outcome, ProcessOutcome::Skipped { ref failed, .. } if failed.gate == "G1"));
        assert!(outcome.results().iter().any(|r| r.gate == "G2"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);

        let entries = TradeLedger::read_entries(&fx.ledger_path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, LedgerStatus::Skipped);
        assert!(entries[0].notes.contains("G1"));
    }

    #[tokio::test]
    async fn test_pass_decides_once_and_records() {
        let client = Arc::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let pipeline = FilterPipeline::new()
            .with_gate(Always("G1", GateKind::Blocking, true))
            .with_gate(Always("G2", GateKind::Advisory, false));
        let fx = fixture(pipeline, client.clone()).await;

        let outcome = fx.processor.process(&btc()).await.unwrap();
        let ProcessOutcome::Decided { decision, .. } = outcome else {
            panic!("expected a decision");
        };
        assert_eq!(decision.reason, "1 advisory results");
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);

        let entries = TradeLedger::read_entries(&fx.ledger_path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, LedgerStatus::Executed);
        assert_eq!(entries[0].quantity, Decimal::ONE);
        assert_eq!(fx.processor.stats().snapshot().executed, 1);
    }

    #[tokio::test]
    async fn test_local_default_records_hold() {
        let fx = fixture(FilterPipeline::standard(), Arc::new(LocalDefault)).await;
        fx.processor.process(&btc()).await.unwrap();

        let entries = TradeLedger::read_entries(&fx.ledger_path).unwrap();
        assert_eq!(entries[0].status, LedgerStatus::Hold);
        assert_eq!(entries[0].signal_type, "HOLD");
    }

    struct Exploding;

    #[async_trait]
    impl DecisionClient for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        async fn decide(&self, _: &Signal, _: &[GateResult], _: &ConfigSnapshot) -> Decision {
            panic!("decision backend exploded");
        }
    }

    #[tokio::test]
    async fn test_guarded_panic_records_error_entry() {
        let fx = fixture(FilterPipeline::standard(), Arc::new(Exploding)).await;

        let err = fx.processor.process_guarded(&btc()).await.unwrap_err();
        assert!(matches!(err, ProcessError::Internal(InternalError::Panicked(ref m)) if m == "decision backend exploded"));

        let entries = TradeLedger::read_entries(&fx.ledger_path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, LedgerStatus::Error);
        assert!(entries[0].notes.contains("decision backend exploded"));
        assert_eq!(fx.processor.stats().snapshot().errors, 1);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_ledger_failure_keeps_decision() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(TradeLedger::open("/dev/full").unwrap());
        let store = Arc::new(ConfigStore::open(dir.path()).await);
        let processor = SignalProcessor::new(
            FilterPipeline::standard(),
            Arc::new(LocalDefault),
            ledger,
            store,
        );

        let err = processor.process(&btc()).await.unwrap_err();
        let ProcessError::Ledger { outcome, .. } = err else {
            panic!("expected a ledger error");
        };
        assert!(matches!(outcome, ProcessOutcome::Decided { .. }));
        assert_eq!(processor.stats().snapshot().errors, 1);
    }
}
