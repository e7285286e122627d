use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, warn};

use crate::error::panic_message;
use crate::filters::gates::{
    ActionHintGate, PositionSizeGate, PriceSanityGate, RewardRiskGate, SymbolAllowlistGate,
};
use crate::filters::{Gate, GateVerdict};
use crate::models::gate::{GateKind, GateResult};
use crate::models::params::ConfigSnapshot;
use crate::models::signal::Signal;

/// Ordered gate list, fixed at construction.
///
/// Blocking gates run in order until the first one fails; the rest of the
/// blocking gates are then skipped. Advisory gates always run so their
/// results can be logged and forwarded even for skipped signals.
pub struct FilterPipeline {
    gates: Vec<Box<dyn Gate>>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub passed: bool,
    pub results: Vec<GateResult>,
}

impl PipelineOutcome {
    /// The blocking gate that stopped the signal, if any.
    pub fn first_failure(&self) -> Option<&GateResult> {
        self.results.iter().find(|r| r.blocking && !r.passed)
    }

    /// Advisory results, forwarded to the decision authority.
    pub fn advisory(&self) -> Vec<GateResult> {
        self.results.iter().filter(|r| !r.blocking).cloned().collect()
    }
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self { gates: Vec::new() }
    }

    /// Built-in gate set: structural blocking checks, then advisory annotations.
    pub fn standard() -> Self {
        Self::new()
            .with_gate(ActionHintGate)
            .with_gate(PriceSanityGate)
            .with_gate(SymbolAllowlistGate)
            .with_gate(RewardRiskGate)
            .with_gate(PositionSizeGate)
    }

    pub fn with_gate(mut self, gate: impl Gate + 'static) -> Self {
        self.gates.push(Box::new(gate));
        self
    }

    /// Declared gate order and classification.
    pub fn layout(&self) -> Vec<(String, GateKind)> {
        self.gates
            .iter()
            .map(|g| (g.name().to_string(), g.kind()))
            .collect()
    }

    pub fn run(&self, signal: &Signal, config: &ConfigSnapshot) -> PipelineOutcome {
        let mut blocked = false;
        let mut results = Vec::with_capacity(self.gates.len());

        for gate in &self.gates {
            let kind = gate.kind();
            if blocked && kind == GateKind::Blocking {
                debug!("Gate {} skipped after blocking failure", gate.name());
                continue;
            }

            let result = evaluate_guarded(gate.as_ref(), signal, config);
            debug!(
                "Gate {} ({:?}): passed={} {}",
                result.gate, kind, result.passed, result.detail
            );
            if result.blocking && !result.passed {
                blocked = true;
            }
            results.push(result);
        }

        PipelineOutcome {
            passed: !blocked,
            results,
        }
    }
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

/// Run one gate, turning errors and panics into a fail-closed result.
fn evaluate_guarded(gate: &dyn Gate, signal: &Signal, config: &ConfigSnapshot) -> GateResult {
    let name = gate.name();
    match catch_unwind(AssertUnwindSafe(|| gate.evaluate(signal, config))) {
        Ok(Ok(GateVerdict { passed, detail })) => GateResult::new(name, gate.kind(), passed, detail),
        Ok(Err(e)) => {
            warn!("Gate {name} failed to evaluate: {e:#}");
            GateResult::gate_error(name, format!("{e:#}"))
        }
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            warn!("Gate {name} panicked: {msg}");
            GateResult::gate_error(name, msg)
        }
    }
}
