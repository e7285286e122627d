use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateKind {
    Blocking, // failure stops the signal before the decision authority
    Advisory, // failure is recorded and forwarded, never stops the signal
}

/// Outcome of one gate for one signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub gate: String,
    pub passed: bool,
    pub blocking: bool,
    pub detail: String,
}

impl GateResult {
    pub fn new(gate: &str, kind: GateKind, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            gate: gate.to_string(),
            passed,
            blocking: kind == GateKind::Blocking,
            detail: detail.into(),
        }
    }

    /// Fail-closed result for a gate that could not be evaluated.
    pub fn gate_error(gate: &str, cause: impl std::fmt::Display) -> Self {
        Self {
            gate: gate.to_string(),
            passed: false,
            blocking: true,
            detail: format!("gate error: {cause}"),
        }
    }
}
