pub mod gates;
pub mod pipeline;

use crate::models::gate::GateKind;
use crate::models::params::ConfigSnapshot;
use crate::models::signal::Signal;

/// A named check in the filter pipeline.
///
/// Gates must not mutate the signal and should not have side effects; they
/// may read config and reference data. Returning `Err` (or panicking) marks
/// the signal as failed by this gate regardless of its kind.
pub trait Gate: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> GateKind;

    fn evaluate(&self, signal: &Signal, config: &ConfigSnapshot) -> anyhow::Result<GateVerdict>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateVerdict {
    pub passed: bool,
    pub detail: String,
}

impl GateVerdict {
    pub fn pass(detail: impl Into<String>) -> Self {
        Self {
            passed: true,
            detail: detail.into(),
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            detail: detail.into(),
        }
    }
}
