use async_trait::async_trait;
use tracing::info;

use crate::decision::DecisionClient;
use crate::models::decision::{Decision, DecisionSource};
use crate::models::gate::GateResult;
use crate::models::params::ConfigSnapshot;
use crate::models::signal::Signal;

/// Used when no remote decision authority is configured. Always holds.
pub struct LocalDefault;

#[async_trait]
impl DecisionClient for LocalDefault {
    fn name(&self) -> &'static str {
        "local_default"
    }

    async fn decide(
        &self,
        signal: &Signal,
        _advisory: &[GateResult],
        _config: &ConfigSnapshot,
    ) -> Decision {
        info!("No decision authority configured, holding {}", signal.display_symbol());
        Decision::hold(
            DecisionSource::LocalDefault,
            "no remote decision authority configured",
        )
    }
}
