pub mod local;
pub mod remote;

use async_trait::async_trait;

use crate::models::decision::Decision;
use crate::models::gate::GateResult;
use crate::models::params::ConfigSnapshot;
use crate::models::signal::Signal;

pub use local::LocalDefault;
pub use remote::RemoteAuthority;

/// Issues the final BUY/SELL/HOLD for a signal that passed every blocking gate.
///
/// Implementations never fail: anything that goes wrong resolves to a HOLD
/// whose `source` says why.
#[async_trait]
pub trait DecisionClient: Send + Sync {
    fn name(&self) -> &'static str;

    async fn decide(
        &self,
        signal: &Signal,
        advisory: &[GateResult],
        config: &ConfigSnapshot,
    ) -> Decision;
}
