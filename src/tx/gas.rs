//! Gas estimation by simulating the transaction against the node

use super::builder::TxAssembler;
use super::codec;
use super::fee::FeeConfig;
use crate::deployment::Message;
use crate::error::{PipelineError, PipelineResult};
use crate::node::{AccountInfo, NodeClient};

use std::sync::Arc;
use tracing::debug;

/// Scale a simulated gas amount, rounding up so the limit never undershoots
pub fn adjust(simulated: u64, adjustment: f64) -> u64 {
    let adjusted = (simulated as f64 * adjustment).ceil();
    if adjusted >= u64::MAX as f64 {
        u64::MAX
    } else {
        adjusted as u64
    }
}

/// Gas estimator for `gas = auto`
pub struct GasEstimator {
    node: Arc<dyn NodeClient>,
}

impl GasEstimator {
    pub fn new(node: Arc<dyn NodeClient>) -> Self {
        Self { node }
    }

    /// Simulate `messages` and return the adjusted gas limit
    ///
    /// Runs before signing, so the simulated tx carries an empty signature.
    pub async fn estimate(
        &self,
        messages: &[Message],
        fee: &FeeConfig,
        account: AccountInfo,
    ) -> PipelineResult<u64> {
        let probe = TxAssembler::new(fee).assemble(messages.to_vec(), 0, account)?;
        let tx_bytes = codec::encode_for_simulation(&probe)?;

        let simulated = self
            .node
            .simulate(&tx_bytes)
            .await
            .map_err(|e| PipelineError::Simulation(e.message))?;

        let gas = adjust(simulated, fee.gas_adjustment);
        debug!(
            "Simulated gas {} adjusted by {} to {}",
            simulated, fee.gas_adjustment, gas
        );
        Ok(gas)
    }
}
