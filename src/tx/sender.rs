//! Submission pipeline: account lookup, gas, assembly, confirmation,
//! signing, broadcast and (after a commit timeout) polling

use super::broadcast::Broadcaster;
use super::builder::TxAssembler;
use super::confirm::{ConfirmationGate, Decision};
use super::fee::{FeeConfig, GasSetting};
use super::gas::GasEstimator;
use super::poller::{RetryPoller, DEFAULT_POLL_DEADLINE, DEFAULT_POLL_INTERVAL};
use super::signer::Signer;
use crate::deployment::Message;
use crate::error::{PipelineError, PipelineResult};
use crate::node::{BroadcastMode, BroadcastResult, NodeClient, TxHash};

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Per-submission options chosen by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOptions {
    pub mode: BroadcastMode,
    /// Sign without asking the operator
    pub skip_confirm: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            mode: BroadcastMode::Block,
            skip_confirm: false,
        }
    }
}

/// How a submission ended when no error occurred
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// The node produced a result; a non-zero code is an on-chain rejection
    Completed(BroadcastResult),
    /// The operator declined; nothing was signed or sent
    Aborted,
}

impl SubmitOutcome {
    pub fn result(&self) -> Option<&BroadcastResult> {
        match self {
            SubmitOutcome::Completed(result) => Some(result),
            SubmitOutcome::Aborted => None,
        }
    }
}

/// Runs one submission at a time from domain messages to a final result
pub struct TxSubmitter {
    node: Arc<dyn NodeClient>,
    gate: ConfirmationGate,
    poll_deadline: Duration,
    poll_interval: Duration,
}

impl TxSubmitter {
    pub fn new(node: Arc<dyn NodeClient>, gate: ConfirmationGate) -> Self {
        Self {
            node,
            gate,
            poll_deadline: DEFAULT_POLL_DEADLINE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_deadline(mut self, deadline: Duration) -> Self {
        self.poll_deadline = deadline;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn poller(&self) -> RetryPoller {
        RetryPoller::new(self.node.clone())
            .with_deadline(self.poll_deadline)
            .with_interval(self.poll_interval)
    }

    /// Submit `messages` as one transaction
    pub async fn submit(
        &self,
        messages: Vec<Message>,
        fee: &FeeConfig,
        options: SubmitOptions,
        cancel: &CancellationToken,
    ) -> PipelineResult<SubmitOutcome> {
        let span = info_span!("submit", id = %Uuid::new_v4(), mode = %options.mode);
        let start = Instant::now();

        let outcome = self
            .run(messages, fee, options, cancel)
            .instrument(span)
            .await;

        match &outcome {
            Ok(SubmitOutcome::Completed(result)) => {
                crate::metrics::record_tx_completed(options.mode, result);
                crate::metrics::record_tx_latency(options.mode, start.elapsed().as_secs_f64());
            }
            Ok(SubmitOutcome::Aborted) => crate::metrics::record_tx_aborted(),
            Err(e) => crate::metrics::record_tx_failed(e.kind()),
        }
        outcome
    }

    async fn run(
        &self,
        messages: Vec<Message>,
        fee: &FeeConfig,
        options: SubmitOptions,
        cancel: &CancellationToken,
    ) -> PipelineResult<SubmitOutcome> {
        TxAssembler::validate(&messages)?;
        let signer = messages[0].signer().to_string();

        let account = until_cancelled(cancel, async {
            fee.accounts
                .account(&signer)
                .await
                .map_err(|e| PipelineError::AccountLookup {
                    address: signer.clone(),
                    message: e.message,
                })
        })
        .await?;
        debug!(
            "Account {} has number {} and sequence {}",
            signer, account.account_number, account.sequence
        );

        let gas_limit = match fee.gas {
            GasSetting::Fixed(gas) => gas,
            GasSetting::Auto => {
                let estimator = GasEstimator::new(self.node.clone());
                until_cancelled(cancel, estimator.estimate(&messages, fee, account)).await?
            }
        };

        let unsigned = TxAssembler::new(fee).assemble(messages, gas_limit, account)?;

        if !options.skip_confirm && self.gate.confirm(&unsigned)? == Decision::Declined {
            return Ok(SubmitOutcome::Aborted);
        }
        // The prompt blocks; a signal received meanwhile still stops signing
        if cancel.is_cancelled() {
            info!("Cancelled before signing");
            return Err(PipelineError::Interrupted);
        }

        let signed = Signer::new(fee.keyring.as_ref()).sign(
            unsigned,
            &fee.key_name,
            fee.fee_granter.clone(),
        )?;

        let tx_hash = Broadcaster::hash_of(&signed)?;
        crate::metrics::record_tx_submitted(options.mode);
        let broadcaster = Broadcaster::new(self.node.clone());
        let broadcast = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Cancelled while broadcasting tx {}", tx_hash);
                return Err(PipelineError::Cancelled { tx_hash });
            }
            result = broadcaster.broadcast(&signed, options.mode) => result,
        };

        let result = match broadcast {
            Ok(result) => result,
            Err(PipelineError::RetryableTimeout {
                tx_hash,
                last_response,
            }) => {
                self.poller()
                    .wait_for_commit(tx_hash, last_response, cancel)
                    .await?
            }
            Err(e) => {
                error!("Broadcast failed: {}", e);
                return Err(e);
            }
        };

        info!(
            "Tx {} finished with code {} at height {:?}",
            result.tx_hash, result.code, result.height
        );
        Ok(SubmitOutcome::Completed(result))
    }

    /// Resume polling for a tx that reached the node earlier
    pub async fn wait(
        &self,
        tx_hash: TxHash,
        cancel: &CancellationToken,
    ) -> PipelineResult<BroadcastResult> {
        self.poller().wait_for_commit(tx_hash, None, cancel).await
    }
}

/// Run a step that happens before anything is sent, giving up on `cancel`
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    step: impl Future<Output = PipelineResult<T>>,
) -> PipelineResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!("Cancelled before broadcasting");
            Err(PipelineError::Interrupted)
        }
        result = step => result,
    }
}
