//! Polls the node for a transaction by hash after a commit timeout
//!
//! Each iteration checks cancellation and the deadline first, then waits one
//! interval (racing it against cancellation and the deadline) and queries
//! the node once.

use crate::error::{PipelineError, PipelineResult};
use crate::node::{BroadcastResult, NodeClient, NodeError, NodeErrorKind, TxHash};

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Overall bound on polling for one transaction
pub const DEFAULT_POLL_DEADLINE: Duration = Duration::from_secs(300);

/// Wait between two queries
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one query by hash
#[derive(Debug)]
pub enum PollOutcome {
    Found(BroadcastResult),
    NotFoundYet,
    Fatal(NodeError),
}

impl From<Result<BroadcastResult, NodeError>> for PollOutcome {
    fn from(result: Result<BroadcastResult, NodeError>) -> Self {
        match result {
            Ok(found) => PollOutcome::Found(found),
            Err(err) if err.kind() == NodeErrorKind::TxNotFound => PollOutcome::NotFoundYet,
            Err(err) => PollOutcome::Fatal(err),
        }
    }
}

pub struct RetryPoller {
    node: Arc<dyn NodeClient>,
    deadline: Duration,
    interval: Duration,
}

impl RetryPoller {
    pub fn new(node: Arc<dyn NodeClient>) -> Self {
        Self {
            node,
            deadline: DEFAULT_POLL_DEADLINE,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Wait until `tx_hash` is found, the deadline passes or `cancel` fires
    ///
    /// `last_response` is the partial response from the timed out commit; it
    /// is handed back in `DeadlineExceeded`.
    pub async fn wait_for_commit(
        &self,
        tx_hash: TxHash,
        last_response: Option<BroadcastResult>,
        cancel: &CancellationToken,
    ) -> PipelineResult<BroadcastResult> {
        let deadline = Instant::now() + self.deadline;
        let mut attempts: u32 = 0;

        info!(
            "Polling for tx {} (deadline {:?}, interval {:?})",
            tx_hash, self.deadline, self.interval
        );

        loop {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled { tx_hash });
            }
            if Instant::now() >= deadline {
                warn!(
                    "Deadline exceeded after {} queries for tx {}",
                    attempts, tx_hash
                );
                return Err(PipelineError::DeadlineExceeded {
                    tx_hash,
                    last_response,
                });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled { tx_hash }),
                _ = sleep(self.interval) => {}
                _ = sleep_until(deadline) => continue,
            }

            attempts += 1;
            crate::metrics::record_poll_attempt();

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled { tx_hash }),
                result = self.node.query_tx(&tx_hash) => PollOutcome::from(result),
            };

            match outcome {
                PollOutcome::Found(result) => {
                    info!(
                        "Tx {} found after {} queries (code {}, height {:?})",
                        tx_hash, attempts, result.code, result.height
                    );
                    return Ok(result);
                }
                PollOutcome::NotFoundYet => {
                    debug!("Tx {} not found yet (attempt {})", tx_hash, attempts);
                }
                PollOutcome::Fatal(source) => {
                    warn!("Query for tx {} failed: {}", tx_hash, source);
                    return Err(PipelineError::Query { tx_hash, source });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::MockNodeClient;
    use std::sync::atomic::{AtomicU32, Ordering};

    const HASH: TxHash = TxHash::new([0x5a; 32]);

    fn not_found() -> NodeError {
        NodeError::new(format!("tx ({}) not found", HASH))
    }

    fn poller(node: MockNodeClient, deadline_secs: u64) -> RetryPoller {
        RetryPoller::new(Arc::new(node))
            .with_deadline(Duration::from_secs(deadline_secs))
            .with_interval(Duration::from_secs(1))
    }

    #[test]
    fn test_outcome_classification() {
        assert!(matches!(
            PollOutcome::from(Ok::<_, NodeError>(BroadcastResult::new(HASH, 0, ""))),
            PollOutcome::Found(_)
        ));
        assert!(matches!(
            PollOutcome::from(Err::<BroadcastResult, _>(not_found())),
            PollOutcome::NotFoundYet
        ));
        assert!(matches!(
            PollOutcome::from(Err::<BroadcastResult, _>(NodeError::new("connection refused"))),
            PollOutcome::Fatal(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_found_after_not_found() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut node = MockNodeClient::new();
        node.expect_query_tx().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(not_found())
            } else {
                Ok(BroadcastResult::new(HASH, 0, "").with_height(10))
            }
        });

        let start = Instant::now();
        let result = poller(node, 300)
            .wait_for_commit(HASH, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.height, Some(10));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded_carries_last_response() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut node = MockNodeClient::new();
        node.expect_query_tx().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(not_found())
        });

        let start = Instant::now();
        let last = BroadcastResult::new(HASH, 0, "");
        let err = poller(node, 3)
            .wait_for_commit(HASH, Some(last.clone()), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            PipelineError::DeadlineExceeded {
                tx_hash,
                last_response,
            } => {
                assert_eq!(tx_hash, HASH);
                assert_eq!(last_response, Some(last));
            }
            other => panic!("expected deadline exceeded, got {:?}", other),
        }
        let attempts = calls.load(Ordering::SeqCst);
        assert!((2..=4).contains(&attempts), "{} attempts", attempts);
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_stops_immediately() {
        let mut node = MockNodeClient::new();
        node.expect_query_tx()
            .times(1)
            .returning(|_| Err(NodeError::new("post failed: connection refused")));

        let err = poller(node, 300)
            .wait_for_commit(HASH, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Query { tx_hash, .. } if tx_hash == HASH));
        assert!(!err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_poll() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut node = MockNodeClient::new();
        node.expect_query_tx().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(not_found())
        });

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(2500)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = poller(node, 300)
            .wait_for_commit(HASH, None, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled { tx_hash } if tx_hash == HASH));
        assert!(err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_never_queries() {
        let mut node = MockNodeClient::new();
        node.expect_query_tx().never();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = poller(node, 300)
            .wait_for_commit(HASH, None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { .. }));
    }
}
