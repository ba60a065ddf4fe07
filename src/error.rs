//! Error types for the transaction pipeline

use crate::node::{BroadcastResult, NodeError, TxHash};
use thiserror::Error;

/// Main error type for a submission
///
/// An operator declining the confirmation prompt is not represented here; it
/// is a normal outcome (`SubmitOutcome::Aborted`).
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Message {index} failed basic validation: {message}")]
    Validation { index: usize, message: String },

    #[error("Account lookup failed for {address}: {message}")]
    AccountLookup { address: String, message: String },

    #[error("Gas simulation rejected by node: {0}")]
    Simulation(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The node rejected or never acknowledged the broadcast. The bytes may
    /// still have reached it, so the hash is kept.
    #[error("Broadcast of tx {tx_hash} failed: {source}")]
    Broadcast { tx_hash: TxHash, source: NodeError },

    /// The node gave up waiting for block inclusion. Consumed by the poller,
    /// only surfaced when a caller drives the broadcaster directly.
    #[error("Timed out waiting for tx {tx_hash} to be included in a block")]
    RetryableTimeout {
        tx_hash: TxHash,
        last_response: Option<BroadcastResult>,
    },

    #[error("Deadline exceeded waiting for tx {tx_hash} to be committed")]
    DeadlineExceeded {
        tx_hash: TxHash,
        last_response: Option<BroadcastResult>,
    },

    #[error("Cancelled while waiting for tx {tx_hash}")]
    Cancelled { tx_hash: TxHash },

    #[error("Cancelled before the transaction was sent")]
    Interrupted,

    #[error("Query for tx {tx_hash} failed: {source}")]
    Query { tx_hash: TxHash, source: NodeError },

    #[error("Operator I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Check if the transaction may still settle and polling can be resumed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::RetryableTimeout { .. }
                | PipelineError::DeadlineExceeded { .. }
                | PipelineError::Cancelled { .. }
        )
    }

    /// Hash of the transaction if it reached the node
    pub fn tx_hash(&self) -> Option<&TxHash> {
        match self {
            PipelineError::RetryableTimeout { tx_hash, .. }
            | PipelineError::DeadlineExceeded { tx_hash, .. }
            | PipelineError::Cancelled { tx_hash }
            | PipelineError::Query { tx_hash, .. }
            | PipelineError::Broadcast { tx_hash, .. } => Some(tx_hash),
            _ => None,
        }
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "config",
            PipelineError::Validation { .. } => "validation",
            PipelineError::AccountLookup { .. } => "account_lookup",
            PipelineError::Simulation(_) => "simulation",
            PipelineError::Signing(_) => "signing",
            PipelineError::Encoding(_) => "encoding",
            PipelineError::Broadcast { .. } => "broadcast",
            PipelineError::RetryableTimeout { .. } => "retryable_timeout",
            PipelineError::DeadlineExceeded { .. } => "deadline_exceeded",
            PipelineError::Cancelled { .. } => "cancelled",
            PipelineError::Interrupted => "interrupted",
            PipelineError::Query { .. } => "query",
            PipelineError::Io(_) => "io",
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_exceeded_carries_hash() {
        let hash = TxHash::new([7u8; 32]);
        let err = PipelineError::DeadlineExceeded {
            tx_hash: hash,
            last_response: None,
        };
        assert!(err.is_retryable());
        assert_eq!(err.tx_hash(), Some(&hash));
        assert!(err.to_string().contains(&hash.to_string()));
    }

    #[test]
    fn test_fatal_kinds_not_retryable() {
        let errors = [
            PipelineError::Config("bad gas".to_string()),
            PipelineError::Simulation("out of gas".to_string()),
            PipelineError::Signing("key not found".to_string()),
            PipelineError::Interrupted,
        ];
        for err in errors {
            assert!(!err.is_retryable(), "{} should be fatal", err);
            assert!(err.tx_hash().is_none());
        }
    }

    #[test]
    fn test_broadcast_failure_keeps_hash() {
        let hash = TxHash::new([9u8; 32]);
        let err = PipelineError::Broadcast {
            tx_hash: hash,
            source: NodeError::new("post failed: operation timed out"),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.tx_hash(), Some(&hash));
        assert_eq!(err.kind(), "broadcast");
        assert!(err.to_string().ends_with("post failed: operation timed out"));
    }
}
