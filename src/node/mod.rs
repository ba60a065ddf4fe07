//! Node module - the RPC surface the pipeline consumes
//!
//! This module provides:
//! - `NodeClient` / `AccountRetriever` capability traits
//! - Result and hash types shared by broadcaster and poller
//! - Classification of node error messages (commit timeout, tx not found)
//! - A Tendermint JSON-RPC implementation (`TendermintRpc`)

pub mod rpc;

pub use rpc::TendermintRpc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Message the node returns when `broadcast_tx_commit` gives up waiting for
/// block inclusion. The node exposes no structured kind for this.
pub const TIMEOUT_ERROR_MESSAGE: &str = "timed out waiting for tx to be included in a block";

/// Suffix of the node's error for a tx hash it has not indexed (yet),
/// e.g. `tx (5A3F...) not found`.
pub const NOT_FOUND_ERROR_SUFFIX: &str = ") not found";

/// SHA-256 hash identifying a transaction
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TxHash([u8; 32]);

impl TxHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self)
    }
}

impl FromStr for TxHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| format!("invalid tx hash {:?}: {}", s, e))?;
        Ok(Self(bytes))
    }
}

impl From<TxHash> for String {
    fn from(hash: TxHash) -> Self {
        hash.to_string()
    }
}

impl TryFrom<String> for TxHash {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Acknowledgement level requested from the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastMode {
    /// Return immediately, no inclusion guarantee
    Async,
    /// Return once the tx passed CheckTx and entered the mempool
    Sync,
    /// Wait for the tx to be committed in a block
    Block,
}

impl BroadcastMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastMode::Async => "async",
            BroadcastMode::Sync => "sync",
            BroadcastMode::Block => "block",
        }
    }
}

impl fmt::Display for BroadcastMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BroadcastMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "async" => Ok(BroadcastMode::Async),
            "sync" => Ok(BroadcastMode::Sync),
            "block" | "commit" => Ok(BroadcastMode::Block),
            other => Err(format!(
                "invalid broadcast mode {:?} (expected async, sync or block)",
                other
            )),
        }
    }
}

/// What the node reported for a submitted or queried transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResult {
    pub tx_hash: TxHash,
    /// 0 means accepted/success
    pub code: u32,
    #[serde(default)]
    pub codespace: String,
    pub raw_log: String,
    /// Block height, when the node reported inclusion
    pub height: Option<u64>,
    #[serde(default)]
    pub gas_wanted: u64,
    #[serde(default)]
    pub gas_used: u64,
}

impl BroadcastResult {
    pub fn new(tx_hash: TxHash, code: u32, raw_log: impl Into<String>) -> Self {
        Self {
            tx_hash,
            code,
            codespace: String::new(),
            raw_log: raw_log.into(),
            height: None,
            gas_wanted: 0,
            gas_used: 0,
        }
    }

    pub fn with_height(mut self, height: u64) -> Self {
        self.height = Some(height);
        self
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Error reported by the node or the transport to it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct NodeError {
    pub message: String,
    /// Partial response the node sent alongside the error, if any
    pub response: Option<Box<BroadcastResult>>,
}

impl NodeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            response: None,
        }
    }

    pub fn with_response(mut self, response: BroadcastResult) -> Self {
        self.response = Some(Box::new(response));
        self
    }

    pub fn kind(&self) -> NodeErrorKind {
        classify(&self.message)
    }
}

/// Known node error shapes; everything else is `Other` and treated as fatal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeErrorKind {
    /// `broadcast_tx_commit` gave up waiting; the tx may still commit
    CommitTimeout,
    /// The tx is not indexed (yet)
    TxNotFound,
    Other,
}

/// Classify a node error message by its fixed suffix
pub fn classify(message: &str) -> NodeErrorKind {
    if message.ends_with(TIMEOUT_ERROR_MESSAGE) {
        NodeErrorKind::CommitTimeout
    } else if message.ends_with(NOT_FOUND_ERROR_SUFFIX) {
        NodeErrorKind::TxNotFound
    } else {
        NodeErrorKind::Other
    }
}

/// Account state needed to sign for an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub account_number: u64,
    pub sequence: u64,
}

/// Node RPC calls used by the pipeline
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Dry-run encoded tx bytes, returning the gas used
    async fn simulate(&self, tx_bytes: &[u8]) -> Result<u64, NodeError>;

    /// Submit encoded tx bytes under the given acknowledgement mode
    async fn broadcast(
        &self,
        tx_bytes: &[u8],
        mode: BroadcastMode,
    ) -> Result<BroadcastResult, NodeError>;

    /// Look up a committed tx by hash
    async fn query_tx(&self, hash: &TxHash) -> Result<BroadcastResult, NodeError>;
}

/// Account number and sequence lookup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountRetriever: Send + Sync {
    async fn account(&self, address: &str) -> Result<AccountInfo, NodeError>;
}
