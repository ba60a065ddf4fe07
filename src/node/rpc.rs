//! Tendermint JSON-RPC client for broadcast, tx lookup and ABCI queries

use super::{AccountInfo, AccountRetriever, BroadcastMode, BroadcastResult, NodeClient, NodeError, TxHash};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// ABCI query path used to dry-run a transaction
pub const SIMULATE_PATH: &str = "/cosmos.tx.v1beta1.Service/Simulate";
/// ABCI query path used to look up account number and sequence
pub const ACCOUNT_PATH: &str = "/cosmos.auth.v1beta1.Query/Account";

/// JSON-RPC client for a single node
pub struct TendermintRpc {
    /// HTTP endpoint of the node
    url: String,
    /// Shared HTTP client
    http: reqwest::Client,
    /// Request id counter
    next_id: AtomicU64,
}

impl TendermintRpc {
    /// Create a client for `node`, accepting `tcp://` URIs as used by node configs
    pub fn new(node: &str, timeout: Duration) -> Result<Self, NodeError> {
        let url = normalize_url(node);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NodeError::new(format!("failed to build http client: {}", e)))?;

        debug!("Using node RPC endpoint {}", url);
        Ok(Self {
            url,
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, NodeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!("RPC request {} ({})", method, id);

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| NodeError::new(format!("post failed: {}", e)))?;

        let envelope: RpcResponse<R> = response
            .json()
            .await
            .map_err(|e| NodeError::new(format!("invalid RPC response for {}: {}", method, e)))?;

        if let Some(err) = envelope.error {
            return Err(NodeError::new(err.into_message()));
        }
        envelope
            .result
            .ok_or_else(|| NodeError::new(format!("empty RPC result for {}", method)))
    }

    async fn abci_query(&self, path: &str, data: &[u8]) -> Result<Vec<u8>, NodeError> {
        let result: AbciQueryResult = self
            .call(
                "abci_query",
                json!({ "path": path, "data": hex::encode_upper(data), "prove": false }),
            )
            .await?;

        let response = result.response;
        if response.code != 0 {
            return Err(NodeError::new(response.log));
        }
        match response.value {
            Some(value) => BASE64
                .decode(value)
                .map_err(|e| NodeError::new(format!("invalid abci_query value: {}", e))),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl NodeClient for TendermintRpc {
    async fn simulate(&self, tx_bytes: &[u8]) -> Result<u64, NodeError> {
        let value = self.abci_query(SIMULATE_PATH, tx_bytes).await?;
        let response: SimulateResponse = serde_json::from_slice(&value)
            .map_err(|e| NodeError::new(format!("invalid simulate response: {}", e)))?;
        Ok(response.gas_info.gas_used)
    }

    async fn broadcast(
        &self,
        tx_bytes: &[u8],
        mode: BroadcastMode,
    ) -> Result<BroadcastResult, NodeError> {
        let params = json!({ "tx": BASE64.encode(tx_bytes) });
        match mode {
            BroadcastMode::Async | BroadcastMode::Sync => {
                let method = if mode == BroadcastMode::Async {
                    "broadcast_tx_async"
                } else {
                    "broadcast_tx_sync"
                };
                let res: CheckTxResult = self.call(method, params).await?;
                Ok(res.into_result())
            }
            BroadcastMode::Block => {
                let res: CommitResult = self.call("broadcast_tx_commit", params).await?;
                Ok(res.into_result())
            }
        }
    }

    async fn query_tx(&self, hash: &TxHash) -> Result<BroadcastResult, NodeError> {
        let res: TxQueryResult = self
            .call(
                "tx",
                json!({ "hash": BASE64.encode(hash.as_bytes()), "prove": false }),
            )
            .await?;
        Ok(res.into_result())
    }
}

#[async_trait]
impl AccountRetriever for TendermintRpc {
    async fn account(&self, address: &str) -> Result<AccountInfo, NodeError> {
        let request = serde_json::to_vec(&json!({ "address": address }))
            .map_err(|e| NodeError::new(e.to_string()))?;
        let value = self.abci_query(ACCOUNT_PATH, &request).await?;
        let response: AccountResponse = serde_json::from_slice(&value)
            .map_err(|e| NodeError::new(format!("invalid account response: {}", e)))?;
        Ok(AccountInfo {
            account_number: response.account.account_number,
            sequence: response.account.sequence,
        })
    }
}

/// Node configs historically carry `tcp://host:port`; the RPC speaks HTTP
fn normalize_url(node: &str) -> String {
    let node = node.trim().trim_end_matches('/');
    match node.strip_prefix("tcp://") {
        Some(rest) => format!("http://{}", rest),
        None if node.starts_with("http://") || node.starts_with("https://") => node.to_string(),
        None => format!("http://{}", node),
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<String>,
}

impl RpcError {
    /// The node puts the interesting text in `data`; `message` is generic
    fn into_message(self) -> String {
        match self.data {
            Some(data) if !data.is_empty() => format!("{}: {}", self.message, data),
            _ => format!("RPC error {}: {}", self.code, self.message),
        }
    }
}

/// Numbers the node encodes as JSON strings
mod strnum {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Num(u64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        match StrOrNum::deserialize(d)? {
            StrOrNum::Num(n) => Ok(n),
            StrOrNum::Str(s) if s.is_empty() => Ok(0),
            StrOrNum::Str(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ExecResult {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    codespace: String,
    #[serde(default)]
    log: String,
    #[serde(default, with = "strnum")]
    gas_wanted: u64,
    #[serde(default, with = "strnum")]
    gas_used: u64,
}

#[derive(Debug, Deserialize)]
struct CheckTxResult {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    codespace: String,
    #[serde(default)]
    log: String,
    hash: TxHash,
}

impl CheckTxResult {
    fn into_result(self) -> BroadcastResult {
        let mut result = BroadcastResult::new(self.hash, self.code, self.log);
        result.codespace = self.codespace;
        result
    }
}

#[derive(Debug, Deserialize)]
struct CommitResult {
    #[serde(default)]
    check_tx: ExecResult,
    #[serde(default)]
    deliver_tx: ExecResult,
    hash: TxHash,
    #[serde(default, with = "strnum")]
    height: u64,
}

impl CommitResult {
    /// A CheckTx failure never reaches DeliverTx, so it wins
    fn into_result(self) -> BroadcastResult {
        let exec = if self.check_tx.code != 0 {
            self.check_tx
        } else {
            self.deliver_tx
        };
        let mut result = BroadcastResult::new(self.hash, exec.code, exec.log);
        result.codespace = exec.codespace;
        result.gas_wanted = exec.gas_wanted;
        result.gas_used = exec.gas_used;
        if self.height > 0 {
            result.height = Some(self.height);
        }
        result
    }
}

#[derive(Debug, Deserialize)]
struct TxQueryResult {
    hash: TxHash,
    #[serde(with = "strnum")]
    height: u64,
    #[serde(default)]
    tx_result: ExecResult,
}

impl TxQueryResult {
    fn into_result(self) -> BroadcastResult {
        let mut result =
            BroadcastResult::new(self.hash, self.tx_result.code, self.tx_result.log)
                .with_height(self.height);
        result.codespace = self.tx_result.codespace;
        result.gas_wanted = self.tx_result.gas_wanted;
        result.gas_used = self.tx_result.gas_used;
        result
    }
}

#[derive(Debug, Deserialize)]
struct AbciQueryResult {
    response: AbciResponse,
}

#[derive(Debug, Deserialize)]
struct AbciResponse {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    log: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SimulateResponse {
    gas_info: GasInfo,
}

#[derive(Debug, Deserialize)]
struct GasInfo {
    #[serde(with = "strnum")]
    gas_used: u64,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    account: AccountFields,
}

#[derive(Debug, Deserialize)]
struct AccountFields {
    #[serde(with = "strnum")]
    account_number: u64,
    #[serde(with = "strnum")]
    sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{classify, NodeErrorKind};

    const HASH: &str = "5A3F9C0E2B7D4A18F6E1C3B2A9D8E7F60123456789ABCDEF0123456789ABCDEF";

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("tcp://localhost:26657"), "http://localhost:26657");
        assert_eq!(normalize_url("https://rpc.example.com/"), "https://rpc.example.com");
        assert_eq!(normalize_url("rpc.example.com:26657"), "http://rpc.example.com:26657");
    }

    #[test]
    fn test_timeout_error_keeps_suffix() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32603,"message":"Internal error","data":"timed out waiting for tx to be included in a block"}}"#;
        let envelope: RpcResponse<Value> = serde_json::from_str(raw).unwrap();
        let message = envelope.error.unwrap().into_message();
        assert_eq!(classify(&message), NodeErrorKind::CommitTimeout);
    }

    #[test]
    fn test_not_found_error_keeps_suffix() {
        let raw = format!(
            r#"{{"jsonrpc":"2.0","id":2,"error":{{"code":-32603,"message":"Internal error","data":"tx ({}) not found"}}}}"#,
            HASH
        );
        let envelope: RpcResponse<Value> = serde_json::from_str(&raw).unwrap();
        let message = envelope.error.unwrap().into_message();
        assert_eq!(classify(&message), NodeErrorKind::TxNotFound);
    }

    #[test]
    fn test_commit_result_prefers_check_tx_failure() {
        let raw = format!(
            r#"{{"check_tx":{{"code":5,"log":"insufficient funds","codespace":"sdk"}},"deliver_tx":{{}},"hash":"{}","height":"0"}}"#,
            HASH
        );
        let res: CommitResult = serde_json::from_str(&raw).unwrap();
        let result = res.into_result();
        assert_eq!(result.code, 5);
        assert_eq!(result.raw_log, "insufficient funds");
        assert_eq!(result.height, None);
    }

    #[test]
    fn test_commit_result_included() {
        let raw = format!(
            r#"{{"check_tx":{{"code":0}},"deliver_tx":{{"code":0,"log":"[]","gas_wanted":"150000","gas_used":"98000"}},"hash":"{}","height":"1234"}}"#,
            HASH
        );
        let res: CommitResult = serde_json::from_str(&raw).unwrap();
        let result = res.into_result();
        assert!(result.is_success());
        assert_eq!(result.height, Some(1234));
        assert_eq!(result.gas_used, 98_000);
        assert_eq!(result.tx_hash.to_string(), HASH);
    }

    #[test]
    fn test_tx_query_result() {
        let raw = format!(
            r#"{{"hash":"{}","height":"77","index":0,"tx_result":{{"code":11,"log":"out of gas"}},"tx":"AA=="}}"#,
            HASH
        );
        let res: TxQueryResult = serde_json::from_str(&raw).unwrap();
        let result = res.into_result();
        assert_eq!(result.code, 11);
        assert_eq!(result.height, Some(77));
    }
}
