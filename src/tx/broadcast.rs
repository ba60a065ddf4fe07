//! Encodes a signed transaction and submits it to the node

use super::codec;
use super::signer::SignedTx;
use crate::error::{PipelineError, PipelineResult};
use crate::node::{BroadcastMode, BroadcastResult, NodeClient, NodeErrorKind, TxHash};

use std::sync::Arc;
use tracing::{debug, warn};

pub struct Broadcaster {
    node: Arc<dyn NodeClient>,
}

impl Broadcaster {
    pub fn new(node: Arc<dyn NodeClient>) -> Self {
        Self { node }
    }

    /// Submit `signed` once under `mode`
    ///
    /// A non-zero result code is returned as `Ok`; the caller inspects it.
    /// In block mode a commit timeout becomes `RetryableTimeout` carrying the
    /// locally computed hash.
    pub async fn broadcast(
        &self,
        signed: &SignedTx,
        mode: BroadcastMode,
    ) -> PipelineResult<BroadcastResult> {
        let tx_bytes = codec::encode_tx(signed)?;
        let tx_hash = codec::tx_hash(&tx_bytes);
        debug!("Broadcasting tx {} ({} bytes, mode {})", tx_hash, tx_bytes.len(), mode);

        match self.node.broadcast(&tx_bytes, mode).await {
            Ok(result) => {
                if result.tx_hash != tx_hash {
                    warn!("Node reported hash {} for tx {}", result.tx_hash, tx_hash);
                }
                Ok(result)
            }
            Err(err) if mode == BroadcastMode::Block && err.kind() == NodeErrorKind::CommitTimeout => {
                warn!("Node timed out waiting for tx {} to be committed", tx_hash);
                Err(PipelineError::RetryableTimeout {
                    tx_hash,
                    last_response: err.response.map(|r| *r),
                })
            }
            Err(source) => Err(PipelineError::Broadcast { tx_hash, source }),
        }
    }

    /// Hash the node will assign to `signed`
    pub(crate) fn hash_of(signed: &SignedTx) -> PipelineResult<TxHash> {
        Ok(codec::tx_hash(&codec::encode_tx(signed)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::tests::create_msg;
    use crate::node::{
        AccountInfo, MockAccountRetriever, MockNodeClient, NodeError, TIMEOUT_ERROR_MESSAGE,
    };
    use crate::tx::builder::TxAssembler;
    use crate::tx::fee::FeeFactory;
    use crate::tx::keyring::tests::TEST_KEY;
    use crate::tx::keyring::{MemoryKeyring, Secp256k1Key};
    use crate::tx::signer::Signer;

    fn signed_tx() -> SignedTx {
        let keyring = Arc::new(MemoryKeyring::new());
        keyring.insert("deploy", Secp256k1Key::from_hex("deploy", TEST_KEY).unwrap());
        let cfg = FeeFactory::new("akashnet-2")
            .gas("100000")
            .key_name("deploy")
            .accounts(Arc::new(MockAccountRetriever::new()))
            .keyring(keyring.clone())
            .build()
            .unwrap();
        let unsigned = TxAssembler::new(&cfg)
            .assemble(
                vec![create_msg().into()],
                100_000,
                AccountInfo {
                    account_number: 1,
                    sequence: 0,
                },
            )
            .unwrap();
        Signer::new(keyring.as_ref()).sign(unsigned, "deploy", None).unwrap()
    }

    #[tokio::test]
    async fn test_non_zero_code_is_ok() {
        let signed = signed_tx();
        let hash = Broadcaster::hash_of(&signed).unwrap();

        let mut node = MockNodeClient::new();
        node.expect_broadcast()
            .times(1)
            .returning(move |bytes, _| Ok(BroadcastResult::new(codec::tx_hash(bytes), 5, "insufficient funds")));

        let result = Broadcaster::new(Arc::new(node))
            .broadcast(&signed, BroadcastMode::Sync)
            .await
            .unwrap();
        assert_eq!(result.code, 5);
        assert_eq!(result.tx_hash, hash);
    }

    #[tokio::test]
    async fn test_block_timeout_is_retryable() {
        let signed = signed_tx();
        let hash = Broadcaster::hash_of(&signed).unwrap();

        let mut node = MockNodeClient::new();
        node.expect_broadcast().times(1).returning(move |_, _| {
            Err(NodeError::new(format!("Internal error: {}", TIMEOUT_ERROR_MESSAGE))
                .with_response(BroadcastResult::new(hash, 0, "")))
        });

        let err = Broadcaster::new(Arc::new(node))
            .broadcast(&signed, BroadcastMode::Block)
            .await
            .unwrap_err();
        match err {
            PipelineError::RetryableTimeout {
                tx_hash,
                last_response,
            } => {
                assert_eq!(tx_hash, hash);
                assert_eq!(last_response.unwrap().tx_hash, hash);
            }
            other => panic!("expected retryable timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_outside_block_mode_is_fatal() {
        let signed = signed_tx();
        let hash = Broadcaster::hash_of(&signed).unwrap();

        let mut node = MockNodeClient::new();
        node.expect_broadcast()
            .times(1)
            .returning(|_, _| Err(NodeError::new(TIMEOUT_ERROR_MESSAGE)));

        let err = Broadcaster::new(Arc::new(node))
            .broadcast(&signed, BroadcastMode::Sync)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Broadcast { tx_hash, .. } if tx_hash == hash));
    }

    #[tokio::test]
    async fn test_other_errors_pass_through() {
        let mut node = MockNodeClient::new();
        node.expect_broadcast()
            .times(1)
            .returning(|_, _| Err(NodeError::new("tx already exists in cache")));

        let err = Broadcaster::new(Arc::new(node))
            .broadcast(&signed_tx(), BroadcastMode::Block)
            .await
            .unwrap_err();
        match err {
            PipelineError::Broadcast { source, .. } => {
                assert_eq!(source.message, "tx already exists in cache")
            }
            other => panic!("expected broadcast error, got {:?}", other),
        }
    }
}
