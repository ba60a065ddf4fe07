//! Attaches the single signature that turns an `UnsignedTx` into a `SignedTx`

use super::builder::{Fee, UnsignedTx};
use super::codec;
use super::keyring::Keyring;
use crate::deployment::Message;
use crate::error::{PipelineError, PipelineResult};

use serde::Serialize;
use tracing::debug;

/// Signed transaction; no mutators, so messages and fee are frozen
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignedTx {
    tx: UnsignedTx,
    #[serde(with = "hex::serde")]
    public_key: Vec<u8>,
    #[serde(with = "hex::serde")]
    signature: Vec<u8>,
}

impl SignedTx {
    pub fn tx(&self) -> &UnsignedTx {
        &self.tx
    }

    pub fn messages(&self) -> &[Message] {
        self.tx.messages()
    }

    pub fn fee(&self) -> &Fee {
        self.tx.fee()
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }
}

/// Signs with a named key from a key source
pub struct Signer<'a> {
    keyring: &'a dyn Keyring,
}

impl<'a> Signer<'a> {
    pub fn new(keyring: &'a dyn Keyring) -> Self {
        Self { keyring }
    }

    /// Consume `tx`, apply the fee-granter override and sign the result
    pub fn sign(
        &self,
        tx: UnsignedTx,
        key_name: &str,
        fee_granter: Option<String>,
    ) -> PipelineResult<SignedTx> {
        let key = self
            .keyring
            .lookup(key_name)
            .map_err(|e| PipelineError::Signing(e.to_string()))?;

        let tx = tx.with_fee_granter(fee_granter);
        let public_key = key.public_key();
        let sign_bytes = codec::sign_bytes(&tx, &public_key)?;
        let signature = key
            .sign(&sign_bytes)
            .map_err(|e| PipelineError::Signing(e.to_string()))?;

        debug!(
            "Signed tx with key {:?} (account {}, sequence {})",
            key_name,
            tx.account_number(),
            tx.sequence()
        );

        Ok(SignedTx {
            tx,
            public_key,
            signature,
        })
    }
}
