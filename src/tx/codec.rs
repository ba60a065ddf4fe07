//! Wire encoding, sign bytes and transaction hashing
//!
//! A transaction travels as `TxRaw`: the encoded body, the encoded auth info
//! and the signatures. Signers commit to `SignDoc`, which binds body and
//! auth info to the chain id and account number.

use super::builder::{Fee, UnsignedTx};
use super::signer::SignedTx;
use crate::deployment::Message;
use crate::error::{PipelineError, PipelineResult};
use crate::node::TxHash;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TxBody {
    messages: Vec<Message>,
    memo: String,
    timeout_height: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SignerInfo {
    public_key: Vec<u8>,
    sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AuthInfo {
    signer_infos: Vec<SignerInfo>,
    fee: Fee,
}

/// Raw transaction as submitted to the node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxRaw {
    pub body_bytes: Vec<u8>,
    pub auth_info_bytes: Vec<u8>,
    pub signatures: Vec<Vec<u8>>,
}

#[derive(Serialize)]
struct SignDoc<'a> {
    body_bytes: &'a [u8],
    auth_info_bytes: &'a [u8],
    chain_id: &'a str,
    account_number: u64,
}

/// Transaction recovered from wire bytes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedTx {
    pub messages: Vec<Message>,
    pub memo: String,
    pub timeout_height: u64,
    pub fee: Fee,
    #[serde(with = "hex::serde")]
    pub public_key: Vec<u8>,
    pub sequence: u64,
    #[serde(serialize_with = "hex_list")]
    pub signatures: Vec<Vec<u8>>,
}

fn hex_list<S: serde::Serializer>(items: &[Vec<u8>], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(items.iter().map(hex::encode))
}

fn encode<T: Serialize>(value: &T) -> PipelineResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| PipelineError::Encoding(e.to_string()))
}

fn body_bytes(tx: &UnsignedTx) -> PipelineResult<Vec<u8>> {
    encode(&TxBody {
        messages: tx.messages().to_vec(),
        memo: tx.memo().to_string(),
        timeout_height: tx.timeout_height(),
    })
}

fn auth_info_bytes(tx: &UnsignedTx, public_key: &[u8]) -> PipelineResult<Vec<u8>> {
    encode(&AuthInfo {
        signer_infos: vec![SignerInfo {
            public_key: public_key.to_vec(),
            sequence: tx.sequence(),
        }],
        fee: tx.fee().clone(),
    })
}

/// Canonical bytes a signer commits to
pub fn sign_bytes(tx: &UnsignedTx, public_key: &[u8]) -> PipelineResult<Vec<u8>> {
    let body = body_bytes(tx)?;
    let auth_info = auth_info_bytes(tx, public_key)?;
    encode(&SignDoc {
        body_bytes: &body,
        auth_info_bytes: &auth_info,
        chain_id: tx.chain_id(),
        account_number: tx.account_number(),
    })
}

/// Wire bytes of a signed transaction
pub fn encode_tx(signed: &SignedTx) -> PipelineResult<Vec<u8>> {
    let tx = signed.tx();
    encode(&TxRaw {
        body_bytes: body_bytes(tx)?,
        auth_info_bytes: auth_info_bytes(tx, signed.public_key())?,
        signatures: vec![signed.signature().to_vec()],
    })
}

/// Wire bytes for a dry run: no public key and an empty signature
pub fn encode_for_simulation(tx: &UnsignedTx) -> PipelineResult<Vec<u8>> {
    encode(&TxRaw {
        body_bytes: body_bytes(tx)?,
        auth_info_bytes: auth_info_bytes(tx, &[])?,
        signatures: vec![Vec::new()],
    })
}

/// Decode wire bytes back into messages, fee and signer data
pub fn decode_tx(bytes: &[u8]) -> PipelineResult<DecodedTx> {
    let decode_err = |e: bincode::Error| PipelineError::Encoding(format!("decode: {}", e));

    let raw: TxRaw = bincode::deserialize(bytes).map_err(decode_err)?;
    let body: TxBody = bincode::deserialize(&raw.body_bytes).map_err(decode_err)?;
    let auth_info: AuthInfo = bincode::deserialize(&raw.auth_info_bytes).map_err(decode_err)?;

    let signer = auth_info
        .signer_infos
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::Encoding("decode: no signer info".to_string()))?;

    Ok(DecodedTx {
        messages: body.messages,
        memo: body.memo,
        timeout_height: body.timeout_height,
        fee: auth_info.fee,
        public_key: signer.public_key,
        sequence: signer.sequence,
        signatures: raw.signatures,
    })
}

/// Hash the node uses to identify the transaction
pub fn tx_hash(tx_bytes: &[u8]) -> TxHash {
    TxHash::new(Sha256::digest(tx_bytes).into())
}
