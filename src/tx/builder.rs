//! Transaction assembly: validated messages plus fee metadata

use super::fee::FeeConfig;
use crate::deployment::{Coin, Message};
use crate::error::{PipelineError, PipelineResult};
use crate::node::AccountInfo;

use serde::{Deserialize, Serialize};

/// Fee attached to a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub amount: Vec<Coin>,
    pub gas_limit: u64,
    pub granter: Option<String>,
}

/// Transaction envelope before signing
///
/// Messages can only be appended; fee and account data are fixed at assembly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnsignedTx {
    chain_id: String,
    account_number: u64,
    sequence: u64,
    messages: Vec<Message>,
    memo: String,
    timeout_height: u64,
    fee: Fee,
}

impl UnsignedTx {
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn account_number(&self) -> u64 {
        self.account_number
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn memo(&self) -> &str {
        &self.memo
    }

    pub fn timeout_height(&self) -> u64 {
        self.timeout_height
    }

    pub fn fee(&self) -> &Fee {
        &self.fee
    }

    /// Set the account paying fees on the signer's behalf
    pub(crate) fn with_fee_granter(mut self, granter: Option<String>) -> Self {
        if granter.is_some() {
            self.fee.granter = granter;
        }
        self
    }

    /// Human readable rendering shown to the operator
    pub fn to_json(&self) -> PipelineResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| PipelineError::Encoding(e.to_string()))
    }
}

/// Builds `UnsignedTx` values from messages and a `FeeConfig`
pub struct TxAssembler<'a> {
    fee: &'a FeeConfig,
}

impl<'a> TxAssembler<'a> {
    pub fn new(fee: &'a FeeConfig) -> Self {
        Self { fee }
    }

    /// Local structural checks; fails on the first invalid message
    pub fn validate(messages: &[Message]) -> PipelineResult<()> {
        if messages.is_empty() {
            return Err(PipelineError::Validation {
                index: 0,
                message: "transaction has no messages".to_string(),
            });
        }
        for (index, msg) in messages.iter().enumerate() {
            validate_message(index, msg)?;
            check_signer(index, msg, messages.first())?;
        }
        Ok(())
    }

    /// Assemble an unsigned transaction with the resolved gas limit
    pub fn assemble(
        &self,
        messages: Vec<Message>,
        gas_limit: u64,
        account: AccountInfo,
    ) -> PipelineResult<UnsignedTx> {
        Self::validate(&messages)?;

        let amount = match &self.fee.gas_prices {
            Some(price) if !price.is_zero() => vec![price.cost_of(gas_limit)],
            _ => Vec::new(),
        };

        Ok(UnsignedTx {
            chain_id: self.fee.chain_id.clone(),
            account_number: account.account_number,
            sequence: account.sequence,
            messages,
            memo: self.fee.memo.clone(),
            timeout_height: self.fee.timeout_height,
            fee: Fee {
                amount,
                gas_limit,
                granter: None,
            },
        })
    }
}

fn validate_message(index: usize, msg: &Message) -> PipelineResult<()> {
    msg.validate_basic()
        .map_err(|e| PipelineError::Validation {
            index,
            message: format!("{}: {}", msg.type_url(), e),
        })
}

/// Only single-signature transactions are built
fn check_signer(index: usize, msg: &Message, first: Option<&Message>) -> PipelineResult<()> {
    match first {
        Some(first) if first.signer() != msg.signer() => Err(PipelineError::Validation {
            index,
            message: format!(
                "{}: signer {} differs from transaction signer {}",
                msg.type_url(),
                msg.signer(),
                first.signer()
            ),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::tests::{create_msg, OWNER};
    use crate::deployment::{DeploymentId, MsgCloseDeployment};
    use crate::node::MockAccountRetriever;
    use crate::tx::fee::FeeFactory;
    use crate::tx::keyring::MemoryKeyring;
    use std::sync::Arc;

    fn fee_config(prices: &str) -> FeeConfig {
        FeeFactory::new("akashnet-2")
            .gas("200000")
            .gas_prices(prices)
            .key_name("deploy")
            .memo("eve")
            .accounts(Arc::new(MockAccountRetriever::new()))
            .keyring(Arc::new(MemoryKeyring::new()))
            .build()
            .unwrap()
    }

    const ACCOUNT: AccountInfo = AccountInfo {
        account_number: 7,
        sequence: 3,
    };

    #[test]
    fn test_assemble_computes_fee() {
        let cfg = fee_config("0.025uakt");
        let tx = TxAssembler::new(&cfg)
            .assemble(vec![create_msg().into()], 200_000, ACCOUNT)
            .unwrap();

        assert_eq!(tx.chain_id(), "akashnet-2");
        assert_eq!(tx.account_number(), 7);
        assert_eq!(tx.sequence(), 3);
        assert_eq!(tx.memo(), "eve");
        assert_eq!(tx.fee().gas_limit, 200_000);
        assert_eq!(tx.fee().amount, vec![Coin::new(5_000, "uakt")]);
        assert_eq!(tx.fee().granter, None);
    }

    #[test]
    fn test_assemble_without_prices_has_no_fee_amount() {
        let cfg = fee_config("");
        let tx = TxAssembler::new(&cfg)
            .assemble(vec![create_msg().into()], 100_000, ACCOUNT)
            .unwrap();
        assert!(tx.fee().amount.is_empty());
    }

    #[test]
    fn test_validation_names_first_invalid_message() {
        let cfg = fee_config("0.025uakt");
        let mut bad = create_msg();
        bad.groups.clear();
        let messages = vec![
            create_msg().into(),
            bad.into(),
            MsgCloseDeployment {
                id: DeploymentId::new(OWNER, 0),
            }
            .into(),
        ];

        match TxAssembler::new(&cfg).assemble(messages, 1, ACCOUNT) {
            Err(PipelineError::Validation { index, message }) => {
                assert_eq!(index, 1);
                assert!(message.contains("MsgCreateDeployment"));
                assert!(message.contains("no groups"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_empty_and_mixed_signers() {
        assert!(TxAssembler::validate(&[]).is_err());

        let mut other = create_msg();
        other.id.owner = "akash1qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqq".to_string();
        other.depositor = other.id.owner.clone();
        let err = TxAssembler::validate(&[create_msg().into(), other.into()]).unwrap_err();
        assert!(matches!(err, PipelineError::Validation { index: 1, .. }));
    }

    #[test]
    fn test_json_preview() {
        let cfg = fee_config("0.025uakt");
        let tx = TxAssembler::new(&cfg)
            .assemble(vec![create_msg().into()], 200_000, ACCOUNT)
            .unwrap();
        let json = tx.to_json().unwrap();
        assert!(json.contains("/akash.deployment.v1beta2.MsgCreateDeployment"));
        assert!(json.contains("\"5000uakt\""));
    }
}
