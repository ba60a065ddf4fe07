//! Fee factory: turns raw gas/fee inputs into the immutable `FeeConfig`

use super::keyring::Keyring;
use crate::deployment::DecCoin;
use crate::error::{PipelineError, PipelineResult};
use crate::node::AccountRetriever;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Gas limit policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GasSetting {
    /// Simulate the transaction and scale the estimate by the adjustment
    Auto,
    /// Use exactly this many gas units
    Fixed(u64),
}

impl GasSetting {
    pub fn is_auto(&self) -> bool {
        matches!(self, GasSetting::Auto)
    }
}

impl FromStr for GasSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "auto" {
            return Ok(GasSetting::Auto);
        }
        match s.parse::<u64>() {
            Ok(gas) if gas > 0 => Ok(GasSetting::Fixed(gas)),
            Ok(_) => Err("gas limit must be positive".to_string()),
            Err(_) => Err(format!(
                "invalid gas setting {:?}: expected \"auto\" or a positive integer",
                s
            )),
        }
    }
}

impl fmt::Display for GasSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GasSetting::Auto => f.write_str("auto"),
            GasSetting::Fixed(gas) => write!(f, "{}", gas),
        }
    }
}

/// Signing and fee parameters shared by every stage of one submission
#[derive(Clone)]
pub struct FeeConfig {
    pub chain_id: String,
    pub gas: GasSetting,
    /// Multiplier applied to simulated gas; ignored for a fixed limit
    pub gas_adjustment: f64,
    /// `None` means no fee is attached
    pub gas_prices: Option<DecCoin>,
    pub key_name: String,
    pub fee_granter: Option<String>,
    pub memo: String,
    pub timeout_height: u64,
    pub accounts: Arc<dyn AccountRetriever>,
    pub keyring: Arc<dyn Keyring>,
}

impl fmt::Debug for FeeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeeConfig")
            .field("chain_id", &self.chain_id)
            .field("gas", &self.gas)
            .field("gas_adjustment", &self.gas_adjustment)
            .field("gas_prices", &self.gas_prices)
            .field("key_name", &self.key_name)
            .field("fee_granter", &self.fee_granter)
            .field("memo", &self.memo)
            .field("timeout_height", &self.timeout_height)
            .finish_non_exhaustive()
    }
}

/// Builder collecting raw configuration inputs for a `FeeConfig`
pub struct FeeFactory {
    chain_id: String,
    gas: String,
    gas_adjustment: String,
    gas_prices: String,
    key_name: String,
    fee_granter: Option<String>,
    memo: String,
    timeout_height: u64,
    accounts: Option<Arc<dyn AccountRetriever>>,
    keyring: Option<Arc<dyn Keyring>>,
}

impl FeeFactory {
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            gas: "auto".to_string(),
            gas_adjustment: "1.0".to_string(),
            gas_prices: String::new(),
            key_name: String::new(),
            fee_granter: None,
            memo: String::new(),
            timeout_height: 0,
            accounts: None,
            keyring: None,
        }
    }

    pub fn gas(mut self, gas: impl Into<String>) -> Self {
        self.gas = gas.into();
        self
    }

    pub fn gas_adjustment(mut self, adjustment: impl Into<String>) -> Self {
        self.gas_adjustment = adjustment.into();
        self
    }

    pub fn gas_prices(mut self, prices: impl Into<String>) -> Self {
        self.gas_prices = prices.into();
        self
    }

    pub fn key_name(mut self, name: impl Into<String>) -> Self {
        self.key_name = name.into();
        self
    }

    pub fn fee_granter(mut self, granter: Option<String>) -> Self {
        self.fee_granter = granter.filter(|g| !g.is_empty());
        self
    }

    pub fn memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn timeout_height(mut self, height: u64) -> Self {
        self.timeout_height = height;
        self
    }

    pub fn accounts(mut self, accounts: Arc<dyn AccountRetriever>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn keyring(mut self, keyring: Arc<dyn Keyring>) -> Self {
        self.keyring = Some(keyring);
        self
    }

    /// Validate the raw inputs; no network access happens here
    pub fn build(self) -> PipelineResult<FeeConfig> {
        if self.chain_id.trim().is_empty() {
            return Err(PipelineError::Config("chain id is empty".to_string()));
        }

        let gas = self.gas.parse::<GasSetting>().map_err(PipelineError::Config)?;

        let gas_adjustment = self
            .gas_adjustment
            .trim()
            .parse::<f64>()
            .map_err(|e| {
                PipelineError::Config(format!(
                    "invalid gas adjustment {:?}: {}",
                    self.gas_adjustment, e
                ))
            })?;
        if !gas_adjustment.is_finite() || gas_adjustment < 0.0 {
            return Err(PipelineError::Config(format!(
                "gas adjustment must be a non-negative number, got {}",
                self.gas_adjustment
            )));
        }

        let gas_prices = if self.gas_prices.trim().is_empty() {
            None
        } else {
            Some(
                self.gas_prices
                    .parse::<DecCoin>()
                    .map_err(|e| PipelineError::Config(format!("gas prices: {}", e)))?,
            )
        };

        if self.key_name.trim().is_empty() {
            return Err(PipelineError::Config("signing key name is empty".to_string()));
        }

        let accounts = self
            .accounts
            .ok_or_else(|| PipelineError::Config("no account retriever configured".to_string()))?;
        let keyring = self
            .keyring
            .ok_or_else(|| PipelineError::Config("no keyring configured".to_string()))?;

        Ok(FeeConfig {
            chain_id: self.chain_id,
            gas,
            gas_adjustment,
            gas_prices,
            key_name: self.key_name,
            fee_granter: self.fee_granter,
            memo: self.memo,
            timeout_height: self.timeout_height,
            accounts,
            keyring,
        })
    }
}
