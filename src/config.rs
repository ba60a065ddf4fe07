//! Configuration management for eve
//!
//! Loads configuration from a TOML file with environment variable
//! substitution, then applies the `AKASH_*` environment overrides.

use crate::deployment::Coin;
use crate::node::{AccountRetriever, BroadcastMode};
use crate::tx::{FeeFactory, Keyring, MemoryKeyring};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default location of the config file, relative to the project directory
pub const DEFAULT_CONFIG_PATH: &str = ".eve/config.toml";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub client: ClientConfig,
    pub fees: FeesConfig,
    pub keyring: KeyringConfig,
    pub poll: PollConfig,
    pub deployment: DeploymentConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Node RPC endpoint; `tcp://` is accepted and spoken as HTTP
    pub node: String,
    pub chain_id: String,
    pub broadcast_mode: BroadcastMode,
    /// Name of the signing key
    pub from: String,
    /// Account owning deployments; must match the signing key
    pub owner: Option<String>,
    pub skip_confirm: bool,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeesConfig {
    /// `auto` or a positive integer
    #[serde(deserialize_with = "string_or_number")]
    pub gas: String,
    #[serde(deserialize_with = "string_or_number")]
    pub gas_adjustment: String,
    pub gas_prices: String,
    pub fee_granter: Option<String>,
    pub memo: String,
    pub timeout_height: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum KeyringBackend {
    /// Unencrypted `<name>.key` files in `dir`
    Test,
    /// `EVE_KEY_<NAME>` environment variables
    Env,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeyringConfig {
    pub backend: KeyringBackend,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub deadline_secs: u64,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    pub deposit: Coin,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            node: "http://localhost:26657".to_string(),
            chain_id: "akashnet-2".to_string(),
            broadcast_mode: BroadcastMode::Block,
            from: "deploy".to_string(),
            owner: None,
            skip_confirm: false,
            request_timeout_secs: 30,
        }
    }
}

impl Default for FeesConfig {
    fn default() -> Self {
        Self {
            gas: "auto".to_string(),
            gas_adjustment: "1.5".to_string(),
            gas_prices: "0.025uakt".to_string(),
            fee_granter: None,
            memo: String::new(),
            timeout_height: 0,
        }
    }
}

impl Default for KeyringConfig {
    fn default() -> Self {
        let home = env::var("HOME").map(PathBuf::from).unwrap_or_default();
        Self {
            backend: KeyringBackend::Test,
            dir: home.join(".akash"),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            deadline_secs: 300,
            interval_secs: 1,
        }
    }
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            deposit: Coin::new(5_000_000, "uakt"),
        }
    }
}

impl Settings {
    /// Load settings from `EVE_CONFIG` or the default path
    ///
    /// Not validated; callers apply their own overrides first.
    pub fn load() -> Result<Self> {
        let config_path = env::var("EVE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        Self::load_from(&config_path, |name| env::var(name).ok())
    }

    /// Read `path` and apply the `AKASH_*` overrides found through `lookup`
    pub fn load_from(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::from_file(path)?;
        settings.apply_overrides(lookup)?;
        Ok(settings)
    }

    /// Parse a config file; a missing file yields the defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        toml::from_str(&config_str).with_context(|| "Failed to parse configuration")
    }

    /// Apply the `AKASH_*` overrides using `lookup` to read variables
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(node) = lookup("AKASH_NODE") {
            self.client.node = node;
        }
        if let Some(chain_id) = lookup("AKASH_CHAIN_ID") {
            self.client.chain_id = chain_id;
        }
        if let Some(mode) = lookup("AKASH_BROADCAST_MODE") {
            self.client.broadcast_mode = mode
                .parse()
                .map_err(|e: String| anyhow::anyhow!("AKASH_BROADCAST_MODE: {}", e))?;
        }
        if let Some(from) = lookup("AKASH_FROM") {
            self.client.from = from;
        }
        if let Some(owner) = lookup("AKASH_OWNER") {
            self.client.owner = Some(owner);
        }
        if let Some(yes) = lookup("AKASH_YES") {
            self.client.skip_confirm = parse_bool(&yes)
                .with_context(|| format!("AKASH_YES: invalid boolean {:?}", yes))?;
        }
        if let Some(gas) = lookup("AKASH_GAS") {
            self.fees.gas = gas;
        }
        if let Some(adjustment) = lookup("AKASH_GAS_ADJUSTMENT") {
            self.fees.gas_adjustment = adjustment;
        }
        if let Some(prices) = lookup("AKASH_GAS_PRICES") {
            self.fees.gas_prices = prices;
        }
        Ok(())
    }

    /// Validate configuration
    ///
    /// Gas strings are checked later by `FeeFactory`.
    pub fn validate(&self) -> Result<()> {
        if self.client.chain_id.trim().is_empty() {
            anyhow::bail!("Chain id must not be empty");
        }
        if self.client.node.trim().is_empty() {
            anyhow::bail!("Node URL must not be empty");
        }
        if self.poll.interval_secs == 0 {
            anyhow::bail!("Poll interval must be positive");
        }
        if self.poll.interval_secs > self.poll.deadline_secs {
            anyhow::bail!(
                "Poll interval ({}s) exceeds poll deadline ({}s)",
                self.poll.interval_secs,
                self.poll.deadline_secs
            );
        }
        if !self.deployment.deposit.is_positive() {
            anyhow::bail!("Default deposit must be positive");
        }
        if let Some(owner) = &self.client.owner {
            crate::deployment::validate_address(owner)
                .map_err(|e| anyhow::anyhow!("Invalid owner address: {}", e))?;
        }
        Ok(())
    }

    pub fn poll_deadline(&self) -> Duration {
        Duration::from_secs(self.poll.deadline_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.client.request_timeout_secs)
    }

    /// Open the configured key source
    pub fn open_keyring(&self) -> Result<MemoryKeyring> {
        let keyring = match self.keyring.backend {
            KeyringBackend::Test => MemoryKeyring::load_dir(&self.keyring.dir)
                .with_context(|| format!("Failed to load keyring from {:?}", self.keyring.dir))?,
            KeyringBackend::Env => {
                MemoryKeyring::load_env().context("Failed to load keys from environment")?
            }
        };
        Ok(keyring)
    }

    /// Raw fee inputs for this configuration; `build()` validates them
    pub fn fee_factory(
        &self,
        accounts: Arc<dyn AccountRetriever>,
        keyring: Arc<dyn Keyring>,
    ) -> FeeFactory {
        FeeFactory::new(self.client.chain_id.clone())
            .gas(self.fees.gas.clone())
            .gas_adjustment(self.fees.gas_adjustment.clone())
            .gas_prices(self.fees.gas_prices.clone())
            .key_name(self.client.from.clone())
            .fee_granter(self.fees.fee_granter.clone())
            .memo(self.fees.memo.clone())
            .timeout_height(self.fees.timeout_height)
            .accounts(accounts)
            .keyring(keyring)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Some(true),
        "0" | "false" | "no" | "n" | "" => Some(false),
        _ => None,
    }
}

/// Accept `gas = 200000` as well as `gas = "200000"`
fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(d)? {
        Raw::Str(s) => s,
        Raw::Int(i) => i.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR: regex::Regex = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
    }

    let mut result = input.to_string();
    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
