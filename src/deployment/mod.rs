//! Deployment messages carried inside transactions
//!
//! Messages are built by the caller with every value already resolved
//! (owner, sequence number, manifest version) and are checked with
//! `validate_basic` before they are placed in a transaction.

mod coin;

pub use coin::{validate_denom, Coin, DecCoin, DEC_PRECISION};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Length of a manifest version hash
pub const VERSION_LEN: usize = 32;

lazy_static! {
    // bech32: human readable part, separator, data in the bech32 charset
    static ref ADDRESS: Regex = Regex::new(r"^[a-z]{1,83}1[02-9ac-hj-np-z]{38,58}$").unwrap();
}

/// Check that an account address is a well-formed bech32 string
pub fn validate_address(address: &str) -> Result<(), String> {
    if ADDRESS.is_match(address) {
        Ok(())
    } else {
        Err(format!("invalid address: {:?}", address))
    }
}

/// Identifies a deployment: owner account plus caller-chosen sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentId {
    pub owner: String,
    pub dseq: u64,
}

impl DeploymentId {
    pub fn new(owner: impl Into<String>, dseq: u64) -> Self {
        Self {
            owner: owner.into(),
            dseq,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_address(&self.owner).map_err(|e| format!("deployment owner: {}", e))?;
        if self.dseq == 0 {
            return Err("deployment sequence must be non-zero".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

/// Compute, memory and storage requested for `count` replicas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUnit {
    pub cpu_millis: u32,
    pub memory_bytes: u64,
    pub storage_bytes: u64,
    pub count: u32,
    pub price: DecCoin,
}

/// One placement group of a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    pub resources: Vec<ResourceUnit>,
}

impl GroupSpec {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("group name is empty".to_string());
        }
        if self.resources.is_empty() {
            return Err(format!("group {:?} has no resources", self.name));
        }
        for (i, unit) in self.resources.iter().enumerate() {
            if unit.count == 0 {
                return Err(format!("group {:?} resource {}: zero count", self.name, i));
            }
            if unit.cpu_millis == 0 || unit.memory_bytes == 0 || unit.storage_bytes == 0 {
                return Err(format!(
                    "group {:?} resource {}: cpu, memory and storage must be non-zero",
                    self.name, i
                ));
            }
            validate_denom(&unit.price.denom)
                .map_err(|e| format!("group {:?} resource {} price: {}", self.name, i, e))?;
        }
        for attr in &self.attributes {
            if attr.key.is_empty() {
                return Err(format!("group {:?} has an attribute with empty key", self.name));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCreateDeployment {
    pub id: DeploymentId,
    pub groups: Vec<GroupSpec>,
    #[serde(with = "hex::serde")]
    pub version: Vec<u8>,
    pub deposit: Coin,
    pub depositor: String,
}

impl MsgCreateDeployment {
    pub fn validate_basic(&self) -> Result<(), String> {
        self.id.validate()?;
        if self.groups.is_empty() {
            return Err("deployment has no groups".to_string());
        }
        let mut names = HashSet::new();
        for group in &self.groups {
            group.validate()?;
            if !names.insert(group.name.as_str()) {
                return Err(format!("duplicate group name {:?}", group.name));
            }
        }
        validate_version(&self.version)?;
        self.deposit
            .validate()
            .map_err(|e| format!("deposit: {}", e))?;
        if !self.deposit.is_positive() {
            return Err(format!("deposit must be positive, got {}", self.deposit));
        }
        validate_address(&self.depositor).map_err(|e| format!("depositor: {}", e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUpdateDeployment {
    pub id: DeploymentId,
    #[serde(with = "hex::serde")]
    pub version: Vec<u8>,
}

impl MsgUpdateDeployment {
    pub fn validate_basic(&self) -> Result<(), String> {
        self.id.validate()?;
        validate_version(&self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgCloseDeployment {
    pub id: DeploymentId,
}

impl MsgCloseDeployment {
    pub fn validate_basic(&self) -> Result<(), String> {
        self.id.validate()
    }
}

fn validate_version(version: &[u8]) -> Result<(), String> {
    if version.len() != VERSION_LEN {
        return Err(format!(
            "deployment version must be {} bytes, got {}",
            VERSION_LEN,
            version.len()
        ));
    }
    Ok(())
}

/// A state change request carried by a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    #[serde(rename = "/akash.deployment.v1beta2.MsgCreateDeployment")]
    CreateDeployment(MsgCreateDeployment),
    #[serde(rename = "/akash.deployment.v1beta2.MsgUpdateDeployment")]
    UpdateDeployment(MsgUpdateDeployment),
    #[serde(rename = "/akash.deployment.v1beta2.MsgCloseDeployment")]
    CloseDeployment(MsgCloseDeployment),
}

impl Message {
    pub fn type_url(&self) -> &'static str {
        match self {
            Message::CreateDeployment(_) => "/akash.deployment.v1beta2.MsgCreateDeployment",
            Message::UpdateDeployment(_) => "/akash.deployment.v1beta2.MsgUpdateDeployment",
            Message::CloseDeployment(_) => "/akash.deployment.v1beta2.MsgCloseDeployment",
        }
    }

    /// Stateless structural checks
    pub fn validate_basic(&self) -> Result<(), String> {
        match self {
            Message::CreateDeployment(msg) => msg.validate_basic(),
            Message::UpdateDeployment(msg) => msg.validate_basic(),
            Message::CloseDeployment(msg) => msg.validate_basic(),
        }
    }

    /// Account expected to sign the message
    pub fn signer(&self) -> &str {
        match self {
            Message::CreateDeployment(msg) => &msg.id.owner,
            Message::UpdateDeployment(msg) => &msg.id.owner,
            Message::CloseDeployment(msg) => &msg.id.owner,
        }
    }
}

impl From<MsgCreateDeployment> for Message {
    fn from(msg: MsgCreateDeployment) -> Self {
        Message::CreateDeployment(msg)
    }
}

impl From<MsgUpdateDeployment> for Message {
    fn from(msg: MsgUpdateDeployment) -> Self {
        Message::UpdateDeployment(msg)
    }
}

impl From<MsgCloseDeployment> for Message {
    fn from(msg: MsgCloseDeployment) -> Self {
        Message::CloseDeployment(msg)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const OWNER: &str = "akash1aqnvsas9plseewyu3nt2rtz6ml4aya4s02qm0q";

    pub fn group(name: &str) -> GroupSpec {
        GroupSpec {
            name: name.to_string(),
            attributes: vec![Attribute {
                key: "region".to_string(),
                value: "us-west".to_string(),
            }],
            resources: vec![ResourceUnit {
                cpu_millis: 500,
                memory_bytes: 512 * 1024 * 1024,
                storage_bytes: 1024 * 1024 * 1024,
                count: 1,
                price: "100uakt".parse().unwrap(),
            }],
        }
    }

    pub fn create_msg() -> MsgCreateDeployment {
        MsgCreateDeployment {
            id: DeploymentId::new(OWNER, 42),
            groups: vec![group("web")],
            version: vec![0xab; VERSION_LEN],
            deposit: "5000000uakt".parse().unwrap(),
            depositor: OWNER.to_string(),
        }
    }

    #[test]
    fn test_valid_create() {
        let msg = Message::from(create_msg());
        assert!(msg.validate_basic().is_ok());
        assert_eq!(msg.signer(), OWNER);
    }

    #[test]
    fn test_create_rejects_empty_groups() {
        let mut msg = create_msg();
        msg.groups.clear();
        assert_eq!(msg.validate_basic().unwrap_err(), "deployment has no groups");
    }

    #[test]
    fn test_create_rejects_zero_deposit() {
        let mut msg = create_msg();
        msg.deposit = Coin::new(0, "uakt");
        assert!(msg.validate_basic().unwrap_err().contains("positive"));
    }

    #[test]
    fn test_create_rejects_bad_addresses() {
        let mut msg = create_msg();
        msg.depositor = "not-an-address".to_string();
        assert!(msg.validate_basic().unwrap_err().starts_with("depositor"));

        let mut msg = create_msg();
        msg.id.owner = "akash1UPPERCASE".to_string();
        assert!(msg.validate_basic().unwrap_err().starts_with("deployment owner"));
    }

    #[test]
    fn test_create_rejects_duplicate_groups() {
        let mut msg = create_msg();
        msg.groups.push(group("web"));
        assert!(msg.validate_basic().unwrap_err().contains("duplicate"));
    }

    #[test]
    fn test_rejects_zero_dseq_and_short_version() {
        let close = MsgCloseDeployment {
            id: DeploymentId::new(OWNER, 0),
        };
        assert!(close.validate_basic().is_err());

        let update = MsgUpdateDeployment {
            id: DeploymentId::new(OWNER, 1),
            version: vec![1, 2, 3],
        };
        assert!(update.validate_basic().unwrap_err().contains("32 bytes"));
    }

    #[test]
    fn test_group_resource_checks() {
        let mut g = group("db");
        g.resources[0].count = 0;
        assert!(g.validate().unwrap_err().contains("zero count"));

        let mut g = group("db");
        g.resources.clear();
        assert!(g.validate().is_err());
    }
}
