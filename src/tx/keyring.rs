//! Key source: named secp256k1 keys available for signing
//!
//! Keys can be shared by concurrent submissions, so lookups only take
//! shared references and the store is a `DashMap`.

use dashmap::DashMap;
use ethers::signers::LocalWallet;
use ethers::types::H256;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Environment variable prefix for keys loaded by the `env` backend
pub const ENV_KEY_PREFIX: &str = "EVE_KEY_";

/// File extension for keys stored by the `test` backend
pub const KEY_FILE_EXTENSION: &str = "key";

#[derive(Error, Debug)]
pub enum KeyringError {
    #[error("key {0:?} not found in keyring")]
    NotFound(String),

    #[error("keyring is locked")]
    Locked,

    #[error("invalid key {name:?}: {message}")]
    InvalidKey { name: String, message: String },

    #[error("signing failed: {0}")]
    Sign(String),

    #[error("keyring I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A key able to produce signatures
pub trait SigningKey: Send + Sync {
    /// Compressed public key bytes
    fn public_key(&self) -> Vec<u8>;

    /// Sign `bytes`, returning the signature bytes
    fn sign(&self, bytes: &[u8]) -> Result<Vec<u8>, KeyringError>;
}

/// Named key lookup
#[cfg_attr(test, mockall::automock)]
pub trait Keyring: Send + Sync {
    fn lookup(&self, name: &str) -> Result<Arc<dyn SigningKey>, KeyringError>;
}

/// secp256k1 key signing the SHA-256 digest of its input
pub struct Secp256k1Key {
    wallet: LocalWallet,
    public_key: Vec<u8>,
}

impl Secp256k1Key {
    /// Parse a hex encoded private key (with or without `0x`)
    pub fn from_hex(name: &str, private_key: &str) -> Result<Self, KeyringError> {
        let wallet = private_key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| KeyringError::InvalidKey {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self::from_wallet(wallet))
    }

    pub fn from_wallet(wallet: LocalWallet) -> Self {
        let public_key = wallet
            .signer()
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        Self { wallet, public_key }
    }
}

impl SigningKey for Secp256k1Key {
    fn public_key(&self) -> Vec<u8> {
        self.public_key.clone()
    }

    /// 64-byte `r || s` signature over SHA-256(bytes)
    fn sign(&self, bytes: &[u8]) -> Result<Vec<u8>, KeyringError> {
        let digest: [u8; 32] = Sha256::digest(bytes).into();
        let signature = self
            .wallet
            .sign_hash(H256::from(digest))
            .map_err(|e| KeyringError::Sign(e.to_string()))?;

        let mut out = vec![0u8; 64];
        signature.r.to_big_endian(&mut out[..32]);
        signature.s.to_big_endian(&mut out[32..]);
        Ok(out)
    }
}

/// In-memory keyring, optionally locked
pub struct MemoryKeyring {
    keys: DashMap<String, Arc<Secp256k1Key>>,
    locked: AtomicBool,
}

impl MemoryKeyring {
    pub fn new() -> Self {
        Self {
            keys: DashMap::new(),
            locked: AtomicBool::new(false),
        }
    }

    pub fn insert(&self, name: impl Into<String>, key: Secp256k1Key) {
        self.keys.insert(name.into(), Arc::new(key));
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    pub fn unlock(&self) {
        self.locked.store(false, Ordering::SeqCst);
    }

    /// Load every `<name>.key` file (hex private key) from `dir`
    pub fn load_dir(dir: &Path) -> Result<Self, KeyringError> {
        let keyring = Self::new();
        if !dir.is_dir() {
            warn!("Keyring directory {:?} does not exist", dir);
            return Ok(keyring);
        }

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(KEY_FILE_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let contents = std::fs::read_to_string(&path)?;
            keyring.insert(name, Secp256k1Key::from_hex(name, &contents)?);
            debug!("Loaded key {:?} from {:?}", name, path);
        }

        Ok(keyring)
    }

    /// Load keys from `EVE_KEY_<NAME>` variables; names are lower-cased
    pub fn load_env() -> Result<Self, KeyringError> {
        Self::load_vars(std::env::vars())
    }

    fn load_vars(vars: impl Iterator<Item = (String, String)>) -> Result<Self, KeyringError> {
        let keyring = Self::new();
        for (var, value) in vars {
            if let Some(name) = var.strip_prefix(ENV_KEY_PREFIX) {
                let name = name.to_ascii_lowercase();
                keyring.insert(name.clone(), Secp256k1Key::from_hex(&name, &value)?);
                debug!("Loaded key {:?} from environment", name);
            }
        }
        Ok(keyring)
    }
}

impl Default for MemoryKeyring {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyring for MemoryKeyring {
    fn lookup(&self, name: &str) -> Result<Arc<dyn SigningKey>, KeyringError> {
        if self.locked.load(Ordering::SeqCst) {
            return Err(KeyringError::Locked);
        }
        self.keys
            .get(name)
            .map(|k| k.value().clone() as Arc<dyn SigningKey>)
            .ok_or_else(|| KeyringError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn test_lookup_and_sign() {
        let keyring = MemoryKeyring::new();
        keyring.insert("deploy", Secp256k1Key::from_hex("deploy", TEST_KEY).unwrap());

        let key = keyring.lookup("deploy").unwrap();
        let public_key = key.public_key();
        assert_eq!(public_key.len(), 33);
        assert!(public_key[0] == 0x02 || public_key[0] == 0x03);

        let sig = key.sign(b"sign doc").unwrap();
        assert_eq!(sig.len(), 64);
        // RFC 6979 signatures are deterministic
        assert_eq!(sig, key.sign(b"sign doc").unwrap());
        assert_ne!(sig, key.sign(b"other doc").unwrap());
    }

    #[test]
    fn test_signature_matches_wallet() {
        let wallet: LocalWallet = TEST_KEY.parse().unwrap();
        let key = Secp256k1Key::from_wallet(wallet.clone());
        let sig = key.sign(b"payload").unwrap();

        let digest: [u8; 32] = Sha256::digest(b"payload").into();
        let expected = wallet.sign_hash(H256::from(digest)).unwrap();
        assert_eq!(&expected.to_vec()[..64], &sig[..]);
    }

    #[test]
    fn test_missing_and_locked() {
        let keyring = MemoryKeyring::new();
        assert!(matches!(
            keyring.lookup("deploy"),
            Err(KeyringError::NotFound(name)) if name == "deploy"
        ));

        keyring.insert("deploy", Secp256k1Key::from_hex("deploy", TEST_KEY).unwrap());
        keyring.lock();
        assert!(matches!(keyring.lookup("deploy"), Err(KeyringError::Locked)));
        keyring.unlock();
        assert!(keyring.lookup("deploy").is_ok());
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("deploy.key"), format!("0x{}\n", TEST_KEY)).unwrap();
        std::fs::write(dir.path().join("README"), "not a key").unwrap();

        let keyring = MemoryKeyring::load_dir(dir.path()).unwrap();
        assert_eq!(keyring.len(), 1);
        assert!(keyring.lookup("deploy").is_ok());
    }

    #[test]
    fn test_load_vars() {
        let vars = vec![
            ("EVE_KEY_DEPLOY".to_string(), TEST_KEY.to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ];
        let keyring = MemoryKeyring::load_vars(vars.into_iter()).unwrap();
        assert_eq!(keyring.len(), 1);
        assert!(keyring.lookup("deploy").is_ok());
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(matches!(
            Secp256k1Key::from_hex("bad", "not hex"),
            Err(KeyringError::InvalidKey { .. })
        ));
    }
}
