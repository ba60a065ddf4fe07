//! Transaction pipeline: fee parameters, gas estimation, assembly,
//! confirmation, signing, wire encoding, broadcast and commit polling

mod broadcast;
mod builder;
pub mod codec;
mod confirm;
mod fee;
mod gas;
pub mod keyring;
mod poller;
mod sender;
mod signer;

pub use broadcast::Broadcaster;
pub use builder::{Fee, TxAssembler, UnsignedTx};
pub use confirm::{ConfirmationGate, Decision, CANCELLED_MESSAGE, CONFIRM_PROMPT};
pub use fee::{FeeConfig, FeeFactory, GasSetting};
pub use gas::{adjust as adjust_gas, GasEstimator};
pub use keyring::{Keyring, KeyringError, MemoryKeyring, Secp256k1Key, SigningKey};
pub use poller::{PollOutcome, RetryPoller, DEFAULT_POLL_DEADLINE, DEFAULT_POLL_INTERVAL};
pub use sender::{SubmitOptions, SubmitOutcome, TxSubmitter};
pub use signer::{SignedTx, Signer};
