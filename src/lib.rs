//! eve - deployment transaction pipeline
//!
//! Turns deployment requests into fee'd, signed transactions, submits them to
//! a Tendermint node and resolves their outcome, polling by hash when the node
//! times out waiting for block inclusion.

pub mod config;
pub mod deployment;
pub mod error;
pub mod metrics;
pub mod node;
pub mod tx;

pub use error::{PipelineError, PipelineResult};
