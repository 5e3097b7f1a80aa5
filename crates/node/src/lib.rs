//! Validator runtime and client operations for pkchain.
//!
//! The `pkchain` binary is a thin shell over this crate: [`Validator`] runs a
//! consensus participant, [`LedgerClient`] submits PKI operations to the
//! validator set.

pub mod client;
pub mod config;
pub mod error;
pub mod validator;

pub use client::{LedgerClient, Submission};
pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use validator::{NodeState, Validator};
