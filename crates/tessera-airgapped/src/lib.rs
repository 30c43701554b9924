//! Tessera air-gapped executor.
//!
//! The executor owns everything secret in a round: the long-term DKG key pair,
//! in-flight DKG instances and the resulting BLS keyrings, sealed at rest
//! under a passphrase. It never talks to the network; operations come in and
//! operations carrying protocol messages go out.

#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod machine;
pub mod sealing;
pub mod store;

pub use config::{ExecutorConfig, KdfConfig};
pub use error::{AirgappedError, Result};
pub use machine::Machine;
pub use sealing::{seal, unseal, SealedBlob};
pub use store::{KeyStore, Keyspace, MemoryStore};
