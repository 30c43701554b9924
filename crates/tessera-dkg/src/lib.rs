//! Tessera DKG: joint Feldman key generation and threshold BLS signatures
//! over BLS12-381.
//!
//! Participants identify themselves with a long-term G1 key pair
//! ([`KeyPair`]). Deals travel encrypted under [`ecies`]; the outcome of a
//! round is a [`BlsKeyring`] whose master public key lives in G2 and whose
//! shares sign messages hashed to G1 ([`bls`]).

#![forbid(unsafe_code)]

pub mod bls;
pub mod codec;
pub mod ecies;
mod error;
pub mod instance;
pub mod keyring;
pub mod keys;
pub mod vss;

pub use bls::PartialSignature;
pub use error::{DkgError, Result};
pub use instance::{Deal, DkgInstance, Response};
pub use keyring::BlsKeyring;
pub use keys::KeyPair;
pub use vss::PublicPolynomial;
