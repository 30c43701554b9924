//! Output of a completed DKG round.

use std::fmt;

use bls12_381::{G2Affine, G2Projective, Scalar};
use ff::Field;
use group::Curve;
use serde::{Deserialize, Serialize};

use crate::codec::scalar_hex;
use crate::error::{DkgError, Result};
use crate::vss::PublicPolynomial;

/// Threshold key material held by one participant after a DKG round
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlsKeyring {
    /// Participant index in `1..=n`
    pub index: u32,
    /// Number of partial signatures needed to recover a signature
    pub threshold: usize,
    /// This participant's share of the master secret
    #[serde(with = "scalar_hex")]
    pub secret_share: Scalar,
    /// Coefficient-wise sum of every dealer's commitments
    pub public_polynomial: PublicPolynomial,
}

impl BlsKeyring {
    /// Build a keyring, checking the share against the public polynomial
    pub fn new(index: u32, secret_share: Scalar, public_polynomial: PublicPolynomial) -> Result<Self> {
        let keyring = Self {
            index,
            threshold: public_polynomial.threshold(),
            secret_share,
            public_polynomial,
        };
        keyring.check()?;
        Ok(keyring)
    }

    /// Verify `secret_share · G2 == P(index)`
    pub fn check(&self) -> Result<()> {
        if self.threshold != self.public_polynomial.threshold() || self.threshold == 0 {
            return Err(DkgError::InvalidThreshold {
                threshold: self.threshold,
                participants: self.public_polynomial.threshold(),
            });
        }
        let expected = self.public_polynomial.eval(self.index).to_affine();
        if (G2Projective::generator() * self.secret_share).to_affine() != expected {
            return Err(DkgError::InvalidShare(self.index));
        }
        Ok(())
    }

    /// Distributed public key
    pub fn master_public_key(&self) -> Result<G2Affine> {
        self.public_polynomial.public_key()
    }

    /// JSON encoding for sealed storage
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode and check a stored keyring
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let keyring: Self = serde_json::from_slice(bytes)?;
        keyring.check()?;
        Ok(keyring)
    }
}

impl fmt::Debug for BlsKeyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlsKeyring")
            .field("index", &self.index)
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl Drop for BlsKeyring {
    fn drop(&mut self) {
        self.secret_share = Scalar::ZERO;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::vss::{commit, evaluate_polynomial, generate_polynomial};
    use rand::rngs::OsRng;

    fn keyring(index: u32) -> BlsKeyring {
        let coefficients = generate_polynomial(Scalar::from(11u64), 2, &mut OsRng);
        let share = evaluate_polynomial(&coefficients, &Scalar::from(u64::from(index)));
        BlsKeyring::new(index, share, commit(&coefficients)).unwrap()
    }

    #[test]
    fn test_keyring_bytes_round_trip() {
        let keyring = keyring(2);
        let restored = BlsKeyring::from_bytes(&keyring.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, keyring);
        assert_eq!(restored.threshold, 2);
    }

    #[test]
    fn test_wrong_share_is_rejected() {
        let valid = keyring(1);
        let result = BlsKeyring::new(2, valid.secret_share, valid.public_polynomial.clone());
        assert_eq!(result.err(), Some(DkgError::InvalidShare(2)));
    }
}
