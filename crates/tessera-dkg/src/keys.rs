//! Long-term participant key pair `(x, X = x·G1)`.

use std::fmt;

use bls12_381::{G1Affine, G1Projective, Scalar};
use ff::Field;
use group::Curve;
use rand::{CryptoRng, RngCore};

use crate::codec::scalar_from_bytes;
use crate::error::Result;

/// Participant key pair used to receive encrypted deals
#[derive(Clone)]
pub struct KeyPair {
    secret: Scalar,
    public: G1Affine,
}

impl KeyPair {
    /// Generate a fresh key pair
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_secret(Scalar::random(rng))
    }

    /// Rebuild a key pair from its secret scalar
    pub fn from_secret(secret: Scalar) -> Self {
        let public = (G1Projective::generator() * secret).to_affine();
        Self { secret, public }
    }

    /// Rebuild a key pair from the 32-byte secret encoding
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        scalar_from_bytes(bytes).map(Self::from_secret)
    }

    /// Secret scalar
    pub fn secret(&self) -> &Scalar {
        &self.secret
    }

    /// Public point
    pub fn public(&self) -> &G1Affine {
        &self.public
    }

    /// 32-byte secret encoding; callers are responsible for wiping it
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// 48-byte compressed public key
    pub fn public_bytes(&self) -> [u8; 48] {
        self.public.to_compressed()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public_bytes()))
            .finish_non_exhaustive()
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.secret = Scalar::ZERO;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_secret_bytes_restore_key_pair() {
        let pair = KeyPair::generate(&mut OsRng);
        let restored = KeyPair::from_secret_bytes(&pair.secret_bytes()).unwrap();
        assert_eq!(restored.public_bytes(), pair.public_bytes());
    }

    #[test]
    fn test_debug_hides_secret() {
        let pair = KeyPair::generate(&mut OsRng);
        let printed = format!("{pair:?}");
        assert!(printed.contains(&hex::encode(pair.public_bytes())));
        assert!(!printed.contains(&hex::encode(pair.secret_bytes())));
    }
}
