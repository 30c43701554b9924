//! Passphrase sealing for data at rest.
//!
//! A fresh salt feeds Argon2id, which stretches the passphrase into a
//! ChaCha20-Poly1305 key; a fresh nonce is drawn for every seal.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::config::KdfConfig;
use crate::error::{AirgappedError, Result};

/// Salt length in bytes
pub const SALT_LEN: usize = 16;
/// Nonce length in bytes
pub const NONCE_LEN: usize = 12;

/// Sealed record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBlob {
    /// Argon2id salt
    pub salt: [u8; SALT_LEN],
    /// AEAD nonce
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with tag
    pub ciphertext: Vec<u8>,
}

impl SealedBlob {
    /// `nonce || ciphertext`, the part stored under the record's keyspace
    pub fn body(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Reassemble a blob from its stored salt and body
    pub fn from_parts(salt: &[u8], body: &[u8]) -> Result<Self> {
        let salt: [u8; SALT_LEN] = salt
            .try_into()
            .map_err(|_| AirgappedError::sealing("stored salt has the wrong length"))?;
        if body.len() < NONCE_LEN {
            return Err(AirgappedError::sealing("sealed record is truncated"));
        }
        let (nonce, ciphertext) = body.split_at(NONCE_LEN);
        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(nonce);
        Ok(Self {
            salt,
            nonce: nonce_bytes,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

fn derive_key(passphrase: &[u8], salt: &[u8], kdf: &KdfConfig) -> Result<Zeroizing<[u8; 32]>> {
    let params = Params::new(kdf.memory_kib, kdf.iterations, kdf.parallelism, Some(32))
        .map_err(|e| AirgappedError::sealing(format!("Invalid kdf parameters: {e}")))?;
    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(passphrase, salt, &mut key[..])
        .map_err(|e| AirgappedError::sealing(format!("Key derivation failed: {e}")))?;
    Ok(key)
}

/// Seal `plaintext` under `passphrase`
pub fn seal(passphrase: &[u8], plaintext: &[u8], kdf: &KdfConfig) -> Result<SealedBlob> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let key = derive_key(passphrase, &salt, kdf)?;
    let cipher = ChaCha20Poly1305::new_from_slice(&key[..])
        .map_err(|e| AirgappedError::sealing(format!("Invalid key: {e}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| AirgappedError::sealing(format!("Encryption failed: {e}")))?;

    Ok(SealedBlob {
        salt,
        nonce,
        ciphertext,
    })
}

/// Open a sealed blob; a wrong passphrase fails authentication
pub fn unseal(passphrase: &[u8], blob: &SealedBlob, kdf: &KdfConfig) -> Result<Vec<u8>> {
    let key = derive_key(passphrase, &blob.salt, kdf)?;
    let cipher = ChaCha20Poly1305::new_from_slice(&key[..])
        .map_err(|e| AirgappedError::sealing(format!("Invalid key: {e}")))?;
    cipher
        .decrypt(Nonce::from_slice(&blob.nonce), blob.ciphertext.as_ref())
        .map_err(|_| AirgappedError::sealing("authentication failed"))
}

impl Drop for SealedBlob {
    fn drop(&mut self) {
        self.ciphertext.zeroize();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kdf() -> KdfConfig {
        KdfConfig::insecure_for_tests()
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let blob = seal(b"correct horse", b"secret share", &kdf()).unwrap();
        let err = unseal(b"battery staple", &blob, &kdf()).unwrap_err();
        assert_eq!(err, AirgappedError::sealing("authentication failed"));
    }

    #[test]
    fn test_salt_and_nonce_are_fresh() {
        let a = seal(b"pw", b"same", &kdf()).unwrap();
        let b = seal(b"pw", b"same", &kdf()).unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_parts_reassemble() {
        let blob = seal(b"pw", b"record", &kdf()).unwrap();
        let restored = SealedBlob::from_parts(&blob.salt, &blob.body()).unwrap();
        assert_eq!(unseal(b"pw", &restored, &kdf()).unwrap(), b"record");
        assert!(SealedBlob::from_parts(&blob.salt[..4], &blob.body()).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_seal_round_trip(
            passphrase in proptest::collection::vec(any::<u8>(), 0..32),
            plaintext in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let blob = seal(&passphrase, &plaintext, &kdf()).unwrap();
            prop_assert_eq!(unseal(&passphrase, &blob, &kdf()).unwrap(), plaintext);
        }
    }
}
