//! ECIES over BLS12-381 G1 for deal transport.
//!
//! The sender samples `r`, publishes `R = r·G1` and derives a ChaCha20-Poly1305
//! key from `r·X` with HKDF-SHA256, where `X` is the recipient's long-term
//! public key. Ciphertexts are laid out as `R (48) || nonce (12) || sealed`.

use bls12_381::{G1Affine, G1Projective, Scalar};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use ff::Field;
use group::Curve;
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::codec::g1_from_bytes;
use crate::error::{DkgError, Result};

const POINT_LEN: usize = 48;
const NONCE_LEN: usize = 12;
const KDF_INFO: &[u8] = b"tessera-dkg-deal-v1";

/// Encrypt `plaintext` for the holder of `recipient`'s secret key
pub fn encrypt<R: RngCore + CryptoRng>(
    recipient: &G1Affine,
    plaintext: &[u8],
    rng: &mut R,
) -> Result<Vec<u8>> {
    let ephemeral = Scalar::random(&mut *rng);
    let ephemeral_point = (G1Projective::generator() * ephemeral).to_affine().to_compressed();
    let shared = (recipient * ephemeral).to_affine();

    let mut key = derive_key(&shared, &ephemeral_point)?;
    let cipher = ChaCha20Poly1305::new_from_slice(&key).map_err(|_| DkgError::Encryption);
    key.zeroize();
    let cipher = cipher?;

    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);

    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &ephemeral_point,
            },
        )
        .map_err(|_| DkgError::Encryption)?;

    let mut out = Vec::with_capacity(POINT_LEN + NONCE_LEN + sealed.len());
    out.extend_from_slice(&ephemeral_point);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt a ciphertext produced by [`encrypt`] with the recipient's secret key
pub fn decrypt(secret: &Scalar, ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < POINT_LEN + NONCE_LEN {
        return Err(DkgError::Decryption);
    }
    let (ephemeral_point, rest) = ciphertext.split_at(POINT_LEN);
    let (nonce, sealed) = rest.split_at(NONCE_LEN);

    let ephemeral = g1_from_bytes(ephemeral_point).map_err(|_| DkgError::Decryption)?;
    let shared = (ephemeral * secret).to_affine();

    let mut key = derive_key(&shared, ephemeral_point)?;
    let cipher = ChaCha20Poly1305::new_from_slice(&key).map_err(|_| DkgError::Decryption);
    key.zeroize();

    cipher?
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: sealed,
                aad: ephemeral_point,
            },
        )
        .map_err(|_| DkgError::Decryption)
}

fn derive_key(shared: &G1Affine, ephemeral_point: &[u8]) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(Some(ephemeral_point), &shared.to_compressed());
    let mut key = [0u8; 32];
    hk.expand(KDF_INFO, &mut key).map_err(|_| DkgError::Encryption)?;
    Ok(key)
}
