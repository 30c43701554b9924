//! Threshold BLS signatures.
//!
//! Messages hash to G1 (RFC 9380, SSWU, SHA-256), keys live in G2. A
//! participant with share `s_i` produces `σ_i = s_i · H(m)`; any `t` valid
//! partials interpolate to `σ = s · H(m)`, which verifies against the master
//! public key with `e(σ, G2) == e(H(m), PK)`.

use std::collections::BTreeSet;

use bls12_381::hash_to_curve::{ExpandMsgXmd, HashToCurve};
use bls12_381::{pairing, G1Affine, G1Projective, G2Affine};
use group::Curve;

use crate::codec::g1_from_bytes;
use crate::error::{DkgError, Result};
use crate::keyring::BlsKeyring;
use crate::vss::{lagrange_coefficient, PublicPolynomial};

/// Domain separation tag for message hashing
pub const DST: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";

/// Encoded length of a partial signature
pub const PARTIAL_SIGNATURE_LEN: usize = 2 + 48;

/// Hash a message to G1
pub fn hash_to_g1(msg: &[u8]) -> G1Projective {
    <G1Projective as HashToCurve<ExpandMsgXmd<sha2_09::Sha256>>>::hash_to_curve(msg, DST)
}

/// Signature share tagged with the signer's index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialSignature {
    /// Signer index in `1..=n`
    pub index: u32,
    /// `s_i · H(m)`
    pub sig: G1Affine,
}

impl PartialSignature {
    /// `index (u16 BE) || σ (48 bytes)`
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let index = u16::try_from(self.index).map_err(|_| DkgError::InvalidShare(self.index))?;
        let mut out = Vec::with_capacity(PARTIAL_SIGNATURE_LEN);
        out.extend_from_slice(&index.to_be_bytes());
        out.extend_from_slice(&self.sig.to_compressed());
        Ok(out)
    }

    /// Decode the form produced by [`PartialSignature::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PARTIAL_SIGNATURE_LEN {
            return Err(DkgError::InvalidPoint("partial signature must be 50 bytes"));
        }
        let index = u32::from(u16::from_be_bytes([bytes[0], bytes[1]]));
        let sig = g1_from_bytes(&bytes[2..])?;
        Ok(Self { index, sig })
    }
}

/// Sign `msg` with this participant's share
pub fn partial_sign(keyring: &BlsKeyring, msg: &[u8]) -> PartialSignature {
    PartialSignature {
        index: keyring.index,
        sig: (hash_to_g1(msg) * keyring.secret_share).to_affine(),
    }
}

/// Check a partial signature against the signer's public share `P(index)`
pub fn verify_partial(public_polynomial: &PublicPolynomial, msg: &[u8], partial: &PartialSignature) -> bool {
    if partial.index == 0 {
        return false;
    }
    let public_share = public_polynomial.eval(partial.index).to_affine();
    pairing(&partial.sig, &G2Affine::generator()) == pairing(&hash_to_g1(msg).to_affine(), &public_share)
}

/// Interpolate a full signature from `threshold` valid partials.
///
/// Invalid partials are skipped and repeated indices count once.
pub fn recover(
    public_polynomial: &PublicPolynomial,
    msg: &[u8],
    partials: &[PartialSignature],
    threshold: usize,
) -> Result<G1Affine> {
    let mut seen = BTreeSet::new();
    let valid: Vec<&PartialSignature> = partials
        .iter()
        .filter(|partial| verify_partial(public_polynomial, msg, partial))
        .filter(|partial| seen.insert(partial.index))
        .take(threshold)
        .collect();

    if valid.len() < threshold || threshold == 0 {
        return Err(DkgError::InsufficientShares {
            required: threshold,
            got: valid.len(),
        });
    }

    let indices: Vec<u32> = valid.iter().map(|partial| partial.index).collect();
    let mut signature = G1Projective::identity();
    for partial in valid {
        signature += G1Projective::from(partial.sig) * lagrange_coefficient(partial.index, &indices)?;
    }
    Ok(signature.to_affine())
}

/// Verify a full signature against the master public key
pub fn verify(master_key: &G2Affine, msg: &[u8], signature: &G1Affine) -> Result<()> {
    if pairing(signature, &G2Affine::generator()) == pairing(&hash_to_g1(msg).to_affine(), master_key) {
        Ok(())
    } else {
        Err(DkgError::InvalidSignature)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::vss::{commit, evaluate_polynomial, generate_polynomial};
    use bls12_381::Scalar;
    use ff::Field;
    use rand::rngs::OsRng;

    fn keyrings(n: u32, threshold: usize) -> Vec<BlsKeyring> {
        let coefficients = generate_polynomial(Scalar::random(&mut OsRng), threshold, &mut OsRng);
        let public = commit(&coefficients);
        (1..=n)
            .map(|index| {
                let share = evaluate_polynomial(&coefficients, &Scalar::from(u64::from(index)));
                BlsKeyring::new(index, share, public.clone()).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_partial_signature_encoding() {
        let keyrings = keyrings(3, 2);
        let partial = partial_sign(&keyrings[2], b"msg");
        let bytes = partial.to_bytes().unwrap();
        assert_eq!(bytes.len(), PARTIAL_SIGNATURE_LEN);
        assert_eq!(&bytes[..2], &[0, 3]);
        assert_eq!(PartialSignature::from_bytes(&bytes).unwrap(), partial);
        assert!(PartialSignature::from_bytes(&bytes[..49]).is_err());
    }

    #[test]
    fn test_recovered_signature_verifies() {
        let keyrings = keyrings(4, 2);
        let public = keyrings[0].public_polynomial.clone();
        let master = keyrings[0].master_public_key().unwrap();
        let partials: Vec<PartialSignature> = keyrings.iter().map(|k| partial_sign(k, b"hello")).collect();

        for partial in &partials {
            assert!(verify_partial(&public, b"hello", partial));
            assert!(!verify_partial(&public, b"other", partial));
        }

        let from_first = recover(&public, b"hello", &partials[..2], 2).unwrap();
        let from_last = recover(&public, b"hello", &partials[2..], 2).unwrap();
        assert_eq!(from_first, from_last);
        verify(&master, b"hello", &from_first).unwrap();
        assert_eq!(verify(&master, b"other", &from_first), Err(DkgError::InvalidSignature));
    }

    #[test]
    fn test_recover_skips_bad_and_duplicate_partials() {
        let keyrings = keyrings(3, 2);
        let public = keyrings[0].public_polynomial.clone();
        let good = partial_sign(&keyrings[0], b"m");
        let forged = PartialSignature {
            index: 2,
            sig: partial_sign(&keyrings[0], b"m").sig,
        };

        let err = recover(&public, b"m", &[good, good, forged], 2).unwrap_err();
        assert_eq!(err, DkgError::InsufficientShares { required: 2, got: 1 });

        let other = partial_sign(&keyrings[2], b"m");
        let signature = recover(&public, b"m", &[forged, good, good, other], 2).unwrap();
        verify(&keyrings[0].master_public_key().unwrap(), b"m", &signature).unwrap();
    }
}
