//! Point and scalar encodings.
//!
//! Points use the standard compressed form (48 bytes in G1, 96 in G2), scalars
//! their 32-byte little-endian form. Inside JSON documents both travel as hex.

use bls12_381::{G1Affine, G2Affine, Scalar};

use crate::error::{DkgError, Result};

/// Decode a compressed G1 point
pub fn g1_from_bytes(bytes: &[u8]) -> Result<G1Affine> {
    let bytes: [u8; 48] = bytes
        .try_into()
        .map_err(|_| DkgError::InvalidPoint("G1 point must be 48 bytes"))?;
    Option::<G1Affine>::from(G1Affine::from_compressed(&bytes)).ok_or(DkgError::InvalidPoint("not a G1 point"))
}

/// Decode a compressed G2 point
pub fn g2_from_bytes(bytes: &[u8]) -> Result<G2Affine> {
    let bytes: [u8; 96] = bytes
        .try_into()
        .map_err(|_| DkgError::InvalidPoint("G2 point must be 96 bytes"))?;
    Option::<G2Affine>::from(G2Affine::from_compressed(&bytes)).ok_or(DkgError::InvalidPoint("not a G2 point"))
}

/// Decode a canonical scalar
pub fn scalar_from_bytes(bytes: &[u8]) -> Result<Scalar> {
    let bytes: [u8; 32] = bytes.try_into().map_err(|_| DkgError::InvalidScalar)?;
    Option::<Scalar>::from(Scalar::from_bytes(&bytes)).ok_or(DkgError::InvalidScalar)
}

/// Serde module for a scalar as hex
pub mod scalar_hex {
    use bls12_381::Scalar;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a scalar
    pub fn serialize<S: Serializer>(scalar: &Scalar, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(scalar.to_bytes()))
    }

    /// Deserialize a scalar
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Scalar, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(encoded).map_err(serde::de::Error::custom)?;
        super::scalar_from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Serde module for a list of G2 points as hex
pub mod g2_vec_hex {
    use bls12_381::G2Affine;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize G2 points
    pub fn serialize<S: Serializer>(points: &[G2Affine], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(points.len()))?;
        for point in points {
            seq.serialize_element(&hex::encode(point.to_compressed()))?;
        }
        seq.end()
    }

    /// Deserialize G2 points
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<G2Affine>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|point| {
                let bytes = hex::decode(point).map_err(serde::de::Error::custom)?;
                super::g2_from_bytes(&bytes).map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use group::Curve;

    #[test]
    fn test_rejects_wrong_lengths() {
        assert!(g1_from_bytes(&[0u8; 47]).is_err());
        assert!(g2_from_bytes(&[0u8; 95]).is_err());
        assert_eq!(scalar_from_bytes(&[0u8; 31]), Err(DkgError::InvalidScalar));
    }

    #[test]
    fn test_rejects_non_canonical_scalar() {
        assert_eq!(scalar_from_bytes(&[0xff; 32]), Err(DkgError::InvalidScalar));
    }

    #[test]
    fn test_generator_decodes() {
        let g1 = G1Affine::generator().to_compressed();
        assert_eq!(g1_from_bytes(&g1), Ok(G1Affine::generator()));
        let g2 = (bls12_381::G2Projective::generator() * Scalar::from(7u64)).to_affine();
        assert_eq!(g2_from_bytes(&g2.to_compressed()), Ok(g2));
    }
}
