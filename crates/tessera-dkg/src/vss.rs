//! Feldman verifiable secret sharing over BLS12-381.
//!
//! A dealer samples `f(x) = a_0 + a_1 x + ... + a_{t-1} x^{t-1}`, publishes
//! `C_k = a_k · G2` and hands `f(j)` to participant `j`. Anyone holding the
//! commitments can check a share: `f(j) · G2 == Σ C_k · j^k`.

use bls12_381::{G2Affine, G2Projective, Scalar};
use ff::Field;
use group::Curve;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::codec::g2_vec_hex;
use crate::error::{DkgError, Result};

/// Commitments to a polynomial's coefficients, lowest degree first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicPolynomial(#[serde(with = "g2_vec_hex")] pub Vec<G2Affine>);

impl PublicPolynomial {
    /// Number of coefficients, equal to the reconstruction threshold
    pub fn threshold(&self) -> usize {
        self.0.len()
    }

    /// Commitment to the constant term
    pub fn public_key(&self) -> Result<G2Affine> {
        self.0.first().copied().ok_or(DkgError::NotInitialized)
    }

    /// Public key of the share held by `index`
    pub fn eval(&self, index: u32) -> G2Projective {
        let x = Scalar::from(u64::from(index));
        let mut result = G2Projective::identity();
        for commitment in self.0.iter().rev() {
            result = result * x + G2Projective::from(commitment);
        }
        result
    }

    /// Coefficient-wise sum of polynomials of the same degree
    pub fn sum<'a>(polynomials: impl IntoIterator<Item = &'a PublicPolynomial>) -> Result<Self> {
        let mut total: Option<Vec<G2Projective>> = None;
        for polynomial in polynomials {
            match total.as_mut() {
                None => total = Some(polynomial.0.iter().map(G2Projective::from).collect()),
                Some(total) => {
                    if total.len() != polynomial.0.len() {
                        return Err(DkgError::InvalidThreshold {
                            threshold: polynomial.0.len(),
                            participants: total.len(),
                        });
                    }
                    for (acc, commitment) in total.iter_mut().zip(&polynomial.0) {
                        *acc += G2Projective::from(commitment);
                    }
                }
            }
        }
        let total = total.ok_or(DkgError::NotInitialized)?;
        Ok(Self(total.iter().map(Curve::to_affine).collect()))
    }
}

/// Sample a random polynomial with `degree` coefficients and the given constant term.
pub fn generate_polynomial<R: RngCore + CryptoRng>(secret: Scalar, degree: usize, rng: &mut R) -> Vec<Scalar> {
    let mut coefficients = Vec::with_capacity(degree);
    coefficients.push(secret);
    for _ in 1..degree {
        coefficients.push(Scalar::random(&mut *rng));
    }
    coefficients
}

/// Evaluate a polynomial at `x` (Horner)
pub fn evaluate_polynomial(coefficients: &[Scalar], x: &Scalar) -> Scalar {
    let mut result = Scalar::ZERO;
    for coefficient in coefficients.iter().rev() {
        result = result * x + coefficient;
    }
    result
}

/// Feldman commitments `a_k · G2`
pub fn commit(coefficients: &[Scalar]) -> PublicPolynomial {
    PublicPolynomial(
        coefficients
            .iter()
            .map(|coefficient| (G2Projective::generator() * coefficient).to_affine())
            .collect(),
    )
}

/// Check `share` for participant `index` against a dealer's commitments
pub fn verify_share(share: &Scalar, index: u32, commitments: &PublicPolynomial) -> bool {
    let lhs = G2Projective::generator() * share;
    lhs.to_affine() == commitments.eval(index).to_affine()
}

/// Lagrange coefficient at zero for `index` among `indices`
pub fn lagrange_coefficient(index: u32, indices: &[u32]) -> Result<Scalar> {
    let x_i = Scalar::from(u64::from(index));
    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;

    for &other in indices {
        if other == index {
            continue;
        }
        let x_j = Scalar::from(u64::from(other));
        numerator *= x_j;
        denominator *= x_j - x_i;
    }

    Option::<Scalar>::from(denominator.invert())
        .map(|inverse| numerator * inverse)
        .ok_or(DkgError::DuplicateShareIndex(index))
}
