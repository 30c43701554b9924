//! Error types for the DKG and threshold signature primitives.

use thiserror::Error;

/// Errors raised by the DKG core and the BLS primitives
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DkgError {
    /// Bytes do not encode a valid curve point
    #[error("Invalid point encoding: {0}")]
    InvalidPoint(&'static str),

    /// Bytes do not encode a canonical scalar
    #[error("Invalid scalar encoding")]
    InvalidScalar,

    /// Participant not part of the round
    #[error("Unknown participant: {0}")]
    UnknownParticipant(String),

    /// Participant registered twice with different data
    #[error("Duplicate participant: {0}")]
    DuplicateParticipant(String),

    /// Threshold outside `1..=n`
    #[error("Invalid threshold {threshold} for {participants} participants")]
    InvalidThreshold {
        /// Requested threshold
        threshold: usize,
        /// Number of participants
        participants: usize,
    },

    /// Operation called before `init_instance`
    #[error("DKG instance not initialized")]
    NotInitialized,

    /// Participant set changed after `init_instance`
    #[error("DKG instance already initialized")]
    AlreadyInitialized,

    /// Deal commitments differ from the dealer's published ones
    #[error("Commitments in deal from dealer {0} do not match the published commitments")]
    CommitmentMismatch(u32),

    /// Share fails verification against the dealer's commitments
    #[error("Invalid share from dealer {0}")]
    InvalidShare(u32),

    /// Deals missing from some dealers
    #[error("Missing deals from dealers {0:?}")]
    MissingDeals(Vec<u32>),

    /// Not every deal was approved by every verifier
    #[error("DKG instance not certified: {0}")]
    NotCertified(String),

    /// Ciphertext could not be decrypted
    #[error("Decryption failed")]
    Decryption,

    /// Plaintext could not be encrypted
    #[error("Encryption failed")]
    Encryption,

    /// Fewer valid partial signatures than the threshold
    #[error("Insufficient shares: need {required}, got {got}")]
    InsufficientShares {
        /// Threshold
        required: usize,
        /// Valid shares available
        got: usize,
    },

    /// Two partial signatures claim the same index
    #[error("Duplicate share index {0}")]
    DuplicateShareIndex(u32),

    /// Signature does not verify
    #[error("Invalid signature")]
    InvalidSignature,

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DkgError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result alias for DKG operations
pub type Result<T> = std::result::Result<T, DkgError>;
