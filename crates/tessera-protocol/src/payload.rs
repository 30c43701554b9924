//! Round-scoped payload carried by the phase machines.
//!
//! One sub-payload per phase. The phase owning the current state writes its
//! own sub-payload; earlier ones stay readable so later phases can seed their
//! quorums from them.

use std::collections::BTreeMap;
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ProtocolError, Result};
use crate::serde::{base64_bytes, base64_opt};

/// Position of a participant in the signature proposal list
pub type ParticipantId = u32;

/// Hex SHA-256 of a participant's communication public key
pub type PubKeyFingerprint = String;

/// Fingerprint a communication public key
pub fn fingerprint(pub_key: &[u8]) -> PubKeyFingerprint {
    hex::encode(Sha256::digest(pub_key))
}

/// Participant status that may only move forward.
pub trait ForwardStatus: Copy + PartialEq + Debug {
    /// Position in the status order
    fn rank(self) -> u8;

    /// No further transition is allowed
    fn is_final(self) -> bool;

    /// Move to `next`, refusing to go backwards or leave a final status
    fn advance_to(&mut self, next: Self) -> Result<()> {
        if self.is_final() || next.rank() <= self.rank() {
            return Err(ProtocolError::stale_confirmation(format!(
                "cannot move participant status from {self:?} to {next:?}"
            )));
        }
        *self = next;
        Ok(())
    }
}

/// Answer to an invitation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// No answer yet
    AwaitConfirmation,
    /// Accepted
    Confirmed,
    /// Refused
    Declined,
    /// Could not take part
    Error,
}

impl ForwardStatus for ParticipantStatus {
    fn rank(self) -> u8 {
        match self {
            Self::AwaitConfirmation => 0,
            Self::Confirmed | Self::Declined | Self::Error => 1,
        }
    }

    fn is_final(self) -> bool {
        self.rank() == 1
    }
}

/// Progress of one participant through the DKG stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum DkgParticipantStatus {
    CommitAwaitConfirmation,
    CommitConfirmed,
    CommitConfirmationError,
    DealAwaitConfirmation,
    DealConfirmed,
    DealConfirmationError,
    ResponseAwaitConfirmation,
    ResponseConfirmed,
    ResponseConfirmationError,
    MasterKeyAwaitConfirmation,
    MasterKeyConfirmed,
    MasterKeyConfirmationError,
}

impl ForwardStatus for DkgParticipantStatus {
    fn rank(self) -> u8 {
        match self {
            Self::CommitAwaitConfirmation => 0,
            Self::CommitConfirmed | Self::CommitConfirmationError => 1,
            Self::DealAwaitConfirmation => 2,
            Self::DealConfirmed | Self::DealConfirmationError => 3,
            Self::ResponseAwaitConfirmation => 4,
            Self::ResponseConfirmed | Self::ResponseConfirmationError => 5,
            Self::MasterKeyAwaitConfirmation => 6,
            Self::MasterKeyConfirmed | Self::MasterKeyConfirmationError => 7,
        }
    }

    fn is_final(self) -> bool {
        matches!(
            self,
            Self::CommitConfirmationError
                | Self::DealConfirmationError
                | Self::ResponseConfirmationError
                | Self::MasterKeyConfirmed
                | Self::MasterKeyConfirmationError
        )
    }
}

/// Progress of one participant through a signing round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningParticipantStatus {
    /// Has not agreed to sign yet
    AwaitConfirmation,
    /// Agreed to sign
    Confirmed,
    /// Refused to sign
    Declined,
    /// Partial signature expected
    AwaitPartialSign,
    /// Partial signature received
    PartialSignConfirmed,
    /// Failed to produce a partial signature
    Error,
}

impl ForwardStatus for SigningParticipantStatus {
    fn rank(self) -> u8 {
        match self {
            Self::AwaitConfirmation => 0,
            Self::Confirmed | Self::Declined => 1,
            Self::AwaitPartialSign => 2,
            Self::PartialSignConfirmed | Self::Error => 3,
        }
    }

    fn is_final(self) -> bool {
        matches!(self, Self::Declined | Self::PartialSignConfirmed | Self::Error)
    }
}

/// Invitation entry of the signature proposal quorum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureProposalParticipant {
    /// Index in the original participant list
    pub participant_id: ParticipantId,
    /// Human readable name, also the routing address
    pub title: String,
    /// Communication public key
    #[serde(with = "base64_bytes")]
    pub pub_key: Vec<u8>,
    /// Executor DKG public key
    #[serde(with = "base64_bytes")]
    pub dkg_pub_key: Vec<u8>,
    /// Random secret handed out with the invitation
    pub invitation_secret: String,
    /// When the participant accepted
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Invitation answer
    pub status: ParticipantStatus,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

/// Signature proposal sub-payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureProposalPayload {
    /// Invitations keyed by communication key fingerprint
    pub quorum: BTreeMap<PubKeyFingerprint, SignatureProposalParticipant>,
    /// Signatures needed to produce a threshold signature
    pub signing_threshold: usize,
    /// Round start
    pub created_at: DateTime<Utc>,
    /// Invitation deadline
    pub expires_at: DateTime<Utc>,
}

impl SignatureProposalPayload {
    /// Entry of the participant with `id`
    pub fn participant_mut(&mut self, id: ParticipantId) -> Result<&mut SignatureProposalParticipant> {
        self.quorum
            .values_mut()
            .find(|participant| participant.participant_id == id)
            .ok_or_else(|| ProtocolError::quorum_entry_not_found(format!("participant {id}")))
    }

    /// Entries ordered by participant id
    pub fn participants_by_id(&self) -> Vec<&SignatureProposalParticipant> {
        let mut participants: Vec<_> = self.quorum.values().collect();
        participants.sort_by_key(|participant| participant.participant_id);
        participants
    }
}

/// DKG quorum entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkgParticipant {
    /// Human readable name, also the routing address
    pub title: String,
    /// Communication public key
    #[serde(with = "base64_bytes")]
    pub pub_key: Vec<u8>,
    /// Executor DKG public key
    #[serde(with = "base64_bytes")]
    pub dkg_pub_key: Vec<u8>,
    /// Published commitment vector
    #[serde(with = "base64_opt", default)]
    pub commit: Option<Vec<u8>>,
    /// Deal addressed to this node
    #[serde(with = "base64_opt", default)]
    pub deal: Option<Vec<u8>>,
    /// Published deal responses
    #[serde(with = "base64_opt", default)]
    pub response: Option<Vec<u8>>,
    /// Published distributed public key
    #[serde(with = "base64_opt", default)]
    pub master_key: Option<Vec<u8>>,
    /// Stage progress
    pub status: DkgParticipantStatus,
    /// Reported failure
    pub error: Option<String>,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

/// DKG proposal sub-payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkgProposalPayload {
    /// Participants keyed by id
    pub quorum: BTreeMap<ParticipantId, DkgParticipant>,
    /// Reconstruction threshold
    pub threshold: usize,
    /// Ceremony start
    pub created_at: DateTime<Utc>,
    /// Deadline of the current stage
    pub expires_at: DateTime<Utc>,
}

impl DkgProposalPayload {
    /// Entry of the participant with `id`
    pub fn participant_mut(&mut self, id: ParticipantId) -> Result<&mut DkgParticipant> {
        self.quorum
            .get_mut(&id)
            .ok_or_else(|| ProtocolError::quorum_entry_not_found(format!("dkg participant {id}")))
    }
}

/// Signing quorum entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningParticipant {
    /// Routing address
    pub addr: String,
    /// Encoded partial signature
    #[serde(with = "base64_opt", default)]
    pub partial_sign: Option<Vec<u8>>,
    /// Round progress
    pub status: SigningParticipantStatus,
    /// Reported failure
    pub error: Option<String>,
    /// Last change
    pub updated_at: DateTime<Utc>,
}

/// Signing proposal sub-payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningProposalPayload {
    /// Participants keyed by id
    pub quorum: BTreeMap<ParticipantId, SigningParticipant>,
    /// Identifier of this signing round
    pub signing_id: String,
    /// Optional batch the round belongs to
    pub batch_id: Option<String>,
    /// Participant who requested the signature
    pub initiator_id: ParticipantId,
    /// Bytes to sign
    #[serde(with = "base64_bytes")]
    pub src_payload: Vec<u8>,
    /// Round start
    pub created_at: DateTime<Utc>,
    /// Deadline of the current stage
    pub expires_at: DateTime<Utc>,
}

impl SigningProposalPayload {
    /// Entry of the participant with `id`
    pub fn participant_mut(&mut self, id: ParticipantId) -> Result<&mut SigningParticipant> {
        self.quorum
            .get_mut(&id)
            .ok_or_else(|| ProtocolError::quorum_entry_not_found(format!("signing participant {id}")))
    }
}

/// Aggregate payload persisted in every dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineStatePayload {
    /// Round this payload belongs to
    pub dkg_round_id: String,
    /// Invitation phase
    pub signature_proposal: Option<SignatureProposalPayload>,
    /// DKG phase
    pub dkg_proposal: Option<DkgProposalPayload>,
    /// Current signing round
    pub signing_proposal: Option<SigningProposalPayload>,
}

impl MachineStatePayload {
    /// Empty payload for a new round
    pub fn new(dkg_round_id: impl Into<String>) -> Self {
        Self {
            dkg_round_id: dkg_round_id.into(),
            signature_proposal: None,
            dkg_proposal: None,
            signing_proposal: None,
        }
    }

    /// Invitation sub-payload
    pub fn signature_proposal(&self) -> Result<&SignatureProposalPayload> {
        self.signature_proposal
            .as_ref()
            .ok_or_else(|| ProtocolError::not_found("signature proposal payload"))
    }

    /// Mutable invitation sub-payload
    pub fn signature_proposal_mut(&mut self) -> Result<&mut SignatureProposalPayload> {
        self.signature_proposal
            .as_mut()
            .ok_or_else(|| ProtocolError::not_found("signature proposal payload"))
    }

    /// DKG sub-payload
    pub fn dkg_proposal(&self) -> Result<&DkgProposalPayload> {
        self.dkg_proposal
            .as_ref()
            .ok_or_else(|| ProtocolError::not_found("dkg proposal payload"))
    }

    /// Mutable DKG sub-payload
    pub fn dkg_proposal_mut(&mut self) -> Result<&mut DkgProposalPayload> {
        self.dkg_proposal
            .as_mut()
            .ok_or_else(|| ProtocolError::not_found("dkg proposal payload"))
    }

    /// Mutable signing sub-payload
    pub fn signing_proposal_mut(&mut self) -> Result<&mut SigningProposalPayload> {
        self.signing_proposal
            .as_mut()
            .ok_or_else(|| ProtocolError::not_found("signing proposal payload"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SIGNING: [SigningParticipantStatus; 6] = [
        SigningParticipantStatus::AwaitConfirmation,
        SigningParticipantStatus::Confirmed,
        SigningParticipantStatus::Declined,
        SigningParticipantStatus::AwaitPartialSign,
        SigningParticipantStatus::PartialSignConfirmed,
        SigningParticipantStatus::Error,
    ];

    const DKG: [DkgParticipantStatus; 12] = [
        DkgParticipantStatus::CommitAwaitConfirmation,
        DkgParticipantStatus::CommitConfirmed,
        DkgParticipantStatus::CommitConfirmationError,
        DkgParticipantStatus::DealAwaitConfirmation,
        DkgParticipantStatus::DealConfirmed,
        DkgParticipantStatus::DealConfirmationError,
        DkgParticipantStatus::ResponseAwaitConfirmation,
        DkgParticipantStatus::ResponseConfirmed,
        DkgParticipantStatus::ResponseConfirmationError,
        DkgParticipantStatus::MasterKeyAwaitConfirmation,
        DkgParticipantStatus::MasterKeyConfirmed,
        DkgParticipantStatus::MasterKeyConfirmationError,
    ];

    #[test]
    fn test_confirmed_cannot_revert() {
        let mut status = ParticipantStatus::AwaitConfirmation;
        status.advance_to(ParticipantStatus::Confirmed).unwrap();
        let err = status.advance_to(ParticipantStatus::AwaitConfirmation).unwrap_err();
        assert!(matches!(err, ProtocolError::StaleConfirmation { .. }));
        assert!(status.advance_to(ParticipantStatus::Declined).is_err());
        assert_eq!(status, ParticipantStatus::Confirmed);
    }

    #[test]
    fn test_dkg_error_is_final() {
        let mut status = DkgParticipantStatus::DealAwaitConfirmation;
        status.advance_to(DkgParticipantStatus::DealConfirmationError).unwrap();
        assert!(status
            .advance_to(DkgParticipantStatus::ResponseAwaitConfirmation)
            .is_err());
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = fingerprint(b"abc");
        assert_eq!(
            fp,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    proptest! {
        #[test]
        fn signing_status_only_moves_forward(steps in proptest::collection::vec(0usize..6, 1..20)) {
            let mut status = SigningParticipantStatus::AwaitConfirmation;
            for step in steps {
                let before = status;
                let next = SIGNING[step];
                match status.advance_to(next) {
                    Ok(()) => {
                        prop_assert!(next.rank() > before.rank());
                        prop_assert!(!before.is_final());
                    }
                    Err(_) => prop_assert_eq!(status, before),
                }
            }
        }

        #[test]
        fn dkg_status_only_moves_forward(steps in proptest::collection::vec(0usize..12, 1..30)) {
            let mut status = DkgParticipantStatus::CommitAwaitConfirmation;
            for step in steps {
                let before = status;
                if status.advance_to(DKG[step]).is_ok() {
                    prop_assert!(status.rank() > before.rank());
                } else {
                    prop_assert_eq!(status, before);
                }
            }
        }
    }
}
