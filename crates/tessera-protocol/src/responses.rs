//! Responses produced by callbacks.
//!
//! A response describes what the round just produced; when the new state needs
//! offline work it becomes the payload of an [`Operation`](crate::types::Operation).

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::payload::ParticipantId;
use crate::serde::base64_bytes;
use crate::states::DkgStage;

/// Invitation handed to one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureProposalInvitation {
    /// Assigned participant id
    pub participant_id: ParticipantId,
    /// Participant title
    pub title: String,
    /// Communication key fingerprint
    pub pub_key_fingerprint: String,
    /// Random invitation secret
    pub invitation_secret: String,
}

/// Invitations created by a new round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureProposalInvitations {
    /// One invitation per participant, by id
    pub invitations: Vec<SignatureProposalInvitation>,
}

/// Participant with the keys the DKG needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkgPubKeyEntry {
    /// Participant id
    pub participant_id: ParticipantId,
    /// Participant title
    pub title: String,
    /// Executor DKG public key
    #[serde(with = "base64_bytes")]
    pub dkg_pub_key: Vec<u8>,
}

/// Every invitation accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureProposalConfirmed {
    /// Agreed signing threshold
    pub signing_threshold: usize,
    /// Confirmed participants by id
    pub participants: Vec<DkgPubKeyEntry>,
}

/// Input of the commits stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkgPubKeys {
    /// Reconstruction threshold
    pub threshold: usize,
    /// Participants by id
    pub participants: Vec<DkgPubKeyEntry>,
}

/// One participant's artifact from a finished DKG stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkgStageEntry {
    /// Participant id
    pub participant_id: ParticipantId,
    /// Participant title
    pub title: String,
    /// Stage artifact
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

/// Artifacts of a finished DKG stage, input of the next one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkgStageResponse {
    /// Stage the artifacts belong to
    pub stage: DkgStage,
    /// Artifacts by participant id
    pub participants: Vec<DkgStageEntry>,
}

/// Agreed distributed public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkgMasterKey {
    /// Compressed master public key
    #[serde(with = "base64_bytes")]
    pub master_key: Vec<u8>,
}

/// Signing participant address book entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningParticipantEntry {
    /// Participant id
    pub participant_id: ParticipantId,
    /// Routing address
    pub addr: String,
}

/// A signing round was requested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningStarted {
    /// Signing round
    pub signing_id: String,
    /// Requesting participant
    pub initiator_id: ParticipantId,
    /// Bytes to sign
    #[serde(with = "base64_bytes")]
    pub src_payload: Vec<u8>,
}

/// Everyone agreed; partial signatures are due
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningPartialSignsRequested {
    /// Signing round
    pub signing_id: String,
    /// Optional batch
    pub batch_id: Option<String>,
    /// Bytes to sign
    #[serde(with = "base64_bytes")]
    pub src_payload: Vec<u8>,
    /// Expected signers
    pub participants: Vec<SigningParticipantEntry>,
}

/// One received partial signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSignEntry {
    /// Signer id
    pub participant_id: ParticipantId,
    /// Signer address
    pub addr: String,
    /// Encoded partial signature
    #[serde(with = "base64_bytes")]
    pub partial_sign: Vec<u8>,
}

/// Every partial signature received
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningPartialSigns {
    /// Signing round
    pub signing_id: String,
    /// Signed bytes
    #[serde(with = "base64_bytes")]
    pub src_payload: Vec<u8>,
    /// Partial signatures by participant id
    pub partial_signs: Vec<PartialSignEntry>,
}

/// Any callback response
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Response {
    SignatureProposalInvitations(SignatureProposalInvitations),
    SignatureProposalConfirmed(SignatureProposalConfirmed),
    DkgPubKeys(DkgPubKeys),
    DkgStage(DkgStageResponse),
    DkgMasterKey(DkgMasterKey),
    SigningStarted(SigningStarted),
    SigningPartialSignsRequested(SigningPartialSignsRequested),
    SigningPartialSigns(SigningPartialSigns),
}

impl Response {
    /// JSON body of the response, as placed in an operation payload
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        let payload = match self {
            Self::SignatureProposalInvitations(response) => serde_json::to_vec(response)?,
            Self::SignatureProposalConfirmed(response) => serde_json::to_vec(response)?,
            Self::DkgPubKeys(response) => serde_json::to_vec(response)?,
            Self::DkgStage(response) => serde_json::to_vec(response)?,
            Self::DkgMasterKey(response) => serde_json::to_vec(response)?,
            Self::SigningStarted(response) => serde_json::to_vec(response)?,
            Self::SigningPartialSignsRequested(response) => serde_json::to_vec(response)?,
            Self::SigningPartialSigns(response) => serde_json::to_vec(response)?,
        };
        Ok(payload)
    }
}
