//! Requests carried in `Message::data`.
//!
//! Every external event has exactly one request type, fixed by
//! [`Request::decode`]. Requests are validated before any callback touches the
//! payload.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{MAX_PARTICIPANTS, MIN_PARTICIPANTS, TITLE_MAX_LEN, TITLE_MIN_LEN};
use crate::error::{ProtocolError, Result};
use crate::payload::ParticipantId;
use crate::serde::base64_bytes;
use crate::states::Event;

/// One invitee of a signature proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureProposalParticipantsEntry {
    /// Human readable name, also the routing address
    pub title: String,
    /// Communication public key
    #[serde(with = "base64_bytes")]
    pub pub_key: Vec<u8>,
    /// Executor DKG public key
    #[serde(with = "base64_bytes")]
    pub dkg_pub_key: Vec<u8>,
}

/// Starts a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureProposalParticipantsListRequest {
    /// Invitees; their position becomes their participant id
    pub participants: Vec<SignatureProposalParticipantsEntry>,
    /// Signatures needed to produce a threshold signature
    pub signing_threshold: usize,
    /// Request time
    pub created_at: DateTime<Utc>,
}

impl SignatureProposalParticipantsListRequest {
    /// Check counts, title bounds, key presence and uniqueness
    pub fn validate(&self) -> Result<()> {
        let count = self.participants.len();
        if !(MIN_PARTICIPANTS..=MAX_PARTICIPANTS).contains(&count) {
            return Err(ProtocolError::invalid(format!(
                "participants count must be in {MIN_PARTICIPANTS}..={MAX_PARTICIPANTS}, got {count}"
            )));
        }
        if !(2..=count).contains(&self.signing_threshold) {
            return Err(ProtocolError::invalid(format!(
                "signing threshold must be in 2..={count}, got {}",
                self.signing_threshold
            )));
        }

        let mut titles = HashSet::new();
        let mut pub_keys = HashSet::new();
        let mut dkg_pub_keys = HashSet::new();
        for participant in &self.participants {
            let title_len = participant.title.chars().count();
            if !(TITLE_MIN_LEN..=TITLE_MAX_LEN).contains(&title_len) {
                return Err(ProtocolError::invalid(format!(
                    "title `{}` must be {TITLE_MIN_LEN}..={TITLE_MAX_LEN} characters",
                    participant.title
                )));
            }
            if participant.pub_key.is_empty() || participant.dkg_pub_key.is_empty() {
                return Err(ProtocolError::invalid(format!(
                    "participant `{}` is missing a public key",
                    participant.title
                )));
            }
            if !titles.insert(participant.title.as_str()) {
                return Err(ProtocolError::invalid(format!(
                    "duplicate title `{}`",
                    participant.title
                )));
            }
            if !pub_keys.insert(participant.pub_key.as_slice())
                || !dkg_pub_keys.insert(participant.dkg_pub_key.as_slice())
            {
                return Err(ProtocolError::invalid(format!(
                    "participant `{}` reuses a public key",
                    participant.title
                )));
            }
        }
        Ok(())
    }
}

/// Invitation answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureProposalParticipantRequest {
    /// Answering participant
    pub participant_id: ParticipantId,
    /// Request time
    pub created_at: DateTime<Utc>,
}

/// Request with no body beyond its timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultRequest {
    /// Request time
    pub created_at: DateTime<Utc>,
}

/// A participant's artifact for the current DKG stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkgProposalConfirmationRequest {
    /// Sending participant
    pub participant_id: ParticipantId,
    /// Commitments, deal, responses or master key
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    /// Request time
    pub created_at: DateTime<Utc>,
}

impl DkgProposalConfirmationRequest {
    /// Reject empty artifacts
    pub fn validate(&self) -> Result<()> {
        if self.payload.is_empty() {
            return Err(ProtocolError::invalid("confirmation payload is empty"));
        }
        Ok(())
    }
}

/// A participant's failure report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationErrorRequest {
    /// Failing participant
    pub participant_id: ParticipantId,
    /// Failure description
    pub error: String,
    /// Request time
    pub created_at: DateTime<Utc>,
}

/// Asks the group for a threshold signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningProposalStartRequest {
    /// Identifier of the signing round
    pub signing_id: String,
    /// Optional batch the round belongs to
    #[serde(default)]
    pub batch_id: Option<String>,
    /// Requesting participant
    pub participant_id: ParticipantId,
    /// Bytes to sign
    #[serde(with = "base64_bytes")]
    pub src_payload: Vec<u8>,
    /// Request time
    pub created_at: DateTime<Utc>,
}

impl SigningProposalStartRequest {
    /// Reject empty identifiers and payloads
    pub fn validate(&self) -> Result<()> {
        if self.signing_id.is_empty() {
            return Err(ProtocolError::invalid("signing id is empty"));
        }
        if self.src_payload.is_empty() {
            return Err(ProtocolError::invalid("nothing to sign"));
        }
        Ok(())
    }
}

/// Signing agreement answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningProposalParticipantRequest {
    /// Signing round
    pub signing_id: String,
    /// Answering participant
    pub participant_id: ParticipantId,
    /// Request time
    pub created_at: DateTime<Utc>,
}

/// A participant's partial signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningProposalPartialSignRequest {
    /// Signing round
    pub signing_id: String,
    /// Signing participant
    pub participant_id: ParticipantId,
    /// Encoded partial signature
    #[serde(with = "base64_bytes")]
    pub partial_sign: Vec<u8>,
    /// Request time
    pub created_at: DateTime<Utc>,
}

impl SigningProposalPartialSignRequest {
    /// Reject empty signatures
    pub fn validate(&self) -> Result<()> {
        if self.partial_sign.is_empty() {
            return Err(ProtocolError::invalid("partial signature is empty"));
        }
        Ok(())
    }
}

/// Any decoded request
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Request {
    ParticipantsList(SignatureProposalParticipantsListRequest),
    SignatureParticipant(SignatureProposalParticipantRequest),
    Default(DefaultRequest),
    DkgConfirmation(DkgProposalConfirmationRequest),
    ConfirmationError(ConfirmationErrorRequest),
    SigningStart(SigningProposalStartRequest),
    SigningParticipant(SigningProposalParticipantRequest),
    PartialSign(SigningProposalPartialSignRequest),
}

impl Request {
    /// Decode `data` with the request type fixed for `event`
    pub fn decode(event: Event, data: &[u8]) -> Result<Self> {
        let request = match event {
            Event::InitProposal => Self::ParticipantsList(serde_json::from_slice(data)?),
            Event::SigConfirmByParticipant | Event::SigDeclineByParticipant => {
                Self::SignatureParticipant(serde_json::from_slice(data)?)
            }
            Event::DkgInitProcess | Event::SigningRestart => Self::Default(serde_json::from_slice(data)?),
            Event::DkgCommitConfirmReceived
            | Event::DkgDealConfirmReceived
            | Event::DkgResponseConfirmReceived
            | Event::DkgMasterKeyConfirmReceived => Self::DkgConfirmation(serde_json::from_slice(data)?),
            Event::DkgCommitConfirmError
            | Event::DkgDealConfirmError
            | Event::DkgResponseConfirmError
            | Event::DkgMasterKeyConfirmError
            | Event::SigningPartialSignError => Self::ConfirmationError(serde_json::from_slice(data)?),
            Event::SigningStart => Self::SigningStart(serde_json::from_slice(data)?),
            Event::SigningConfirmByParticipant | Event::SigningDeclineByParticipant => {
                Self::SigningParticipant(serde_json::from_slice(data)?)
            }
            Event::SigningPartialSignReceived => Self::PartialSign(serde_json::from_slice(data)?),
            Event::SigValidate
            | Event::SigSetValidated
            | Event::SigCancelByParticipant
            | Event::SigCancelByTimeout
            | Event::DkgCommitsValidate
            | Event::DkgCommitsConfirmed
            | Event::DkgCommitsCancelByError
            | Event::DkgCommitsCancelByTimeout
            | Event::DkgDealsValidate
            | Event::DkgDealsConfirmed
            | Event::DkgDealsCancelByError
            | Event::DkgDealsCancelByTimeout
            | Event::DkgResponsesValidate
            | Event::DkgResponsesConfirmed
            | Event::DkgResponsesCancelByError
            | Event::DkgResponsesCancelByTimeout
            | Event::DkgMasterKeysValidate
            | Event::DkgMasterKeysConfirmed
            | Event::DkgMasterKeysCancelByError
            | Event::DkgMasterKeysCancelByTimeout
            | Event::SigningConfirmationsValidate
            | Event::SigningConfirmationsConfirmed
            | Event::SigningCancelByParticipant
            | Event::SigningConfirmationsCancelByTimeout
            | Event::SigningPartialSignsValidate
            | Event::SigningPartialSignsConfirmed
            | Event::SigningPartialSignsCancelByError
            | Event::SigningPartialSignsCancelByTimeout => {
                return Err(ProtocolError::InternalEventRejected {
                    event: event.to_string(),
                })
            }
        };
        request.validate()?;
        Ok(request)
    }

    /// Encode the request body for `Message::data`
    pub fn encode(&self) -> Result<Vec<u8>> {
        let data = match self {
            Self::ParticipantsList(request) => serde_json::to_vec(request)?,
            Self::SignatureParticipant(request) => serde_json::to_vec(request)?,
            Self::Default(request) => serde_json::to_vec(request)?,
            Self::DkgConfirmation(request) => serde_json::to_vec(request)?,
            Self::ConfirmationError(request) => serde_json::to_vec(request)?,
            Self::SigningStart(request) => serde_json::to_vec(request)?,
            Self::SigningParticipant(request) => serde_json::to_vec(request)?,
            Self::PartialSign(request) => serde_json::to_vec(request)?,
        };
        Ok(data)
    }

    /// Run the per-type validation
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::ParticipantsList(request) => request.validate(),
            Self::DkgConfirmation(request) => request.validate(),
            Self::SigningStart(request) => request.validate(),
            Self::PartialSign(request) => request.validate(),
            Self::SignatureParticipant(_)
            | Self::Default(_)
            | Self::ConfirmationError(_)
            | Self::SigningParticipant(_) => Ok(()),
        }
    }

    /// Time the request was made
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::ParticipantsList(request) => request.created_at,
            Self::SignatureParticipant(request) => request.created_at,
            Self::Default(request) => request.created_at,
            Self::DkgConfirmation(request) => request.created_at,
            Self::ConfirmationError(request) => request.created_at,
            Self::SigningStart(request) => request.created_at,
            Self::SigningParticipant(request) => request.created_at,
            Self::PartialSign(request) => request.created_at,
        }
    }
}

/// Borrow a concrete request out of [`Request`].
pub trait FromRequest {
    /// Name used in error messages
    const NAME: &'static str;

    /// The concrete request, if `request` holds one
    fn from_request(request: &Request) -> Option<&Self>;
}

macro_rules! from_request {
    ($($variant:ident => $ty:ty,)+) => {
        $(
            impl FromRequest for $ty {
                const NAME: &'static str = stringify!($ty);

                fn from_request(request: &Request) -> Option<&Self> {
                    match request {
                        Request::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for Request {
                fn from(request: $ty) -> Self {
                    Request::$variant(request)
                }
            }
        )+
    };
}

from_request! {
    ParticipantsList => SignatureProposalParticipantsListRequest,
    SignatureParticipant => SignatureProposalParticipantRequest,
    Default => DefaultRequest,
    DkgConfirmation => DkgProposalConfirmationRequest,
    ConfirmationError => ConfirmationErrorRequest,
    SigningStart => SigningProposalStartRequest,
    SigningParticipant => SigningProposalParticipantRequest,
    PartialSign => SigningProposalPartialSignRequest,
}

/// Extract the request a callback expects
pub(crate) fn expect_request<T: FromRequest>(request: Option<&Request>) -> Result<&T> {
    request
        .and_then(T::from_request)
        .ok_or_else(|| ProtocolError::invalid(format!("expected {}", T::NAME)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn entry(title: &str, key: u8) -> SignatureProposalParticipantsEntry {
        SignatureProposalParticipantsEntry {
            title: title.to_string(),
            pub_key: vec![key; 32],
            dkg_pub_key: vec![key; 48],
        }
    }

    fn list(participants: Vec<SignatureProposalParticipantsEntry>, threshold: usize) -> SignatureProposalParticipantsListRequest {
        SignatureProposalParticipantsListRequest {
            participants,
            signing_threshold: threshold,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_participants_list_bounds() {
        assert!(list(vec![entry("alice", 1), entry("bob", 2)], 2).validate().is_ok());
        assert!(list(vec![entry("alice", 1)], 1).validate().is_err());
        assert!(list(vec![entry("alice", 1), entry("bob", 2)], 3).validate().is_err());
        assert!(list(vec![entry("al", 1), entry("bob", 2)], 2).validate().is_err());
        assert!(list(vec![entry(&"x".repeat(151), 1), entry("bob", 2)], 2)
            .validate()
            .is_err());
    }

    #[test]
    fn test_participants_list_uniqueness() {
        assert!(list(vec![entry("alice", 1), entry("alice", 2)], 2).validate().is_err());
        assert!(list(vec![entry("alice", 1), entry("bob", 1)], 2).validate().is_err());

        let mut missing_key = entry("bob", 2);
        missing_key.dkg_pub_key.clear();
        assert!(list(vec![entry("alice", 1), missing_key], 2).validate().is_err());
    }

    #[test]
    fn test_decode_follows_event_table() {
        let request = DkgProposalConfirmationRequest {
            participant_id: 3,
            payload: vec![1, 2, 3],
            created_at: Utc::now(),
        };
        let data = Request::from(request.clone()).encode().unwrap();

        let decoded = Request::decode(Event::DkgDealConfirmReceived, &data).unwrap();
        assert_eq!(decoded, Request::DkgConfirmation(request));
        assert!(Request::decode(Event::SigningStart, &data).is_err());
    }

    #[test]
    fn test_decode_rejects_internal_events() {
        let data = Request::from(DefaultRequest { created_at: Utc::now() })
            .encode()
            .unwrap();
        let err = Request::decode(Event::DkgCommitsConfirmed, &data).unwrap_err();
        assert!(matches!(err, ProtocolError::InternalEventRejected { .. }));
    }

    #[test]
    fn test_decode_runs_validation() {
        let data = Request::from(DkgProposalConfirmationRequest {
            participant_id: 0,
            payload: Vec::new(),
            created_at: Utc::now(),
        })
        .encode()
        .unwrap();
        assert!(Request::decode(Event::DkgCommitConfirmReceived, &data).is_err());
    }

    #[test]
    fn test_expect_request() {
        let request = Request::from(DefaultRequest { created_at: Utc::now() });
        assert!(expect_request::<DefaultRequest>(Some(&request)).is_ok());
        assert!(expect_request::<SigningProposalStartRequest>(Some(&request)).is_err());
        assert!(expect_request::<DefaultRequest>(None).is_err());
    }
}
