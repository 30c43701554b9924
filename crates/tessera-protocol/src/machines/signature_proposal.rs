//! Signature proposal: invite every participant and collect their answers.

use std::collections::BTreeMap;

use chrono::Utc;
use rand::RngCore;
use tessera_fsm::EventDesc;
use tracing::info;

use super::{Callback, Machine, Outcome};
use crate::config::{signature_proposal_window, INVITATION_SECRET_LEN};
use crate::error::{ProtocolError, Result};
use crate::payload::{
    fingerprint, ForwardStatus, MachineStatePayload, ParticipantStatus, SignatureProposalParticipant,
    SignatureProposalPayload,
};
use crate::quorum::{verdict, Standing, Verdict};
use crate::requests::{
    expect_request, Request, SignatureProposalParticipantRequest, SignatureProposalParticipantsListRequest,
};
use crate::responses::{
    DkgPubKeyEntry, Response, SignatureProposalConfirmed, SignatureProposalInvitation,
    SignatureProposalInvitations,
};
use crate::states::{Event, State};

/// Machine name
pub const NAME: &str = "signature_proposal";

/// Build the signature proposal machine
pub fn machine() -> Machine {
    let awaiting = State::SigProposalAwaitParticipantsConfirmations;
    Machine::must_new(
        NAME,
        State::SigProposalInit,
        vec![
            EventDesc::new(Event::InitProposal, [State::SigProposalInit], awaiting),
            EventDesc::new(Event::SigConfirmByParticipant, [awaiting], awaiting),
            EventDesc::new(Event::SigDeclineByParticipant, [awaiting], awaiting),
            EventDesc::new(Event::SigValidate, [awaiting], awaiting).auto(),
            EventDesc::new(Event::SigSetValidated, [awaiting], State::SigProposalCollected).internal(),
            EventDesc::new(
                Event::SigCancelByParticipant,
                [awaiting],
                State::SigProposalCanceledByParticipant,
            )
            .internal(),
            EventDesc::new(
                Event::SigCancelByTimeout,
                [awaiting],
                State::SigProposalCanceledByTimeout,
            )
            .internal(),
        ],
        vec![
            (Event::InitProposal, init_proposal as Callback),
            (Event::SigConfirmByParticipant, answer_invitation as Callback),
            (Event::SigDeclineByParticipant, answer_invitation as Callback),
            (Event::SigValidate, validate as Callback),
        ],
    )
}

fn invitation_secret() -> String {
    let mut secret = [0u8; INVITATION_SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut secret);
    hex::encode(secret)
}

fn init_proposal(
    payload: &mut MachineStatePayload,
    _event: Event,
    request: Option<&Request>,
) -> Result<Outcome> {
    let request = expect_request::<SignatureProposalParticipantsListRequest>(request)?;
    request.validate()?;

    let mut quorum = BTreeMap::new();
    let mut invitations = Vec::with_capacity(request.participants.len());
    for (index, entry) in request.participants.iter().enumerate() {
        let participant_id = u32::try_from(index)
            .map_err(|_| ProtocolError::invalid("participant index out of range"))?;
        let pub_key_fingerprint = fingerprint(&entry.pub_key);
        let participant = SignatureProposalParticipant {
            participant_id,
            title: entry.title.clone(),
            pub_key: entry.pub_key.clone(),
            dkg_pub_key: entry.dkg_pub_key.clone(),
            invitation_secret: invitation_secret(),
            confirmed_at: None,
            status: ParticipantStatus::AwaitConfirmation,
            updated_at: request.created_at,
        };
        invitations.push(SignatureProposalInvitation {
            participant_id,
            title: participant.title.clone(),
            pub_key_fingerprint: pub_key_fingerprint.clone(),
            invitation_secret: participant.invitation_secret.clone(),
        });
        quorum.insert(pub_key_fingerprint, participant);
    }

    payload.signature_proposal = Some(SignatureProposalPayload {
        quorum,
        signing_threshold: request.signing_threshold,
        created_at: request.created_at,
        expires_at: request.created_at + signature_proposal_window(),
    });

    Ok(Outcome::respond(Response::SignatureProposalInvitations(
        SignatureProposalInvitations { invitations },
    )))
}

fn answer_invitation(
    payload: &mut MachineStatePayload,
    event: Event,
    request: Option<&Request>,
) -> Result<Outcome> {
    let request = expect_request::<SignatureProposalParticipantRequest>(request)?;
    let participant = payload
        .signature_proposal_mut()?
        .participant_mut(request.participant_id)?;

    if participant.status != ParticipantStatus::AwaitConfirmation {
        return Err(ProtocolError::stale_confirmation(format!(
            "participant {} already answered ({:?})",
            request.participant_id, participant.status
        )));
    }

    if event == Event::SigConfirmByParticipant {
        participant.status.advance_to(ParticipantStatus::Confirmed)?;
        participant.confirmed_at = Some(request.created_at);
    } else {
        participant.status.advance_to(ParticipantStatus::Declined)?;
    }
    participant.updated_at = request.created_at;

    Ok(Outcome::none())
}

fn standing(status: ParticipantStatus) -> Standing {
    match status {
        ParticipantStatus::AwaitConfirmation => Standing::Awaiting,
        ParticipantStatus::Confirmed => Standing::Done,
        ParticipantStatus::Declined | ParticipantStatus::Error => Standing::Failed,
    }
}

fn validate(payload: &mut MachineStatePayload, _event: Event, _request: Option<&Request>) -> Result<Outcome> {
    let proposal = payload.signature_proposal()?;
    let quorum_state = proposal.quorum.values().map(|participant| standing(participant.status));

    match verdict(quorum_state, proposal.expires_at, Utc::now()) {
        Verdict::TimedOut => Ok(Outcome::redirect(Event::SigCancelByTimeout)),
        Verdict::Failed => Ok(Outcome::redirect(Event::SigCancelByParticipant)),
        Verdict::Pending => Ok(Outcome::none()),
        Verdict::Complete => {
            let participants = proposal
                .participants_by_id()
                .into_iter()
                .map(|participant| DkgPubKeyEntry {
                    participant_id: participant.participant_id,
                    title: participant.title.clone(),
                    dkg_pub_key: participant.dkg_pub_key.clone(),
                })
                .collect::<Vec<_>>();
            info!(
                round = %payload.dkg_round_id,
                participants = participants.len(),
                "signature proposal collected"
            );
            Ok(Outcome::redirect(Event::SigSetValidated).with_response(
                Response::SignatureProposalConfirmed(SignatureProposalConfirmed {
                    signing_threshold: proposal.signing_threshold,
                    participants,
                }),
            ))
        }
    }
}
