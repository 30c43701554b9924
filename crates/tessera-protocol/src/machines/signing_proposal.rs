//! Signing proposal: agree on a payload, then collect partial signatures.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tessera_fsm::EventDesc;
use tracing::{info, warn};

use super::{Callback, Machine, Outcome};
use crate::config::signing_stage_window;
use crate::error::{ProtocolError, Result};
use crate::payload::{
    ForwardStatus, MachineStatePayload, SigningParticipant, SigningParticipantStatus, SigningProposalPayload,
};
use crate::quorum::{verdict, Standing, Verdict};
use crate::requests::{
    expect_request, ConfirmationErrorRequest, DefaultRequest, Request, SigningProposalParticipantRequest,
    SigningProposalPartialSignRequest, SigningProposalStartRequest,
};
use crate::responses::{
    PartialSignEntry, Response, SigningParticipantEntry, SigningPartialSigns, SigningPartialSignsRequested,
    SigningStarted,
};
use crate::states::{Event, State};

/// Machine name
pub const NAME: &str = "signing_proposal";

/// Build the signing proposal machine
pub fn machine() -> Machine {
    let idle = State::DkgMasterKeyCollected;
    let confirming = State::SigningAwaitConfirmations;
    let signing = State::SigningAwaitPartialSigns;

    Machine::must_new(
        NAME,
        idle,
        vec![
            EventDesc::new(Event::SigningStart, [idle], confirming),
            EventDesc::new(Event::SigningConfirmByParticipant, [confirming], confirming),
            EventDesc::new(Event::SigningDeclineByParticipant, [confirming], confirming),
            EventDesc::new(Event::SigningConfirmationsValidate, [confirming], confirming).auto(),
            EventDesc::new(Event::SigningConfirmationsConfirmed, [confirming], signing).internal(),
            EventDesc::new(
                Event::SigningCancelByParticipant,
                [confirming],
                State::SigningConfirmationsCanceledByParticipant,
            )
            .internal(),
            EventDesc::new(
                Event::SigningConfirmationsCancelByTimeout,
                [confirming],
                State::SigningConfirmationsCanceledByTimeout,
            )
            .internal(),
            EventDesc::new(Event::SigningPartialSignReceived, [signing], signing),
            EventDesc::new(Event::SigningPartialSignError, [signing], signing),
            EventDesc::new(Event::SigningPartialSignsValidate, [signing], signing).auto(),
            EventDesc::new(
                Event::SigningPartialSignsConfirmed,
                [signing],
                State::SigningPartialSignsCollected,
            )
            .internal(),
            EventDesc::new(
                Event::SigningPartialSignsCancelByError,
                [signing],
                State::SigningPartialSignsCanceledByError,
            )
            .internal(),
            EventDesc::new(
                Event::SigningPartialSignsCancelByTimeout,
                [signing],
                State::SigningPartialSignsCanceledByTimeout,
            )
            .internal(),
            EventDesc::new(Event::SigningRestart, [State::SigningPartialSignsCollected], idle),
        ],
        vec![
            (Event::SigningStart, start as Callback),
            (Event::SigningConfirmByParticipant, answer as Callback),
            (Event::SigningDeclineByParticipant, answer as Callback),
            (Event::SigningConfirmationsValidate, validate_confirmations as Callback),
            (Event::SigningPartialSignReceived, partial_sign_received as Callback),
            (Event::SigningPartialSignError, partial_sign_error as Callback),
            (Event::SigningPartialSignsValidate, validate_partial_signs as Callback),
            (Event::SigningRestart, restart as Callback),
        ],
    )
}

fn check_signing_id(proposal: &SigningProposalPayload, signing_id: &str) -> Result<()> {
    if proposal.signing_id != signing_id {
        return Err(ProtocolError::invalid(format!(
            "signing id `{signing_id}` does not match current round `{}`",
            proposal.signing_id
        )));
    }
    Ok(())
}

fn last_update(proposal: &SigningProposalPayload) -> DateTime<Utc> {
    proposal
        .quorum
        .values()
        .map(|participant| participant.updated_at)
        .max()
        .unwrap_or(proposal.created_at)
}

fn start(payload: &mut MachineStatePayload, _event: Event, request: Option<&Request>) -> Result<Outcome> {
    let request = expect_request::<SigningProposalStartRequest>(request)?;
    request.validate()?;

    let dkg = payload.dkg_proposal()?;
    if !dkg.quorum.contains_key(&request.participant_id) {
        return Err(ProtocolError::quorum_entry_not_found(format!(
            "initiator {} is not a dkg participant",
            request.participant_id
        )));
    }

    let quorum: BTreeMap<_, _> = dkg
        .quorum
        .iter()
        .map(|(participant_id, participant)| {
            let status = if *participant_id == request.participant_id {
                SigningParticipantStatus::Confirmed
            } else {
                SigningParticipantStatus::AwaitConfirmation
            };
            let entry = SigningParticipant {
                addr: participant.title.clone(),
                partial_sign: None,
                status,
                error: None,
                updated_at: request.created_at,
            };
            (*participant_id, entry)
        })
        .collect();

    payload.signing_proposal = Some(SigningProposalPayload {
        quorum,
        signing_id: request.signing_id.clone(),
        batch_id: request.batch_id.clone(),
        initiator_id: request.participant_id,
        src_payload: request.src_payload.clone(),
        created_at: request.created_at,
        expires_at: request.created_at + signing_stage_window(),
    });

    Ok(Outcome::respond(Response::SigningStarted(SigningStarted {
        signing_id: request.signing_id.clone(),
        initiator_id: request.participant_id,
        src_payload: request.src_payload.clone(),
    })))
}

fn answer(payload: &mut MachineStatePayload, event: Event, request: Option<&Request>) -> Result<Outcome> {
    let request = expect_request::<SigningProposalParticipantRequest>(request)?;
    let proposal = payload.signing_proposal_mut()?;
    check_signing_id(proposal, &request.signing_id)?;

    let participant = proposal.participant_mut(request.participant_id)?;
    if participant.status != SigningParticipantStatus::AwaitConfirmation {
        return Err(ProtocolError::stale_confirmation(format!(
            "participant {} already answered ({:?})",
            request.participant_id, participant.status
        )));
    }

    let next = if event == Event::SigningConfirmByParticipant {
        SigningParticipantStatus::Confirmed
    } else {
        SigningParticipantStatus::Declined
    };
    participant.status.advance_to(next)?;
    participant.updated_at = request.created_at;

    Ok(Outcome::none())
}

fn validate_confirmations(
    payload: &mut MachineStatePayload,
    _event: Event,
    _request: Option<&Request>,
) -> Result<Outcome> {
    let proposal = payload.signing_proposal_mut()?;
    let quorum_state = proposal.quorum.values().map(|participant| match participant.status {
        SigningParticipantStatus::Confirmed => Standing::Done,
        SigningParticipantStatus::Declined | SigningParticipantStatus::Error => Standing::Failed,
        _ => Standing::Awaiting,
    });

    match verdict(quorum_state, proposal.expires_at, Utc::now()) {
        Verdict::TimedOut => Ok(Outcome::redirect(Event::SigningConfirmationsCancelByTimeout)),
        Verdict::Failed => Ok(Outcome::redirect(Event::SigningCancelByParticipant)),
        Verdict::Pending => Ok(Outcome::none()),
        Verdict::Complete => {
            for participant in proposal.quorum.values_mut() {
                participant.status.advance_to(SigningParticipantStatus::AwaitPartialSign)?;
            }
            proposal.expires_at = last_update(proposal) + signing_stage_window();

            let participants = proposal
                .quorum
                .iter()
                .map(|(participant_id, participant)| SigningParticipantEntry {
                    participant_id: *participant_id,
                    addr: participant.addr.clone(),
                })
                .collect();
            Ok(Outcome::redirect(Event::SigningConfirmationsConfirmed).with_response(
                Response::SigningPartialSignsRequested(SigningPartialSignsRequested {
                    signing_id: proposal.signing_id.clone(),
                    batch_id: proposal.batch_id.clone(),
                    src_payload: proposal.src_payload.clone(),
                    participants,
                }),
            ))
        }
    }
}

fn await_partial_sign<'a>(
    proposal: &'a mut SigningProposalPayload,
    signing_id: &str,
    participant_id: u32,
) -> Result<&'a mut SigningParticipant> {
    check_signing_id(proposal, signing_id)?;
    let participant = proposal.participant_mut(participant_id)?;
    if participant.status != SigningParticipantStatus::AwaitPartialSign {
        return Err(ProtocolError::stale_confirmation(format!(
            "participant {participant_id} is not awaiting a partial signature ({:?})",
            participant.status
        )));
    }
    Ok(participant)
}

fn partial_sign_received(
    payload: &mut MachineStatePayload,
    _event: Event,
    request: Option<&Request>,
) -> Result<Outcome> {
    let request = expect_request::<SigningProposalPartialSignRequest>(request)?;
    request.validate()?;

    let proposal = payload.signing_proposal_mut()?;
    let participant = await_partial_sign(proposal, &request.signing_id, request.participant_id)?;
    participant
        .status
        .advance_to(SigningParticipantStatus::PartialSignConfirmed)?;
    participant.partial_sign = Some(request.partial_sign.clone());
    participant.updated_at = request.created_at;

    Ok(Outcome::none())
}

fn partial_sign_error(
    payload: &mut MachineStatePayload,
    _event: Event,
    request: Option<&Request>,
) -> Result<Outcome> {
    let request = expect_request::<ConfirmationErrorRequest>(request)?;

    let proposal = payload.signing_proposal_mut()?;
    let signing_id = proposal.signing_id.clone();
    let participant = await_partial_sign(proposal, &signing_id, request.participant_id)?;
    participant.status.advance_to(SigningParticipantStatus::Error)?;
    participant.error = Some(request.error.clone());
    participant.updated_at = request.created_at;

    Ok(Outcome::none())
}

fn validate_partial_signs(
    payload: &mut MachineStatePayload,
    _event: Event,
    _request: Option<&Request>,
) -> Result<Outcome> {
    let round = payload.dkg_round_id.clone();
    let proposal = payload.signing_proposal_mut()?;
    let quorum_state = proposal.quorum.values().map(|participant| match participant.status {
        SigningParticipantStatus::PartialSignConfirmed => Standing::Done,
        SigningParticipantStatus::Error | SigningParticipantStatus::Declined => Standing::Failed,
        _ => Standing::Awaiting,
    });

    match verdict(quorum_state, proposal.expires_at, Utc::now()) {
        Verdict::TimedOut => Ok(Outcome::redirect(Event::SigningPartialSignsCancelByTimeout)),
        Verdict::Failed => {
            warn!(round = %round, signing_id = %proposal.signing_id, "partial signing failed");
            Ok(Outcome::redirect(Event::SigningPartialSignsCancelByError))
        }
        Verdict::Pending => Ok(Outcome::none()),
        Verdict::Complete => {
            let partial_signs = proposal
                .quorum
                .iter()
                .filter_map(|(participant_id, participant)| {
                    participant.partial_sign.as_ref().map(|partial_sign| PartialSignEntry {
                        participant_id: *participant_id,
                        addr: participant.addr.clone(),
                        partial_sign: partial_sign.clone(),
                    })
                })
                .collect();
            info!(round = %round, signing_id = %proposal.signing_id, "partial signatures collected");
            Ok(Outcome::redirect(Event::SigningPartialSignsConfirmed).with_response(
                Response::SigningPartialSigns(SigningPartialSigns {
                    signing_id: proposal.signing_id.clone(),
                    src_payload: proposal.src_payload.clone(),
                    partial_signs,
                }),
            ))
        }
    }
}

fn restart(payload: &mut MachineStatePayload, _event: Event, request: Option<&Request>) -> Result<Outcome> {
    expect_request::<DefaultRequest>(request)?;
    payload.signing_proposal = None;
    Ok(Outcome::none())
}
