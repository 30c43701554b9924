//! DKG proposal: drive the four ceremony stages.
//!
//! Every stage follows the same pattern. Participants publish their artifact
//! (or an error) for the stage, then the stage's auto event decides whether to
//! wait, cancel, or move on. Moving on resets each entry to the next stage's
//! awaiting status and hands the collected artifacts to the next stage.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tessera_fsm::EventDesc;
use tracing::{info, warn};

use super::{Callback, Machine, Outcome};
use crate::config::dkg_stage_window;
use crate::error::{ProtocolError, Result};
use crate::payload::{
    DkgParticipant, DkgParticipantStatus, DkgProposalPayload, ForwardStatus, MachineStatePayload,
};
use crate::quorum::{verdict, Standing, Verdict};
use crate::requests::{expect_request, ConfirmationErrorRequest, DefaultRequest, DkgProposalConfirmationRequest, Request};
use crate::responses::{DkgMasterKey, DkgPubKeyEntry, DkgPubKeys, DkgStageEntry, DkgStageResponse, Response};
use crate::states::{DkgStage, Event, State};

/// Machine name
pub const NAME: &str = "dkg_proposal";

/// Build the DKG proposal machine
pub fn machine() -> Machine {
    let mut events = vec![EventDesc::new(
        Event::DkgInitProcess,
        [State::SigProposalCollected],
        DkgStage::Commits.await_state(),
    )];
    let mut callbacks = vec![(Event::DkgInitProcess, init_process as Callback)];

    for stage in DkgStage::ALL {
        let awaiting = stage.await_state();
        events.extend([
            EventDesc::new(stage.confirm_received_event(), [awaiting], awaiting),
            EventDesc::new(stage.confirm_error_event(), [awaiting], awaiting),
            EventDesc::new(stage.validate_event(), [awaiting], awaiting).auto(),
            EventDesc::new(stage.confirmed_event(), [awaiting], stage.next_state()).internal(),
            EventDesc::new(stage.cancel_by_error_event(), [awaiting], stage.canceled_by_error_state())
                .internal(),
            EventDesc::new(
                stage.cancel_by_timeout_event(),
                [awaiting],
                stage.canceled_by_timeout_state(),
            )
            .internal(),
        ]);
        callbacks.extend([
            (stage.confirm_received_event(), confirm_received as Callback),
            (stage.confirm_error_event(), confirm_error as Callback),
            (stage.validate_event(), validate_stage as Callback),
        ]);
    }

    Machine::must_new(NAME, State::SigProposalCollected, events, callbacks)
}

fn await_status(stage: DkgStage) -> DkgParticipantStatus {
    match stage {
        DkgStage::Commits => DkgParticipantStatus::CommitAwaitConfirmation,
        DkgStage::Deals => DkgParticipantStatus::DealAwaitConfirmation,
        DkgStage::Responses => DkgParticipantStatus::ResponseAwaitConfirmation,
        DkgStage::MasterKey => DkgParticipantStatus::MasterKeyAwaitConfirmation,
    }
}

fn confirmed_status(stage: DkgStage) -> DkgParticipantStatus {
    match stage {
        DkgStage::Commits => DkgParticipantStatus::CommitConfirmed,
        DkgStage::Deals => DkgParticipantStatus::DealConfirmed,
        DkgStage::Responses => DkgParticipantStatus::ResponseConfirmed,
        DkgStage::MasterKey => DkgParticipantStatus::MasterKeyConfirmed,
    }
}

fn error_status(stage: DkgStage) -> DkgParticipantStatus {
    match stage {
        DkgStage::Commits => DkgParticipantStatus::CommitConfirmationError,
        DkgStage::Deals => DkgParticipantStatus::DealConfirmationError,
        DkgStage::Responses => DkgParticipantStatus::ResponseConfirmationError,
        DkgStage::MasterKey => DkgParticipantStatus::MasterKeyConfirmationError,
    }
}

fn artifact(participant: &DkgParticipant, stage: DkgStage) -> Option<&Vec<u8>> {
    match stage {
        DkgStage::Commits => participant.commit.as_ref(),
        DkgStage::Deals => participant.deal.as_ref(),
        DkgStage::Responses => participant.response.as_ref(),
        DkgStage::MasterKey => participant.master_key.as_ref(),
    }
}

fn artifact_mut(participant: &mut DkgParticipant, stage: DkgStage) -> &mut Option<Vec<u8>> {
    match stage {
        DkgStage::Commits => &mut participant.commit,
        DkgStage::Deals => &mut participant.deal,
        DkgStage::Responses => &mut participant.response,
        DkgStage::MasterKey => &mut participant.master_key,
    }
}

fn stage_of(event: Event) -> Result<DkgStage> {
    DkgStage::from_event(event)
        .or_else(|| DkgStage::ALL.into_iter().find(|stage| stage.validate_event() == event))
        .ok_or_else(|| ProtocolError::invalid(format!("event `{event}` belongs to no dkg stage")))
}

fn init_process(payload: &mut MachineStatePayload, _event: Event, request: Option<&Request>) -> Result<Outcome> {
    let request = expect_request::<DefaultRequest>(request)?;
    let proposal = payload.signature_proposal()?;

    let mut quorum = BTreeMap::new();
    let mut participants = Vec::with_capacity(proposal.quorum.len());
    for participant in proposal.participants_by_id() {
        quorum.insert(
            participant.participant_id,
            DkgParticipant {
                title: participant.title.clone(),
                pub_key: participant.pub_key.clone(),
                dkg_pub_key: participant.dkg_pub_key.clone(),
                commit: None,
                deal: None,
                response: None,
                master_key: None,
                status: DkgParticipantStatus::CommitAwaitConfirmation,
                error: None,
                updated_at: request.created_at,
            },
        );
        participants.push(DkgPubKeyEntry {
            participant_id: participant.participant_id,
            title: participant.title.clone(),
            dkg_pub_key: participant.dkg_pub_key.clone(),
        });
    }
    let threshold = proposal.signing_threshold;

    payload.dkg_proposal = Some(DkgProposalPayload {
        quorum,
        threshold,
        created_at: request.created_at,
        expires_at: request.created_at + dkg_stage_window(),
    });

    Ok(Outcome::respond(Response::DkgPubKeys(DkgPubKeys {
        threshold,
        participants,
    })))
}

fn confirm_received(
    payload: &mut MachineStatePayload,
    event: Event,
    request: Option<&Request>,
) -> Result<Outcome> {
    let stage = stage_of(event)?;
    let request = expect_request::<DkgProposalConfirmationRequest>(request)?;
    request.validate()?;

    let participant = payload
        .dkg_proposal_mut()?
        .participant_mut(request.participant_id)?;
    if participant.status != await_status(stage) {
        return Err(ProtocolError::stale_confirmation(format!(
            "participant {} is not awaiting {stage} ({:?})",
            request.participant_id, participant.status
        )));
    }

    participant.status.advance_to(confirmed_status(stage))?;
    *artifact_mut(participant, stage) = Some(request.payload.clone());
    participant.updated_at = request.created_at;

    Ok(Outcome::none())
}

fn confirm_error(payload: &mut MachineStatePayload, event: Event, request: Option<&Request>) -> Result<Outcome> {
    let stage = stage_of(event)?;
    let request = expect_request::<ConfirmationErrorRequest>(request)?;

    let participant = payload
        .dkg_proposal_mut()?
        .participant_mut(request.participant_id)?;
    if participant.status != await_status(stage) {
        return Err(ProtocolError::stale_confirmation(format!(
            "participant {} is not awaiting {stage} ({:?})",
            request.participant_id, participant.status
        )));
    }

    participant.status.advance_to(error_status(stage))?;
    participant.error = Some(request.error.clone());
    participant.updated_at = request.created_at;

    Ok(Outcome::none())
}

fn standing(status: DkgParticipantStatus, stage: DkgStage) -> Standing {
    if status == confirmed_status(stage) {
        Standing::Done
    } else if status == error_status(stage) {
        Standing::Failed
    } else {
        Standing::Awaiting
    }
}

fn last_update(proposal: &DkgProposalPayload) -> DateTime<Utc> {
    proposal
        .quorum
        .values()
        .map(|participant| participant.updated_at)
        .max()
        .unwrap_or(proposal.created_at)
}

fn validate_stage(payload: &mut MachineStatePayload, event: Event, _request: Option<&Request>) -> Result<Outcome> {
    let stage = stage_of(event)?;
    let round = payload.dkg_round_id.clone();
    let proposal = payload.dkg_proposal_mut()?;

    let quorum_state = proposal
        .quorum
        .values()
        .map(|participant| standing(participant.status, stage));
    match verdict(quorum_state, proposal.expires_at, Utc::now()) {
        Verdict::TimedOut => {
            warn!(round = %round, %stage, "dkg stage timed out");
            return Ok(Outcome::redirect(stage.cancel_by_timeout_event()));
        }
        Verdict::Failed => {
            warn!(round = %round, %stage, "dkg stage failed");
            return Ok(Outcome::redirect(stage.cancel_by_error_event()));
        }
        Verdict::Pending => return Ok(Outcome::none()),
        Verdict::Complete => {}
    }

    let mut participants = Vec::with_capacity(proposal.quorum.len());
    for (participant_id, participant) in &proposal.quorum {
        let payload = artifact(participant, stage)
            .cloned()
            .ok_or_else(|| ProtocolError::not_found(format!("{stage} of participant {participant_id}")))?;
        participants.push(DkgStageEntry {
            participant_id: *participant_id,
            title: participant.title.clone(),
            payload,
        });
    }

    let response = match stage.next() {
        Some(next) => {
            let next_status = await_status(next);
            for participant in proposal.quorum.values_mut() {
                participant.status.advance_to(next_status)?;
            }
            proposal.expires_at = last_update(proposal) + dkg_stage_window();
            Response::DkgStage(DkgStageResponse { stage, participants })
        }
        None => {
            let mut master_keys = participants.iter().map(|entry| &entry.payload);
            let first = master_keys.next().cloned().unwrap_or_default();
            if master_keys.any(|key| *key != first) {
                warn!(round = %round, "participants published different master keys");
                return Ok(Outcome::redirect(stage.cancel_by_error_event()));
            }
            info!(round = %round, "dkg master key collected");
            Response::DkgMasterKey(DkgMasterKey { master_key: first })
        }
    };

    Ok(Outcome::redirect(stage.confirmed_event()).with_response(response))
}
