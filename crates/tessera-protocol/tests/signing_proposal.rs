//! Signing phase behaviour.
#![allow(clippy::unwrap_used)]

mod common;

use chrono::Utc;
use common::*;
use tessera_protocol::payload::SigningParticipantStatus;
use tessera_protocol::requests::{
    ConfirmationErrorRequest, SigningProposalParticipantRequest, SigningProposalPartialSignRequest,
    SigningProposalStartRequest,
};
use tessera_protocol::{build_operation, Event, ProtocolError, Request, Response, State};

fn start(signing_id: &str, initiator: u32) -> Request {
    Request::from(SigningProposalStartRequest {
        signing_id: signing_id.to_string(),
        batch_id: None,
        participant_id: initiator,
        src_payload: b"message to sign".to_vec(),
        created_at: Utc::now(),
    })
}

fn answer(signing_id: &str, participant_id: u32) -> Request {
    Request::from(SigningProposalParticipantRequest {
        signing_id: signing_id.to_string(),
        participant_id,
        created_at: Utc::now(),
    })
}

fn partial_sign(signing_id: &str, participant_id: u32) -> Request {
    Request::from(SigningProposalPartialSignRequest {
        signing_id: signing_id.to_string(),
        participant_id,
        partial_sign: vec![participant_id as u8; 50],
        created_at: Utc::now(),
    })
}

#[test]
fn test_full_signing_round_and_restart() {
    init_tracing();
    let round = master_key_round(3, 2);

    let response = apply(&round, Event::SigningStart, &start("sign-1", 1)).unwrap();
    assert_eq!(response.state, State::SigningAwaitConfirmations);
    let signing = round.payload().signing_proposal.unwrap();
    assert_eq!(signing.quorum[&1].status, SigningParticipantStatus::Confirmed);
    assert_eq!(signing.quorum[&0].status, SigningParticipantStatus::AwaitConfirmation);

    apply(&round, Event::SigningConfirmByParticipant, &answer("sign-1", 0)).unwrap();
    let response = apply(&round, Event::SigningConfirmByParticipant, &answer("sign-1", 2)).unwrap();
    assert_eq!(response.state, State::SigningAwaitPartialSigns);
    let Some(Response::SigningPartialSignsRequested(requested)) = &response.response else {
        panic!("expected partial sign request");
    };
    assert_eq!(requested.participants.len(), 3);
    assert_eq!(requested.src_payload, b"message to sign".to_vec());
    assert!(build_operation(ROUND, response.state, response.response.as_ref())
        .unwrap()
        .is_some());

    for participant_id in 0..2 {
        let response = apply(&round, Event::SigningPartialSignReceived, &partial_sign("sign-1", participant_id)).unwrap();
        assert_eq!(response.state, State::SigningAwaitPartialSigns);
    }
    let response = apply(&round, Event::SigningPartialSignReceived, &partial_sign("sign-1", 2)).unwrap();
    assert_eq!(response.state, State::SigningPartialSignsCollected);
    let Some(Response::SigningPartialSigns(collected)) = response.response else {
        panic!("expected partial signatures");
    };
    assert_eq!(collected.signing_id, "sign-1");
    assert_eq!(collected.partial_signs.len(), 3);

    let response = apply(&round, Event::SigningRestart, &default_request()).unwrap();
    assert_eq!(response.state, State::DkgMasterKeyCollected);
    assert!(round.payload().signing_proposal.is_none());
    assert!(round.payload().dkg_proposal.is_some());

    let response = apply(&round, Event::SigningStart, &start("sign-2", 0)).unwrap();
    assert_eq!(response.state, State::SigningAwaitConfirmations);
}

#[test]
fn test_decline_cancels_signing() {
    let round = master_key_round(3, 2);
    apply(&round, Event::SigningStart, &start("sign-1", 0)).unwrap();
    let response = apply(&round, Event::SigningDeclineByParticipant, &answer("sign-1", 2)).unwrap();
    assert_eq!(response.state, State::SigningConfirmationsCanceledByParticipant);
}

#[test]
fn test_partial_sign_error_cancels_signing() {
    let round = master_key_round(2, 2);
    apply(&round, Event::SigningStart, &start("sign-1", 0)).unwrap();
    apply(&round, Event::SigningConfirmByParticipant, &answer("sign-1", 1)).unwrap();
    assert_eq!(round.current_state(), State::SigningAwaitPartialSigns);

    let error = Request::from(ConfirmationErrorRequest {
        participant_id: 1,
        error: "keyring missing".to_string(),
        created_at: Utc::now(),
    });
    let response = apply(&round, Event::SigningPartialSignError, &error).unwrap();
    assert_eq!(response.state, State::SigningPartialSignsCanceledByError);
}

#[test]
fn test_wrong_signing_id_is_rejected() {
    let round = master_key_round(2, 2);
    apply(&round, Event::SigningStart, &start("sign-1", 0)).unwrap();
    let err = apply(&round, Event::SigningConfirmByParticipant, &answer("other", 1)).unwrap_err();
    assert!(matches!(err, ProtocolError::Invalid { .. }));
    assert_eq!(round.current_state(), State::SigningAwaitConfirmations);
}

#[test]
fn test_unknown_initiator_is_rejected() {
    let round = master_key_round(2, 2);
    let err = apply(&round, Event::SigningStart, &start("sign-1", 7)).unwrap_err();
    assert!(matches!(err, ProtocolError::QuorumEntryNotFound { .. }));
    assert_eq!(round.current_state(), State::DkgMasterKeyCollected);
}

#[test]
fn test_initiator_cannot_confirm_twice() {
    let round = master_key_round(3, 2);
    apply(&round, Event::SigningStart, &start("sign-1", 0)).unwrap();
    let err = apply(&round, Event::SigningConfirmByParticipant, &answer("sign-1", 0)).unwrap_err();
    assert!(matches!(err, ProtocolError::StaleConfirmation { .. }));
}
