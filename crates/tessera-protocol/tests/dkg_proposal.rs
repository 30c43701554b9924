//! DKG phase behaviour.
#![allow(clippy::unwrap_used)]

mod common;

use common::*;
use tessera_protocol::payload::DkgParticipantStatus;
use tessera_protocol::requests::ConfirmationErrorRequest;
use tessera_protocol::responses::DkgStageResponse;
use tessera_protocol::{
    build_operation, DkgStage, Event, ProtocolError, Request, Response, State,
};

#[test]
fn test_init_seeds_quorum_from_invitations() {
    init_tracing();
    let round = collected_round(3, 2);
    let response = apply(&round, Event::DkgInitProcess, &default_request()).unwrap();

    assert_eq!(response.state, State::DkgCommitsAwaitConfirmations);
    let Some(Response::DkgPubKeys(keys)) = &response.response else {
        panic!("expected dkg public keys");
    };
    assert_eq!(keys.threshold, 2);
    assert_eq!(keys.participants.len(), 3);
    assert_eq!(keys.participants[1].dkg_pub_key, vec![102; 48]);

    let op = build_operation(ROUND, response.state, response.response.as_ref())
        .unwrap()
        .unwrap();
    assert_eq!(op.operation_type, State::DkgCommitsAwaitConfirmations);

    let dkg = round.payload().dkg_proposal.unwrap();
    assert!(dkg
        .quorum
        .values()
        .all(|participant| participant.status == DkgParticipantStatus::CommitAwaitConfirmation));
}

#[test]
fn test_stages_chain_to_master_key() {
    let round = collected_round(3, 2);
    apply(&round, Event::DkgInitProcess, &default_request()).unwrap();

    for stage in DkgStage::ALL {
        assert_eq!(round.current_state(), stage.await_state());
        for participant_id in 0..3 {
            let response = apply(
                &round,
                stage.confirm_received_event(),
                &dkg_confirmation(participant_id, artifact(stage, participant_id)),
            )
            .unwrap();

            if participant_id < 2 {
                assert_eq!(response.state, stage.await_state());
                assert!(response.response.is_none());
                continue;
            }

            assert_eq!(response.state, stage.next_state());
            match (stage, response.response.unwrap()) {
                (DkgStage::MasterKey, Response::DkgMasterKey(master_key)) => {
                    assert_eq!(master_key.master_key, vec![42; 96]);
                }
                (_, Response::DkgStage(DkgStageResponse { stage: done, participants })) => {
                    assert_eq!(done, stage);
                    assert_eq!(participants.len(), 3);
                    assert_eq!(participants[0].payload, artifact(stage, 0));
                }
                (_, other) => panic!("unexpected response {other:?}"),
            }
        }
    }

    assert_eq!(round.current_state(), State::DkgMasterKeyCollected);
}

#[test]
fn test_participant_error_cancels_stage() {
    let round = collected_round(3, 2);
    apply(&round, Event::DkgInitProcess, &default_request()).unwrap();
    for participant_id in 0..3 {
        apply(
            &round,
            Event::DkgCommitConfirmReceived,
            &dkg_confirmation(participant_id, artifact(DkgStage::Commits, participant_id)),
        )
        .unwrap();
    }

    apply(
        &round,
        Event::DkgDealConfirmReceived,
        &dkg_confirmation(0, artifact(DkgStage::Deals, 0)),
    )
    .unwrap();
    let error = Request::from(ConfirmationErrorRequest {
        participant_id: 1,
        error: "commitment mismatch".to_string(),
        created_at: chrono::Utc::now(),
    });
    let response = apply(&round, Event::DkgDealConfirmError, &error).unwrap();
    assert_eq!(response.state, State::DkgDealsAwaitCanceledByError);

    let dkg = round.payload().dkg_proposal.unwrap();
    assert_eq!(dkg.quorum[&1].status, DkgParticipantStatus::DealConfirmationError);
    assert_eq!(dkg.quorum[&1].error.as_deref(), Some("commitment mismatch"));
}

#[test]
fn test_master_key_disagreement_cancels() {
    let round = collected_round(2, 2);
    apply(&round, Event::DkgInitProcess, &default_request()).unwrap();
    for stage in [DkgStage::Commits, DkgStage::Deals, DkgStage::Responses] {
        for participant_id in 0..2 {
            apply(
                &round,
                stage.confirm_received_event(),
                &dkg_confirmation(participant_id, artifact(stage, participant_id)),
            )
            .unwrap();
        }
    }

    apply(&round, Event::DkgMasterKeyConfirmReceived, &dkg_confirmation(0, vec![1; 96])).unwrap();
    let response = apply(&round, Event::DkgMasterKeyConfirmReceived, &dkg_confirmation(1, vec![2; 96])).unwrap();
    assert_eq!(response.state, State::DkgMasterKeyAwaitCanceledByError);
}

#[test]
fn test_repeated_confirmation_is_stale() {
    let round = collected_round(2, 2);
    apply(&round, Event::DkgInitProcess, &default_request()).unwrap();
    apply(&round, Event::DkgCommitConfirmReceived, &dkg_confirmation(0, vec![1])).unwrap();
    let before = round.dump();

    let err = apply(&round, Event::DkgCommitConfirmReceived, &dkg_confirmation(0, vec![2])).unwrap_err();
    assert!(matches!(err, ProtocolError::StaleConfirmation { .. }));
    assert_eq!(round.dump(), before);
}

#[test]
fn test_confirmation_for_wrong_stage_is_invalid_transition() {
    let round = collected_round(2, 2);
    apply(&round, Event::DkgInitProcess, &default_request()).unwrap();
    let err = apply(&round, Event::DkgDealConfirmReceived, &dkg_confirmation(0, vec![1])).unwrap_err();
    assert!(err.is_invalid_transition());
}

#[test]
fn test_expired_stage_times_out() {
    let round = collected_round(2, 2);
    let response = apply(&round, Event::DkgInitProcess, &default_request_at(days_ago(4))).unwrap();
    assert_eq!(response.state, State::DkgCommitsAwaitCanceledByTimeout);
}
