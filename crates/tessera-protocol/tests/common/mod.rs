//! Shared helpers for the phase machine tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tessera_protocol::requests::{
    DefaultRequest, DkgProposalConfirmationRequest, SignatureProposalParticipantRequest,
    SignatureProposalParticipantsEntry, SignatureProposalParticipantsListRequest,
};
use tessera_protocol::{
    DkgStage, Event, Message, ProtocolInstance, ProtocolRegistry, ProtocolResponse, Request, Result, State,
};

pub const ROUND: &str = "round-1";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn registry() -> Arc<ProtocolRegistry> {
    Arc::new(ProtocolRegistry::new())
}

pub fn title(index: usize) -> String {
    format!("participant-{index}")
}

pub fn participants_list(n: usize, threshold: usize, created_at: DateTime<Utc>) -> Request {
    let participants = (0..n)
        .map(|index| SignatureProposalParticipantsEntry {
            title: title(index),
            pub_key: vec![index as u8 + 1; 32],
            dkg_pub_key: vec![index as u8 + 101; 48],
        })
        .collect();
    Request::from(SignatureProposalParticipantsListRequest {
        participants,
        signing_threshold: threshold,
        created_at,
    })
}

pub fn confirm_invitation(participant_id: u32) -> Request {
    Request::from(SignatureProposalParticipantRequest {
        participant_id,
        created_at: Utc::now(),
    })
}

pub fn default_request() -> Request {
    Request::from(DefaultRequest { created_at: Utc::now() })
}

pub fn default_request_at(created_at: DateTime<Utc>) -> Request {
    Request::from(DefaultRequest { created_at })
}

pub fn dkg_confirmation(participant_id: u32, payload: Vec<u8>) -> Request {
    Request::from(DkgProposalConfirmationRequest {
        participant_id,
        payload,
        created_at: Utc::now(),
    })
}

pub fn apply(round: &ProtocolInstance, event: Event, request: &Request) -> Result<ProtocolResponse> {
    let message = Message::new(ROUND, event, request, "test")?;
    round.process_message(&message)
}

/// Round with every invitation accepted
pub fn collected_round(n: usize, threshold: usize) -> ProtocolInstance {
    let round = ProtocolInstance::new(registry(), ROUND).unwrap();
    apply(&round, Event::InitProposal, &participants_list(n, threshold, Utc::now())).unwrap();
    for participant_id in 0..n as u32 {
        apply(&round, Event::SigConfirmByParticipant, &confirm_invitation(participant_id)).unwrap();
    }
    assert_eq!(round.current_state(), State::SigProposalCollected);
    round
}

/// Artifact a participant publishes for a stage
pub fn artifact(stage: DkgStage, participant_id: u32) -> Vec<u8> {
    match stage {
        DkgStage::MasterKey => vec![42; 96],
        other => format!("{other}-{participant_id}").into_bytes(),
    }
}

/// Round with a distributed key agreed
pub fn master_key_round(n: usize, threshold: usize) -> ProtocolInstance {
    let round = collected_round(n, threshold);
    apply(&round, Event::DkgInitProcess, &default_request()).unwrap();
    for stage in DkgStage::ALL {
        for participant_id in 0..n as u32 {
            apply(
                &round,
                stage.confirm_received_event(),
                &dkg_confirmation(participant_id, artifact(stage, participant_id)),
            )
            .unwrap();
        }
    }
    assert_eq!(round.current_state(), State::DkgMasterKeyCollected);
    round
}

pub fn days_ago(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days)
}
