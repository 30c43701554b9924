//! Protocol states and events.
//!
//! Both are closed enums. The snake-case names are the wire form used in
//! dumps, messages and operation types; nothing inside the engine looks at
//! them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProtocolError;

macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident, unknown = $unknown:path {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[ $( $name::$variant, )+ ];

            /// Wire name
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $wire, )+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ProtocolError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $wire => Ok($name::$variant), )+
                    other => Err($unknown(other)),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let name = String::deserialize(deserializer)?;
                name.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fn unknown_state(name: &str) -> ProtocolError {
    ProtocolError::invalid(format!("unknown state `{name}`"))
}

named_enum! {
    /// Every state of the three phase machines
    pub enum State, unknown = unknown_state {
        /// Fresh round, waiting for the participant list
        SigProposalInit => "state_sig_proposal_init",
        /// Invitations sent, collecting participant answers
        SigProposalAwaitParticipantsConfirmations => "state_sig_proposal_await_participants_confirmations",
        /// A participant declined the invitation
        SigProposalCanceledByParticipant => "state_sig_proposal_canceled_by_participant",
        /// Invitations expired
        SigProposalCanceledByTimeout => "state_sig_proposal_canceled_by_timeout",
        /// Every participant confirmed; DKG may start
        SigProposalCollected => "state_sig_proposal_collected",

        /// Collecting commitment vectors
        DkgCommitsAwaitConfirmations => "state_dkg_commits_await_confirmations",
        /// A participant failed the commit stage
        DkgCommitsAwaitCanceledByError => "state_dkg_commits_await_canceled_by_error",
        /// Commit stage expired
        DkgCommitsAwaitCanceledByTimeout => "state_dkg_commits_await_canceled_by_timeout",
        /// Collecting encrypted deals
        DkgDealsAwaitConfirmations => "state_dkg_deals_await_confirmations",
        /// A participant failed the deal stage
        DkgDealsAwaitCanceledByError => "state_dkg_deals_await_canceled_by_error",
        /// Deal stage expired
        DkgDealsAwaitCanceledByTimeout => "state_dkg_deals_await_canceled_by_timeout",
        /// Collecting deal responses
        DkgResponsesAwaitConfirmations => "state_dkg_responses_await_confirmations",
        /// A participant failed the response stage
        DkgResponsesAwaitCanceledByError => "state_dkg_responses_await_canceled_by_error",
        /// Response stage expired
        DkgResponsesAwaitCanceledByTimeout => "state_dkg_responses_await_canceled_by_timeout",
        /// Collecting master public keys
        DkgMasterKeyAwaitConfirmations => "state_dkg_master_key_await_confirmations",
        /// A participant failed the master key stage, or keys disagree
        DkgMasterKeyAwaitCanceledByError => "state_dkg_master_key_await_canceled_by_error",
        /// Master key stage expired
        DkgMasterKeyAwaitCanceledByTimeout => "state_dkg_master_key_await_canceled_by_timeout",
        /// Distributed key agreed; idle between signing rounds
        DkgMasterKeyCollected => "state_dkg_master_key_collected",

        /// Signing requested, collecting participant agreement
        SigningAwaitConfirmations => "state_signing_await_confirmations",
        /// A participant refused to sign
        SigningConfirmationsCanceledByParticipant => "state_signing_confirmations_canceled_by_participant",
        /// Signing agreement expired
        SigningConfirmationsCanceledByTimeout => "state_signing_confirmations_canceled_by_timeout",
        /// Collecting partial signatures
        SigningAwaitPartialSigns => "state_signing_await_partial_signs",
        /// A participant failed to produce a partial signature
        SigningPartialSignsCanceledByError => "state_signing_partial_signs_canceled_by_error",
        /// Partial signature collection expired
        SigningPartialSignsCanceledByTimeout => "state_signing_partial_signs_canceled_by_timeout",
        /// Every partial signature received
        SigningPartialSignsCollected => "state_signing_partial_signs_collected",
    }
}

named_enum! {
    /// Every event of the three phase machines
    pub enum Event, unknown = ProtocolError::unknown_event {
        /// Start a round with the participant list
        InitProposal => "event_sig_proposal_init",
        /// Participant accepts the invitation
        SigConfirmByParticipant => "event_sig_proposal_confirm_by_participant",
        /// Participant declines the invitation
        SigDeclineByParticipant => "event_sig_proposal_decline_by_participant",
        /// Re-evaluate invitation answers
        SigValidate => "event_sig_proposal_validate",
        /// Every invitation accepted
        SigSetValidated => "event_sig_proposal_set_validated",
        /// Cancel after a decline
        SigCancelByParticipant => "event_sig_proposal_cancel_by_participant",
        /// Cancel after expiry
        SigCancelByTimeout => "event_sig_proposal_cancel_by_timeout",

        /// Start the DKG ceremony
        DkgInitProcess => "event_dkg_init_process",

        /// Commitment vector received
        DkgCommitConfirmReceived => "event_dkg_commit_confirm_received",
        /// Participant failed the commit stage
        DkgCommitConfirmError => "event_dkg_commit_confirm_error",
        /// Re-evaluate commit stage
        DkgCommitsValidate => "event_dkg_commits_validate",
        /// Every commitment vector received
        DkgCommitsConfirmed => "event_dkg_commits_confirmed",
        /// Cancel commit stage after an error
        DkgCommitsCancelByError => "event_dkg_commits_cancel_by_error",
        /// Cancel commit stage after expiry
        DkgCommitsCancelByTimeout => "event_dkg_commits_cancel_by_timeout",

        /// Deal received
        DkgDealConfirmReceived => "event_dkg_deal_confirm_received",
        /// Participant failed the deal stage
        DkgDealConfirmError => "event_dkg_deal_confirm_error",
        /// Re-evaluate deal stage
        DkgDealsValidate => "event_dkg_deals_validate",
        /// Every deal received
        DkgDealsConfirmed => "event_dkg_deals_confirmed",
        /// Cancel deal stage after an error
        DkgDealsCancelByError => "event_dkg_deals_cancel_by_error",
        /// Cancel deal stage after expiry
        DkgDealsCancelByTimeout => "event_dkg_deals_cancel_by_timeout",

        /// Responses received
        DkgResponseConfirmReceived => "event_dkg_response_confirm_received",
        /// Participant failed the response stage
        DkgResponseConfirmError => "event_dkg_response_confirm_error",
        /// Re-evaluate response stage
        DkgResponsesValidate => "event_dkg_responses_validate",
        /// Every response received
        DkgResponsesConfirmed => "event_dkg_responses_confirmed",
        /// Cancel response stage after an error
        DkgResponsesCancelByError => "event_dkg_responses_cancel_by_error",
        /// Cancel response stage after expiry
        DkgResponsesCancelByTimeout => "event_dkg_responses_cancel_by_timeout",

        /// Master public key received
        DkgMasterKeyConfirmReceived => "event_dkg_master_key_confirm_received",
        /// Participant failed the master key stage
        DkgMasterKeyConfirmError => "event_dkg_master_key_confirm_error",
        /// Re-evaluate master key stage
        DkgMasterKeysValidate => "event_dkg_master_keys_validate",
        /// Every master key received and equal
        DkgMasterKeysConfirmed => "event_dkg_master_keys_confirmed",
        /// Cancel master key stage after an error
        DkgMasterKeysCancelByError => "event_dkg_master_keys_cancel_by_error",
        /// Cancel master key stage after expiry
        DkgMasterKeysCancelByTimeout => "event_dkg_master_keys_cancel_by_timeout",

        /// Request a threshold signature
        SigningStart => "event_signing_start",
        /// Participant agrees to sign
        SigningConfirmByParticipant => "event_signing_confirm_by_participant",
        /// Participant refuses to sign
        SigningDeclineByParticipant => "event_signing_decline_by_participant",
        /// Re-evaluate signing agreement
        SigningConfirmationsValidate => "event_signing_confirmations_validate",
        /// Everyone agreed to sign
        SigningConfirmationsConfirmed => "event_signing_confirmations_confirmed",
        /// Cancel signing after a refusal
        SigningCancelByParticipant => "event_signing_cancel_by_participant",
        /// Cancel signing agreement after expiry
        SigningConfirmationsCancelByTimeout => "event_signing_confirmations_cancel_by_timeout",
        /// Partial signature received
        SigningPartialSignReceived => "event_signing_partial_sign_received",
        /// Participant failed to sign
        SigningPartialSignError => "event_signing_partial_sign_error",
        /// Re-evaluate partial signatures
        SigningPartialSignsValidate => "event_signing_partial_signs_validate",
        /// Every partial signature received
        SigningPartialSignsConfirmed => "event_signing_partial_signs_confirmed",
        /// Cancel signing after a partial signature error
        SigningPartialSignsCancelByError => "event_signing_partial_signs_cancel_by_error",
        /// Cancel partial signature collection after expiry
        SigningPartialSignsCancelByTimeout => "event_signing_partial_signs_cancel_by_timeout",
        /// Return to idle after a completed signing round
        SigningRestart => "event_signing_restart",
    }
}

/// The four DKG stages, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DkgStage {
    /// Commitment vectors
    Commits,
    /// Encrypted shares
    Deals,
    /// Deal verification results
    Responses,
    /// Distributed public key
    MasterKey,
}

impl DkgStage {
    /// Stages in protocol order
    pub const ALL: [DkgStage; 4] = [
        DkgStage::Commits,
        DkgStage::Deals,
        DkgStage::Responses,
        DkgStage::MasterKey,
    ];

    /// State collecting this stage's confirmations
    pub fn await_state(self) -> State {
        match self {
            DkgStage::Commits => State::DkgCommitsAwaitConfirmations,
            DkgStage::Deals => State::DkgDealsAwaitConfirmations,
            DkgStage::Responses => State::DkgResponsesAwaitConfirmations,
            DkgStage::MasterKey => State::DkgMasterKeyAwaitConfirmations,
        }
    }

    /// Sink reached when a participant reports an error
    pub fn canceled_by_error_state(self) -> State {
        match self {
            DkgStage::Commits => State::DkgCommitsAwaitCanceledByError,
            DkgStage::Deals => State::DkgDealsAwaitCanceledByError,
            DkgStage::Responses => State::DkgResponsesAwaitCanceledByError,
            DkgStage::MasterKey => State::DkgMasterKeyAwaitCanceledByError,
        }
    }

    /// Sink reached when the stage expires
    pub fn canceled_by_timeout_state(self) -> State {
        match self {
            DkgStage::Commits => State::DkgCommitsAwaitCanceledByTimeout,
            DkgStage::Deals => State::DkgDealsAwaitCanceledByTimeout,
            DkgStage::Responses => State::DkgResponsesAwaitCanceledByTimeout,
            DkgStage::MasterKey => State::DkgMasterKeyAwaitCanceledByTimeout,
        }
    }

    /// External event carrying a participant's artifact
    pub fn confirm_received_event(self) -> Event {
        match self {
            DkgStage::Commits => Event::DkgCommitConfirmReceived,
            DkgStage::Deals => Event::DkgDealConfirmReceived,
            DkgStage::Responses => Event::DkgResponseConfirmReceived,
            DkgStage::MasterKey => Event::DkgMasterKeyConfirmReceived,
        }
    }

    /// External event carrying a participant's failure
    pub fn confirm_error_event(self) -> Event {
        match self {
            DkgStage::Commits => Event::DkgCommitConfirmError,
            DkgStage::Deals => Event::DkgDealConfirmError,
            DkgStage::Responses => Event::DkgResponseConfirmError,
            DkgStage::MasterKey => Event::DkgMasterKeyConfirmError,
        }
    }

    /// Auto event re-evaluating the stage quorum
    pub fn validate_event(self) -> Event {
        match self {
            DkgStage::Commits => Event::DkgCommitsValidate,
            DkgStage::Deals => Event::DkgDealsValidate,
            DkgStage::Responses => Event::DkgResponsesValidate,
            DkgStage::MasterKey => Event::DkgMasterKeysValidate,
        }
    }

    /// Internal event leaving the stage successfully
    pub fn confirmed_event(self) -> Event {
        match self {
            DkgStage::Commits => Event::DkgCommitsConfirmed,
            DkgStage::Deals => Event::DkgDealsConfirmed,
            DkgStage::Responses => Event::DkgResponsesConfirmed,
            DkgStage::MasterKey => Event::DkgMasterKeysConfirmed,
        }
    }

    /// Internal event cancelling the stage after an error
    pub fn cancel_by_error_event(self) -> Event {
        match self {
            DkgStage::Commits => Event::DkgCommitsCancelByError,
            DkgStage::Deals => Event::DkgDealsCancelByError,
            DkgStage::Responses => Event::DkgResponsesCancelByError,
            DkgStage::MasterKey => Event::DkgMasterKeysCancelByError,
        }
    }

    /// Internal event cancelling the stage after expiry
    pub fn cancel_by_timeout_event(self) -> Event {
        match self {
            DkgStage::Commits => Event::DkgCommitsCancelByTimeout,
            DkgStage::Deals => Event::DkgDealsCancelByTimeout,
            DkgStage::Responses => Event::DkgResponsesCancelByTimeout,
            DkgStage::MasterKey => Event::DkgMasterKeysCancelByTimeout,
        }
    }

    /// Where the machine goes once the stage completes
    pub fn next_state(self) -> State {
        match self.next() {
            Some(next) => next.await_state(),
            None => State::DkgMasterKeyCollected,
        }
    }

    /// Following stage
    pub fn next(self) -> Option<DkgStage> {
        match self {
            DkgStage::Commits => Some(DkgStage::Deals),
            DkgStage::Deals => Some(DkgStage::Responses),
            DkgStage::Responses => Some(DkgStage::MasterKey),
            DkgStage::MasterKey => None,
        }
    }

    /// Stage collected in `state`, if it is an await state
    pub fn from_await_state(state: State) -> Option<DkgStage> {
        DkgStage::ALL
            .into_iter()
            .find(|stage| stage.await_state() == state)
    }

    /// Stage an external DKG confirmation event belongs to
    pub fn from_event(event: Event) -> Option<DkgStage> {
        DkgStage::ALL.into_iter().find(|stage| {
            stage.confirm_received_event() == event || stage.confirm_error_event() == event
        })
    }
}

impl fmt::Display for DkgStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DkgStage::Commits => "commits",
            DkgStage::Deals => "deals",
            DkgStage::Responses => "responses",
            DkgStage::MasterKey => "master_key",
        };
        f.write_str(name)
    }
}
