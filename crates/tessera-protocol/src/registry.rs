//! Registry of the phase machines.
//!
//! Built once at startup and shared by `Arc`. Every state used as a source and
//! every event belongs to exactly one phase; the registry refuses to build if
//! two machines claim the same name.

use std::collections::BTreeMap;

use tessera_fsm::MachineResolver;
use tracing::debug;

use crate::error::{ProtocolError, Result};
use crate::machines::{dkg_proposal, signature_proposal, signing_proposal, Machine, Protocol};
use crate::states::{Event, State};

/// The three chained phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Invitations
    SignatureProposal,
    /// Key generation ceremony
    DkgProposal,
    /// Threshold signing rounds
    SigningProposal,
}

impl Phase {
    /// Phases in protocol order
    pub const ALL: [Phase; 3] = [Phase::SignatureProposal, Phase::DkgProposal, Phase::SigningProposal];

    /// Build this phase's machine
    pub fn machine(self) -> Machine {
        match self {
            Phase::SignatureProposal => signature_proposal::machine(),
            Phase::DkgProposal => dkg_proposal::machine(),
            Phase::SigningProposal => signing_proposal::machine(),
        }
    }
}

/// Owner lookup for states and events
pub struct ProtocolRegistry {
    signature_proposal: Machine,
    dkg_proposal: Machine,
    signing_proposal: Machine,
    by_event: BTreeMap<Event, Phase>,
    by_state: BTreeMap<State, Phase>,
}

impl std::fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("events", &self.by_event.len())
            .field("states", &self.by_state.len())
            .finish()
    }
}

impl ProtocolRegistry {
    /// Build the registry, panicking if two machines overlap
    #[allow(clippy::panic)]
    pub fn new() -> Self {
        match Self::try_new() {
            Ok(registry) => registry,
            Err(err) => panic!("invalid protocol registry: {err}"),
        }
    }

    /// Build the registry, reporting overlaps
    pub fn try_new() -> Result<Self> {
        Self::from_machines(
            Phase::SignatureProposal.machine(),
            Phase::DkgProposal.machine(),
            Phase::SigningProposal.machine(),
        )
    }

    /// Build a registry from explicit machines
    pub fn from_machines(
        signature_proposal: Machine,
        dkg_proposal: Machine,
        signing_proposal: Machine,
    ) -> Result<Self> {
        let mut by_event = BTreeMap::new();
        let mut by_state = BTreeMap::new();

        for (phase, machine) in [
            (Phase::SignatureProposal, &signature_proposal),
            (Phase::DkgProposal, &dkg_proposal),
            (Phase::SigningProposal, &signing_proposal),
        ] {
            for event in machine.events() {
                if let Some(owner) = by_event.insert(event, phase) {
                    return Err(ProtocolError::machine(format!(
                        "event `{event}` claimed by both {owner:?} and {phase:?}"
                    )));
                }
            }
            for state in machine.source_states() {
                if let Some(owner) = by_state.insert(state, phase) {
                    return Err(ProtocolError::machine(format!(
                        "state `{state}` claimed by both {owner:?} and {phase:?}"
                    )));
                }
            }
            debug!(machine = machine.name(), ?phase, "registered phase machine");
        }

        Ok(Self {
            signature_proposal,
            dkg_proposal,
            signing_proposal,
            by_event,
            by_state,
        })
    }

    /// Machine of `phase`
    pub fn machine(&self, phase: Phase) -> &Machine {
        match phase {
            Phase::SignatureProposal => &self.signature_proposal,
            Phase::DkgProposal => &self.dkg_proposal,
            Phase::SigningProposal => &self.signing_proposal,
        }
    }

    /// Phase that starts a round
    pub fn entry_phase(&self) -> Result<Phase> {
        self.phase_by_event(Event::InitProposal)
            .ok_or_else(|| ProtocolError::unknown_event(Event::InitProposal.as_str()))
    }

    /// State a new round starts in
    pub fn initial_state(&self) -> Result<State> {
        Ok(self.machine(self.entry_phase()?).initial_state())
    }

    /// Phase owning `event`
    pub fn phase_by_event(&self, event: Event) -> Option<Phase> {
        self.by_event.get(&event).copied()
    }

    /// Phase owning `state`; `None` for sink states
    pub fn phase_by_state(&self, state: State) -> Option<Phase> {
        self.by_state.get(&state).copied()
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineResolver<Protocol> for ProtocolRegistry {
    fn resolve(&self, state: State, event: Event) -> Result<&Machine> {
        match self.phase_by_state(state) {
            Some(phase) => Ok(self.machine(phase)),
            None => Err(ProtocolError::InvalidTransition {
                state: state.to_string(),
                event: event.to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_every_event_has_one_owner() {
        let registry = ProtocolRegistry::new();
        for event in Event::ALL {
            assert!(registry.phase_by_event(*event).is_some(), "{event} has no owner");
        }
        assert_eq!(registry.entry_phase().unwrap(), Phase::SignatureProposal);
        assert_eq!(registry.initial_state().unwrap(), State::SigProposalInit);
    }

    #[test]
    fn test_hand_off_states_belong_to_next_phase() {
        let registry = ProtocolRegistry::new();
        assert_eq!(
            registry.phase_by_state(State::SigProposalCollected),
            Some(Phase::DkgProposal)
        );
        assert_eq!(
            registry.phase_by_state(State::DkgMasterKeyCollected),
            Some(Phase::SigningProposal)
        );
        assert_eq!(registry.phase_by_state(State::DkgDealsAwaitCanceledByTimeout), None);
    }

    #[test]
    fn test_sink_state_rejects_events() {
        let registry = ProtocolRegistry::new();
        let err = registry
            .resolve(State::SigProposalCanceledByTimeout, Event::InitProposal)
            .unwrap_err();
        assert!(err.is_invalid_transition());
    }

    #[test]
    fn test_overlapping_machines_are_rejected() {
        let err = ProtocolRegistry::from_machines(
            Phase::SignatureProposal.machine(),
            Phase::SignatureProposal.machine(),
            Phase::SigningProposal.machine(),
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::Machine { .. }));
    }

    #[test]
    fn test_every_machine_is_named() {
        let registry = ProtocolRegistry::new();
        let names: Vec<_> = Phase::ALL
            .into_iter()
            .map(|phase| registry.machine(phase).name().to_string())
            .collect();
        assert_eq!(names, ["signature_proposal", "dkg_proposal", "signing_proposal"]);
    }
}
