//! Live machine instances.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::fsm::{Fsm, FsmTypes, Origin};

/// Finds the machine responsible for an event in a given state.
///
/// A single machine resolves to itself; a pool of chained machines resolves
/// through whichever machine owns the current state.
pub trait MachineResolver<T: FsmTypes>: Send + Sync {
    /// Machine that handles `event` from `state`
    fn resolve(&self, state: T::State, event: T::Event) -> Result<&Fsm<T>, T::Error>;
}

impl<T: FsmTypes> MachineResolver<T> for Fsm<T>
where
    Fsm<T>: Send + Sync,
{
    fn resolve(&self, _state: T::State, _event: T::Event) -> Result<&Fsm<T>, T::Error> {
        Ok(self)
    }
}

impl<T: FsmTypes, R: MachineResolver<T>> MachineResolver<T> for Arc<R> {
    fn resolve(&self, state: T::State, event: T::Event) -> Result<&Fsm<T>, T::Error> {
        self.as_ref().resolve(state, event)
    }
}

/// Outcome of `do_event` on an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsmResponse<S, R> {
    /// State after the event settled
    pub state: S,
    /// Last response produced along the chain
    pub response: Option<R>,
}

/// A machine bound to one round's state and payload.
pub struct FsmInstance<T: FsmTypes, R> {
    resolver: R,
    state: RwLock<T::State>,
    // Held for the whole `do_event` call, so it doubles as the event mutex.
    payload: Mutex<T::Payload>,
}

impl<T: FsmTypes, R: MachineResolver<T>> FsmInstance<T, R> {
    /// Bind `resolver` to a starting state and payload
    pub fn new(resolver: R, state: T::State, payload: T::Payload) -> Self {
        Self {
            resolver,
            state: RwLock::new(state),
            payload: Mutex::new(payload),
        }
    }

    /// Current state, readable while `do_event` is running
    pub fn current_state(&self) -> T::State {
        *self.state.read()
    }

    /// Snapshot of the payload
    pub fn payload(&self) -> T::Payload {
        self.payload.lock().clone()
    }

    /// Resolver this instance dispatches through
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Apply an external event.
    ///
    /// On error neither state nor payload change.
    pub fn do_event(
        &self,
        event: T::Event,
        request: Option<&T::Request>,
    ) -> Result<FsmResponse<T::State, T::Response>, T::Error> {
        let mut payload = self.payload.lock();
        let state = *self.state.read();

        let machine = self.resolver.resolve(state, event)?;
        let fired = machine.fire(state, event, &payload, request, Origin::External)?;

        *payload = fired.payload;
        *self.state.write() = fired.state;

        Ok(FsmResponse {
            state: fired.state,
            response: fired.response,
        })
    }

    /// Release the state and payload
    pub fn into_parts(self) -> (T::State, T::Payload) {
        (self.state.into_inner(), self.payload.into_inner())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fsm::tests::{ballot, Ballot, BallotTypes, Cast, Votes};
    use crate::FsmError;

    #[test]
    fn test_do_event_commits_state_and_payload() {
        let instance = FsmInstance::<BallotTypes, _>::new(ballot(), Ballot::Idle, Votes::default());

        let response = instance.do_event(Cast::Open, Some(&1)).unwrap();
        assert_eq!(response.state, Ballot::Collecting);
        assert_eq!(response.response.as_deref(), Some("need 1"));
        assert_eq!(instance.payload().needed, 1);

        let response = instance.do_event(Cast::Vote, None).unwrap();
        assert_eq!(response.state, Ballot::Accepted);
        assert_eq!(instance.current_state(), Ballot::Accepted);

        let (state, payload) = instance.into_parts();
        assert_eq!(state, Ballot::Accepted);
        assert_eq!(payload.yes, 1);
    }

    #[test]
    fn test_rejected_event_leaves_instance_untouched() {
        let votes = Votes {
            needed: 3,
            yes: 1,
            vetoed: false,
        };
        let instance = FsmInstance::<BallotTypes, _>::new(ballot(), Ballot::Collecting, votes.clone());

        let err = instance.do_event(Cast::Open, None).unwrap_err();
        assert!(matches!(err, FsmError::InvalidTransition { .. }));
        assert!(instance.do_event(Cast::Broken, None).is_err());
        assert!(instance.do_event(Cast::SetRejected, None).is_err());

        assert_eq!(instance.current_state(), Ballot::Collecting);
        assert_eq!(instance.payload(), votes);
    }

    #[test]
    fn test_shared_resolver() {
        let machine = Arc::new(ballot());
        let first = FsmInstance::<BallotTypes, _>::new(machine.clone(), Ballot::Idle, Votes::default());
        let second = FsmInstance::<BallotTypes, _>::new(machine, Ballot::Idle, Votes::default());

        first.do_event(Cast::Open, Some(&5)).unwrap();
        assert_eq!(first.current_state(), Ballot::Collecting);
        assert_eq!(second.current_state(), Ballot::Idle);
        assert_eq!(first.resolver().name(), "ballot");
    }
}
