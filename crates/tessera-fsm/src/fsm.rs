//! Immutable state machine definitions.
//!
//! An [`Fsm`] is a transition table plus per-event callbacks. It never stores
//! progress: [`Fsm::fire`] takes the current state and payload, works on a copy
//! of the payload and hands back the new state only if every callback along the
//! way succeeded.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::Hash;

use tracing::debug;

use crate::FsmError;

/// Type family a machine is defined over.
///
/// States and events are closed enums in practice; the engine only needs to
/// order, compare and print them.
pub trait FsmTypes: 'static {
    /// State identifier
    type State: Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;
    /// Event identifier
    type Event: Copy + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;
    /// Round-scoped payload mutated by callbacks
    type Payload: Clone + Send;
    /// Decoded request passed to callbacks of external events
    type Request;
    /// Value produced by callbacks for the caller
    type Response;
    /// Error returned by callbacks and by `fire`
    type Error: From<FsmError>;
}

/// Callback attached to an event.
///
/// Receives the working payload, the event being applied and the request (only
/// for the externally triggered event of a `do_event` call; auto events get `None`).
pub type Callback<T> = fn(
    &mut <T as FsmTypes>::Payload,
    <T as FsmTypes>::Event,
    Option<&<T as FsmTypes>::Request>,
) -> Result<Outcome<T>, <T as FsmTypes>::Error>;

/// What a callback hands back to the engine.
pub struct Outcome<T: FsmTypes> {
    /// Response for the caller of `do_event`
    pub response: Option<T::Response>,
    /// Event used instead of the incoming one to resolve the destination
    pub out_event: Option<T::Event>,
}

impl<T: FsmTypes> Outcome<T> {
    /// Follow the declared transition, nothing to report
    pub fn none() -> Self {
        Self {
            response: None,
            out_event: None,
        }
    }

    /// Follow the declared transition and report a response
    pub fn respond(response: T::Response) -> Self {
        Self {
            response: Some(response),
            out_event: None,
        }
    }

    /// Resolve the destination through `event` instead
    pub fn redirect(event: T::Event) -> Self {
        Self {
            response: None,
            out_event: Some(event),
        }
    }

    /// Attach a response
    pub fn with_response(mut self, response: T::Response) -> Self {
        self.response = Some(response);
        self
    }
}

impl<T: FsmTypes> Default for Outcome<T> {
    fn default() -> Self {
        Self::none()
    }
}

/// Declaration of one event in a transition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDesc<S, E> {
    /// Event name
    pub name: E,
    /// States the event may fire from
    pub src: Vec<S>,
    /// Destination state
    pub dst: S,
    /// Only reachable from inside the engine
    pub internal: bool,
    /// Fired by the engine right after landing in one of `src`
    pub auto: bool,
}

impl<S, E> EventDesc<S, E> {
    /// External event from `src` to `dst`
    pub fn new(name: E, src: impl IntoIterator<Item = S>, dst: S) -> Self {
        Self {
            name,
            src: src.into_iter().collect(),
            dst,
            internal: false,
            auto: false,
        }
    }

    /// Mark the event internal
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// Mark the event auto (and therefore internal)
    pub fn auto(mut self) -> Self {
        self.auto = true;
        self.internal = true;
        self
    }
}

/// Who triggered an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Caller of `do_event`
    External,
    /// The engine itself
    Internal,
}

#[derive(Debug, Clone, Copy)]
struct Transition<S> {
    dst: S,
    internal: bool,
}

/// Result of a successful `fire`.
pub struct Fired<T: FsmTypes> {
    /// State after the event and any auto events
    pub state: T::State,
    /// Payload after all callbacks ran
    pub payload: T::Payload,
    /// Last response produced along the chain
    pub response: Option<T::Response>,
}

/// Immutable machine definition.
pub struct Fsm<T: FsmTypes> {
    name: String,
    initial: T::State,
    transitions: BTreeMap<(T::State, T::Event), Transition<T::State>>,
    callbacks: BTreeMap<T::Event, Callback<T>>,
    auto_events: BTreeMap<T::State, T::Event>,
    events: BTreeSet<T::Event>,
    internal_events: BTreeSet<T::Event>,
    states: BTreeSet<T::State>,
    source_states: BTreeSet<T::State>,
}

impl<T: FsmTypes> fmt::Debug for Fsm<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fsm")
            .field("name", &self.name)
            .field("initial", &self.initial)
            .field("states", &self.states.len())
            .field("events", &self.events.len())
            .finish()
    }
}

impl<T: FsmTypes> Fsm<T> {
    /// Build a machine, panicking on a malformed table.
    #[allow(clippy::panic)]
    pub fn must_new(
        name: impl Into<String>,
        initial: T::State,
        events: Vec<EventDesc<T::State, T::Event>>,
        callbacks: Vec<(T::Event, Callback<T>)>,
    ) -> Self {
        match Self::try_new(name, initial, events, callbacks) {
            Ok(machine) => machine,
            Err(err) => panic!("invalid state machine definition: {err}"),
        }
    }

    /// Build a machine, reporting a malformed table as an error.
    pub fn try_new(
        name: impl Into<String>,
        initial: T::State,
        events: Vec<EventDesc<T::State, T::Event>>,
        callbacks: Vec<(T::Event, Callback<T>)>,
    ) -> Result<Self, FsmError> {
        let name = name.into();
        if name.is_empty() {
            return Err(FsmError::EmptyName);
        }

        let mut transitions = BTreeMap::new();
        let mut auto_events = BTreeMap::new();
        let mut event_names = BTreeSet::new();
        let mut internal_events = BTreeSet::new();
        let mut states = BTreeSet::from([initial]);
        let mut source_states = BTreeSet::new();

        for desc in events {
            if desc.src.is_empty() {
                return Err(FsmError::EventWithoutSource {
                    machine: name,
                    event: desc.name.to_string(),
                });
            }
            if desc.auto && !desc.internal {
                return Err(FsmError::AutoEventNotInternal {
                    machine: name,
                    event: desc.name.to_string(),
                });
            }

            event_names.insert(desc.name);
            if desc.internal {
                internal_events.insert(desc.name);
            }
            states.insert(desc.dst);

            for src in desc.src {
                states.insert(src);
                source_states.insert(src);

                let transition = Transition {
                    dst: desc.dst,
                    internal: desc.internal,
                };
                if transitions.insert((src, desc.name), transition).is_some() {
                    return Err(FsmError::DuplicateTransition {
                        machine: name,
                        state: src.to_string(),
                        event: desc.name.to_string(),
                    });
                }

                if desc.auto && auto_events.insert(src, desc.name).is_some() {
                    return Err(FsmError::AmbiguousAutoEvent {
                        machine: name,
                        state: src.to_string(),
                    });
                }
            }
        }

        if states.len() < 2 {
            return Err(FsmError::TooFewStates { machine: name });
        }
        if states.iter().all(|state| source_states.contains(state)) {
            return Err(FsmError::NoTerminalState { machine: name });
        }
        if !source_states.contains(&initial) {
            return Err(FsmError::InitialStateNotSource {
                machine: name,
                state: initial.to_string(),
            });
        }

        let mut callback_map = BTreeMap::new();
        for (event, callback) in callbacks {
            if !event_names.contains(&event) {
                return Err(FsmError::UnknownCallbackEvent {
                    machine: name,
                    event: event.to_string(),
                });
            }
            callback_map.insert(event, callback);
        }

        Ok(Self {
            name,
            initial,
            transitions,
            callbacks: callback_map,
            auto_events,
            events: event_names,
            internal_events,
            states,
            source_states,
        })
    }

    /// Machine name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// State a fresh instance starts in
    pub fn initial_state(&self) -> T::State {
        self.initial
    }

    /// Every state mentioned by the table
    pub fn states(&self) -> impl Iterator<Item = T::State> + '_ {
        self.states.iter().copied()
    }

    /// States with at least one outgoing event
    pub fn source_states(&self) -> impl Iterator<Item = T::State> + '_ {
        self.source_states.iter().copied()
    }

    /// Every declared event
    pub fn events(&self) -> impl Iterator<Item = T::Event> + '_ {
        self.events.iter().copied()
    }

    /// True if `event` may only be fired by the engine
    pub fn is_internal(&self, event: T::Event) -> bool {
        self.internal_events.contains(&event)
    }

    /// True if `state` has no outgoing event
    pub fn is_terminal(&self, state: T::State) -> bool {
        self.states.contains(&state) && !self.source_states.contains(&state)
    }

    /// True if `event` is declared from `state`
    pub fn can(&self, state: T::State, event: T::Event) -> bool {
        self.transitions.contains_key(&(state, event))
    }

    /// Apply `event` in `state`, then any auto events, on a copy of `payload`.
    pub fn fire(
        &self,
        state: T::State,
        event: T::Event,
        payload: &T::Payload,
        request: Option<&T::Request>,
        origin: Origin,
    ) -> Result<Fired<T>, T::Error> {
        let mut working = payload.clone();
        let (mut current, mut response) = self.step(state, event, &mut working, request, origin)?;

        let mut auto_steps = 0;
        while let Some(auto_event) = self.auto_events.get(&current).copied() {
            auto_steps += 1;
            if auto_steps > self.states.len() {
                return Err(FsmError::AutoEventLoop {
                    machine: self.name.clone(),
                    state: state.to_string(),
                }
                .into());
            }

            let (next, auto_response) =
                self.step(current, auto_event, &mut working, None, Origin::Internal)?;
            if auto_response.is_some() {
                response = auto_response;
            }
            if next == current {
                break;
            }
            current = next;
        }

        Ok(Fired {
            state: current,
            payload: working,
            response,
        })
    }

    fn step(
        &self,
        state: T::State,
        event: T::Event,
        payload: &mut T::Payload,
        request: Option<&T::Request>,
        origin: Origin,
    ) -> Result<(T::State, Option<T::Response>), T::Error> {
        let transition = self
            .transitions
            .get(&(state, event))
            .ok_or_else(|| FsmError::invalid_transition(state, event))?;

        if transition.internal && origin == Origin::External {
            return Err(FsmError::InternalEventRejected {
                event: event.to_string(),
            }
            .into());
        }

        let outcome = match self.callbacks.get(&event) {
            Some(callback) => callback(payload, event, request)?,
            None => Outcome::none(),
        };

        let dst = match outcome.out_event {
            Some(out_event) if out_event != event => self
                .transitions
                .get(&(state, out_event))
                .map(|redirected| redirected.dst)
                .ok_or_else(|| FsmError::invalid_transition(state, out_event))?,
            _ => transition.dst,
        };

        debug!(
            machine = %self.name,
            from = %state,
            event = %event,
            to = %dst,
            "fsm step"
        );

        Ok((dst, outcome.response))
    }
}
