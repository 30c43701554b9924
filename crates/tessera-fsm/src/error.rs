//! Engine errors.
//!
//! Construction errors describe malformed transition tables and are programming
//! mistakes; `Fsm::must_new` turns them into panics at startup. Transition
//! errors are returned from `do_event` and never change state.

/// Errors raised by the state machine engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsmError {
    /// Machine constructed without a name
    #[error("machine name must not be empty")]
    EmptyName,

    /// Event declared without any source state
    #[error("machine `{machine}`: event `{event}` has no source states")]
    EventWithoutSource {
        /// Machine name
        machine: String,
        /// Offending event
        event: String,
    },

    /// The same `(source, event)` pair declared twice
    #[error("machine `{machine}`: duplicate transition from `{state}` on `{event}`")]
    DuplicateTransition {
        /// Machine name
        machine: String,
        /// Source state of the duplicated pair
        state: String,
        /// Event of the duplicated pair
        event: String,
    },

    /// Fewer than two distinct states in the table
    #[error("machine `{machine}` needs at least two distinct states")]
    TooFewStates {
        /// Machine name
        machine: String,
    },

    /// Every state is used as a source, so the machine can never finish
    #[error("machine `{machine}` has no terminal state")]
    NoTerminalState {
        /// Machine name
        machine: String,
    },

    /// The initial state has no outgoing event
    #[error("machine `{machine}`: initial state `{state}` is not a source of any event")]
    InitialStateNotSource {
        /// Machine name
        machine: String,
        /// Initial state
        state: String,
    },

    /// A callback was registered for an event missing from the table
    #[error("machine `{machine}`: callback registered for undeclared event `{event}`")]
    UnknownCallbackEvent {
        /// Machine name
        machine: String,
        /// Undeclared event
        event: String,
    },

    /// Two auto events leave the same state
    #[error("machine `{machine}`: state `{state}` has more than one auto event")]
    AmbiguousAutoEvent {
        /// Machine name
        machine: String,
        /// State with competing auto events
        state: String,
    },

    /// Auto events are only fired by the engine, so they must be internal
    #[error("machine `{machine}`: auto event `{event}` must be internal")]
    AutoEventNotInternal {
        /// Machine name
        machine: String,
        /// Offending event
        event: String,
    },

    /// No transition for `(state, event)`
    #[error("invalid transition: event `{event}` is not allowed from state `{state}`")]
    InvalidTransition {
        /// Current state
        state: String,
        /// Rejected event
        event: String,
    },

    /// Internal event invoked from outside a callback
    #[error("event `{event}` is internal and cannot be triggered externally")]
    InternalEventRejected {
        /// Rejected event
        event: String,
    },

    /// Auto events kept firing without settling
    #[error("machine `{machine}`: auto events did not settle after leaving `{state}`")]
    AutoEventLoop {
        /// Machine name
        machine: String,
        /// State where the chain started
        state: String,
    },
}

impl FsmError {
    /// Create an invalid transition error from displayable state and event
    pub fn invalid_transition(state: impl ToString, event: impl ToString) -> Self {
        Self::InvalidTransition {
            state: state.to_string(),
            event: event.to_string(),
        }
    }

    /// True for errors that come from a malformed transition table
    pub fn is_construction_error(&self) -> bool {
        !matches!(
            self,
            Self::InvalidTransition { .. }
                | Self::InternalEventRejected { .. }
                | Self::AutoEventLoop { .. }
        )
    }
}
