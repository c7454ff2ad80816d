//! Connection lifecycle state machine
//!
//! ```text
//! LoggedOut -> Connecting -> Welcomed -> LoggingOut -> LoggedOut
//! Connecting -> LoggedOut     username taken, connect failure
//! Welcomed   -> LoggedOut     socket lost
//! any        -> LoggedOut     kill
//! ```
//!
//! Only tracks state. The hub decides what to do about each transition.

use std::fmt;

/// Where a connection is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    LoggedOut,
    Connecting,
    Welcomed,
    LoggingOut,
}

/// Something that happened to the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// `connect` accepted; the caller follows up with a login
    ConnectRequested,
    WelcomeReceived,
    UsernameTakenReceived,
    /// Connect failure or socket loss
    SocketLost,
    /// User asked for a graceful close
    CloseRequested,
    /// Queued writes flushed and the socket is shut
    CloseCompleted,
    Killed,
}

/// A state change that was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub event: LifecycleEvent,
}

impl Transition {
    pub fn is_change(&self) -> bool {
        self.from != self.to
    }

    /// An established session went away without being asked to
    pub fn is_unexpected_loss(&self) -> bool {
        self.event == LifecycleEvent::SocketLost
            && matches!(self.from, ConnectionState::Connecting | ConnectionState::Welcomed)
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} -> {:?} on {:?}", self.from, self.to, self.event)
    }
}

/// Event not allowed in the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{event:?} is not allowed while {from:?}")]
pub struct IllegalTransition {
    pub from: ConnectionState,
    pub event: LifecycleEvent,
}

/// Tracks the state of one hub's connection
#[derive(Debug, Default)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Apply an event, moving to the next state if it is legal here
    pub fn apply(&mut self, event: LifecycleEvent) -> Result<Transition, IllegalTransition> {
        use ConnectionState::*;
        use LifecycleEvent::*;

        let from = self.state;
        let to = match (from, event) {
            (_, Killed) => LoggedOut,
            (LoggedOut, ConnectRequested) => Connecting,
            (Connecting, WelcomeReceived) => Welcomed,
            (Connecting, UsernameTakenReceived) => LoggedOut,
            (Connecting | Welcomed, SocketLost) => LoggedOut,
            (Connecting | Welcomed, CloseRequested) => LoggingOut,
            (LoggingOut, CloseCompleted | SocketLost) => LoggedOut,
            _ => return Err(IllegalTransition { from, event }),
        };

        self.state = to;
        Ok(Transition { from, to, event })
    }
}
