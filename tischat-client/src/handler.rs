//! Collaborator interfaces the hub delivers to
//!
//! Both traits are driven from the hub's single delivery thread, one call
//! at a time and in network arrival order, so implementations never see
//! concurrent callbacks.

use std::collections::HashSet;

use tischat_protocol::{ProtocolError, Transmission};
use tischat_utils::ConnectionError;

use crate::state::Transition;

/// Receives routed server transmissions and connection notifications
pub trait UiDelegate: Send {
    /// The connection dropped without the user asking for it
    fn connection_lost(&mut self, reason: &ConnectionError);

    fn welcomed(&mut self, transmission: Transmission);

    fn username_taken(&mut self, transmission: Transmission);

    fn user_connected(&mut self, transmission: Transmission);

    fn user_disconnected(&mut self, transmission: Transmission);

    fn active_users_snapshot(&mut self, transmission: Transmission);

    fn public_message(&mut self, transmission: Transmission);

    fn private_message(&mut self, transmission: Transmission);

    /// The server reported an error
    fn transmission_error(&mut self, transmission: Transmission);

    /// The socket is up; a good moment to send the login
    fn connected(&mut self) {}

    /// Every applied state change, in order
    fn state_changed(&mut self, _transition: &Transition) {}

    /// A unit from the server could not be decoded and was dropped
    fn protocol_fault(&mut self, _error: &ProtocolError) {}
}

/// Active user list updated from roster-affecting transmissions
pub trait Roster: Send {
    fn add_user(&mut self, name: &str);

    fn remove_user(&mut self, name: &str);

    /// Drop every user not named in `keep`
    fn filter_users(&mut self, keep: &HashSet<String>);
}

/// Parse the comma-separated user list of an active users snapshot
pub fn parse_user_list(argument: &str) -> Vec<String> {
    argument
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
