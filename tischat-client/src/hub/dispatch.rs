//! Ordered delivery to the UI delegate and roster
//!
//! Runs on one dedicated thread that owns both collaborators. Events from a
//! connection that has since been replaced or killed are dropped here.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;

use tischat_protocol::{ProtocolError, Transmission, VerbRole};
use tischat_utils::ConnectionError;

use super::Shared;
use crate::handler::{parse_user_list, Roster, UiDelegate};
use crate::state::LifecycleEvent;

/// Something a connection's tasks observed
#[derive(Debug)]
pub(crate) enum LinkEvent {
    Established,
    Received(Result<Transmission, ProtocolError>),
    /// `None` when the close was asked for
    Ended(Option<ConnectionError>),
}

#[derive(Debug)]
pub(crate) enum DeliveryEvent {
    Link { id: u64, event: LinkEvent },
    /// A caller's thread applied state changes; they wait in [`Shared`]
    StateChanged,
    Shutdown,
}

pub(crate) struct Dispatcher {
    shared: Arc<Shared>,
    delegate: Box<dyn UiDelegate>,
    roster: Box<dyn Roster>,
}

impl Dispatcher {
    pub(crate) fn new(
        shared: Arc<Shared>,
        delegate: Box<dyn UiDelegate>,
        roster: Box<dyn Roster>,
    ) -> Self {
        Self {
            shared,
            delegate,
            roster,
        }
    }

    /// Deliver events until the hub shuts down
    pub(crate) fn run(mut self, mut events: mpsc::UnboundedReceiver<DeliveryEvent>) {
        while let Some(event) = events.blocking_recv() {
            self.flush_state_changes();
            match event {
                DeliveryEvent::Shutdown => break,
                DeliveryEvent::StateChanged => {}
                DeliveryEvent::Link { id, event } => self.link_event(id, event),
            }
        }
        tracing::debug!("Delivery thread exiting");
    }

    fn link_event(&mut self, id: u64, event: LinkEvent) {
        if !self.shared.is_current(id) {
            tracing::debug!(id, ?event, "Discarding event from replaced connection");
            return;
        }

        match event {
            LinkEvent::Established => self.delegate.connected(),
            LinkEvent::Received(Ok(transmission)) => self.route(id, transmission),
            LinkEvent::Received(Err(error)) => {
                tracing::warn!(id, %error, "Dropping undecodable transmission");
                self.delegate.protocol_fault(&error);
            }
            LinkEvent::Ended(reason) => self.ended(id, reason),
        }
    }

    fn route(&mut self, id: u64, transmission: Transmission) {
        tracing::debug!(
            id,
            verb = transmission.verb(),
            argument = transmission.argument(),
            "Routing transmission"
        );

        match transmission.role() {
            VerbRole::Welcome => {
                self.apply(id, LifecycleEvent::WelcomeReceived);
                self.delegate.welcomed(transmission);
            }
            VerbRole::UsernameTaken => {
                if self.apply(id, LifecycleEvent::UsernameTakenReceived) {
                    self.shared.release_link(id);
                }
                self.delegate.username_taken(transmission);
            }
            VerbRole::UserConnected => {
                self.roster.add_user(transmission.argument());
                self.delegate.user_connected(transmission);
            }
            VerbRole::UserDisconnected => {
                self.roster.remove_user(transmission.argument());
                self.delegate.user_disconnected(transmission);
            }
            VerbRole::ActiveUsers => {
                let names = parse_user_list(transmission.argument());
                let keep: HashSet<String> = names.iter().cloned().collect();
                self.roster.filter_users(&keep);
                for name in &names {
                    self.roster.add_user(name);
                }
                self.delegate.active_users_snapshot(transmission);
            }
            VerbRole::PublicMessage => self.delegate.public_message(transmission),
            VerbRole::PrivateMessage => self.delegate.private_message(transmission),
            VerbRole::Error => self.delegate.transmission_error(transmission),
            VerbRole::Login
            | VerbRole::ListUsers
            | VerbRole::SendPublic
            | VerbRole::SendPrivate
            | VerbRole::Close => {
                tracing::warn!(id, verb = transmission.verb(), "Server sent a client-only verb, ignoring");
            }
        }
    }

    fn ended(&mut self, id: u64, reason: Option<ConnectionError>) {
        let Some(transition) = self.shared.finish_link(id, reason.is_some()) else {
            return;
        };

        self.flush_state_changes();
        if transition.is_unexpected_loss() {
            let reason = reason.unwrap_or_else(ConnectionError::closed_by_peer);
            tracing::warn!(id, %reason, "Connection lost");
            self.delegate.connection_lost(&reason);
        }
    }

    /// Tell the delegate about every applied change, whichever thread
    /// applied it, in the order they were applied
    fn flush_state_changes(&mut self) {
        for transition in self.shared.take_notices() {
            self.delegate.state_changed(&transition);
        }
    }

    /// Apply a state change for connection `id`, telling the delegate.
    /// Returns whether it was applied.
    fn apply(&mut self, id: u64, event: LifecycleEvent) -> bool {
        match self.shared.apply_if_current(id, event) {
            Some(Ok(_)) => {
                self.flush_state_changes();
                true
            }
            Some(Err(illegal)) => {
                tracing::warn!(id, %illegal, "Ignoring out-of-place transmission");
                false
            }
            None => false,
        }
    }
}
