//! tischat-client: networking core of the tischat chat client
//!
//! This crate provides:
//! - [`DispatchHub`]: owns the server connection, bridges blocking reads onto
//!   the async socket, and routes server transmissions in arrival order
//! - [`ConnectionStateMachine`]: the logged-out / connecting / welcomed /
//!   logging-out lifecycle
//! - [`UiDelegate`] and [`Roster`]: the callbacks the hub delivers to
//! - [`ActiveUserList`] and [`ConversationLinks`]: in-memory roster and the
//!   user-to-conversation table
//! - [`ClientConfig`]: settings loaded from `config.toml`

pub mod config;
pub mod handler;
pub mod hub;
pub mod roster;
pub mod state;

pub use config::{ClientConfig, HubConfig, LoggingConfig, DEFAULT_PORT};
pub use handler::{parse_user_list, Roster, UiDelegate};
pub use hub::{DispatchHub, SocketHandle};
pub use roster::{ActiveUser, ActiveUserList, ConversationId, ConversationLinks};
pub use state::{ConnectionState, ConnectionStateMachine, IllegalTransition, LifecycleEvent, Transition};

pub use tischat_protocol::{ProtocolError, Transmission, Vocabulary};
pub use tischat_utils::ConnectionError;
