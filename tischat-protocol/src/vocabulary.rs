//! The set of verbs a connection understands
//!
//! A [`Vocabulary`] is built once at startup and shared for the life of the
//! process. It fixes which verbs exist, which of them carry a data block,
//! what each one means to the client, and how a data block is terminated.

use crate::error::{TransmissionError, VocabularyError};
use crate::transmission::Transmission;

/// The TISCaP end-of-transmission marker (U+0004)
pub const TISCAP_EOT: &str = "\u{4}";

/// What a verb means to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerbRole {
    // Client-originated
    Login,
    ListUsers,
    SendPublic,
    SendPrivate,
    Close,

    // Server-originated
    Welcome,
    UsernameTaken,
    UserConnected,
    UserDisconnected,
    ActiveUsers,
    PublicMessage,
    PrivateMessage,
    Error,
}

impl VerbRole {
    /// Whether the server sends this verb (and so it gets routed on arrival)
    pub fn is_server_originated(self) -> bool {
        !matches!(
            self,
            Self::Login | Self::ListUsers | Self::SendPublic | Self::SendPrivate | Self::Close
        )
    }
}

/// Line terminator written by the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Lf => b"\n",
            Self::CrLf => b"\r\n",
        }
    }
}

/// One known verb
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbSpec {
    name: String,
    role: VerbRole,
    carries_data: bool,
}

impl VerbSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> VerbRole {
        self.role
    }

    pub fn carries_data(&self) -> bool {
        self.carries_data
    }
}

/// Known verbs, the carries-data subset, and framing constants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    verbs: Vec<VerbSpec>,
    marker: String,
    line_ending: LineEnding,
}

impl Vocabulary {
    /// The TISCaP verb set spoken by tischat-server
    pub fn tiscap() -> Self {
        use VerbRole::*;

        let verbs = [
            ("/login", Login, false),
            ("/users", ListUsers, false),
            ("/public", SendPublic, true),
            ("/private", SendPrivate, true),
            ("/close", Close, false),
            ("]welcome", Welcome, false),
            ("]usernametaken", UsernameTaken, false),
            ("]connected", UserConnected, false),
            ("]disconnected", UserDisconnected, false),
            ("]activeusers", ActiveUsers, false),
            ("]public", PublicMessage, true),
            ("]private", PrivateMessage, true),
            ("]error", Error, false),
            ("]badsyntax", Error, false),
        ];

        Self {
            verbs: verbs
                .into_iter()
                .map(|(name, role, carries_data)| VerbSpec {
                    name: name.to_string(),
                    role,
                    carries_data,
                })
                .collect(),
            marker: TISCAP_EOT.to_string(),
            line_ending: LineEnding::CrLf,
        }
    }

    pub fn builder() -> VocabularyBuilder {
        VocabularyBuilder::default()
    }

    /// Find a verb, ignoring ASCII case
    pub fn lookup(&self, verb: &str) -> Option<&VerbSpec> {
        self.verbs
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(verb))
    }

    /// First verb registered for a role
    pub fn verb_for(&self, role: VerbRole) -> Option<&VerbSpec> {
        self.verbs.iter().find(|spec| spec.role == role)
    }

    pub fn is_known(&self, verb: &str) -> bool {
        self.lookup(verb).is_some()
    }

    pub fn carries_data(&self, verb: &str) -> bool {
        self.lookup(verb).is_some_and(VerbSpec::carries_data)
    }

    pub fn verbs(&self) -> impl Iterator<Item = &VerbSpec> {
        self.verbs.iter()
    }

    /// Text of the line that terminates a data block
    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// Same verbs, different line terminator
    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    fn for_role(
        &self,
        role: VerbRole,
        argument: &str,
        data: Option<&str>,
    ) -> Result<Transmission, TransmissionError> {
        let spec = self
            .verb_for(role)
            .ok_or(TransmissionError::NoVerbForRole(role))?;
        Transmission::new(self, spec.name(), argument, data)
    }

    /// Ask to join the chat circle under `username`
    pub fn login(&self, username: &str) -> Result<Transmission, TransmissionError> {
        self.for_role(VerbRole::Login, username, None)
    }

    /// Ask the server for an active users snapshot
    pub fn list_users(&self) -> Result<Transmission, TransmissionError> {
        self.for_role(VerbRole::ListUsers, "", None)
    }

    pub fn public(&self, text: &str) -> Result<Transmission, TransmissionError> {
        self.for_role(VerbRole::SendPublic, "", Some(text))
    }

    pub fn private(&self, to: &str, text: &str) -> Result<Transmission, TransmissionError> {
        self.for_role(VerbRole::SendPrivate, to, Some(text))
    }

    /// Protocol-level close handshake
    pub fn close(&self) -> Result<Transmission, TransmissionError> {
        self.for_role(VerbRole::Close, "", None)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::tiscap()
    }
}

/// Builds a custom [`Vocabulary`]
#[derive(Debug, Clone)]
pub struct VocabularyBuilder {
    verbs: Vec<VerbSpec>,
    marker: String,
    line_ending: LineEnding,
}

impl Default for VocabularyBuilder {
    fn default() -> Self {
        Self {
            verbs: Vec::new(),
            marker: TISCAP_EOT.to_string(),
            line_ending: LineEnding::Lf,
        }
    }
}

impl VocabularyBuilder {
    pub fn verb(mut self, name: impl Into<String>, role: VerbRole, carries_data: bool) -> Self {
        self.verbs.push(VerbSpec {
            name: name.into(),
            role,
            carries_data,
        });
        self
    }

    pub fn marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    pub fn line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    pub fn build(self) -> Result<Vocabulary, VocabularyError> {
        if self.marker.is_empty()
            || self.marker.contains(['\r', '\n'])
            || self.marker.starts_with('\\')
        {
            return Err(VocabularyError::InvalidMarker(self.marker));
        }

        for (i, spec) in self.verbs.iter().enumerate() {
            if spec.name.is_empty() || spec.name.contains(char::is_whitespace) {
                return Err(VocabularyError::InvalidVerb(spec.name.clone()));
            }
            if self.verbs[..i]
                .iter()
                .any(|earlier| earlier.name.eq_ignore_ascii_case(&spec.name))
            {
                return Err(VocabularyError::DuplicateVerb(spec.name.clone()));
            }
        }

        Ok(Vocabulary {
            verbs: self.verbs,
            marker: self.marker,
            line_ending: self.line_ending,
        })
    }
}
