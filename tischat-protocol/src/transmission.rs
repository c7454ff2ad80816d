//! One protocol message unit

use crate::error::TransmissionError;
use crate::vocabulary::{VerbRole, VerbSpec, Vocabulary};

/// An immutable verb / argument / data triple.
///
/// `data` is present exactly when the verb carries data, and the verb is
/// always one the vocabulary knows, spelled the way the vocabulary spells it.
/// A header with no argument (`welcome`) and one with an empty argument
/// (`welcome `) are different transmissions, and so are two headers whose
/// verb and argument are separated by different whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    verb: String,
    role: VerbRole,
    argument: Option<Argument>,
    data: Option<String>,
}

/// Argument text and the whitespace that introduced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Argument {
    pub(crate) separator: char,
    pub(crate) text: String,
}

impl Transmission {
    /// Build a transmission, checking it against `vocab`.
    ///
    /// An empty `argument` means the header carries none.
    pub fn new(
        vocab: &Vocabulary,
        verb: &str,
        argument: &str,
        data: Option<&str>,
    ) -> Result<Self, TransmissionError> {
        let spec = vocab.lookup(verb).ok_or_else(|| TransmissionError::UnknownVerb {
            verb: verb.to_string(),
        })?;

        match (spec.carries_data(), data.is_some()) {
            (true, false) => {
                return Err(TransmissionError::DataRequired {
                    verb: spec.name().to_string(),
                })
            }
            (false, true) => {
                return Err(TransmissionError::DataNotAllowed {
                    verb: spec.name().to_string(),
                })
            }
            _ => {}
        }

        if argument.contains(['\r', '\n']) {
            return Err(TransmissionError::InvalidArgument {
                verb: spec.name().to_string(),
            });
        }

        Ok(Self::from_parts(
            spec,
            (!argument.is_empty()).then(|| Argument {
                separator: ' ',
                text: argument.to_string(),
            }),
            data.map(str::to_string),
        ))
    }

    /// Assemble from already-validated pieces
    pub(crate) fn from_parts(spec: &VerbSpec, argument: Option<Argument>, data: Option<String>) -> Self {
        Self {
            verb: spec.name().to_string(),
            role: spec.role(),
            argument,
            data,
        }
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn role(&self) -> VerbRole {
        self.role
    }

    /// Argument text; empty when the verb was sent without one
    pub fn argument(&self) -> &str {
        self.argument.as_ref().map_or("", |arg| &arg.text)
    }

    /// True when the header has a separator after the verb, even if
    /// nothing follows it
    pub fn has_argument(&self) -> bool {
        self.argument.is_some()
    }

    /// Whitespace between verb and argument, if there is an argument
    pub fn separator(&self) -> Option<char> {
        self.argument.as_ref().map(|arg| arg.separator)
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    pub fn into_parts(self) -> (String, String, Option<String>) {
        let argument = self.argument.map(|arg| arg.text).unwrap_or_default();
        (self.verb, argument, self.data)
    }
}
