//! Protocol error types

use crate::vocabulary::VerbRole;

/// A single transmission could not be decoded.
///
/// These are values, not stream faults: the offending unit has been fully
/// consumed and decoding resumes at the next line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Unknown verb: {verb}")]
    UnknownVerb { verb: String },

    #[error("Malformed line: {reason}")]
    MalformedLine { reason: String },

    #[error("Stream ended before end of transmission for {verb}")]
    Truncated { verb: String },
}

impl ProtocolError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedLine {
            reason: reason.into(),
        }
    }
}

/// Fatal codec error; the stream cannot continue after one of these
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line too long: {len} bytes (max {max})")]
    LineTooLong { len: usize, max: usize },
}

/// Attempt to build a transmission that breaks the wire invariants
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransmissionError {
    #[error("Unknown verb: {verb}")]
    UnknownVerb { verb: String },

    #[error("Verb {verb} requires a data block")]
    DataRequired { verb: String },

    #[error("Verb {verb} does not take a data block")]
    DataNotAllowed { verb: String },

    #[error("Argument for {verb} must fit on one line")]
    InvalidArgument { verb: String },

    #[error("Vocabulary has no verb for {0:?}")]
    NoVerbForRole(VerbRole),
}

/// Rejected vocabulary definition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VocabularyError {
    #[error("Verb {0:?} must be non-empty and contain no whitespace")]
    InvalidVerb(String),

    #[error("Verb {0} is defined twice")]
    DuplicateVerb(String),

    #[error("End-of-transmission marker {0:?} must be non-empty, single-line and not start with a backslash")]
    InvalidMarker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::UnknownVerb {
            verb: "]shrug".into(),
        };
        assert_eq!(err.to_string(), "Unknown verb: ]shrug");

        let err = ProtocolError::Truncated {
            verb: "]public".into(),
        };
        assert!(err.to_string().contains("]public"));
    }

    #[test]
    fn test_malformed_helper() {
        let err = ProtocolError::malformed("empty line");
        assert_eq!(err.to_string(), "Malformed line: empty line");
    }

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::LineTooLong { len: 10, max: 4 };
        assert_eq!(err.to_string(), "Line too long: 10 bytes (max 4)");
    }

    #[test]
    fn test_transmission_error_display() {
        let err = TransmissionError::NoVerbForRole(VerbRole::Close);
        assert_eq!(err.to_string(), "Vocabulary has no verb for Close");
    }
}
