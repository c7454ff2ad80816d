//! tischat-protocol: TISCaP wire definitions
//!
//! This crate defines the transmission unit exchanged between a tischat
//! client and server, the vocabulary of verbs both sides agree on, and the
//! line-oriented codec that frames transmissions on a byte stream.

pub mod codec;
pub mod error;
pub mod transmission;
pub mod vocabulary;

// Re-export main types at crate root
pub use codec::{RawFrame, TransmissionCodec, DEFAULT_MAX_LINE_LENGTH};
pub use error::{CodecError, ProtocolError, TransmissionError, VocabularyError};
pub use transmission::Transmission;
pub use vocabulary::{LineEnding, VerbRole, VerbSpec, Vocabulary, VocabularyBuilder, TISCAP_EOT};
