//! Line codec for transmissions
//!
//! Wire layout of one transmission:
//!
//! ```text
//! <verb>[ <argument>]<eol>
//! [<data line><eol>]...        only for verbs that carry data
//! [<marker><eol>]
//! ```
//!
//! A data line made of zero or more `\` followed by exactly the marker text
//! is written with one extra leading `\`, and decoding removes it again, so
//! any data text survives the trip.
//!
//! The header splits at its first whitespace character, which is kept.
//! `welcome` has no argument while `welcome ` has an empty one, and each
//! encodes back to its own spelling.
//!
//! Line limits count the bytes before the line ending, as written on the
//! wire, so anything the encoder accepts the decoder accepts too.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{CodecError, ProtocolError};
use crate::transmission::{Argument, Transmission};
use crate::vocabulary::{LineEnding, Vocabulary};

/// Default maximum length of a single line (64 KiB)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// One transmission's worth of undecoded lines, line endings removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    header: Bytes,
    data_lines: Option<Vec<Bytes>>,
}

impl RawFrame {
    /// Turn the frame into a transmission.
    ///
    /// Runs independently of the stream, so frames may be parsed in parallel.
    pub fn parse(self, vocab: &Vocabulary) -> Result<Transmission, ProtocolError> {
        let header = std::str::from_utf8(&self.header)
            .map_err(|_| ProtocolError::malformed("header is not valid UTF-8"))?;
        let (verb, argument) = split_header(header)?;

        let spec = vocab.lookup(verb).ok_or_else(|| ProtocolError::UnknownVerb {
            verb: verb.to_string(),
        })?;

        let data = if spec.carries_data() {
            let lines = self.data_lines.ok_or_else(|| ProtocolError::Truncated {
                verb: spec.name().to_string(),
            })?;
            Some(join_data(&lines, vocab.marker())?)
        } else {
            None
        };

        let argument = argument.map(|(separator, text)| Argument {
            separator,
            text: text.to_string(),
        });
        Ok(Transmission::from_parts(spec, argument, data))
    }
}

/// Split a header at its first whitespace character
fn split_header(line: &str) -> Result<(&str, Option<(char, &str)>), ProtocolError> {
    let (verb, argument) = match line.char_indices().find(|(_, c)| c.is_whitespace()) {
        Some((at, separator)) => (
            &line[..at],
            Some((separator, &line[at + separator.len_utf8()..])),
        ),
        None => (line, None),
    };
    if verb.is_empty() {
        return Err(ProtocolError::malformed(if line.is_empty() {
            "empty header line"
        } else {
            "header starts with whitespace"
        }));
    }
    Ok((verb, argument))
}

fn join_data(lines: &[Bytes], marker: &str) -> Result<String, ProtocolError> {
    let mut data = String::new();
    for (i, line) in lines.iter().enumerate() {
        let line = std::str::from_utf8(line)
            .map_err(|_| ProtocolError::malformed("data line is not valid UTF-8"))?;
        if i > 0 {
            data.push('\n');
        }
        data.push_str(unescape_line(line, marker));
    }
    Ok(data)
}

fn is_marker_like(line: &str, marker: &str) -> bool {
    line.trim_start_matches('\\') == marker
}

/// Wire length of a data line, escape included
fn escaped_len(line: &str, marker: &str) -> usize {
    line.len() + usize::from(is_marker_like(line, marker))
}

fn unescape_line<'a>(line: &'a str, marker: &str) -> &'a str {
    if line.starts_with('\\') && is_marker_like(line, marker) {
        &line[1..]
    } else {
        line
    }
}

#[derive(Debug)]
enum DecodeState {
    Header,
    Data { header: Bytes, lines: Vec<Bytes> },
}

/// Encodes and decodes transmissions for one stream
#[derive(Debug)]
pub struct TransmissionCodec {
    vocab: Arc<Vocabulary>,
    max_line_length: usize,
    state: DecodeState,
    /// Where to resume the newline search in a partial line
    next_index: usize,
}

impl TransmissionCodec {
    pub fn new(vocab: Arc<Vocabulary>) -> Self {
        Self::with_max_line_length(vocab, DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(vocab: Arc<Vocabulary>, max_line_length: usize) -> Self {
        Self {
            vocab,
            max_line_length,
            state: DecodeState::Header,
            next_index: 0,
        }
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocab
    }

    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// True when no transmission is partially consumed
    pub fn is_idle(&self) -> bool {
        matches!(self.state, DecodeState::Header)
    }

    /// Forget any partial-line scan position.
    ///
    /// Needed when bytes were taken off the buffer behind the codec's back.
    pub fn reset_scan(&mut self) {
        self.next_index = 0;
    }

    /// Cut the next complete frame off `src`, if one is buffered.
    ///
    /// A header whose verb is unknown or unparsable is returned as a frame
    /// on its own, so the error surfaces at parse time and the stream picks
    /// up again at the following line.
    pub fn next_frame(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>, CodecError> {
        loop {
            let Some(line) = self.take_line(src)? else {
                return Ok(None);
            };

            match std::mem::replace(&mut self.state, DecodeState::Header) {
                DecodeState::Header => {
                    if self.header_carries_data(&line) {
                        self.state = DecodeState::Data {
                            header: line,
                            lines: Vec::new(),
                        };
                    } else {
                        return Ok(Some(RawFrame {
                            header: line,
                            data_lines: None,
                        }));
                    }
                }
                DecodeState::Data { header, mut lines } => {
                    if line[..] == *self.vocab.marker().as_bytes() {
                        return Ok(Some(RawFrame {
                            header,
                            data_lines: Some(lines),
                        }));
                    }
                    lines.push(line);
                    self.state = DecodeState::Data { header, lines };
                }
            }
        }
    }

    /// Like [`next_frame`](Self::next_frame), for when no more bytes will come.
    ///
    /// An unterminated final line is taken as-is; a data block without its
    /// marker yields a frame that parses to [`ProtocolError::Truncated`].
    pub fn next_frame_eof(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>, CodecError> {
        if let Some(frame) = self.next_frame(src)? {
            return Ok(Some(frame));
        }

        self.next_index = 0;
        let leftover = if src.is_empty() {
            None
        } else {
            let mut line = src.split();
            self.strip_cr(&mut line);
            Some(line.freeze())
        };

        match std::mem::replace(&mut self.state, DecodeState::Header) {
            DecodeState::Header => Ok(leftover.map(|header| RawFrame {
                header,
                data_lines: None,
            })),
            DecodeState::Data { header, lines } => {
                let complete = leftover
                    .as_deref()
                    .is_some_and(|l| l == self.vocab.marker().as_bytes());
                if !complete {
                    tracing::debug!(
                        buffered_lines = lines.len(),
                        "stream ended inside a data block"
                    );
                }
                Ok(Some(RawFrame {
                    header,
                    data_lines: complete.then_some(lines),
                }))
            }
        }
    }

    /// Append the wire form of `item` to `dst`
    pub fn encode_transmission(
        &self,
        item: &Transmission,
        dst: &mut BytesMut,
    ) -> Result<(), CodecError> {
        let eol = self.vocab.line_ending().as_bytes();
        let marker = self.vocab.marker();

        let header_len = item.verb().len()
            + item
                .separator()
                .map_or(0, |sep| sep.len_utf8() + item.argument().len());
        self.check_line(header_len)?;
        let data_lines: Vec<&str> = match item.data() {
            Some("") | None => Vec::new(),
            Some(data) => data.split('\n').collect(),
        };
        if item.data().is_some() {
            self.check_line(marker.len())?;
        }
        for line in &data_lines {
            self.check_line(escaped_len(line, marker))?;
        }

        dst.reserve(header_len + eol.len() + item.data().map_or(0, |d| d.len() + 16));
        dst.put_slice(item.verb().as_bytes());
        if let Some(separator) = item.separator() {
            dst.put_slice(separator.encode_utf8(&mut [0; 4]).as_bytes());
            dst.put_slice(item.argument().as_bytes());
        }
        dst.put_slice(eol);

        if item.data().is_some() {
            for line in data_lines {
                if is_marker_like(line, marker) {
                    dst.put_u8(b'\\');
                }
                dst.put_slice(line.as_bytes());
                dst.put_slice(eol);
            }
            dst.put_slice(marker.as_bytes());
            dst.put_slice(eol);
        }

        Ok(())
    }

    /// Encode a single transmission into its own buffer
    pub fn to_bytes(&self, item: &Transmission) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::new();
        self.encode_transmission(item, &mut buf)?;
        Ok(buf.freeze())
    }

    fn check_line(&self, len: usize) -> Result<(), CodecError> {
        if len > self.max_line_length {
            return Err(CodecError::LineTooLong {
                len,
                max: self.max_line_length,
            });
        }
        Ok(())
    }

    fn header_carries_data(&self, line: &[u8]) -> bool {
        std::str::from_utf8(line)
            .ok()
            .and_then(|header| split_header(header).ok())
            .is_some_and(|(verb, _)| self.vocab.carries_data(verb))
    }

    fn strip_cr(&self, line: &mut BytesMut) {
        if self.vocab.line_ending() == LineEnding::CrLf && line.ends_with(b"\r") {
            line.truncate(line.len() - 1);
        }
    }

    /// Length of `line` without the `\r` of a CRLF ending
    fn content_len(&self, line: &[u8]) -> usize {
        match self.vocab.line_ending() {
            LineEnding::CrLf if line.ends_with(b"\r") => line.len() - 1,
            _ => line.len(),
        }
    }

    /// Take one newline-terminated line off `src`, without its line ending
    fn take_line(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, CodecError> {
        let start = self.next_index.min(src.len());
        match src[start..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let end = start + offset;
                self.next_index = 0;
                self.check_line(self.content_len(&src[..end]))?;

                let mut line = src.split_to(end + 1);
                line.truncate(end);
                self.strip_cr(&mut line);
                Ok(Some(line.freeze()))
            }
            None => {
                self.check_line(self.content_len(src))?;
                self.next_index = src.len();
                Ok(None)
            }
        }
    }
}

impl Decoder for TransmissionCodec {
    type Item = Result<Transmission, ProtocolError>;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let vocab = Arc::clone(&self.vocab);
        Ok(self.next_frame(src)?.map(|frame| frame.parse(&vocab)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let vocab = Arc::clone(&self.vocab);
        Ok(self.next_frame_eof(src)?.map(|frame| frame.parse(&vocab)))
    }
}

impl Encoder<Transmission> for TransmissionCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Transmission, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_transmission(&item, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::VerbRole;

    /// Descriptive verb names with a visible marker, LF endings
    fn chat_vocab() -> Arc<Vocabulary> {
        Arc::new(
            Vocabulary::builder()
                .verb("login", VerbRole::Login, false)
                .verb("welcome", VerbRole::Welcome, false)
                .verb("username-taken", VerbRole::UsernameTaken, false)
                .verb("user-connected", VerbRole::UserConnected, true)
                .verb("user-disconnected", VerbRole::UserDisconnected, true)
                .verb("public-message", VerbRole::PublicMessage, true)
                .verb("protocol-error", VerbRole::Error, false)
                .marker("EOT")
                .build()
                .unwrap(),
        )
    }

    fn decode_all(codec: &mut TransmissionCodec, bytes: &str) -> Vec<Result<Transmission, ProtocolError>> {
        let mut buf = BytesMut::from(bytes);
        let mut out = Vec::new();
        while let Some(item) = codec.decode_eof(&mut buf).unwrap() {
            out.push(item);
        }
        out
    }

    fn t(vocab: &Vocabulary, verb: &str, arg: &str, data: Option<&str>) -> Transmission {
        Transmission::new(vocab, verb, arg, data).unwrap()
    }

    // ==================== Decode Tests ====================

    #[test]
    fn test_decode_public_message() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::new(vocab.clone());
        let mut buf = BytesMut::from("public-message alice\nhello there\nEOT\n");

        let decoded = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(decoded.verb(), "public-message");
        assert_eq!(decoded.argument(), "alice");
        assert_eq!(decoded.data(), Some("hello there"));
        assert!(buf.is_empty());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_header_without_argument() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::new(vocab.clone());
        let items = decode_all(&mut codec, "welcome\n");
        assert_eq!(items, vec![Ok(t(&vocab, "welcome", "", None))]);
    }

    #[test]
    fn test_decode_argument_keeps_inner_spaces() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::new(vocab.clone());
        let items = decode_all(&mut codec, "protocol-error No known user  bob\n");
        assert_eq!(items[0].as_ref().unwrap().argument(), "No known user  bob");
    }

    #[test]
    fn test_decode_multiline_data() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::new(vocab.clone());
        let items = decode_all(&mut codec, "public-message bob\nline one\n\nline three\nEOT\n");
        assert_eq!(items[0].as_ref().unwrap().data(), Some("line one\n\nline three"));
    }

    #[test]
    fn test_decode_partial_then_complete() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::new(vocab.clone());
        let mut buf = BytesMut::from("public-message al");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"ice\nhello");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"\nEO");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"T\n");
        let decoded = codec.decode(&mut buf).unwrap().unwrap().unwrap();
        assert_eq!(decoded, t(&vocab, "public-message", "alice", Some("hello")));
    }

    #[test]
    fn test_decode_case_insensitive_verb() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::new(vocab.clone());
        let items = decode_all(&mut codec, "WELCOME\n");
        assert_eq!(items[0].as_ref().unwrap().verb(), "welcome");
    }

    #[test]
    fn test_decode_tiscap_crlf() {
        let vocab = Arc::new(Vocabulary::tiscap());
        let mut codec = TransmissionCodec::new(vocab.clone());
        let items = decode_all(&mut codec, "]private carol\r\nmeet at noon\r\n\u{4}\r\n]welcome\r\n");
        assert_eq!(
            items,
            vec![
                Ok(t(&vocab, "]private", "carol", Some("meet at noon"))),
                Ok(t(&vocab, "]welcome", "", None)),
            ]
        );
    }

    // ==================== Error Recovery Tests ====================

    #[test]
    fn test_unknown_verb_resynchronizes() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::new(vocab.clone());
        let items = decode_all(&mut codec, "shrug whatever\nwelcome\n");
        assert_eq!(
            items,
            vec![
                Err(ProtocolError::UnknownVerb {
                    verb: "shrug".into()
                }),
                Ok(t(&vocab, "welcome", "", None)),
            ]
        );
    }

    #[test]
    fn test_malformed_lines() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::new(vocab.clone());
        let items = decode_all(&mut codec, "\n welcome\nwelcome\n");
        assert!(matches!(items[0], Err(ProtocolError::MalformedLine { .. })));
        assert!(matches!(items[1], Err(ProtocolError::MalformedLine { .. })));
        assert_eq!(items[2], Ok(t(&vocab, "welcome", "", None)));
    }

    #[test]
    fn test_invalid_utf8_header_is_malformed() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::new(vocab.clone());
        let mut buf = BytesMut::from(&b"\xff\xfe\nwelcome\n"[..]);
        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(first, Err(ProtocolError::MalformedLine { .. })));
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert!(second.is_ok());
    }

    #[test]
    fn test_data_verb_without_block_is_truncated() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::new(vocab.clone());
        let items = decode_all(&mut codec, "public-message alice\n");
        assert_eq!(
            items,
            vec![Err(ProtocolError::Truncated {
                verb: "public-message".into()
            })]
        );
    }

    #[test]
    fn test_data_block_cut_off_is_truncated() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::new(vocab.clone());
        let items = decode_all(&mut codec, "public-message alice\nhalf a thou");
        assert!(matches!(
            items.as_slice(),
            [Err(ProtocolError::Truncated { .. })]
        ));
    }

    #[test]
    fn test_unterminated_marker_at_eof_completes() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::new(vocab.clone());
        let items = decode_all(&mut codec, "public-message alice\nbye\nEOT");
        assert_eq!(items, vec![Ok(t(&vocab, "public-message", "alice", Some("bye")))]);
    }

    #[test]
    fn test_header_argument_spellings() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::new(vocab.clone());
        let items = decode_all(&mut codec, "welcome\nwelcome \nlogin  alice\n");
        let items: Vec<_> = items.into_iter().map(Result::unwrap).collect();

        assert!(!items[0].has_argument());
        assert!(items[1].has_argument());
        assert_eq!(items[1].argument(), "");
        assert_ne!(items[0], items[1]);
        assert_eq!(items[2].argument(), " alice");
    }

    #[test]
    fn test_tab_separator_is_kept() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::new(vocab.clone());
        let items = decode_all(&mut codec, "login\talice\n");
        let login = items[0].as_ref().unwrap();
        assert_eq!(login.argument(), "alice");
        assert_eq!(login.separator(), Some('\t'));
        assert_eq!(&codec.to_bytes(login).unwrap()[..], b"login\talice\n");
    }

    #[test]
    fn test_line_too_long() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::with_max_line_length(vocab, 8);
        let mut buf = BytesMut::from("welcome to the longest line\n");
        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(CodecError::LineTooLong { .. })));
    }

    #[test]
    fn test_crlf_limit_ignores_carriage_return() {
        let vocab = Arc::new(Vocabulary::tiscap());
        let mut codec = TransmissionCodec::with_max_line_length(vocab, 8);

        let mut buf = BytesMut::from("]welcome");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\r");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\n");
        assert!(codec.decode(&mut buf).unwrap().unwrap().is_ok());
    }

    // ==================== Encode Tests ====================

    #[test]
    fn test_encode_public_message() {
        let vocab = chat_vocab();
        let codec = TransmissionCodec::new(vocab.clone());
        let bytes = codec
            .to_bytes(&t(&vocab, "public-message", "alice", Some("hello there")))
            .unwrap();
        assert_eq!(&bytes[..], b"public-message alice\nhello there\nEOT\n");
    }

    #[test]
    fn test_encode_empty_data() {
        let vocab = chat_vocab();
        let codec = TransmissionCodec::new(vocab.clone());
        let bytes = codec
            .to_bytes(&t(&vocab, "user-connected", "bob", Some("")))
            .unwrap();
        assert_eq!(&bytes[..], b"user-connected bob\nEOT\n");
    }

    #[test]
    fn test_encode_tiscap_login() {
        let vocab = Arc::new(Vocabulary::tiscap());
        let codec = TransmissionCodec::new(vocab.clone());
        let bytes = codec.to_bytes(&vocab.login("alice").unwrap()).unwrap();
        assert_eq!(&bytes[..], b"/login alice\r\n");
    }

    #[test]
    fn test_encode_limit_matches_decode_limit() {
        let vocab = Arc::new(Vocabulary::tiscap());
        let mut codec = TransmissionCodec::with_max_line_length(vocab.clone(), 16);

        // "/login " + 9 bytes is exactly 16 before the CRLF
        let fits = vocab.login("abcdefghi").unwrap();
        let mut buf = BytesMut::from(&codec.to_bytes(&fits).unwrap()[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), Ok(fits));

        let over = vocab.login("abcdefghij").unwrap();
        assert!(matches!(
            codec.to_bytes(&over),
            Err(CodecError::LineTooLong { len: 17, max: 16 })
        ));
    }

    #[test]
    fn test_encode_limit_counts_escape() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::with_max_line_length(vocab.clone(), 14);

        // Goes out with one more backslash, fourteen bytes
        let fits = t(&vocab, "user-connected", "", Some(&format!("{}EOT", "\\".repeat(10))));
        let mut buf = BytesMut::from(&codec.to_bytes(&fits).unwrap()[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), Ok(fits));

        let over = t(&vocab, "user-connected", "", Some(&format!("{}EOT", "\\".repeat(11))));
        assert!(matches!(
            codec.to_bytes(&over),
            Err(CodecError::LineTooLong { len: 15, max: 14 })
        ));
    }

    #[test]
    fn test_encode_is_deterministic() {
        let vocab = chat_vocab();
        let codec = TransmissionCodec::new(vocab.clone());
        let msg = t(&vocab, "public-message", "a", Some("x\ny"));
        assert_eq!(codec.to_bytes(&msg).unwrap(), codec.to_bytes(&msg).unwrap());
    }

    #[test]
    fn test_encode_escapes_marker_lines() {
        let vocab = chat_vocab();
        let codec = TransmissionCodec::new(vocab.clone());
        let bytes = codec
            .to_bytes(&t(&vocab, "public-message", "a", Some("EOT\n\\EOT\nEOTX")))
            .unwrap();
        assert_eq!(
            &bytes[..],
            b"public-message a\n\\EOT\n\\\\EOT\nEOTX\nEOT\n".as_slice()
        );
    }

    // ==================== Stream Tests ====================

    #[tokio::test]
    async fn test_framed_read_over_stream() {
        use futures::StreamExt;
        use tokio::io::AsyncWriteExt;
        use tokio_util::codec::FramedRead;

        let vocab = chat_vocab();
        let (mut client, server) = tokio::io::duplex(64);
        let mut frames = FramedRead::new(server, TransmissionCodec::new(vocab.clone()));

        tokio::spawn(async move {
            for piece in ["user-connected b", "ob\nEOT\nwel", "come\nbogus\npublic-message carol\ncut"] {
                client.write_all(piece.as_bytes()).await.unwrap();
            }
        });

        let mut seen = Vec::new();
        while let Some(item) = frames.next().await {
            seen.push(item.unwrap());
        }
        assert_eq!(
            seen,
            vec![
                Ok(t(&vocab, "user-connected", "bob", Some(""))),
                Ok(t(&vocab, "welcome", "", None)),
                Err(ProtocolError::UnknownVerb {
                    verb: "bogus".into()
                }),
                Err(ProtocolError::Truncated {
                    verb: "public-message".into()
                }),
            ]
        );
    }

    #[test]
    fn test_idle_between_transmissions() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::new(vocab);
        let mut buf = BytesMut::from("public-message alice\nhello");
        assert!(codec.is_idle());
        assert!(codec.next_frame(&mut buf).unwrap().is_none());
        assert!(!codec.is_idle());

        buf.extend_from_slice(b"\nEOT\n");
        assert!(codec.next_frame(&mut buf).unwrap().is_some());
        assert!(codec.is_idle());
    }

    // ==================== Round Trip Properties ====================

    #[test]
    fn test_decode_encode_preserves_transmissions() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::new(vocab.clone());
        let samples = [
            t(&vocab, "welcome", "", None),
            t(&vocab, "login", "alice", None),
            t(&vocab, "public-message", "alice", Some("EOT")),
            t(&vocab, "public-message", "alice", Some("\\\\EOT\n\\n")),
            t(&vocab, "public-message", "alice", Some("trailing newline\n")),
            t(&vocab, "user-disconnected", "carol", Some("")),
        ];

        let mut buf = BytesMut::new();
        for msg in &samples {
            codec.encode(msg.clone(), &mut buf).unwrap();
        }
        for msg in &samples {
            let decoded = codec.decode(&mut buf).unwrap().unwrap().unwrap();
            assert_eq!(&decoded, msg);
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_decode_preserves_wire_bytes() {
        let vocab = chat_vocab();
        let wire = "login alice\nwelcome\nwelcome \nlogin \npublic-message bob\nhi\n\\EOT\nEOT\nuser-connected carol\nEOT\npublic-message\nx\nEOT\nlogin\tbob\n";
        let mut codec = TransmissionCodec::new(vocab.clone());

        let mut out = BytesMut::new();
        for item in decode_all(&mut codec, wire) {
            codec.encode_transmission(&item.unwrap(), &mut out).unwrap();
        }
        assert_eq!(&out[..], wire.as_bytes());
    }

    #[test]
    fn test_frames_parse_out_of_order() {
        let vocab = chat_vocab();
        let mut codec = TransmissionCodec::new(vocab.clone());
        let mut buf = BytesMut::from("user-connected bob\nEOT\nuser-connected carol\nEOT\n");

        let first = codec.next_frame(&mut buf).unwrap().unwrap();
        let second = codec.next_frame(&mut buf).unwrap().unwrap();

        let carol = second.parse(&vocab).unwrap();
        let bob = first.parse(&vocab).unwrap();
        assert_eq!(bob.argument(), "bob");
        assert_eq!(carol.argument(), "carol");
    }
}
