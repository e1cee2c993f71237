//! Wire format for LRCP messages.
//!
//! Every datagram exchanged between peers carries exactly one [`Message`].
//! This module is responsible for:
//! - Defining the four message kinds.
//! - Serialising a [`Message`] into the bytes of one datagram.
//! - Parsing a raw datagram back into a [`Message`], rejecting anything
//!   malformed with a [`ParseError`].
//! - Escaping DATA payloads and cutting outbound streams into chunks that fit
//!   a datagram.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! Messages are ASCII text, framed by slashes:
//!
//! ```text
//! /connect/SESSION/
//! /data/SESSION/POS/DATA/
//! /ack/SESSION/LENGTH/
//! /close/SESSION/
//! ```
//!
//! `SESSION`, `POS` and `LENGTH` are decimal integers in `0..=2^31`.  Inside
//! `DATA` a literal `\` travels as `\\` and a literal `/` as `\/`.

use std::fmt;

use thiserror::Error;

/// Largest datagram accepted from a peer, in bytes.
pub const MAX_MESSAGE_LEN: usize = 1000;

/// Largest value a numeric field may carry (inclusive).
pub const MAX_NUMERIC: u32 = 1 << 31;

/// Most escaped payload bytes placed in one outbound DATA message.
///
/// Leaves room for the header: `/data/` + two 10-digit integers + three
/// slashes stays well under [`MAX_MESSAGE_LEN`].
pub const MAX_CHUNK_LEN: usize = 900;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One LRCP message; exactly one per datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Open a session (idempotent).
    Connect { session: u32 },
    /// Bytes of the stream starting at offset `pos`.  `payload` is unescaped.
    Data {
        session: u32,
        pos: u32,
        payload: Vec<u8>,
    },
    /// The sender has received every byte before `length`.
    Ack { session: u32, length: u32 },
    /// Tear the session down.
    Close { session: u32 },
}

impl Message {
    /// Serialise this message into the bytes of a single datagram.
    ///
    /// DATA payloads are escaped on the way out.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::Connect { session } => format!("/connect/{session}/").into_bytes(),
            Message::Data {
                session,
                pos,
                payload,
            } => {
                let mut buf = format!("/data/{session}/{pos}/").into_bytes();
                buf.extend_from_slice(&escape(payload));
                buf.push(b'/');
                buf
            }
            Message::Ack { session, length } => format!("/ack/{session}/{length}/").into_bytes(),
            Message::Close { session } => format!("/close/{session}/").into_bytes(),
        }
    }

    /// Parse a [`Message`] from a raw datagram.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is longer than [`MAX_MESSAGE_LEN`],
    /// - it does not start and end with an unescaped `/`,
    /// - the type is not one of the four kinds,
    /// - the field count is wrong for the type, or
    /// - a numeric field is not a plain integer in `0..=2^31`.
    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        if buf.len() > MAX_MESSAGE_LEN {
            return Err(ParseError::TooLong(buf.len()));
        }
        let body = match buf {
            [b'/', rest @ ..] => rest,
            _ => return Err(ParseError::Unframed),
        };

        let fields = split_fields(body)?;
        let (kind, args) = fields.split_first().ok_or(ParseError::Unframed)?;

        match *kind {
            b"connect" => {
                expect_arity("connect", args, 1)?;
                Ok(Message::Connect {
                    session: parse_numeric(args[0])?,
                })
            }
            b"data" => {
                expect_arity("data", args, 3)?;
                Ok(Message::Data {
                    session: parse_numeric(args[0])?,
                    pos: parse_numeric(args[1])?,
                    payload: unescape(args[2]),
                })
            }
            b"ack" => {
                expect_arity("ack", args, 2)?;
                Ok(Message::Ack {
                    session: parse_numeric(args[0])?,
                    length: parse_numeric(args[1])?,
                })
            }
            b"close" => {
                expect_arity("close", args, 1)?;
                Ok(Message::Close {
                    session: parse_numeric(args[0])?,
                })
            }
            other => Err(ParseError::UnknownType(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Reasons a datagram is rejected.  A rejected datagram is dropped without reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("message is {0} bytes, over the {} byte limit", MAX_MESSAGE_LEN)]
    TooLong(usize),
    #[error("message is not enclosed in unescaped slashes")]
    Unframed,
    #[error("unknown message type {0:?}")]
    UnknownType(String),
    #[error("{kind} takes {expected} field(s), got {found}")]
    Arity {
        kind: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("invalid numeric field {0:?}")]
    BadInteger(String),
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Split the body (everything after the leading slash) on unescaped slashes.
///
/// The body must end with an unescaped slash, so nothing may trail the last
/// delimiter.  Escapes are left in place; only DATA payloads are unescaped.
fn split_fields(body: &[u8]) -> Result<Vec<&[u8]>, ParseError> {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (i, &b) in body.iter().enumerate() {
        match b {
            _ if escaped => escaped = false,
            b'\\' => escaped = true,
            b'/' => {
                fields.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if fields.is_empty() || start != body.len() {
        return Err(ParseError::Unframed);
    }
    Ok(fields)
}

fn expect_arity(kind: &'static str, args: &[&[u8]], expected: usize) -> Result<(), ParseError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ParseError::Arity {
            kind,
            expected,
            found: args.len(),
        })
    }
}

/// Parse a decimal field.  Only ASCII digits are allowed: no sign, no spaces.
fn parse_numeric(field: &[u8]) -> Result<u32, ParseError> {
    let bad = || ParseError::BadInteger(String::from_utf8_lossy(field).into_owned());

    if field.is_empty() || !field.iter().all(u8::is_ascii_digit) {
        return Err(bad());
    }
    let mut value: u32 = 0;
    for &digit in field {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u32::from(digit - b'0')))
            .filter(|v| *v <= MAX_NUMERIC)
            .ok_or_else(bad)?;
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Escaping and chunking
// ---------------------------------------------------------------------------

/// Bytes `b` occupies once escaped.
#[inline]
fn escaped_width(b: u8) -> usize {
    if matches!(b, b'\\' | b'/') {
        2
    } else {
        1
    }
}

/// Escape `\` as `\\` and `/` as `\/`.
pub fn escape(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.iter().map(|&b| escaped_width(b)).sum());
    for &b in raw {
        if escaped_width(b) == 2 {
            out.push(b'\\');
        }
        out.push(b);
    }
    out
}

/// Resolve `\/` and `\\` left to right, once.
///
/// A backslash before any other byte is kept literally.
pub fn unescape(escaped: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(escaped.len());
    let mut bytes = escaped.iter().copied();

    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(next @ (b'\\' | b'/')) => out.push(next),
            Some(other) => out.extend_from_slice(&[b'\\', other]),
            None => out.push(b'\\'),
        }
    }
    out
}

/// Cut `raw` into consecutive pieces whose escaped form is at most `limit`
/// bytes.  Cuts fall on raw byte boundaries, so an escape pair is never split.
pub fn chunk_by_escaped_len(raw: &[u8], limit: usize) -> Vec<&[u8]> {
    assert!(limit >= 2, "chunk limit must fit one escaped byte");

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut width = 0;

    for (i, &b) in raw.iter().enumerate() {
        let w = escaped_width(b);
        if width + w > limit {
            chunks.push(&raw[start..i]);
            start = i;
            width = 0;
        }
        width += w;
    }
    if start < raw.len() {
        chunks.push(&raw[start..]);
    }
    chunks
}

/// Renders a frame for logs, with newlines shown as `\n`.
pub struct Printable<'a>(pub &'a [u8]);

impl fmt::Display for Printable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.0).replace('\n', "\\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(s: &str) -> Result<Message, ParseError> {
        Message::decode(s.as_bytes())
    }

    #[test]
    fn decode_connect() {
        assert_eq!(decode("/connect/12345/"), Ok(Message::Connect { session: 12345 }));
    }

    #[test]
    fn decode_data_unescapes_payload() {
        assert_eq!(
            decode(r"/data/1/0/a\/b\\c/"),
            Ok(Message::Data {
                session: 1,
                pos: 0,
                payload: br"a/b\c".to_vec(),
            })
        );
    }

    #[test]
    fn decode_data_with_empty_payload() {
        assert_eq!(
            decode("/data/1/5//"),
            Ok(Message::Data {
                session: 1,
                pos: 5,
                payload: vec![],
            })
        );
    }

    #[test]
    fn decode_data_payload_ending_in_escaped_backslash() {
        assert_eq!(
            decode(r"/data/1/0/abc\\/"),
            Ok(Message::Data {
                session: 1,
                pos: 0,
                payload: br"abc\".to_vec(),
            })
        );
    }

    #[test]
    fn decode_ack_and_close() {
        assert_eq!(decode("/ack/7/42/"), Ok(Message::Ack { session: 7, length: 42 }));
        assert_eq!(decode("/close/7/"), Ok(Message::Close { session: 7 }));
    }

    #[test]
    fn decode_accepts_upper_numeric_bound() {
        assert_eq!(
            decode("/connect/2147483648/"),
            Ok(Message::Connect { session: MAX_NUMERIC })
        );
    }

    #[test]
    fn decode_rejects_out_of_range_integer() {
        assert!(matches!(decode("/connect/2147483649/"), Err(ParseError::BadInteger(_))));
        assert!(matches!(decode("/connect/99999999999/"), Err(ParseError::BadInteger(_))));
    }

    #[test]
    fn decode_rejects_non_digit_integers() {
        for bad in ["/connect/-1/", "/connect/+1/", "/connect/ 1/", "/connect//", "/ack/1/1x/"] {
            assert!(matches!(decode(bad), Err(ParseError::BadInteger(_))), "{bad}");
        }
    }

    #[test]
    fn decode_rejects_missing_slashes() {
        assert_eq!(decode("connect/1/"), Err(ParseError::Unframed));
        assert_eq!(decode("/connect/1"), Err(ParseError::Unframed));
        assert_eq!(decode("/"), Err(ParseError::Unframed));
        assert_eq!(decode(""), Err(ParseError::Unframed));
    }

    #[test]
    fn decode_rejects_escaped_final_slash() {
        assert_eq!(decode(r"/data/1/0/abc\/"), Err(ParseError::Unframed));
    }

    #[test]
    fn decode_rejects_unknown_type() {
        assert_eq!(
            decode("/hello/1/"),
            Err(ParseError::UnknownType("hello".into()))
        );
    }

    #[test]
    fn decode_rejects_wrong_arity() {
        assert!(matches!(decode("/connect/1/2/"), Err(ParseError::Arity { .. })));
        assert!(matches!(decode("/ack/1/"), Err(ParseError::Arity { .. })));
        assert!(matches!(decode("/close/"), Err(ParseError::Arity { .. })));
        // An unescaped slash in the payload adds a field.
        assert!(matches!(decode("/data/1/0/a/b/"), Err(ParseError::Arity { .. })));
    }

    #[test]
    fn decode_rejects_oversized_datagram() {
        let mut big = b"/data/1/0/".to_vec();
        big.resize(MAX_MESSAGE_LEN, b'a');
        big.push(b'/');
        assert_eq!(Message::decode(&big), Err(ParseError::TooLong(MAX_MESSAGE_LEN + 1)));
    }

    #[test]
    fn encode_escapes_data_payload() {
        let msg = Message::Data {
            session: 3,
            pos: 10,
            payload: br"x/y\z".to_vec(),
        };
        assert_eq!(msg.encode(), br"/data/3/10/x\/y\\z/".to_vec());
    }

    #[test]
    fn encode_control_messages() {
        assert_eq!(Message::Connect { session: 1 }.encode(), b"/connect/1/");
        assert_eq!(Message::Ack { session: 1, length: 6 }.encode(), b"/ack/1/6/");
        assert_eq!(Message::Close { session: 99 }.encode(), b"/close/99/");
    }

    #[test]
    fn unescape_keeps_unknown_escapes() {
        assert_eq!(unescape(br"a\nb"), br"a\nb".to_vec());
    }

    #[test]
    fn chunking_respects_escaped_width() {
        let raw = b"ab/cd";
        let chunks = chunk_by_escaped_len(raw, 3);
        assert_eq!(chunks, vec![&b"ab"[..], &b"/c"[..], &b"d"[..]]);
        for c in &chunks {
            assert!(escape(c).len() <= 3);
        }
    }

    #[test]
    fn chunking_empty_input_yields_nothing() {
        assert!(chunk_by_escaped_len(b"", MAX_CHUNK_LEN).is_empty());
    }

    #[test]
    fn printable_escapes_newlines() {
        assert_eq!(Printable(b"/data/1/0/hi\n/").to_string(), r"/data/1/0/hi\n/");
    }
}
