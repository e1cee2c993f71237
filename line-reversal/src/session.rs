//! Per-session stream state and the table that owns it.
//!
//! A [`Session`] holds both directions of one LRCP conversation:
//!
//! ```text
//!  inbound   input:  [ scanned | unscanned ]           len = received_len
//!  outbound  output: [ acked | sent, unacked | unsent ]
//!                    0     bytes_acked     bytes_sent    output.len()
//! ```
//!
//! Invariants: `bytes_acked <= bytes_sent <= output.len()` and
//! `scanned <= received_len`.  Both buffers only ever grow at the tail.
//!
//! Sessions never expire on their own.  They leave the [`SessionStore`] on
//! CLOSE, on a protocol violation, or when retransmission gives up.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::ops::Range;

use crate::reverse::reverse_lines;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// State for one open session.
#[derive(Debug)]
pub struct Session {
    id: u32,
    /// Peer that opened the session.  Never changes.
    remote: SocketAddr,
    /// Contiguous bytes received so far.
    input: Vec<u8>,
    /// Prefix of `input` already handed to the line reverser.
    scanned: usize,
    /// Every byte the application has produced.  Kept whole for retransmission.
    output: Vec<u8>,
    /// Prefix of `output` transmitted at least once.
    bytes_sent: usize,
    /// Prefix of `output` the peer has confirmed.
    bytes_acked: usize,
}

impl Session {
    pub fn new(id: u32, remote: SocketAddr) -> Self {
        Self {
            id,
            remote,
            input: Vec::new(),
            scanned: 0,
            output: Vec::new(),
            bytes_sent: 0,
            bytes_acked: 0,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Contiguous input length; the value every ACK we send carries.
    pub fn received_len(&self) -> usize {
        self.input.len()
    }

    pub fn input(&self) -> &[u8] {
        &self.input
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    pub fn bytes_acked(&self) -> usize {
        self.bytes_acked
    }

    /// Apply a DATA payload that starts at stream offset `pos`.
    ///
    /// Returns `None` when `pos` lies beyond what we have (a gap): nothing is
    /// stored and the caller should re-ACK the current length.  Otherwise the
    /// part of `payload` not seen before is appended and its length returned;
    /// a payload lying wholly inside received data appends nothing.
    pub fn accept(&mut self, pos: usize, payload: &[u8]) -> Option<usize> {
        let received = self.received_len();
        if pos > received {
            return None;
        }
        let overlap = received - pos;
        let fresh = payload.get(overlap..).unwrap_or_default();
        self.input.extend_from_slice(fresh);
        Some(fresh.len())
    }

    /// Run the line reverser over unscanned input.
    ///
    /// Newly produced bytes are appended to the output buffer; the returned
    /// range is where they landed (empty when no line was completed).
    pub fn reverse_pending(&mut self) -> Range<usize> {
        let (produced, consumed) = reverse_lines(&self.input[self.scanned..]);
        self.scanned += consumed;

        let start = self.output.len();
        self.output.extend_from_slice(&produced);
        start..self.output.len()
    }

    /// Output not yet transmitted at all.
    pub fn unsent(&self) -> Range<usize> {
        self.bytes_sent..self.output.len()
    }

    /// Record that `output[..end]` has been transmitted at least once.
    pub fn mark_sent(&mut self, end: usize) {
        debug_assert!(end <= self.output.len(), "sent past end of output");
        self.bytes_sent = self.bytes_sent.max(end);
    }

    /// Record a peer ACK.  The acknowledged length never moves backwards.
    pub fn record_ack(&mut self, length: usize) {
        debug_assert!(length <= self.bytes_sent, "ack beyond sent data");
        self.bytes_acked = self.bytes_acked.max(length);
    }
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// All open sessions, keyed by session id.
///
/// No idle expiry: an entry stays until it is removed explicitly.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<u32, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `id`, creating it for `remote` if it does not exist.
    ///
    /// Returns the session and whether it was just created.  An existing
    /// session keeps its original remote endpoint.
    pub fn open(&mut self, id: u32, remote: SocketAddr) -> (&mut Session, bool) {
        let mut created = false;
        let session = self.sessions.entry(id).or_insert_with(|| {
            created = true;
            Session::new(id, remote)
        });
        (session, created)
    }

    pub fn get(&self, id: u32) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<Session> {
        self.sessions.remove(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
