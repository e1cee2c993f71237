//! LRCP protocol engine: dispatches inbound messages against session state.
//!
//! The engine is sans-IO.  The host feeds it datagrams and the current time
//! and transmits whatever comes back:
//!
//! ```ignore
//! let mut engine = Engine::default();
//! for t in engine.handle_datagram(&buf[..n], from, Instant::now()) {
//!     socket.send_to(&t.frame, t.dest).await?;
//! }
//! // ... and whenever engine.next_deadline() passes:
//! for t in engine.poll_timers(Instant::now()) { /* send */ }
//! ```
//!
//! # Per-session states
//!
//! ```text
//!  ABSENT ──CONNECT──▶ OPEN ──CLOSE / bad ACK / retransmit exhausted──▶ ABSENT
//! ```
//!
//! - CONNECT: open if absent; always ACK the received length.
//! - DATA: absent → stateless CLOSE.  Gap → re-ACK.  Otherwise append the new
//!   suffix, ACK, reverse completed lines and send them reliably.
//! - ACK: absent or beyond what was sent → CLOSE (and destroy).  Behind → resend
//!   from the acknowledged offset.
//! - CLOSE: if open, reply CLOSE and destroy; if absent, ignore.
//!
//! Malformed datagrams are dropped without reply.

use std::net::SocketAddr;
use std::ops::Range;
use std::time::Instant;

use crate::message::{chunk_by_escaped_len, Message, MAX_CHUNK_LEN};
use crate::retransmit::{RetransmitConfig, RetransmitQueue, Verdict};
use crate::session::{Session, SessionStore};

/// A datagram the host must send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmit {
    pub dest: SocketAddr,
    pub frame: Vec<u8>,
}

impl Transmit {
    fn new(dest: SocketAddr, message: &Message) -> Self {
        Self {
            dest,
            frame: message.encode(),
        }
    }
}

/// Session table plus retransmission timers for one server socket.
#[derive(Debug, Default)]
pub struct Engine {
    sessions: SessionStore,
    retransmits: RetransmitQueue,
}

impl Engine {
    pub fn new(config: RetransmitConfig) -> Self {
        Self {
            sessions: SessionStore::new(),
            retransmits: RetransmitQueue::new(config),
        }
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Handle one inbound datagram from `from`.
    ///
    /// Returns the datagrams to send, in order.  The ACK for a DATA message
    /// always precedes any DATA it causes us to emit.
    pub fn handle_datagram(&mut self, datagram: &[u8], from: SocketAddr, now: Instant) -> Vec<Transmit> {
        let message = match Message::decode(datagram) {
            Ok(message) => message,
            Err(e) => {
                log::debug!("{from}: dropping malformed message: {e}");
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        match message {
            Message::Connect { session } => self.on_connect(session, from, &mut out),
            Message::Data {
                session,
                pos,
                payload,
            } => self.on_data(session, pos as usize, &payload, from, now, &mut out),
            Message::Ack { session, length } => {
                self.on_ack(session, length as usize, from, now, &mut out)
            }
            Message::Close { session } => self.on_close(session, &mut out),
        }
        out
    }

    /// Fire every retransmission whose deadline is at or before `now`.
    pub fn poll_timers(&mut self, now: Instant) -> Vec<Transmit> {
        let mut out = Vec::new();

        while let Some((task_id, mut task)) = self.retransmits.pop_due(now) {
            let peer = self
                .sessions
                .get(task.session)
                .map(|s| (s.remote(), s.bytes_acked()));

            match self.retransmits.verdict(&task, peer.map(|(_, acked)| acked)) {
                Verdict::Cancel => {}
                Verdict::Exhausted => {
                    log::info!(
                        "session {}: no ACK after {} attempts, abandoning peer",
                        task.session,
                        task.attempts
                    );
                    self.destroy(task.session);
                }
                Verdict::Resend => {
                    if let Some((dest, _)) = peer {
                        out.push(Transmit {
                            dest,
                            frame: task.frame.clone(),
                        });
                    }
                    task.attempts += 1;
                    self.retransmits.reschedule(task_id, task, now);
                }
            }
        }
        out
    }

    /// When [`poll_timers`](Self::poll_timers) next has work, if ever.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.retransmits.next_deadline()
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn session(&self, id: u32) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Chunks still awaiting acknowledgement, across all sessions.
    pub fn pending_retransmits(&self) -> usize {
        self.retransmits.len()
    }

    // -----------------------------------------------------------------------
    // Message handlers
    // -----------------------------------------------------------------------

    fn on_connect(&mut self, id: u32, from: SocketAddr, out: &mut Vec<Transmit>) {
        let (session, created) = self.sessions.open(id, from);
        if created {
            log::info!("session {id}: opened by {from}");
        }
        out.push(ack(session));
    }

    fn on_data(
        &mut self,
        id: u32,
        pos: usize,
        payload: &[u8],
        from: SocketAddr,
        now: Instant,
        out: &mut Vec<Transmit>,
    ) {
        let Some(session) = self.sessions.get_mut(id) else {
            out.push(Transmit::new(from, &Message::Close { session: id }));
            return;
        };

        if session.accept(pos, payload).is_none() {
            log::debug!(
                "session {id}: gap at {pos}, have {} bytes",
                session.received_len()
            );
            out.push(ack(session));
            return;
        }
        out.push(ack(session));

        session.reverse_pending();
        let unsent = session.unsent();
        if !unsent.is_empty() {
            let end = unsent.end;
            send_range(session, &mut self.retransmits, unsent, now, out);
            session.mark_sent(end);
        }
    }

    fn on_ack(
        &mut self,
        id: u32,
        length: usize,
        from: SocketAddr,
        now: Instant,
        out: &mut Vec<Transmit>,
    ) {
        let Some(session) = self.sessions.get_mut(id) else {
            out.push(Transmit::new(from, &Message::Close { session: id }));
            return;
        };

        if length > session.bytes_sent() {
            log::info!(
                "session {id}: peer acknowledged {length} bytes, only {} sent; closing",
                session.bytes_sent()
            );
            out.push(Transmit::new(from, &Message::Close { session: id }));
            self.destroy(id);
            return;
        }

        session.record_ack(length);
        if length < session.bytes_sent() {
            // Fresh tasks for the whole window supersede the outstanding ones.
            let window = length..session.bytes_sent();
            self.retransmits.cancel_session(id);
            send_range(session, &mut self.retransmits, window, now, out);
        }
    }

    fn on_close(&mut self, id: u32, out: &mut Vec<Transmit>) {
        let Some(session) = self.sessions.get(id) else {
            return;
        };
        out.push(Transmit::new(session.remote(), &Message::Close { session: id }));
        self.destroy(id);
    }

    /// Forget a session and everything scheduled on its behalf.
    fn destroy(&mut self, id: u32) {
        if self.sessions.remove(id).is_some() {
            let dropped = self.retransmits.cancel_session(id);
            log::info!("session {id}: closed ({dropped} pending chunk(s) dropped)");
        }
    }
}

// ---------------------------------------------------------------------------
// Frame builders
// ---------------------------------------------------------------------------

fn ack(session: &Session) -> Transmit {
    Transmit::new(
        session.remote(),
        &Message::Ack {
            session: session.id(),
            length: session.received_len() as u32,
        },
    )
}

/// Send `session.output()[range]` as DATA chunks, each tracked for retransmission.
fn send_range(
    session: &Session,
    queue: &mut RetransmitQueue,
    range: Range<usize>,
    now: Instant,
    out: &mut Vec<Transmit>,
) {
    let mut offset = range.start;
    for chunk in chunk_by_escaped_len(&session.output()[range], MAX_CHUNK_LEN) {
        let end = offset + chunk.len();
        let frame = Message::Data {
            session: session.id(),
            pos: offset as u32,
            payload: chunk.to_vec(),
        }
        .encode();
        queue.schedule(session.id(), frame.clone(), end, now);
        out.push(Transmit {
            dest: session.remote(),
            frame,
        });
        offset = end;
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
