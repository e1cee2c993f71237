//! Randomised tests: escaping, and whole streams pushed through a lossy,
//! duplicating, reordering "network" built on top of the sans-IO engine.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::Rng;

use line_reversal::message::{escape, unescape, Message};
use line_reversal::Engine;

const LOSS: f64 = 0.3;

fn peer() -> SocketAddr {
    "127.0.0.1:40001".parse().unwrap()
}

/// Random lines over an alphabet heavy in characters that need escaping.
fn random_text(rng: &mut impl Rng, lines: usize) -> Vec<u8> {
    let alphabet = b"abc/\\xyz ";
    let mut text = Vec::new();
    for _ in 0..lines {
        for _ in 0..rng.gen_range(0..80) {
            text.push(*alphabet.choose(rng).unwrap());
        }
        text.push(b'\n');
    }
    text
}

fn reversed_lines(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for line in text.strip_suffix(b"\n").unwrap_or(text).split(|&b| b == b'\n') {
        out.extend(line.iter().rev());
        out.push(b'\n');
    }
    out
}

#[test]
fn escape_round_trip_random_payloads() {
    let mut rng = rand::thread_rng();
    let alphabet = b"aZ/\\\n 0";
    for _ in 0..1000 {
        let len = rng.gen_range(0..300);
        let payload: Vec<u8> = (0..len).map(|_| *alphabet.choose(&mut rng).unwrap()).collect();
        assert_eq!(unescape(&escape(&payload)), payload);

        let msg = Message::Data {
            session: 7,
            pos: 0,
            payload,
        };
        assert_eq!(Message::decode(&msg.encode()), Ok(msg));
    }
}

#[test]
fn inbound_stream_survives_loss_duplication_and_reordering() {
    let mut rng = rand::thread_rng();
    let text = random_text(&mut rng, 40);

    let mut segments = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        let end = (pos + rng.gen_range(1..=120)).min(text.len());
        segments.push(pos..end);
        pos = end;
    }

    let mut engine = Engine::default();
    let now = Instant::now();
    engine.handle_datagram(b"/connect/1/", peer(), now);

    let mut acked = 0;
    for round in 0.. {
        assert!(round < 1000, "stream never completed");
        if acked == text.len() {
            break;
        }

        // Everything not yet acknowledged, some of it twice, in random order.
        let mut batch: Vec<_> = segments.iter().filter(|r| r.end > acked).cloned().collect();
        let dupes: Vec<_> = batch.iter().filter(|_| rng.gen_bool(0.2)).cloned().collect();
        batch.extend(dupes);
        batch.shuffle(&mut rng);

        for range in batch {
            if rng.gen_bool(LOSS) {
                continue;
            }
            let frame = Message::Data {
                session: 1,
                pos: range.start as u32,
                payload: text[range].to_vec(),
            }
            .encode();
            for t in engine.handle_datagram(&frame, peer(), now) {
                if let Ok(Message::Ack { length, .. }) = Message::decode(&t.frame) {
                    acked = acked.max(length as usize);
                }
            }
        }
    }

    let s = engine.session(1).unwrap();
    assert_eq!(s.input(), &text[..]);
    assert_eq!(s.output(), &reversed_lines(&text)[..]);
    assert_eq!(s.bytes_sent(), s.output().len());
}

#[test]
fn outbound_stream_survives_loss() {
    let mut rng = rand::thread_rng();
    let text = random_text(&mut rng, 60);
    let expected = reversed_lines(&text);

    let mut engine = Engine::default();
    let mut now = Instant::now();
    let mut received: Vec<u8> = Vec::new();

    engine.handle_datagram(b"/connect/1/", peer(), now);
    let mut pending = Vec::new();
    let mut pos = 0;
    for chunk in text.chunks(200) {
        let frame = Message::Data {
            session: 1,
            pos: pos as u32,
            payload: chunk.to_vec(),
        }
        .encode();
        pending.extend(engine.handle_datagram(&frame, peer(), now));
        pos += chunk.len();
    }

    for round in 0..200 {
        if received.len() == expected.len() {
            break;
        }
        assert!(engine.session(1).is_some(), "session abandoned in round {round}");

        // The server's frames cross a lossy link; one cumulative ACK goes back.
        let mut got_data = false;
        for t in pending.drain(..) {
            if rng.gen_bool(LOSS) {
                continue;
            }
            if let Ok(Message::Data { pos, payload, .. }) = Message::decode(&t.frame) {
                let pos = pos as usize;
                if pos <= received.len() {
                    let overlap = received.len() - pos;
                    received.extend_from_slice(payload.get(overlap..).unwrap_or_default());
                }
                got_data = true;
            }
        }
        if got_data {
            let ack = format!("/ack/1/{}/", received.len());
            pending.extend(engine.handle_datagram(ack.as_bytes(), peer(), now));
        }

        now += Duration::from_millis(2000);
        pending.extend(engine.poll_timers(now));
    }

    assert_eq!(received, expected);
}
