//! Interactive client for poking at a server by hand.
//!
//! Each line typed on stdin is sent as one datagram, with the two characters
//! `\n` turned into a real newline so DATA payloads can be typed:
//!
//! ```text
//! /connect/1/
//! /data/1/0/hello\n/
//! ```
//!
//! Every datagram received is printed with its newlines shown as `\n`.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::message::Printable;
use crate::socket::{Socket, MAX_DATAGRAM};

/// Convert a typed line into the datagram it stands for.
pub fn frame_from_line(line: &str) -> Vec<u8> {
    line.replace("\\n", "\n").into_bytes()
}

/// Run until stdin is closed.
pub async fn run(server: SocketAddr) -> anyhow::Result<()> {
    let local = match server {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    };
    let socket = Socket::bind(local).await?;
    log::info!("bound {}, talking to {server}", socket.local_addr);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                socket.send_to(&frame_from_line(&line), server).await?;
            }

            result = socket.recv_from(&mut buf) => {
                let (n, _) = result?;
                println!("{}", Printable(&buf[..n]));
            }
        }
    }
    Ok(())
}
