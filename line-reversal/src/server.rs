//! LRCP server: a single task that owns the socket and the engine.
//!
//! Inbound datagrams and retransmission deadlines are multiplexed with
//! `tokio::select!` on one task, so every session is only ever touched from
//! one place at a time.  Sending is fire-and-forget: a failed send is logged
//! and the retransmission timer covers the loss.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use crate::engine::{Engine, Transmit};
use crate::message::Printable;
use crate::retransmit::RetransmitConfig;
use crate::socket::{Socket, SocketError, MAX_DATAGRAM};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 33221;

/// Everything needed to start a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Local address to bind.
    pub bind: SocketAddr,
    pub retransmit: RetransmitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            retransmit: RetransmitConfig::default(),
        }
    }
}

/// A bound LRCP server, ready to [`run`](Server::run).
pub struct Server {
    socket: Socket,
    engine: Engine,
}

impl Server {
    /// Bind the socket described by `config`.
    pub async fn bind(config: ServerConfig) -> Result<Self, SocketError> {
        let socket = Socket::bind(config.bind).await?;
        Ok(Self {
            socket,
            engine: Engine::new(config.retransmit),
        })
    }

    /// Address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Serve forever.  Drop the future to stop.
    pub async fn run(mut self) -> Result<(), SocketError> {
        log::info!("listening on {}", self.socket.local_addr);

        let mut buf = vec![0u8; MAX_DATAGRAM];

        // Parked far in the future whenever no retransmission is pending; the
        // `deadline.is_some()` guard keeps select! from acting on it.
        let far_future = Duration::from_secs(365 * 24 * 3600);
        let timer = tokio::time::sleep(far_future);
        tokio::pin!(timer);

        loop {
            let deadline = self.engine.next_deadline();
            if let Some(at) = deadline {
                timer.as_mut().reset(tokio::time::Instant::from_std(at));
            }

            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    let (n, from) = match result {
                        Ok(v) => v,
                        Err(e) => {
                            log::warn!("receive failed: {e}");
                            continue;
                        }
                    };
                    let datagram = &buf[..n];
                    log::debug!("{from} <-- {}", Printable(datagram));
                    let out = self.engine.handle_datagram(datagram, from, Instant::now());
                    self.transmit(out).await;
                }

                _ = &mut timer, if deadline.is_some() => {
                    let out = self.engine.poll_timers(Instant::now());
                    self.transmit(out).await;
                }
            }
        }
    }

    async fn transmit(&self, out: Vec<Transmit>) {
        for t in out {
            log::debug!("{} --> {}", t.dest, Printable(&t.frame));
            if let Err(e) = self.socket.send_to(&t.frame, t.dest).await {
                log::warn!("send to {} failed: {e}", t.dest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind, "127.0.0.1:33221".parse::<SocketAddr>().unwrap());
        assert_eq!(c.retransmit, RetransmitConfig::default());
    }
}
