//! Entry point for `line-reversal`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client** mode.
//! All actual protocol work is delegated to library modules; `main.rs` owns only
//! process setup (logging, signal handling, argument parsing).

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::{Parser, Subcommand};
use line_reversal::{client, RetransmitConfig, Server, ServerConfig};

/// LRCP line-reversal server over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run the server.
    Server {
        /// Local address to bind.
        #[arg(long, env = "PROTOHACKERS_BIND_ADDRESS", default_value = "127.0.0.1")]
        host: IpAddr,
        /// Local port to bind.
        #[arg(short, long, env = "PROTOHACKERS_BIND_PORT", default_value_t = line_reversal::server::DEFAULT_PORT)]
        port: u16,
        /// Milliseconds between retransmissions of an unacknowledged chunk.
        #[arg(long, default_value_t = 2000, value_parser = clap::value_parser!(u64).range(1..))]
        retransmit_ms: u64,
        /// Transmissions of one chunk before the peer is given up on.
        #[arg(long, default_value_t = 20)]
        max_attempts: u32,
    },
    /// Send lines typed on stdin to a server and print its replies.
    Client {
        /// Server address.
        #[arg(short, long, default_value = "127.0.0.1:33221")]
        server: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server {
            host,
            port,
            retransmit_ms,
            max_attempts,
        } => {
            let config = ServerConfig {
                bind: SocketAddr::new(host, port),
                retransmit: RetransmitConfig {
                    interval: Duration::from_millis(retransmit_ms),
                    max_attempts,
                },
            };
            let server = Server::bind(config).await?;
            tokio::select! {
                result = server.run() => result?,
                _ = tokio::signal::ctrl_c() => log::info!("interrupted, shutting down"),
            }
        }
        Mode::Client { server } => {
            log::info!("Starting client, connecting to {server}");
            client::run(server).await?;
        }
    }
    Ok(())
}
