//! `line-reversal` — LRCP, a reliable ordered byte stream over UDP, serving
//! an application that reverses every line it receives.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐  datagram   ┌────────────────────────────────────────┐
//!  │  Socket  │────────────▶│                 Engine                 │
//!  └────▲─────┘             │  message::decode → dispatch by kind    │
//!       │                   │    ├── SessionStore (id → Session)     │
//!       │                   │    ├── reverse::reverse_lines          │
//!       │   Vec<Transmit>   │    └── RetransmitQueue (timers)        │
//!       └───────────────────│  message::encode ◀─────────────────────│
//!                           └────────────────────────────────────────┘
//!            Server: one tokio task selecting over socket + next deadline
//! ```
//!
//! Each module has a single responsibility:
//! - [`message`]    — wire format (parse / encode / escape / chunk)
//! - [`session`]    — per-session stream state and the session table
//! - [`reverse`]    — the line-reversal application
//! - [`retransmit`] — retransmission task table and deadlines
//! - [`engine`]     — sans-IO protocol dispatcher
//! - [`socket`]     — async UDP socket abstraction
//! - [`server`]     — event loop tying the engine to a socket
//! - [`client`]     — interactive stdin/stdout client for manual testing

pub mod client;
pub mod engine;
pub mod message;
pub mod retransmit;
pub mod reverse;
pub mod server;
pub mod session;
pub mod socket;

pub use engine::{Engine, Transmit};
pub use message::{Message, ParseError};
pub use retransmit::RetransmitConfig;
pub use server::{Server, ServerConfig};
