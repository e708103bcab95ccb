//! holdpty - hold a PTY open for a spawned child process.
//!
//! Each session is an independent holder process owning one PTY, one bounded
//! history ring, and one listening local-IPC endpoint. Other processes connect
//! to the endpoint to attach interactively, view read-only, or dump recent
//! output. The filesystem is the only shared registry: a session is a
//! `{dir}/{name}.json` metadata record plus a socket (or named pipe) derived
//! from the same name.
//!
//! Architecture:
//! - PTY reader: dedicated thread reading from the PTY, appends to the ring
//!   and broadcasts to connected clients
//! - PTY writer: dedicated thread receiving from the input channel, writes to PTY
//! - Accept loop: async, hands each connection to a per-client state machine
//! - Child monitor: watches for child exit, triggers drain then shutdown

pub mod config;
pub mod endpoint;
pub mod foreground;
pub mod holder;
pub mod peer;
pub mod protocol;
pub mod pty;
pub mod registry;
pub mod ring;
pub mod terminal;

pub use config::Config;
pub use holder::{Holder, HolderError, StartOptions};
pub use peer::{Peer, PeerError};
pub use protocol::{Frame, FrameDecoder, FrameType, Mode};
pub use registry::{SessionEntry, SessionMeta};
pub use ring::Ring;
