//! Protocol peer: the connection-side helper used by attach/view/logs
//! front-ends (and tests) so they need not re-implement framing.
//!
//! A peer opens the session endpoint, sends `HELLO` immediately, and reads
//! frames until `HELLO_ACK` (success) or `ERROR` (rejection). After the
//! handshake it consumes the replay and, for attach/view, the live stream.

use bytes::Bytes;
use std::path::Path;
use thiserror::Error;
use tokio::io::{AsyncReadExt, ReadHalf, WriteHalf};

use crate::endpoint::{self, Stream};
use crate::protocol::{
    Frame, FrameDecoder, FrameType, HelloAckMsg, HelloMsg, Mode, ProtocolError, PROTOCOL_VERSION,
};
use crate::registry::{self, RegistryError};

#[derive(Debug, Error)]
pub enum PeerError {
    /// The session's metadata is absent or its endpoint unreachable.
    #[error("session {0:?} is not running")]
    NotFound(String),

    /// The holder refused the handshake with an `ERROR` frame.
    #[error("holder rejected connection: {0}")]
    Rejected(String),

    /// The holder closed the stream before acknowledging the handshake.
    #[error("connection closed during handshake")]
    ClosedDuringHandshake,

    #[error("unexpected {0:?} frame during handshake")]
    UnexpectedFrame(FrameType),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A handshaken connection to a holder.
#[derive(Debug)]
pub struct Peer {
    read_half: ReadHalf<Stream>,
    write_half: WriteHalf<Stream>,
    decoder: FrameDecoder,
    ack: HelloAckMsg,
}

impl Peer {
    /// Connect to session `name` under `dir` and perform the handshake.
    ///
    /// Not-found conditions (no metadata, unreachable endpoint) surface
    /// locally as [`PeerError::NotFound`]; they are never transmitted.
    pub async fn connect(dir: &Path, name: &str, mode: Mode) -> Result<Self, PeerError> {
        match registry::read_meta(dir, name) {
            Ok(_) => {}
            Err(RegistryError::NotFound(_)) => return Err(PeerError::NotFound(name.to_string())),
            // Metadata we cannot parse may be mid-write; still try to connect.
            Err(RegistryError::BadMetadata(..)) => {}
            Err(RegistryError::InvalidName(n)) => return Err(PeerError::NotFound(n)),
            Err(RegistryError::Io(e)) => return Err(PeerError::Io(e)),
        }

        let path = registry::endpoint_path(dir, name);
        let stream = endpoint::connect(&path)
            .await
            .map_err(|_| PeerError::NotFound(name.to_string()))?;
        Self::handshake(stream, mode).await
    }

    /// Perform the handshake over an already-open stream.
    pub async fn handshake(stream: Stream, mode: Mode) -> Result<Self, PeerError> {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let hello = HelloMsg {
            mode,
            protocol_version: PROTOCOL_VERSION,
        };
        let frame = Frame::control(FrameType::Hello, &hello)
            .map_err(|e| PeerError::Rejected(format!("could not encode HELLO: {e}")))?;
        frame.write_to(&mut write_half).await?;

        let mut peer = Self {
            read_half,
            write_half,
            decoder: FrameDecoder::new(),
            // Placeholder until the ack arrives.
            ack: HelloAckMsg {
                name: String::new(),
                cols: 0,
                rows: 0,
                mode,
                pid: 0,
            },
        };

        let frame = peer
            .read_frame()
            .await?
            .ok_or(PeerError::ClosedDuringHandshake)?;
        match frame.frame_type {
            FrameType::HelloAck => {
                peer.ack = frame
                    .parse_json()
                    .map_err(|e| PeerError::Protocol(ProtocolError::BadHandshake(e)))?;
                Ok(peer)
            }
            FrameType::Error => Err(PeerError::Rejected(frame.error_text())),
            other => Err(PeerError::UnexpectedFrame(other)),
        }
    }

    /// The holder's handshake acknowledgement.
    pub fn ack(&self) -> &HelloAckMsg {
        &self.ack
    }

    /// Read the next frame. `None` means the holder half-closed (FIN).
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, PeerError> {
        self.read_frame().await
    }

    /// Send stdin bytes. Only meaningful for attach peers; the holder
    /// silently ignores input from view peers.
    pub async fn send_input(&mut self, data: Bytes) -> Result<(), PeerError> {
        Frame::data_in(data).write_to(&mut self.write_half).await?;
        Ok(())
    }

    /// Forward a terminal size change. Attach only.
    pub async fn send_resize(&mut self, cols: u16, rows: u16) -> Result<(), PeerError> {
        Frame::resize(cols, rows)
            .write_to(&mut self.write_half)
            .await?;
        Ok(())
    }

    /// Consume frames up to `REPLAY_END`, returning the concatenated replay
    /// bytes. This is the whole useful life of a logs peer.
    pub async fn collect_replay(&mut self) -> Result<Vec<u8>, PeerError> {
        let mut replay = Vec::new();
        loop {
            match self.read_frame().await? {
                Some(frame) => match frame.frame_type {
                    FrameType::DataOut => replay.extend_from_slice(&frame.payload),
                    FrameType::ReplayEnd => return Ok(replay),
                    // EXIT may arrive here only if the holder closed before
                    // finishing replay, which the ordering rules forbid;
                    // anything else is skipped for forward compatibility.
                    _ => {}
                },
                None => return Ok(replay),
            }
        }
    }

    async fn read_frame(&mut self) -> Result<Option<Frame>, PeerError> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(Some(frame));
            }
            let mut buf = [0u8; 4096];
            let n = self.read_half.read(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            self.decoder.feed(&buf[..n]);
        }
    }
}
