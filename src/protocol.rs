//! Wire protocol between a holder and its peers.
//!
//! Wire format: `[type: u8][length: u32 big-endian][payload: bytes]`
//!
//! `HELLO`/`HELLO_ACK` carry JSON payloads; data frames carry raw PTY bytes.
//! `RESIZE` and `EXIT` carry fixed-width big-endian integers.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Current handshake protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum frame payload size (10 MiB). A declared length above this poisons
/// the stream.
pub const MAX_PAYLOAD: u32 = 10 * 1024 * 1024;

/// Frame header size: one type byte plus a four-byte length.
pub const HEADER_LEN: usize = 5;

/// Frame type byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Holder → client: raw PTY output bytes.
    DataOut = 0x01,
    /// Client → holder: raw stdin bytes (attach only).
    DataIn = 0x02,
    /// Client → holder: `cols:u16 BE`, `rows:u16 BE` (attach only).
    Resize = 0x03,
    /// Holder → client: `code:i32 BE`, last frame before FIN.
    Exit = 0x04,
    /// Holder → client: UTF-8 message.
    Error = 0x05,
    /// Client → holder: UTF-8 JSON `{mode, protocolVersion}`.
    Hello = 0x06,
    /// Holder → client: UTF-8 JSON `{name, cols, rows, mode, pid}`.
    HelloAck = 0x07,
    /// Holder → client: empty; marks the end of history replay.
    ReplayEnd = 0x08,
}

impl FrameType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::DataOut),
            0x02 => Some(Self::DataIn),
            0x03 => Some(Self::Resize),
            0x04 => Some(Self::Exit),
            0x05 => Some(Self::Error),
            0x06 => Some(Self::Hello),
            0x07 => Some(Self::HelloAck),
            0x08 => Some(Self::ReplayEnd),
            _ => None,
        }
    }
}

/// Connection mode requested in `HELLO` and echoed in `HELLO_ACK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Interactive: replay then live stream, stdin and resize honoured.
    /// At most one per session.
    Attach,
    /// Read-only: replay then live stream.
    View,
    /// One-shot dump: replay, then the holder half-closes.
    Logs,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Attach => write!(f, "attach"),
            Mode::View => write!(f, "view"),
            Mode::Logs => write!(f, "logs"),
        }
    }
}

/// Client → holder handshake body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloMsg {
    pub mode: Mode,
    #[serde(rename = "protocolVersion")]
    pub protocol_version: u32,
}

/// Holder → client handshake acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloAckMsg {
    pub name: String,
    pub cols: u16,
    pub rows: u16,
    pub mode: Mode,
    /// Holder process id.
    pub pid: u32,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame payload too large: {0} bytes (max {MAX_PAYLOAD})")]
    Oversize(u32),
    #[error("truncated {0:?} payload")]
    Truncated(FrameType),
    #[error("stream poisoned by earlier framing error")]
    Poisoned,
    #[error("invalid handshake payload: {0}")]
    BadHandshake(#[from] serde_json::Error),
}

/// A single protocol frame: type tag plus payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(frame_type: FrameType, payload: Bytes) -> Self {
        Self {
            frame_type,
            payload,
        }
    }

    /// Build a JSON-bodied frame from a serializable message.
    pub fn control<T: Serialize>(
        frame_type: FrameType,
        msg: &T,
    ) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_vec(msg)?;
        Ok(Self::new(frame_type, Bytes::from(payload)))
    }

    pub fn data_out(data: Bytes) -> Self {
        Self::new(FrameType::DataOut, data)
    }

    pub fn data_in(data: Bytes) -> Self {
        Self::new(FrameType::DataIn, data)
    }

    pub fn resize(cols: u16, rows: u16) -> Self {
        let mut buf = BytesMut::with_capacity(4);
        buf.put_u16(cols);
        buf.put_u16(rows);
        Self::new(FrameType::Resize, buf.freeze())
    }

    pub fn exit(code: i32) -> Self {
        let mut buf = BytesMut::with_capacity(4);
        buf.put_i32(code);
        Self::new(FrameType::Exit, buf.freeze())
    }

    pub fn error(message: &str) -> Self {
        Self::new(FrameType::Error, Bytes::copy_from_slice(message.as_bytes()))
    }

    pub fn replay_end() -> Self {
        Self::new(FrameType::ReplayEnd, Bytes::new())
    }

    /// Parse a `Resize` payload as `(cols, rows)`.
    pub fn parse_resize(&self) -> Result<(u16, u16), ProtocolError> {
        if self.payload.len() < 4 {
            return Err(ProtocolError::Truncated(FrameType::Resize));
        }
        let mut buf = self.payload.clone();
        Ok((buf.get_u16(), buf.get_u16()))
    }

    /// Parse an `Exit` payload.
    pub fn parse_exit(&self) -> Result<i32, ProtocolError> {
        if self.payload.len() < 4 {
            return Err(ProtocolError::Truncated(FrameType::Exit));
        }
        let mut buf = self.payload.clone();
        Ok(buf.get_i32())
    }

    /// Decode an `Error` payload as text (lossy).
    pub fn error_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Parse the payload as a JSON message.
    pub fn parse_json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    /// Encode this frame into wire bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        buf.put_u8(self.frame_type as u8);
        buf.put_u32(self.payload.len() as u32);
        buf.put(self.payload.as_ref());
        buf.freeze()
    }

    /// Write this frame to an async writer and flush.
    pub async fn write_to<W: AsyncWriteExt + Unpin>(&self, writer: &mut W) -> io::Result<()> {
        let encoded = self.encode();
        writer.write_all(&encoded).await?;
        writer.flush().await
    }
}

/// Incremental frame decoder.
///
/// Feed arbitrary byte chunks; pull zero or more complete frames. The
/// remainder is retained across calls, so single-byte delivery,
/// header-spanning reads, and payloads straddling chunks all work. Opcodes
/// outside [`FrameType`] are consumed (header plus payload) without being
/// surfaced, the forward-compatibility rule. A declared length above
/// [`MAX_PAYLOAD`] poisons the decoder: every later call errors until
/// [`FrameDecoder::reset`].
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    poisoned: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a chunk read from the stream.
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.poisoned {
            return;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Pull the next complete frame, if one is buffered.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        if self.poisoned {
            return Err(ProtocolError::Poisoned);
        }
        loop {
            if self.buf.len() < HEADER_LEN {
                return Ok(None);
            }
            let declared = u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]);
            if declared > MAX_PAYLOAD {
                self.poisoned = true;
                return Err(ProtocolError::Oversize(declared));
            }
            let total = HEADER_LEN + declared as usize;
            if self.buf.len() < total {
                return Ok(None);
            }
            let type_byte = self.buf[0];
            self.buf.advance(HEADER_LEN);
            let payload = self.buf.split_to(declared as usize).freeze();
            match FrameType::from_u8(type_byte) {
                Some(frame_type) => return Ok(Some(Frame::new(frame_type, payload))),
                // Unknown opcode with a valid length: skip it.
                None => continue,
            }
        }
    }

    /// Discard the buffered remainder and clear any poisoned state, making
    /// the decoder reusable for a fresh stream.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.poisoned = false;
    }
}
