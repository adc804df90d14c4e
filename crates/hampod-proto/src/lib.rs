// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HAMPOD inter-process protocol.
//!
//! The firmware and software processes exchange fixed-header binary packets
//! over a pair of named FIFOs owned by the firmware. This crate holds
//! everything both sides must agree on byte-for-byte:
//!
//! - [`Packet`] and its wire codec (`type, data_len, tag, data` header order)
//! - typed AUDIO payload constructors ([`audio`])
//! - the FIFO transport with its open-order and retry semantics ([`pipe`])
//!
//! ## Wire format
//!
//! ```text
//! +---------+----------+------+---------------+
//! | type    | data_len | tag  | data          |
//! | (4 B)   | (2 B)    | (2 B)| (data_len B)  |
//! +---------+----------+------+---------------+
//! ```
//!
//! All header fields are little-endian. A `data_len` above 256 is a protocol
//! violation: the stream is considered corrupt and the connection is torn
//! down, since there is no way to resynchronize a byte stream after a
//! framing error.

/// AUDIO payload sub-type constructors and parsing.
pub mod audio;
/// Packet framing: header layout, encode/decode, payload cap.
pub mod packet;
/// Named-FIFO transport with the handshake open order.
pub mod pipe;

pub use audio::{AudioRequest, BeepKind};
pub use packet::{Packet, PacketType, MAX_DATA_LEN, READY_PAYLOAD};
pub use pipe::{FifoTransport, PipeEnd, PipeReader, PipeWriter, FIFO_FW_IN, FIFO_FW_OUT};

use std::fmt;
use std::io;

/// Errors shared by the codec and the transport.
#[derive(Debug)]
pub enum Error {
    /// Underlying I/O failure (pipe gone, short write).
    Io(io::Error),
    /// Peer closed the pipe mid-stream.
    UnexpectedEof,
    /// `data_len` exceeded [`MAX_DATA_LEN`]; the stream is unrecoverable.
    OversizePayload(usize),
    /// Unknown `type` discriminator on the wire.
    UnknownPacketType(u32),
    /// A payload constructor was handed an argument that cannot be encoded
    /// (embedded NUL, or too long for the payload cap).
    InvalidPayload(&'static str),
    /// A timed wait expired before data arrived.
    Timeout,
    /// The owning process is shutting down; no further traffic.
    Shutdown,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::UnexpectedEof => write!(f, "unexpected EOF on pipe"),
            Error::OversizePayload(n) => {
                write!(f, "data_len {} exceeds {} byte cap", n, MAX_DATA_LEN)
            }
            Error::UnknownPacketType(t) => write!(f, "unknown packet type {:#x}", t),
            Error::InvalidPayload(what) => write!(f, "invalid payload: {}", what),
            Error::Timeout => write!(f, "timed out"),
            Error::Shutdown => write!(f, "shutting down"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        // Map EOF-ish errors distinctly so callers can tell "peer went away"
        // from "syscall failed".
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof
        } else {
            Error::Io(e)
        }
    }
}

/// Result alias used throughout the protocol crate.
pub type Result<T> = std::result::Result<T, Error>;
