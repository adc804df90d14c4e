// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packet framing for the firmware/software pipes.
//!
//! The header is fixed at 8 bytes (`type` u32, `data_len` u16, `tag` u16,
//! all little-endian) followed by exactly `data_len` payload bytes. Both
//! sides encode and decode with the functions here; nothing else touches
//! the byte layout.

use crate::{Error, Result};

/// Hard cap on payload size. A `data_len` above this value marks the stream
/// as corrupt; framing cannot be recovered on a byte stream.
pub const MAX_DATA_LEN: usize = 256;

/// Size of the fixed packet header on the wire.
pub const HEADER_LEN: usize = 8;

/// Payload of the one-shot ready signal the firmware sends after init.
pub const READY_PAYLOAD: &[u8] = b"R";

/// Four-byte packet discriminator.
///
/// The numeric values are wire constants; changing them breaks every
/// deployed peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PacketType {
    /// Keypad reads and key-state replies.
    Keypad = 0,
    /// Audio requests (speak, play, beep, info) and their replies.
    Audio = 1,
    /// Reserved for direct serial passthrough.
    Serial = 2,
    /// Configuration traffic and the ready signal.
    Config = 3,
}

impl PacketType {
    /// Decode the wire discriminator.
    pub fn from_wire(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(PacketType::Keypad),
            1 => Ok(PacketType::Audio),
            2 => Ok(PacketType::Serial),
            3 => Ok(PacketType::Config),
            other => Err(Error::UnknownPacketType(other)),
        }
    }

    /// Index used by the per-type response queues (dense 0..4).
    #[inline]
    #[must_use]
    pub fn queue_index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PacketType::Keypad => "KEYPAD",
            PacketType::Audio => "AUDIO",
            PacketType::Serial => "SERIAL",
            PacketType::Config => "CONFIG",
        };
        f.write_str(s)
    }
}

/// One framed message in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    /// Sender-chosen correlation number. The software side counts up
    /// monotonically; the firmware echoes the tag of the request it is
    /// answering.
    pub tag: u16,
    pub data: Vec<u8>,
}

impl Packet {
    /// Build a packet, enforcing the payload cap at construction time so an
    /// oversize frame can never be produced locally.
    pub fn new(packet_type: PacketType, tag: u16, data: Vec<u8>) -> Result<Self> {
        if data.len() > MAX_DATA_LEN {
            return Err(Error::OversizePayload(data.len()));
        }
        Ok(Self {
            packet_type,
            tag,
            data,
        })
    }

    /// The ready-signal CONFIG packet the firmware emits exactly once.
    #[must_use]
    pub fn ready() -> Self {
        Self {
            packet_type: PacketType::Config,
            tag: 0,
            data: READY_PAYLOAD.to_vec(),
        }
    }

    /// True if this is the ready signal (CONFIG with payload `"R"`).
    #[must_use]
    pub fn is_ready_signal(&self) -> bool {
        self.packet_type == PacketType::Config && self.data == READY_PAYLOAD
    }

    /// Serialize header + payload into a fresh buffer.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.data.len());
        buf.extend_from_slice(&(self.packet_type as u32).to_le_bytes());
        buf.extend_from_slice(&(self.data.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.tag.to_le_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Parse a header; returns `(type, data_len, tag)`.
    ///
    /// The payload length is validated here so the caller never issues a
    /// read for a corrupt length.
    pub fn decode_header(header: &[u8; HEADER_LEN]) -> Result<(PacketType, usize, u16)> {
        let raw_type = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let data_len = u16::from_le_bytes([header[4], header[5]]) as usize;
        let tag = u16::from_le_bytes([header[6], header[7]]);
        if data_len > MAX_DATA_LEN {
            return Err(Error::OversizePayload(data_len));
        }
        let packet_type = PacketType::from_wire(raw_type)?;
        Ok((packet_type, data_len, tag))
    }

    /// Payload interpreted as a NUL-terminated ASCII string (trailing NUL
    /// stripped, absent NUL tolerated).
    #[must_use]
    pub fn data_as_str(&self) -> std::borrow::Cow<'_, str> {
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.data.len());
        String::from_utf8_lossy(&self.data[..end])
    }
}

// ===== Tests =====
