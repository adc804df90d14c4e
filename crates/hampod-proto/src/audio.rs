// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! AUDIO payload sub-types.
//!
//! The first byte of an AUDIO payload selects the operation; the remainder
//! is a NUL-terminated ASCII argument. Constructors here are the only place
//! the selector bytes appear, so the two processes cannot drift apart.
//!
//! | Byte | Operation |
//! |------|-----------|
//! | `d`  | speak text via TTS |
//! | `p`  | play WAV file at path |
//! | `s`  | spell out characters |
//! | `b`  | cached beep (`k` keypress, `h` hold, `e` error) |
//! | `t`  | set speech speed (fixed-point, `100` = 1.0x) |
//! | `i`  | query audio-device info |

use crate::packet::{Packet, PacketType, MAX_DATA_LEN};
use crate::{Error, Result};

/// Which of the three RAM-cached beeps to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeepKind {
    Keypress,
    Hold,
    Error,
}

impl BeepKind {
    #[inline]
    #[must_use]
    pub fn selector(self) -> u8 {
        match self {
            BeepKind::Keypress => b'k',
            BeepKind::Hold => b'h',
            BeepKind::Error => b'e',
        }
    }

    pub fn from_selector(b: u8) -> Result<Self> {
        match b {
            b'k' => Ok(BeepKind::Keypress),
            b'h' => Ok(BeepKind::Hold),
            b'e' => Ok(BeepKind::Error),
            _ => Err(Error::InvalidPayload("unknown beep selector")),
        }
    }
}

/// A decoded AUDIO request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioRequest {
    /// `d<text>` - synthesize and play.
    Speak(String),
    /// `p<path>` - play a WAV file from disk.
    PlayFile(String),
    /// `s<chars>` - spell characters one at a time.
    Spell(String),
    /// `b<k|h|e>` - play a cached beep.
    Beep(BeepKind),
    /// `t<speed>` - set speech speed, percent of nominal (50..=200).
    SetSpeed(u16),
    /// `i` - report audio-device info in the reply payload.
    Info,
}

impl AudioRequest {
    /// Encode into an AUDIO packet payload.
    ///
    /// Text arguments must be NUL-free and short enough to fit the payload
    /// cap with the selector byte and terminator.
    pub fn encode(&self, tag: u16) -> Result<Packet> {
        let data = match self {
            AudioRequest::Speak(text) => Self::text_payload(b'd', text)?,
            AudioRequest::PlayFile(path) => Self::text_payload(b'p', path)?,
            AudioRequest::Spell(chars) => Self::text_payload(b's', chars)?,
            AudioRequest::Beep(kind) => vec![b'b', kind.selector()],
            AudioRequest::SetSpeed(speed) => Self::text_payload(b't', &speed.to_string())?,
            AudioRequest::Info => vec![b'i'],
        };
        Packet::new(PacketType::Audio, tag, data)
    }

    /// Decode a received AUDIO payload.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (&selector, rest) = data
            .split_first()
            .ok_or(Error::InvalidPayload("empty AUDIO payload"))?;
        match selector {
            b'd' => Ok(AudioRequest::Speak(Self::text_arg(rest))),
            b'p' => Ok(AudioRequest::PlayFile(Self::text_arg(rest))),
            b's' => Ok(AudioRequest::Spell(Self::text_arg(rest))),
            b'b' => {
                let &k = rest
                    .first()
                    .ok_or(Error::InvalidPayload("beep payload missing kind"))?;
                Ok(AudioRequest::Beep(BeepKind::from_selector(k)?))
            }
            b't' => {
                let speed: u16 = Self::text_arg(rest)
                    .parse()
                    .map_err(|_| Error::InvalidPayload("speed not numeric"))?;
                Ok(AudioRequest::SetSpeed(speed))
            }
            b'i' => Ok(AudioRequest::Info),
            _ => Err(Error::InvalidPayload("unknown AUDIO sub-type")),
        }
    }

    fn text_payload(selector: u8, text: &str) -> Result<Vec<u8>> {
        if text.as_bytes().contains(&0) {
            return Err(Error::InvalidPayload("embedded NUL in argument"));
        }
        // selector + text + NUL terminator
        if text.len() + 2 > MAX_DATA_LEN {
            return Err(Error::InvalidPayload("argument too long for payload"));
        }
        let mut data = Vec::with_capacity(text.len() + 2);
        data.push(selector);
        data.extend_from_slice(text.as_bytes());
        data.push(0);
        Ok(data)
    }

    fn text_arg(rest: &[u8]) -> String {
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        String::from_utf8_lossy(&rest[..end]).into_owned()
    }
}

// ===== Tests =====
