// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Firmware error type.

use thiserror::Error;

/// Errors surfaced by the firmware subsystems.
#[derive(Debug, Error)]
pub enum FirmwareError {
    #[error("protocol error: {0}")]
    Proto(#[from] hampod_proto::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ALSA error: {0}")]
    Alsa(#[from] alsa::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("beep file {0} violates the 16 kHz mono s16 contract")]
    BeepFormat(String),

    #[error("TTS engine failure: {0}")]
    Tts(String),

    #[error("malformed request: {0}")]
    BadRequest(&'static str),

    #[error("keypad device failure: {0}")]
    Keypad(String),
}
