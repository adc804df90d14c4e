// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HAMPOD firmware process.
//!
//! Owns the hardware: the USB keypad, the PCM output device and the TTS
//! synthesis child. Serves requests arriving on the `fw_in` FIFO and
//! answers on `fw_out`. The software process never touches a device node
//! directly; everything goes through the packet protocol.
//!
//! Thread layout:
//!
//! - request loop (main): reads `fw_in`, dispatches to subsystems
//! - audio worker: plays beeps / WAV files / synthesized speech, one job
//!   at a time; a newly arriving audio request interrupts the current one
//! - keypad HAL: maintains the latest pressed symbol

/// Interruptible PCM engine, beep cache, WAV playback.
pub mod audio;
/// Crate-level error type.
pub mod error;
/// Keypad HAL thread and the key-source contract.
pub mod keypad;
/// Request loop wiring the pipes to the subsystems.
pub mod server;
/// Persistent text-to-speech child process.
pub mod tts;

pub use error::FirmwareError;
pub use server::{FirmwareServer, ServerOptions};

/// Result alias for firmware operations.
pub type Result<T> = std::result::Result<T, FirmwareError>;
