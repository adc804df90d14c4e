// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HAMPOD software process.
//!
//! Owns the user-interaction logic: the router demultiplexing firmware
//! responses, the keypad press/hold classifier, the speech queue, the
//! radio abstraction with auto-reconnect, the three UI modes (Normal,
//! Frequency Entry, Set) and the configuration store.
//!
//! Thread layout:
//!
//! - main: key-event dispatch across modes
//! - router: reads `fw_out`, fans packets into per-type queues
//! - speech worker: drains the speech queue into AUDIO requests
//! - keypad poller: periodic KEYPAD reads + press/hold classification
//! - radio poller: frequency polling with debounce
//! - radio reconnect watcher: device-path probing and USB reset

/// Application wiring and the event loop.
pub mod app;
/// Router, response queues and request/response helpers.
pub mod comm;
/// Configuration file store with undo ring.
pub mod config;
/// Crate-level error type.
pub mod error;
/// Keypad poller and press/hold classification.
pub mod keypad;
/// The three user-interface modes and their dispatcher.
pub mod modes;
/// Radio abstraction: CAT backends, polling, reconnect.
pub mod radio;
/// Speech queue and the speaker contract.
pub mod speech;

pub use error::SoftwareError;

/// Result alias for software operations.
pub type Result<T> = std::result::Result<T, SoftwareError>;
