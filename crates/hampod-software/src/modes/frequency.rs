// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Frequency Entry mode.
//!
//! `#` from Normal enters VFO selection; further `#` presses cycle
//! Current/A/B. The first digit starts the accumulator; `*` inserts the
//! decimal point (a second `*` cancels); `#` parses, validates and
//! commits; `D` cancels. Ten seconds without a key times the mode out.
//!
//! Entry shorthand: a 4-5 digit buffer with no point is kilohertz-style
//! shorthand, so an implicit decimal lands before the last three digits
//! (`14025` reads as 14.025 MHz).

use crate::modes::{spoken_frequency, DispatchEvent, SharedModeState};
use crate::radio::{Radio, Vfo};
use crate::speech::Speaker;
use hampod_proto::BeepKind;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Inactivity timeout while the mode is engaged.
const ENTRY_TIMEOUT: Duration = Duration::from_secs(10);
/// Accumulator cap.
const MAX_DIGITS: usize = 12;
/// Commit range in MHz.
const MIN_MHZ: f64 = 0.1;
const MAX_MHZ: f64 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    SelectVfo,
    Entering,
}

struct Entry {
    state: State,
    vfo: Vfo,
    buffer: String,
    has_point: bool,
    last_key_at: Instant,
}

/// The mode object. Interior-mutable so the poll callback can query
/// activity from another thread.
pub struct FrequencyMode {
    entry: Mutex<Entry>,
    shared: Arc<SharedModeState>,
    speaker: Arc<dyn Speaker>,
    radio: Arc<Radio>,
}

impl FrequencyMode {
    pub fn new(
        shared: Arc<SharedModeState>,
        speaker: Arc<dyn Speaker>,
        radio: Arc<Radio>,
    ) -> Self {
        Self {
            entry: Mutex::new(Entry {
                state: State::Idle,
                vfo: Vfo::Current,
                buffer: String::new(),
                has_point: false,
                last_key_at: Instant::now(),
            }),
            shared,
            speaker,
            radio,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.entry.lock().state != State::Idle
    }

    /// Returns true when the event was claimed.
    pub fn handle(&self, event: &DispatchEvent) -> bool {
        let mut entry = self.entry.lock();
        match entry.state {
            State::Idle => {
                if event.key == '#' && !event.is_hold && !event.shift {
                    entry.state = State::SelectVfo;
                    entry.vfo = Vfo::Current;
                    entry.last_key_at = Instant::now();
                    self.speaker.say("Frequency Mode");
                    true
                } else {
                    false
                }
            }
            State::SelectVfo => {
                entry.last_key_at = Instant::now();
                match event.key {
                    '#' => {
                        entry.vfo = match entry.vfo {
                            Vfo::Current => Vfo::A,
                            Vfo::A => Vfo::B,
                            Vfo::B => Vfo::Current,
                        };
                        self.speaker.say(&format!("VFO {}", entry.vfo.spoken()));
                        true
                    }
                    '0'..='9' => {
                        entry.state = State::Entering;
                        entry.buffer.clear();
                        entry.buffer.push(event.key);
                        entry.has_point = false;
                        self.speaker.say(&event.key.to_string());
                        true
                    }
                    '*' | 'D' => {
                        Self::reset(&mut entry);
                        self.speaker.say("Cancelled");
                        true
                    }
                    _ => false,
                }
            }
            State::Entering => {
                entry.last_key_at = Instant::now();
                match event.key {
                    '0'..='9' => {
                        if entry.buffer.len() < MAX_DIGITS {
                            entry.buffer.push(event.key);
                            self.speaker.say(&event.key.to_string());
                        } else {
                            self.speaker.beep(BeepKind::Error);
                        }
                        true
                    }
                    '*' => {
                        if entry.has_point {
                            // Second point: cancel.
                            Self::reset(&mut entry);
                            self.speaker.say("Cancelled");
                        } else {
                            entry.buffer.push('.');
                            entry.has_point = true;
                            self.speaker.say("point");
                        }
                        true
                    }
                    '#' => {
                        self.commit(&mut entry);
                        true
                    }
                    'D' => {
                        Self::reset(&mut entry);
                        self.speaker.say("Cancelled");
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    /// Time the mode out after inactivity.
    pub fn tick(&self, now: Instant) {
        let mut entry = self.entry.lock();
        if entry.state != State::Idle && now.duration_since(entry.last_key_at) > ENTRY_TIMEOUT {
            log::debug!("[MODE] frequency entry timed out");
            Self::reset(&mut entry);
            self.speaker.say("Timeout");
        }
    }

    fn commit(&self, entry: &mut Entry) {
        let Some(mhz) = parse_entry(&entry.buffer) else {
            self.reject(entry);
            return;
        };
        if !(MIN_MHZ..=MAX_MHZ).contains(&mhz) {
            self.reject(entry);
            return;
        }
        let hz = (mhz * 1_000_000.0).round() as i64;

        if entry.vfo != Vfo::Current && self.radio.select_vfo(entry.vfo).is_err() {
            self.speaker.beep(BeepKind::Error);
            self.speaker
                .say(&format!("VFO {} select failed", entry.vfo.spoken()));
            Self::reset(entry);
            return;
        }

        // The commit itself will trip the radio poller's change callback;
        // arm the suppression before the set so the user hears one
        // announcement, not two.
        self.shared.suppress_next_poll();
        match self.radio.set_frequency(entry.vfo, hz) {
            Ok(()) => self.speaker.say(&spoken_frequency(hz)),
            Err(e) => {
                log::warn!("[MODE] frequency set failed: {}", e);
                self.speaker.beep(BeepKind::Error);
                self.speaker.say("Frequency set failed");
            }
        }
        Self::reset(entry);
    }

    fn reject(&self, entry: &mut Entry) {
        self.speaker.beep(BeepKind::Error);
        self.speaker.say("Invalid frequency");
        Self::reset(entry);
    }

    fn reset(entry: &mut Entry) {
        entry.state = State::Idle;
        entry.vfo = Vfo::Current;
        entry.buffer.clear();
        entry.has_point = false;
    }
}

/// Parse the accumulator into MHz, applying the kilohertz shorthand.
fn parse_entry(buffer: &str) -> Option<f64> {
    if buffer.is_empty() {
        return None;
    }
    if !buffer.contains('.') && (4..=5).contains(&buffer.len()) {
        let split = buffer.len() - 3;
        let text = format!("{}.{}", &buffer[..split], &buffer[split..]);
        return text.parse().ok();
    }
    buffer.parse().ok()
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shorthand_inserts_implicit_point() {
        assert_eq!(parse_entry("14025"), Some(14.025));
        assert_eq!(parse_entry("7074"), Some(7.074));
    }

    #[test]
    fn test_explicit_point_parses_as_mhz() {
        assert_eq!(parse_entry("14.025"), Some(14.025));
        assert_eq!(parse_entry("14.25"), Some(14.25));
        assert_eq!(parse_entry("145"), Some(145.0));
        assert_eq!(parse_entry("430"), Some(430.0));
    }

    #[test]
    fn test_empty_and_garbage_rejected() {
        assert_eq!(parse_entry(""), None);
        assert_eq!(parse_entry("."), None);
    }
}
