// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Keypad poller and press/hold classification.
//!
//! A background thread polls the firmware every 50 ms for the currently
//! held symbol and turns the raw samples into discrete press/hold events.
//! The release-debounce counter absorbs the gaps the input layer's
//! auto-repeat leaves between reports; without it every gap would fire a
//! spurious release.
//!
//! Exactly one of press or hold fires per physical key press, never both:
//! a hold fires the moment the threshold elapses while the key is still
//! down, and the `hold_fired` latch suppresses the event that would
//! otherwise fire at release.

use crate::comm::{Comm, KEYPAD_TIMEOUT};
use crate::config::KeypadLayout;
use crate::SoftwareError;
use hampod_proto::PacketType;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Poll cadence.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// A key held at least this long is a hold; the boundary is inclusive.
pub const HOLD_THRESHOLD: Duration = Duration::from_millis(500);
/// Consecutive no-key polls before a release is believed.
pub const RELEASE_THRESHOLD: u32 = 6;
/// Non-timeout errors tolerated before the poller thread gives up.
const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Symbol meaning "no key pressed" in keypad replies.
const NO_KEY: char = '-';

/// A classified key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: char,
    pub is_hold: bool,
}

/// The press/hold state machine, separated from the polling thread so it
/// can be driven with synthetic samples and timestamps.
#[derive(Debug)]
pub struct PressHoldClassifier {
    last_key: char,
    press_time: Instant,
    hold_fired: bool,
    no_key_count: u32,
}

impl PressHoldClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_key: NO_KEY,
            press_time: Instant::now(),
            hold_fired: false,
            no_key_count: 0,
        }
    }

    /// Feed one poll sample; returns at most one event.
    pub fn step(&mut self, raw: char, now: Instant) -> Option<KeyEvent> {
        let pressed = raw != NO_KEY && raw != '\u{ff}' && raw != '\0';
        if pressed {
            self.no_key_count = 0;
            if self.last_key == NO_KEY {
                // First detection.
                self.last_key = raw;
                self.press_time = now;
                self.hold_fired = false;
                None
            } else if self.last_key == raw {
                // Continuation: fire the hold as soon as the threshold
                // elapses, once.
                if !self.hold_fired && now.duration_since(self.press_time) >= HOLD_THRESHOLD {
                    self.hold_fired = true;
                    Some(KeyEvent {
                        key: raw,
                        is_hold: true,
                    })
                } else {
                    None
                }
            } else {
                // Key switch without an observed release: flush the old key
                // if it never produced an event, then start the new press.
                let event = (!self.hold_fired).then_some(KeyEvent {
                    key: self.last_key,
                    is_hold: false,
                });
                self.last_key = raw;
                self.press_time = now;
                self.hold_fired = false;
                event
            }
        } else if self.last_key != NO_KEY {
            self.no_key_count += 1;
            if self.no_key_count >= RELEASE_THRESHOLD {
                // Real release. Emit the deferred event unless the hold
                // already fired mid-press.
                let event = (!self.hold_fired).then(|| KeyEvent {
                    key: self.last_key,
                    is_hold: now.duration_since(self.press_time) >= HOLD_THRESHOLD,
                });
                self.last_key = NO_KEY;
                self.no_key_count = 0;
                self.hold_fired = false;
                event
            } else {
                None
            }
        } else {
            None
        }
    }
}

impl Default for PressHoldClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// The polling thread.
pub struct KeypadPoller {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl KeypadPoller {
    /// Spawn the poller. `on_event` runs on the poller thread for every
    /// classified event, after layout translation.
    pub fn start<F>(comm: Arc<Comm>, layout: KeypadLayout, on_event: F) -> Self
    where
        F: Fn(KeyEvent) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);

        let handle = std::thread::spawn(move || {
            let mut classifier = PressHoldClassifier::new();
            let mut consecutive_errors = 0u32;
            log::debug!("[KEYPAD] poller started");

            while !stop_clone.load(Ordering::Relaxed) {
                let reply = comm.request(PacketType::Keypad, vec![b'r'], KEYPAD_TIMEOUT);
                let raw = match reply {
                    Ok(packet) => {
                        consecutive_errors = 0;
                        packet.data.first().map_or(NO_KEY, |&b| b as char)
                    }
                    Err(SoftwareError::Timeout) => {
                        // Transient; retry freely without logging a fatal.
                        continue;
                    }
                    Err(SoftwareError::Shutdown) => break,
                    Err(e) => {
                        consecutive_errors += 1;
                        log::warn!(
                            "[KEYPAD] poll error {}/{}: {}",
                            consecutive_errors,
                            MAX_CONSECUTIVE_ERRORS,
                            e
                        );
                        if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                            log::error!("[KEYPAD] poller terminating");
                            break;
                        }
                        continue;
                    }
                };

                let logical = layout.translate(raw);
                if let Some(event) = classifier.step(logical, Instant::now()) {
                    log::debug!(
                        "[KEYPAD] event key='{}' hold={}",
                        event.key,
                        event.is_hold
                    );
                    on_event(event);
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            log::debug!("[KEYPAD] poller exiting");
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for KeypadPoller {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the classifier with a symbol per 50 ms tick.
    fn run_script(script: &[char]) -> Vec<KeyEvent> {
        let mut classifier = PressHoldClassifier::new();
        let start = Instant::now();
        let mut events = Vec::new();
        for (i, &symbol) in script.iter().enumerate() {
            let now = start + POLL_INTERVAL * (i as u32);
            if let Some(e) = classifier.step(symbol, now) {
                events.push(e);
            }
        }
        events
    }

    #[test]
    fn test_short_press_fires_press_after_debounce() {
        // 3 ticks down (150 ms), then 6 no-key ticks to clear debounce.
        let mut script = vec!['5'; 3];
        script.extend(['-'; 6]);
        let events = run_script(&script);
        assert_eq!(
            events,
            vec![KeyEvent {
                key: '5',
                is_hold: false
            }]
        );
    }

    #[test]
    fn test_hold_fires_exactly_once_while_held() {
        // Held for 16 ticks = 800 ms, then released. One hold, no press.
        let mut script = vec!['8'; 16];
        script.extend(['-'; 6]);
        let events = run_script(&script);
        assert_eq!(
            events,
            vec![KeyEvent {
                key: '8',
                is_hold: true
            }]
        );
    }

    #[test]
    fn test_hold_boundary_is_inclusive() {
        let mut classifier = PressHoldClassifier::new();
        let start = Instant::now();
        assert!(classifier.step('2', start).is_none());
        // Exactly the threshold elapsed: counts as a hold.
        let event = classifier.step('2', start + HOLD_THRESHOLD).unwrap();
        assert!(event.is_hold);
    }

    #[test]
    fn test_repeat_gaps_do_not_release() {
        // Gaps shorter than RELEASE_THRESHOLD polls between reports of
        // the same key must not produce extra events.
        let mut script = Vec::new();
        for _ in 0..4 {
            script.push('3');
            script.extend(['-'; 3]); // gap below the threshold
        }
        script.extend(['-'; 6]);
        let events = run_script(&script);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, '3');
    }

    #[test]
    fn test_key_switch_flushes_previous_press() {
        // '1' briefly, then '2' without an observed release.
        let mut script = vec!['1'; 2];
        script.extend(['2'; 2]);
        script.extend(['-'; 6]);
        let events = run_script(&script);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            KeyEvent {
                key: '1',
                is_hold: false
            }
        );
        assert_eq!(
            events[1],
            KeyEvent {
                key: '2',
                is_hold: false
            }
        );
    }

    #[test]
    fn test_invalid_bytes_are_not_presses() {
        let events = run_script(&['\u{ff}', '\0', '-', '-']);
        assert!(events.is_empty());
    }

    #[test]
    fn test_exactly_one_event_per_press() {
        // Long hold: the release must not add a second event.
        let mut script = vec!['9'; 20];
        script.extend(['-'; 12]);
        let events = run_script(&script);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_hold);
    }
}
