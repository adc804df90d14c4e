// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The three user-interface modes and their dispatcher.
//!
//! Frequency Entry and Set are the overriding modes; Normal is not a
//! state but the fall-through dispatcher that fires when neither claims a
//! key. Their entry keys (`#`, `B`) only fire from Normal, which makes
//! the two overriding modes mutually exclusive by construction.
//!
//! The modes are peers: each holds shared references to the radio and
//! the speaker, and cross-mode coordination (shift, verbosity, the
//! poll-suppression flag) goes through [`SharedModeState`] rather than
//! back-pointers.

/// Digit-accumulator frequency entry.
pub mod frequency;
/// Fall-through query dispatcher.
pub mod normal;
/// Parameter-selection and value-entry mode.
pub mod set;

pub use frequency::FrequencyMode;
pub use normal::NormalMode;
pub use set::SetMode;

use crate::config::ConfigStore;
use crate::keypad::KeyEvent;
use crate::radio::Radio;
use crate::speech::Speaker;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A key event as the modes see it, with the one-shot shift resolved.
#[derive(Debug, Clone, Copy)]
pub struct DispatchEvent {
    pub key: char,
    pub is_hold: bool,
    pub shift: bool,
}

/// Cross-mode coordination flags.
pub struct SharedModeState {
    /// One-shot shift, armed by `A` in Normal, consumed by the next key.
    shift_armed: AtomicBool,
    /// Set by Frequency Mode right before a commit so the radio poller's
    /// own change callback stays silent once.
    suppress_next_poll: AtomicBool,
    /// Normal Mode's verbosity toggle; polled announcements honor it.
    verbose: AtomicBool,
}

impl SharedModeState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shift_armed: AtomicBool::new(false),
            suppress_next_poll: AtomicBool::new(false),
            verbose: AtomicBool::new(true),
        }
    }

    pub fn arm_shift(&self) {
        self.shift_armed.store(true, Ordering::Release);
    }

    /// Consume the shift flag (one-shot).
    pub fn take_shift(&self) -> bool {
        self.shift_armed.swap(false, Ordering::AcqRel)
    }

    #[must_use]
    pub fn shift_armed(&self) -> bool {
        self.shift_armed.load(Ordering::Acquire)
    }

    pub fn suppress_next_poll(&self) {
        self.suppress_next_poll.store(true, Ordering::Release);
    }

    /// Consume the suppression flag (one-shot).
    pub fn take_poll_suppression(&self) -> bool {
        self.suppress_next_poll.swap(false, Ordering::AcqRel)
    }

    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.verbose.load(Ordering::Acquire)
    }

    /// Returns the new value.
    pub fn toggle_verbose(&self) -> bool {
        !self.verbose.fetch_xor(true, Ordering::AcqRel)
    }
}

impl Default for SharedModeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes key events Set -> Frequency -> Normal and fans radio callbacks
/// to whichever mode should speak.
pub struct ModeManager {
    shared: Arc<SharedModeState>,
    set: SetMode,
    frequency: FrequencyMode,
    normal: NormalMode,
}

impl ModeManager {
    pub fn new(
        shared: Arc<SharedModeState>,
        speaker: Arc<dyn Speaker>,
        radio: Arc<Radio>,
        config: Arc<ConfigStore>,
        apply_config: Arc<dyn Fn() + Send + Sync>,
    ) -> Self {
        Self {
            set: SetMode::new(Arc::clone(&shared), Arc::clone(&speaker), Arc::clone(&radio)),
            frequency: FrequencyMode::new(
                Arc::clone(&shared),
                Arc::clone(&speaker),
                Arc::clone(&radio),
            ),
            normal: NormalMode::new(
                Arc::clone(&shared),
                speaker,
                radio,
                config,
                apply_config,
            ),
            shared,
        }
    }

    /// Dispatch one classified key event.
    pub fn handle_key(&mut self, event: KeyEvent) {
        // The shift flag is consumed here, before routing, so it applies
        // to this key no matter which mode claims it.
        let shift = self.shared.take_shift();
        let event = DispatchEvent {
            key: event.key,
            is_hold: event.is_hold,
            shift,
        };
        log::debug!(
            "[MODE] key='{}' hold={} shift={}",
            event.key,
            event.is_hold,
            event.shift
        );
        if self.set.handle(&event) {
            return;
        }
        if self.frequency.handle(&event) {
            return;
        }
        self.normal.handle(&event);
    }

    /// Periodic tick for entry timeouts.
    pub fn tick(&mut self, now: Instant) {
        self.frequency.tick(now);
    }

    /// The radio poller's frequency-change callback lands here.
    pub fn on_poll_frequency(&self, hz: i64) {
        // The suppression flag is consumed even when nothing would have
        // been announced; it covers exactly one poll callback.
        if self.shared.take_poll_suppression() {
            log::debug!("[MODE] poll announcement suppressed after commit");
            return;
        }
        if self.set.is_active() || self.frequency.is_active() {
            return;
        }
        self.normal.announce_polled_frequency(hz);
    }

    #[must_use]
    pub fn shared(&self) -> &Arc<SharedModeState> {
        &self.shared
    }

    #[must_use]
    pub fn is_frequency_active(&self) -> bool {
        self.frequency.is_active()
    }

    #[must_use]
    pub fn is_set_active(&self) -> bool {
        self.set.is_active()
    }
}

/// Spoken rendering of a frequency: integer megahertz, "point", each of
/// the five 10 Hz-resolution decimal digits individually, "megahertz".
#[must_use]
pub fn spoken_frequency(hz: i64) -> String {
    let mhz = hz / 1_000_000;
    let frac = (hz % 1_000_000) / 10; // five digits at 10 Hz resolution
    let digits = format!("{:05}", frac);
    let mut out = format!("{} point", mhz);
    for d in digits.chars() {
        out.push(' ');
        out.push(d);
    }
    out.push_str(" megahertz");
    out
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spoken_frequency_pads_decimals() {
        assert_eq!(
            spoken_frequency(14_250_000),
            "14 point 2 5 0 0 0 megahertz"
        );
        assert_eq!(spoken_frequency(7_074_000), "7 point 0 7 4 0 0 megahertz");
        assert_eq!(
            spoken_frequency(14_025_000),
            "14 point 0 2 5 0 0 megahertz"
        );
    }

    #[test]
    fn test_shift_is_one_shot() {
        let shared = SharedModeState::new();
        shared.arm_shift();
        assert!(shared.take_shift());
        assert!(!shared.take_shift());
    }

    #[test]
    fn test_poll_suppression_is_one_shot() {
        let shared = SharedModeState::new();
        shared.suppress_next_poll();
        assert!(shared.take_poll_suppression());
        assert!(!shared.take_poll_suppression());
    }
}
