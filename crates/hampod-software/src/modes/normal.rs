// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Normal mode: the fall-through query dispatcher.
//!
//! Receives only the keys Frequency and Set decline, plus the radio poll
//! callbacks when no overriding mode is active. Press, hold and
//! shift-press select different queries per key; `A` arms the one-shot
//! shift and `C` toggles verbosity.

use crate::config::ConfigStore;
use crate::modes::{spoken_frequency, DispatchEvent, SharedModeState};
use crate::radio::{AgcSpeed, Func, Level, Radio, Vfo};
use crate::speech::Speaker;
use crate::SoftwareError;
use hampod_proto::BeepKind;
use std::sync::Arc;

/// The fall-through dispatcher. Stateless apart from the shared flags.
pub struct NormalMode {
    shared: Arc<SharedModeState>,
    speaker: Arc<dyn Speaker>,
    radio: Arc<Radio>,
    config: Arc<ConfigStore>,
    /// Re-pushes config-derived state (volume, speech speed) to the
    /// firmware after an undo.
    apply_config: Arc<dyn Fn() + Send + Sync>,
}

impl NormalMode {
    pub fn new(
        shared: Arc<SharedModeState>,
        speaker: Arc<dyn Speaker>,
        radio: Arc<Radio>,
        config: Arc<ConfigStore>,
        apply_config: Arc<dyn Fn() + Send + Sync>,
    ) -> Self {
        Self {
            shared,
            speaker,
            radio,
            config,
            apply_config,
        }
    }

    /// Terminal handler; every event ends here if nothing above claimed it.
    pub fn handle(&self, event: &DispatchEvent) {
        match (event.key, event.is_hold, event.shift) {
            ('A', false, _) => {
                self.shared.arm_shift();
                self.speaker.say("Shift");
            }
            ('C', false, false) => {
                let verbose = self.shared.toggle_verbose();
                self.speaker
                    .say(if verbose { "Verbose on" } else { "Verbose off" });
            }
            ('C', true, false) => self.undo_setting(),
            ('0', false, false) => self.query_mode(),
            ('1', false, false) => self.select_vfo(Vfo::A),
            ('1', true, false) => self.select_vfo(Vfo::B),
            ('1', false, true) => self.query_func("VOX", Func::Vox),
            ('2', false, false) => self.query_frequency(),
            ('4', false, false) => self.query_level("Preamp", Level::Preamp, ""),
            ('4', true, false) => self.query_agc(),
            ('4', false, true) => self.query_level("Attenuation", Level::Attenuation, " d B"),
            ('7', false, false) => self.query_func("Noise blanker", Func::NoiseBlanker),
            ('8', false, false) => self.query_func("Noise reduction", Func::NoiseReduction),
            ('8', true, false) => self.query_level("Mic gain", Level::MicGain, ""),
            ('9', true, false) => self.query_level("Power", Level::Power, " percent"),
            ('9', false, true) => self.query_level("Compression", Level::Compression, ""),
            ('*', false, false) => self.query_level("S meter", Level::SMeter, ""),
            ('*', true, false) => self.query_level("Power meter", Level::PowerMeter, ""),
            _ => {
                log::debug!(
                    "[MODE] unmapped key '{}' hold={} shift={}",
                    event.key,
                    event.is_hold,
                    event.shift
                );
            }
        }
    }

    /// Poll-driven announcement; suppressed when verbosity is off.
    pub fn announce_polled_frequency(&self, hz: i64) {
        if !self.shared.is_verbose() {
            return;
        }
        self.speaker.say(&spoken_frequency(hz));
    }

    fn query_frequency(&self) {
        match self.radio.get_frequency(Vfo::Current) {
            Ok(hz) => {
                if self.shared.is_verbose() {
                    self.speaker.say(&spoken_frequency(hz));
                } else {
                    // Quiet mode: spell the raw digits only.
                    let mhz = hz as f64 / 1_000_000.0;
                    self.speaker.spell(&format!("{:.5}", mhz));
                }
            }
            Err(e) => self.announce_failure(&e),
        }
    }

    fn query_mode(&self) {
        match self.radio.get_mode() {
            Ok(mode) => self.speaker.say(mode.spoken()),
            Err(e) => self.announce_failure(&e),
        }
    }

    fn select_vfo(&self, vfo: Vfo) {
        match self.radio.select_vfo(vfo) {
            Ok(()) => self.speaker.say(&format!("VFO {}", vfo.spoken())),
            Err(e) => self.announce_failure(&e),
        }
    }

    fn query_level(&self, name: &str, level: Level, unit: &str) {
        match self.radio.get_level(level) {
            Ok(value) => self.speaker.say(&format!("{} {}{}", name, value, unit)),
            Err(e) => self.announce_failure(&e),
        }
    }

    fn query_func(&self, name: &str, func: Func) {
        match self.radio.get_func(func) {
            Ok(on) => self
                .speaker
                .say(&format!("{} {}", name, if on { "on" } else { "off" })),
            Err(e) => self.announce_failure(&e),
        }
    }

    fn query_agc(&self) {
        match self.radio.get_level(Level::AgcSpeed) {
            Ok(code) => {
                let spoken = [AgcSpeed::Fast, AgcSpeed::Medium, AgcSpeed::Slow]
                    .into_iter()
                    .min_by_key(|s| (s.code() - code).abs())
                    .map_or("unknown", AgcSpeed::spoken);
                self.speaker.say(&format!("AGC {}", spoken));
            }
            Err(e) => self.announce_failure(&e),
        }
    }

    fn undo_setting(&self) {
        match self.config.undo() {
            Ok(Some(_)) => {
                (self.apply_config)();
                self.speaker.say("Setting restored");
            }
            Ok(None) => self.speaker.say("Nothing to undo"),
            Err(e) => {
                log::warn!("[MODE] undo failed: {}", e);
                self.speaker.beep(BeepKind::Error);
            }
        }
    }

    fn announce_failure(&self, error: &SoftwareError) {
        match error {
            SoftwareError::NotConnected => self.speaker.say("Radio not connected"),
            SoftwareError::Unavailable => {
                self.speaker.beep(BeepKind::Error);
                self.speaker.say("Unavailable");
            }
            other => {
                log::warn!("[MODE] radio query failed: {}", other);
                self.speaker.beep(BeepKind::Error);
                self.speaker.say("Radio error");
            }
        }
    }
}
