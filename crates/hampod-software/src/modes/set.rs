// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Set mode: parameter selection and value entry.
//!
//! `B` from Normal opens the mode. In `Idle` the Normal-mode key
//! modifiers pick a parameter (`9`-hold is Power, shift-`9` is
//! Compression, and so on) and transition to `Editing` with the current
//! value announced. Numeric parameters take a digit accumulator committed
//! by `#`; toggle parameters flip with `A`/`B` and commit implicitly; AGC
//! uses `1`/`2`/`3` holds; demodulation mode cycles on `0`. `D` steps
//! back (Editing -> Idle -> Off), and a second `B` in Idle exits.

use crate::modes::{DispatchEvent, SharedModeState};
use crate::radio::{AgcSpeed, Func, Level, Radio, RadioMode};
use crate::speech::Speaker;
use hampod_proto::BeepKind;
use parking_lot::Mutex;
use std::sync::Arc;

/// Accumulator cap for numeric entry.
const MAX_VALUE_DIGITS: usize = 8;

/// What a selected parameter can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Param {
    Power,
    MicGain,
    Compression,
    NoiseBlanker,
    NoiseReduction,
    Preamp,
    Attenuation,
    Agc,
    Mode,
}

impl Param {
    fn name(self) -> &'static str {
        match self {
            Param::Power => "Power",
            Param::MicGain => "Mic gain",
            Param::Compression => "Compression",
            Param::NoiseBlanker => "Noise blanker",
            Param::NoiseReduction => "Noise reduction",
            Param::Preamp => "Preamp",
            Param::Attenuation => "Attenuation",
            Param::Agc => "AGC",
            Param::Mode => "Mode",
        }
    }

    /// The scalar level behind the parameter, if any.
    fn level(self) -> Option<Level> {
        match self {
            Param::Power => Some(Level::Power),
            Param::MicGain => Some(Level::MicGain),
            Param::Compression => Some(Level::Compression),
            Param::NoiseBlanker => Some(Level::NbLevel),
            Param::NoiseReduction => Some(Level::NrLevel),
            Param::Preamp => Some(Level::Preamp),
            Param::Attenuation => Some(Level::Attenuation),
            Param::Agc | Param::Mode => None,
        }
    }

    /// The on/off function behind the parameter, if any.
    fn func(self) -> Option<Func> {
        match self {
            Param::NoiseBlanker => Some(Func::NoiseBlanker),
            Param::NoiseReduction => Some(Func::NoiseReduction),
            Param::Compression => Some(Func::Compressor),
            _ => None,
        }
    }

    /// Per-parameter commit clamp. Attenuation accepts any integer.
    fn clamp(self, value: i64) -> i32 {
        let value = value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        match self {
            Param::Power | Param::MicGain | Param::Compression => value.clamp(0, 100),
            Param::NoiseBlanker | Param::NoiseReduction => value.clamp(0, 10),
            Param::Preamp => value.clamp(0, 2),
            Param::Attenuation | Param::Agc | Param::Mode => value,
        }
    }

    fn unit(self) -> &'static str {
        match self {
            Param::Power | Param::MicGain | Param::Compression => " percent",
            _ => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Off,
    Idle,
    Editing { param: Param, accumulator: String },
}

/// The mode object. Interior-mutable like the other modes so activity can
/// be queried from the poll-callback thread.
pub struct SetMode {
    state: Mutex<State>,
    #[allow(dead_code)]
    shared: Arc<SharedModeState>,
    speaker: Arc<dyn Speaker>,
    radio: Arc<Radio>,
}

impl SetMode {
    pub fn new(shared: Arc<SharedModeState>, speaker: Arc<dyn Speaker>, radio: Arc<Radio>) -> Self {
        Self {
            state: Mutex::new(State::Off),
            shared,
            speaker,
            radio,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.state.lock() != State::Off
    }

    /// Returns true when the event was claimed.
    pub fn handle(&self, event: &DispatchEvent) -> bool {
        let mut state = self.state.lock();
        match &*state {
            State::Off => {
                if event.key == 'B' && !event.is_hold && !event.shift {
                    *state = State::Idle;
                    self.speaker.say("Set");
                    true
                } else {
                    false
                }
            }
            State::Idle => match (event.key, event.is_hold, event.shift) {
                ('B', false, false) => {
                    *state = State::Off;
                    self.speaker.say("Set Off");
                    true
                }
                ('D', false, _) => {
                    *state = State::Off;
                    self.speaker.say("Set Off");
                    true
                }
                ('9', true, false) => self.select(&mut state, Param::Power),
                ('9', false, true) => self.select(&mut state, Param::Compression),
                ('8', true, false) => self.select(&mut state, Param::MicGain),
                ('8', false, false) => self.select(&mut state, Param::NoiseReduction),
                ('7', false, false) => self.select(&mut state, Param::NoiseBlanker),
                ('4', false, false) => self.select(&mut state, Param::Preamp),
                ('4', false, true) => self.select(&mut state, Param::Attenuation),
                ('4', true, false) => self.select(&mut state, Param::Agc),
                ('0', false, false) => self.select(&mut state, Param::Mode),
                _ => false,
            },
            State::Editing { param, .. } => {
                let param = *param;
                self.handle_editing(&mut state, param, event);
                true
            }
        }
    }

    fn select(&self, state: &mut State, param: Param) -> bool {
        *state = State::Editing {
            param,
            accumulator: String::new(),
        };
        self.announce_current(param);
        true
    }

    fn announce_current(&self, param: Param) {
        match param {
            Param::Mode => match self.radio.get_mode() {
                Ok(mode) => self.speaker.say(&format!("Mode {}", mode.spoken())),
                Err(_) => self.speaker.say("Mode unavailable"),
            },
            Param::Agc => match self.radio.get_level(Level::AgcSpeed) {
                Ok(code) => {
                    let spoken = [AgcSpeed::Fast, AgcSpeed::Medium, AgcSpeed::Slow]
                        .into_iter()
                        .min_by_key(|s| (s.code() - code).abs())
                        .map_or("unknown", AgcSpeed::spoken);
                    self.speaker.say(&format!("AGC {}", spoken));
                }
                Err(_) => self.speaker.say("AGC unavailable"),
            },
            _ => {
                let Some(level) = param.level() else { return };
                match self.radio.get_level(level) {
                    Ok(value) => self
                        .speaker
                        .say(&format!("{} {}{}", param.name(), value, param.unit())),
                    Err(_) => self.speaker.say(&format!("{} unavailable", param.name())),
                }
            }
        }
    }

    fn handle_editing(&self, state: &mut State, param: Param, event: &DispatchEvent) {
        match (event.key, event.is_hold) {
            ('D', _) => {
                *state = State::Idle;
            }
            ('0'..='9', false) if param == Param::Mode && event.key == '0' => {
                self.cycle_mode();
            }
            ('1', true) if param == Param::Agc => self.set_agc(AgcSpeed::Fast),
            ('2', true) if param == Param::Agc => self.set_agc(AgcSpeed::Medium),
            ('3', true) if param == Param::Agc => self.set_agc(AgcSpeed::Slow),
            ('0'..='9', false) => {
                let State::Editing { accumulator, .. } = state else {
                    return;
                };
                if accumulator.len() < MAX_VALUE_DIGITS {
                    accumulator.push(event.key);
                    self.speaker.say(&event.key.to_string());
                } else {
                    self.speaker.beep(BeepKind::Error);
                }
            }
            ('#', false) => self.commit_numeric(state, param),
            ('*', false) => {
                if let State::Editing { accumulator, .. } = state {
                    accumulator.clear();
                    self.speaker.say("Cleared");
                }
            }
            ('A', false) => self.set_toggle(param, true),
            // 'B' inside Editing adjusts toggle parameters; it does not
            // exit the mode here.
            ('B', false) => self.set_toggle(param, false),
            _ => {
                log::debug!("[MODE] set: ignoring key '{}'", event.key);
            }
        }
    }

    fn commit_numeric(&self, state: &mut State, param: Param) {
        let State::Editing { accumulator, .. } = state else {
            return;
        };
        let Some(level) = param.level() else {
            self.speaker.beep(BeepKind::Error);
            return;
        };
        let Ok(raw) = accumulator.parse::<i64>() else {
            self.speaker.beep(BeepKind::Error);
            self.speaker.say("No value entered");
            accumulator.clear();
            return;
        };
        let value = param.clamp(raw);
        match self.radio.set_level(level, value) {
            Ok(()) => {
                self.speaker
                    .say(&format!("{} set to {}", param.name(), value));
            }
            Err(e) => {
                log::warn!("[MODE] set {} failed: {}", param.name(), e);
                self.speaker.beep(BeepKind::Error);
                self.speaker.say(&format!("{} set failed", param.name()));
            }
        }
        accumulator.clear();
    }

    fn set_toggle(&self, param: Param, on: bool) {
        let Some(func) = param.func() else {
            self.speaker.beep(BeepKind::Error);
            return;
        };
        match self.radio.set_func(func, on) {
            Ok(()) => self.speaker.say(&format!(
                "{} {}",
                param.name(),
                if on { "on" } else { "off" }
            )),
            Err(e) => {
                log::warn!("[MODE] toggle {} failed: {}", param.name(), e);
                self.speaker.beep(BeepKind::Error);
                self.speaker.say(&format!("{} failed", param.name()));
            }
        }
    }

    fn set_agc(&self, speed: AgcSpeed) {
        match self.radio.set_level(Level::AgcSpeed, speed.code()) {
            Ok(()) => self.speaker.say(&format!("AGC {}", speed.spoken())),
            Err(e) => {
                log::warn!("[MODE] AGC set failed: {}", e);
                self.speaker.beep(BeepKind::Error);
                self.speaker.say("AGC set failed");
            }
        }
    }

    fn cycle_mode(&self) {
        let next = match self.radio.get_mode() {
            Ok(mode) => mode.next(),
            Err(_) => RadioMode::Usb,
        };
        match self.radio.set_mode(next) {
            Ok(()) => self.speaker.say(&format!("Mode {}", next.spoken())),
            Err(e) => {
                log::warn!("[MODE] mode set failed: {}", e);
                self.speaker.beep(BeepKind::Error);
                self.speaker.say("Mode set failed");
            }
        }
    }
}
