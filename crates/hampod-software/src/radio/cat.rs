// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The CAT backend contract and the built-in software rig.
//!
//! [`Transceiver`] is the narrow contract standing in for the external
//! radio-control library: frequency, mode, VFO and level get/set against
//! one concrete rig. The serial drivers live next door
//! ([`crate::radio::kenwood`], [`crate::radio::icom`]);
//! [`DummyTransceiver`] is radio model 0, a software rig used for bench
//! work and tests.

use crate::{Result, SoftwareError};

/// VFO selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vfo {
    Current,
    A,
    B,
}

impl Vfo {
    #[must_use]
    pub fn spoken(self) -> &'static str {
        match self {
            Vfo::Current => "current",
            Vfo::A => "A",
            Vfo::B => "B",
        }
    }
}

/// Demodulation modes in cycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    Lsb,
    Usb,
    Cw,
    Fm,
    Am,
    Fsk,
}

impl RadioMode {
    pub const ALL: [RadioMode; 6] = [
        RadioMode::Lsb,
        RadioMode::Usb,
        RadioMode::Cw,
        RadioMode::Fm,
        RadioMode::Am,
        RadioMode::Fsk,
    ];

    #[must_use]
    pub fn spoken(self) -> &'static str {
        match self {
            RadioMode::Lsb => "lower sideband",
            RadioMode::Usb => "upper sideband",
            RadioMode::Cw => "C W",
            RadioMode::Fm => "F M",
            RadioMode::Am => "A M",
            RadioMode::Fsk => "F S K",
        }
    }

    #[must_use]
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|&m| m == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

/// Scalar rig levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Output power, percent.
    Power,
    /// Microphone gain, percent.
    MicGain,
    /// Noise-blanker strength 0..=10.
    NbLevel,
    /// Noise-reduction strength 0..=10.
    NrLevel,
    /// S-meter reading (read-only).
    SMeter,
    /// Forward-power meter reading (read-only).
    PowerMeter,
    /// Preamplifier stage 0..=2.
    Preamp,
    /// Attenuation in dB.
    Attenuation,
    /// AGC speed code.
    AgcSpeed,
    /// Speech-compression level, percent.
    Compression,
}

/// Switchable rig functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    NoiseBlanker,
    NoiseReduction,
    Compressor,
    Vox,
}

/// AGC speeds reachable from Set mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgcSpeed {
    Fast,
    Medium,
    Slow,
}

impl AgcSpeed {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            AgcSpeed::Fast => 5,
            AgcSpeed::Medium => 10,
            AgcSpeed::Slow => 20,
        }
    }

    #[must_use]
    pub fn spoken(self) -> &'static str {
        match self {
            AgcSpeed::Fast => "fast",
            AgcSpeed::Medium => "medium",
            AgcSpeed::Slow => "slow",
        }
    }
}

/// The backend contract. All methods may fail with
/// [`SoftwareError::Unavailable`] when the rig refuses or lacks the
/// capability; callers decide what to announce.
pub trait Transceiver: Send {
    /// Frequency in Hz (10 Hz resolution).
    fn get_frequency(&mut self, vfo: Vfo) -> Result<i64>;
    fn set_frequency(&mut self, vfo: Vfo, hz: i64) -> Result<()>;
    fn get_mode(&mut self) -> Result<RadioMode>;
    fn set_mode(&mut self, mode: RadioMode) -> Result<()>;
    /// Make `vfo` the receive VFO.
    fn select_vfo(&mut self, vfo: Vfo) -> Result<()>;
    fn get_level(&mut self, level: Level) -> Result<i32>;
    /// Setters clamp to their domain and do not read back.
    fn set_level(&mut self, level: Level, value: i32) -> Result<()>;
    fn get_func(&mut self, func: Func) -> Result<bool>;
    fn set_func(&mut self, func: Func, on: bool) -> Result<()>;
}

// ============================================================================
// Dummy rig (model 0)
// ============================================================================

/// A fully software rig. Every operation succeeds and state is retained,
/// which makes it the workhorse of the mode tests and `--no-radio` runs.
pub struct DummyTransceiver {
    freq_a: i64,
    freq_b: i64,
    rx_vfo: Vfo,
    mode: RadioMode,
    levels: [(Level, i32); 8],
    funcs: [(Func, bool); 4],
}

impl DummyTransceiver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            freq_a: 14_250_000,
            freq_b: 7_074_000,
            rx_vfo: Vfo::A,
            mode: RadioMode::Usb,
            levels: [
                (Level::Power, 45),
                (Level::MicGain, 50),
                (Level::NbLevel, 0),
                (Level::NrLevel, 0),
                (Level::Preamp, 0),
                (Level::Attenuation, 0),
                (Level::AgcSpeed, AgcSpeed::Medium.code()),
                (Level::Compression, 0),
            ],
            funcs: [
                (Func::NoiseBlanker, false),
                (Func::NoiseReduction, false),
                (Func::Compressor, false),
                (Func::Vox, false),
            ],
        }
    }

    fn resolve(&self, vfo: Vfo) -> Vfo {
        match vfo {
            Vfo::Current => self.rx_vfo,
            other => other,
        }
    }
}

impl Default for DummyTransceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Transceiver for DummyTransceiver {
    fn get_frequency(&mut self, vfo: Vfo) -> Result<i64> {
        Ok(match self.resolve(vfo) {
            Vfo::B => self.freq_b,
            _ => self.freq_a,
        })
    }

    fn set_frequency(&mut self, vfo: Vfo, hz: i64) -> Result<()> {
        let hz = (hz / 10) * 10;
        match self.resolve(vfo) {
            Vfo::B => self.freq_b = hz,
            _ => self.freq_a = hz,
        }
        Ok(())
    }

    fn get_mode(&mut self) -> Result<RadioMode> {
        Ok(self.mode)
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<()> {
        self.mode = mode;
        Ok(())
    }

    fn select_vfo(&mut self, vfo: Vfo) -> Result<()> {
        if vfo != Vfo::Current {
            self.rx_vfo = vfo;
        }
        Ok(())
    }

    fn get_level(&mut self, level: Level) -> Result<i32> {
        if level == Level::SMeter {
            return Ok(9); // steady S9 keeps the meter announcements stable
        }
        if level == Level::PowerMeter {
            return Ok(0); // not transmitting
        }
        self.levels
            .iter()
            .find(|(l, _)| *l == level)
            .map(|&(_, v)| v)
            .ok_or(SoftwareError::Unavailable)
    }

    fn set_level(&mut self, level: Level, value: i32) -> Result<()> {
        for slot in &mut self.levels {
            if slot.0 == level {
                slot.1 = value;
                return Ok(());
            }
        }
        Err(SoftwareError::Unavailable)
    }

    fn get_func(&mut self, func: Func) -> Result<bool> {
        self.funcs
            .iter()
            .find(|(f, _)| *f == func)
            .map(|&(_, v)| v)
            .ok_or(SoftwareError::Unavailable)
    }

    fn set_func(&mut self, func: Func, on: bool) -> Result<()> {
        for slot in &mut self.funcs {
            if slot.0 == func {
                slot.1 = on;
                return Ok(());
            }
        }
        Err(SoftwareError::Unavailable)
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_cycle_wraps() {
        let mut mode = RadioMode::Lsb;
        for _ in 0..RadioMode::ALL.len() {
            mode = mode.next();
        }
        assert_eq!(mode, RadioMode::Lsb);
    }

    #[test]
    fn test_dummy_round_trips() {
        let mut rig = DummyTransceiver::new();
        rig.set_frequency(Vfo::A, 7_123_450).unwrap();
        assert_eq!(rig.get_frequency(Vfo::A).unwrap(), 7_123_450);
        // 10 Hz resolution is enforced.
        rig.set_frequency(Vfo::A, 7_123_456).unwrap();
        assert_eq!(rig.get_frequency(Vfo::A).unwrap(), 7_123_450);

        rig.select_vfo(Vfo::B).unwrap();
        assert_eq!(rig.get_frequency(Vfo::Current).unwrap(), 7_074_000);

        rig.set_level(Level::Power, 55).unwrap();
        assert_eq!(rig.get_level(Level::Power).unwrap(), 55);

        rig.set_func(Func::NoiseBlanker, true).unwrap();
        assert!(rig.get_func(Func::NoiseBlanker).unwrap());
    }
}
