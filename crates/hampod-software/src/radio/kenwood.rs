// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Kenwood CAT driver.
//!
//! ASCII command set of the TS-480/TS-590 family: semicolon-terminated
//! commands, digits zero-padded to fixed widths, `?;` for a refusal.
//! Radio model 1 in the configuration file.

use crate::radio::cat::{Func, Level, RadioMode, Transceiver, Vfo};
use crate::{Result, SoftwareError};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;

/// Serial read timeout per transaction.
const SERIAL_TIMEOUT: Duration = Duration::from_millis(500);

/// Kenwood-style CAT backend (TS-480/TS-590 command family).
pub struct KenwoodCat {
    port: Box<dyn SerialPort>,
}

impl KenwoodCat {
    /// Open the serial device and verify the rig answers an ID query.
    pub fn open(device: &str, baud: u32) -> Result<Self> {
        if !std::path::Path::new(device).exists() {
            return Err(SoftwareError::NotFound(device.to_string()));
        }
        let port = serialport::new(device, baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(SERIAL_TIMEOUT)
            .open()?;
        let mut cat = Self { port };
        let id = cat.transact("ID;")?;
        log::info!("[RADIO] rig answered {} on {}", id.trim_end_matches(';'), device);
        Ok(cat)
    }

    /// Send one command and read up to the `;` terminator.
    fn transact(&mut self, command: &str) -> Result<String> {
        self.port.write_all(command.as_bytes())?;
        self.port.flush()?;
        let mut reply = Vec::with_capacity(16);
        let mut byte = [0u8; 1];
        loop {
            match self.port.read(&mut byte) {
                Ok(0) => return Err(SoftwareError::BadReply("serial EOF".into())),
                Ok(_) => {
                    reply.push(byte[0]);
                    if byte[0] == b';' {
                        break;
                    }
                    if reply.len() > 64 {
                        return Err(SoftwareError::BadReply("unterminated reply".into()));
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(SoftwareError::Timeout);
                }
                Err(e) => return Err(SoftwareError::Io(e)),
            }
        }
        let text = String::from_utf8_lossy(&reply).into_owned();
        if text == "?;" {
            return Err(SoftwareError::Unavailable);
        }
        Ok(text)
    }

    /// Fire a set command; Kenwood sets produce no reply, so only the
    /// write is checked.
    fn command(&mut self, command: &str) -> Result<()> {
        self.port.write_all(command.as_bytes())?;
        self.port.flush()?;
        Ok(())
    }

    fn parse_digits(reply: &str, prefix: &str) -> Result<i64> {
        let digits = reply
            .strip_prefix(prefix)
            .and_then(|s| s.strip_suffix(';'))
            .ok_or_else(|| SoftwareError::BadReply(reply.to_string()))?;
        digits
            .trim_start_matches('0')
            .parse::<i64>()
            .or_else(|_| if digits.chars().all(|c| c == '0') { Ok(0) } else { Err(SoftwareError::BadReply(reply.to_string())) })
    }

    fn freq_command(vfo: Vfo) -> &'static str {
        match vfo {
            // "Current" reads the receive VFO, which Kenwood exposes as FA
            // unless FB was selected; FA is the safe default the poller uses.
            Vfo::Current | Vfo::A => "FA",
            Vfo::B => "FB",
        }
    }
}

impl Transceiver for KenwoodCat {
    fn get_frequency(&mut self, vfo: Vfo) -> Result<i64> {
        let prefix = Self::freq_command(vfo);
        let reply = self.transact(&format!("{};", prefix))?;
        Self::parse_digits(&reply, prefix)
    }

    fn set_frequency(&mut self, vfo: Vfo, hz: i64) -> Result<()> {
        let prefix = Self::freq_command(vfo);
        // 10 Hz resolution: the last digit is always zero on these rigs.
        let hz = (hz / 10) * 10;
        self.command(&format!("{}{:011};", prefix, hz))
    }

    fn get_mode(&mut self) -> Result<RadioMode> {
        let reply = self.transact("MD;")?;
        match Self::parse_digits(&reply, "MD")? {
            1 => Ok(RadioMode::Lsb),
            2 => Ok(RadioMode::Usb),
            3 | 7 => Ok(RadioMode::Cw),
            4 => Ok(RadioMode::Fm),
            5 => Ok(RadioMode::Am),
            6 | 9 => Ok(RadioMode::Fsk),
            other => Err(SoftwareError::BadReply(format!("mode code {}", other))),
        }
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<()> {
        let code = match mode {
            RadioMode::Lsb => 1,
            RadioMode::Usb => 2,
            RadioMode::Cw => 3,
            RadioMode::Fm => 4,
            RadioMode::Am => 5,
            RadioMode::Fsk => 6,
        };
        self.command(&format!("MD{};", code))
    }

    fn select_vfo(&mut self, vfo: Vfo) -> Result<()> {
        match vfo {
            Vfo::Current => Ok(()),
            Vfo::A => self.command("FR0;"),
            Vfo::B => self.command("FR1;"),
        }
    }

    fn get_level(&mut self, level: Level) -> Result<i32> {
        let (cmd, prefix) = match level {
            Level::Power => ("PC;", "PC"),
            Level::MicGain => ("MG;", "MG"),
            Level::NbLevel => ("NL;", "NL"),
            Level::NrLevel => ("RL;", "RL"),
            Level::SMeter => ("SM0;", "SM0"),
            Level::PowerMeter => ("RM1;", "RM1"),
            Level::Preamp => ("PA;", "PA"),
            Level::Attenuation => ("RA;", "RA"),
            Level::AgcSpeed => ("GT;", "GT"),
            Level::Compression => ("PL;", "PL"),
        };
        let reply = self.transact(cmd)?;
        Ok(Self::parse_digits(&reply, prefix)? as i32)
    }

    fn set_level(&mut self, level: Level, value: i32) -> Result<()> {
        let cmd = match level {
            Level::Power => format!("PC{:03};", value.clamp(0, 100)),
            Level::MicGain => format!("MG{:03};", value.clamp(0, 100)),
            Level::NbLevel => format!("NL{:03};", value.clamp(0, 10)),
            Level::NrLevel => format!("RL{:02};", value.clamp(0, 10)),
            Level::Preamp => format!("PA{};", value.clamp(0, 2)),
            Level::Attenuation => format!("RA{:02};", value.clamp(0, 99)),
            Level::AgcSpeed => format!("GT{:03};", value.clamp(0, 20)),
            Level::Compression => format!("PL{:03};", value.clamp(0, 100)),
            Level::SMeter | Level::PowerMeter => return Err(SoftwareError::Unavailable),
        };
        self.command(&cmd)
    }

    fn get_func(&mut self, func: Func) -> Result<bool> {
        let (cmd, prefix) = match func {
            Func::NoiseBlanker => ("NB;", "NB"),
            Func::NoiseReduction => ("NR;", "NR"),
            Func::Compressor => ("PR;", "PR"),
            Func::Vox => ("VX;", "VX"),
        };
        let reply = self.transact(cmd)?;
        Ok(Self::parse_digits(&reply, prefix)? != 0)
    }

    fn set_func(&mut self, func: Func, on: bool) -> Result<()> {
        let flag = i32::from(on);
        let cmd = match func {
            Func::NoiseBlanker => format!("NB{};", flag),
            Func::NoiseReduction => format!("NR{};", flag),
            Func::Compressor => format!("PR{};", flag),
            Func::Vox => format!("VX{};", flag),
        };
        self.command(&cmd)
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_digits() {
        assert_eq!(
            KenwoodCat::parse_digits("FA00014250000;", "FA").unwrap(),
            14_250_000
        );
        assert_eq!(KenwoodCat::parse_digits("PC045;", "PC").unwrap(), 45);
        assert_eq!(KenwoodCat::parse_digits("PC000;", "PC").unwrap(), 0);
        assert!(KenwoodCat::parse_digits("XX123;", "FA").is_err());
    }

    #[test]
    fn test_open_missing_device_is_not_found() {
        assert!(matches!(
            KenwoodCat::open("/dev/ttyUSB-none", 57_600),
            Err(SoftwareError::NotFound(_))
        ));
    }
}
