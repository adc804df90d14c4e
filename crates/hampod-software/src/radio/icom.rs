// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Icom CI-V driver.
//!
//! Binary frames on a shared bus: `FE FE <to> <from> <cmd> [data] FD`,
//! BCD-packed values, `FB` for an ack and `FA` for a refusal. Because
//! CI-V is a bus, every frame we transmit is echoed back on the line;
//! the echo is read and discarded before the real reply. Command and
//! sub-command numbers follow the IC-7300 family. Radio model 2 in the
//! configuration file.

use crate::radio::cat::{Func, Level, RadioMode, Transceiver, Vfo};
use crate::{Result, SoftwareError};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::Duration;

/// Serial read timeout per transaction.
const SERIAL_TIMEOUT: Duration = Duration::from_millis(500);

const PREAMBLE: u8 = 0xFE;
const TERMINATOR: u8 = 0xFD;
const ACK: u8 = 0xFB;
const NAK: u8 = 0xFA;
/// Our controller address on the bus.
const CONTROLLER_ADDR: u8 = 0xE0;
/// Default transceiver address (IC-7300).
const DEFAULT_RIG_ADDR: u8 = 0x94;
/// Frames longer than this are line noise.
const MAX_FRAME: usize = 64;

/// Icom CI-V backend.
pub struct IcomCiv {
    port: Box<dyn SerialPort>,
    rig_addr: u8,
}

impl IcomCiv {
    /// Open the serial device and verify the rig answers a frequency read.
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
        let mut civ = Self {
            port,
            rig_addr: DEFAULT_RIG_ADDR,
        };
        let hz = civ.read_frequency_raw()?;
        log::info!("[RADIO] CI-V rig at {} Hz on {}", hz, device);
        Ok(civ)
    }

    /// Send one command frame and return the reply payload (the bytes
    /// between `<cmd>` and the terminator).
    fn transact(&mut self, body: &[u8]) -> Result<Vec<u8>> {
        let mut frame = Vec::with_capacity(body.len() + 5);
        frame.extend_from_slice(&[PREAMBLE, PREAMBLE, self.rig_addr, CONTROLLER_ADDR]);
        frame.extend_from_slice(body);
        frame.push(TERMINATOR);
        self.port.write_all(&frame)?;
        self.port.flush()?;

        // Bus echo of our own frame comes first.
        let echo = self.read_frame()?;
        if echo[..] != frame[2..frame.len() - 1] {
            log::debug!("[RADIO] CI-V echo mismatch (collision?)");
        }

        let reply = self.read_frame()?;
        // Reply layout: <to> <from> <payload...>
        if reply.len() < 3 || reply[0] != CONTROLLER_ADDR || reply[1] != self.rig_addr {
            return Err(SoftwareError::BadReply(format!(
                "unexpected CI-V addressing {:02x?}",
                &reply[..reply.len().min(4)]
            )));
        }
        let payload = reply[2..].to_vec();
        if payload == [NAK] {
            return Err(SoftwareError::Unavailable);
        }
        Ok(payload)
    }

    /// Read one frame, returning the bytes between the preamble pair and
    /// the terminator.
    fn read_frame(&mut self) -> Result<Vec<u8>> {
        let mut byte = [0u8; 1];
        let mut preambles = 0u8;
        // Hunt for FE FE.
        while preambles < 2 {
            self.read_byte(&mut byte)?;
            if byte[0] == PREAMBLE {
                preambles += 1;
            } else {
                preambles = 0;
            }
        }
        let mut frame = Vec::with_capacity(12);
        loop {
            self.read_byte(&mut byte)?;
            match byte[0] {
                TERMINATOR => return Ok(frame),
                PREAMBLE => continue, // extra preamble bytes are padding
                b => {
                    frame.push(b);
                    if frame.len() > MAX_FRAME {
                        return Err(SoftwareError::BadReply("unterminated CI-V frame".into()));
                    }
                }
            }
        }
    }

    fn read_byte(&mut self, byte: &mut [u8; 1]) -> Result<()> {
        loop {
            match self.port.read(byte) {
                Ok(0) => return Err(SoftwareError::BadReply("serial EOF".into())),
                Ok(_) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                    return Err(SoftwareError::Timeout);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(SoftwareError::Io(e)),
            }
        }
    }

    /// Expect a bare ACK for a set command.
    fn expect_ack(&mut self, body: &[u8]) -> Result<()> {
        let payload = self.transact(body)?;
        if payload == [ACK] {
            Ok(())
        } else {
            Err(SoftwareError::BadReply(format!(
                "expected ack, got {:02x?}",
                payload
            )))
        }
    }

    fn read_frequency_raw(&mut self) -> Result<i64> {
        let payload = self.transact(&[0x03])?;
        // payload: 03 <5 BCD bytes, LSB first>
        if payload.len() < 6 || payload[0] != 0x03 {
            return Err(SoftwareError::BadReply("bad frequency reply".into()));
        }
        bcd_to_freq(&payload[1..6])
    }

    /// Read a 0..=255 level via command 0x14.
    fn get_level_raw(&mut self, sub: u8) -> Result<i32> {
        let payload = self.transact(&[0x14, sub])?;
        if payload.len() < 4 || payload[0] != 0x14 || payload[1] != sub {
            return Err(SoftwareError::BadReply("bad level reply".into()));
        }
        // Two BCD bytes, 0000-0255.
        let value = i32::from(bcd_byte(payload[2])?) * 100 + i32::from(bcd_byte(payload[3])?);
        Ok(value)
    }

    fn set_level_raw(&mut self, sub: u8, value: i32) -> Result<()> {
        let value = value.clamp(0, 255) as u16;
        self.expect_ack(&[
            0x14,
            sub,
            to_bcd((value / 100) as u8),
            to_bcd((value % 100) as u8),
        ])
    }

    /// Read an on/off function via command 0x16.
    fn get_func_raw(&mut self, sub: u8) -> Result<bool> {
        let payload = self.transact(&[0x16, sub])?;
        if payload.len() < 3 || payload[0] != 0x16 || payload[1] != sub {
            return Err(SoftwareError::BadReply("bad function reply".into()));
        }
        Ok(payload[2] != 0)
    }
}

/// Percent (0..=100) to the rig's 0..=255 scale and back.
fn percent_to_255(percent: i32) -> i32 {
    (percent.clamp(0, 100) * 255 + 50) / 100
}

fn from_255_to_percent(raw: i32) -> i32 {
    (raw.clamp(0, 255) * 100 + 127) / 255
}

/// One packed-BCD byte to its decimal value.
fn bcd_byte(b: u8) -> Result<u8> {
    let hi = b >> 4;
    let lo = b & 0x0F;
    if hi > 9 || lo > 9 {
        return Err(SoftwareError::BadReply(format!("bad BCD byte {:02x}", b)));
    }
    Ok(hi * 10 + lo)
}

fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Five LSB-first BCD bytes to Hz.
fn bcd_to_freq(bytes: &[u8]) -> Result<i64> {
    let mut hz: i64 = 0;
    for &b in bytes.iter().rev() {
        hz = hz * 100 + i64::from(bcd_byte(b)?);
    }
    Ok(hz)
}

/// Hz to five LSB-first BCD bytes.
fn freq_to_bcd(hz: i64) -> [u8; 5] {
    let mut rest = hz.clamp(0, 9_999_999_999);
    let mut out = [0u8; 5];
    for slot in &mut out {
        *slot = to_bcd((rest % 100) as u8);
        rest /= 100;
    }
    out
}

impl Transceiver for IcomCiv {
    fn get_frequency(&mut self, vfo: Vfo) -> Result<i64> {
        // CI-V reads the selected VFO; a specific VFO is selected first.
        if vfo != Vfo::Current {
            self.select_vfo(vfo)?;
        }
        self.read_frequency_raw()
    }

    fn set_frequency(&mut self, vfo: Vfo, hz: i64) -> Result<()> {
        if vfo != Vfo::Current {
            self.select_vfo(vfo)?;
        }
        let hz = (hz / 10) * 10;
        let bcd = freq_to_bcd(hz);
        let mut body = vec![0x05];
        body.extend_from_slice(&bcd);
        self.expect_ack(&body)
    }

    fn get_mode(&mut self) -> Result<RadioMode> {
        let payload = self.transact(&[0x04])?;
        if payload.len() < 2 || payload[0] != 0x04 {
            return Err(SoftwareError::BadReply("bad mode reply".into()));
        }
        match payload[1] {
            0x00 => Ok(RadioMode::Lsb),
            0x01 => Ok(RadioMode::Usb),
            0x02 => Ok(RadioMode::Am),
            0x03 | 0x07 => Ok(RadioMode::Cw),
            0x04 | 0x08 => Ok(RadioMode::Fsk),
            0x05 => Ok(RadioMode::Fm),
            other => Err(SoftwareError::BadReply(format!("mode code {:02x}", other))),
        }
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<()> {
        let code = match mode {
            RadioMode::Lsb => 0x00,
            RadioMode::Usb => 0x01,
            RadioMode::Am => 0x02,
            RadioMode::Cw => 0x03,
            RadioMode::Fsk => 0x04,
            RadioMode::Fm => 0x05,
        };
        self.expect_ack(&[0x06, code])
    }

    fn select_vfo(&mut self, vfo: Vfo) -> Result<()> {
        match vfo {
            Vfo::Current => Ok(()),
            Vfo::A => self.expect_ack(&[0x07, 0x00]),
            Vfo::B => self.expect_ack(&[0x07, 0x01]),
        }
    }

    fn get_level(&mut self, level: Level) -> Result<i32> {
        match level {
            Level::Power => Ok(from_255_to_percent(self.get_level_raw(0x0A)?)),
            Level::MicGain => Ok(from_255_to_percent(self.get_level_raw(0x0B)?)),
            Level::Compression => Ok(from_255_to_percent(self.get_level_raw(0x0E)?)),
            Level::NbLevel => Ok(self.get_level_raw(0x12)? * 10 / 255),
            Level::NrLevel => Ok(self.get_level_raw(0x06)? * 10 / 255),
            Level::SMeter => {
                // Meter reads live under command 0x15.
                let payload = self.transact(&[0x15, 0x02])?;
                if payload.len() < 4 {
                    return Err(SoftwareError::BadReply("bad meter reply".into()));
                }
                let raw =
                    i32::from(bcd_byte(payload[2])?) * 100 + i32::from(bcd_byte(payload[3])?);
                // 0..=120 maps S0..S9; coarse S-unit readout.
                Ok((raw * 9 / 120).min(9))
            }
            Level::PowerMeter => {
                let payload = self.transact(&[0x15, 0x11])?;
                if payload.len() < 4 {
                    return Err(SoftwareError::BadReply("bad meter reply".into()));
                }
                let raw =
                    i32::from(bcd_byte(payload[2])?) * 100 + i32::from(bcd_byte(payload[3])?);
                Ok(from_255_to_percent(raw))
            }
            Level::Preamp => {
                let payload = self.transact(&[0x16, 0x02])?;
                if payload.len() < 3 {
                    return Err(SoftwareError::BadReply("bad preamp reply".into()));
                }
                Ok(i32::from(payload[2]))
            }
            Level::Attenuation => {
                let payload = self.transact(&[0x11])?;
                if payload.len() < 2 {
                    return Err(SoftwareError::BadReply("bad attenuator reply".into()));
                }
                Ok(i32::from(bcd_byte(payload[1])?))
            }
            Level::AgcSpeed => {
                let payload = self.transact(&[0x16, 0x12])?;
                if payload.len() < 3 {
                    return Err(SoftwareError::BadReply("bad AGC reply".into()));
                }
                // 1=fast 2=medium 3=slow; report the Kenwood-style code the
                // rest of the stack reasons in.
                Ok(match payload[2] {
                    1 => 5,
                    2 => 10,
                    _ => 20,
                })
            }
        }
    }

    fn set_level(&mut self, level: Level, value: i32) -> Result<()> {
        match level {
            Level::Power => self.set_level_raw(0x0A, percent_to_255(value)),
            Level::MicGain => self.set_level_raw(0x0B, percent_to_255(value)),
            Level::Compression => self.set_level_raw(0x0E, percent_to_255(value)),
            Level::NbLevel => self.set_level_raw(0x12, value.clamp(0, 10) * 255 / 10),
            Level::NrLevel => self.set_level_raw(0x06, value.clamp(0, 10) * 255 / 10),
            Level::Preamp => self.expect_ack(&[0x16, 0x02, value.clamp(0, 2) as u8]),
            Level::Attenuation => {
                let db = value.clamp(0, 45) as u8;
                self.expect_ack(&[0x11, to_bcd(db)])
            }
            Level::AgcSpeed => {
                let code = if value <= 5 {
                    1
                } else if value <= 10 {
                    2
                } else {
                    3
                };
                self.expect_ack(&[0x16, 0x12, code])
            }
            Level::SMeter | Level::PowerMeter => Err(SoftwareError::Unavailable),
        }
    }

    fn get_func(&mut self, func: Func) -> Result<bool> {
        match func {
            Func::NoiseBlanker => self.get_func_raw(0x22),
            Func::NoiseReduction => self.get_func_raw(0x40),
            Func::Compressor => self.get_func_raw(0x44),
            Func::Vox => self.get_func_raw(0x46),
        }
    }

    fn set_func(&mut self, func: Func, on: bool) -> Result<()> {
        let sub = match func {
            Func::NoiseBlanker => 0x22,
            Func::NoiseReduction => 0x40,
            Func::Compressor => 0x44,
            Func::Vox => 0x46,
        };
        self.expect_ack(&[0x16, sub, u8::from(on)])
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bcd_byte_roundtrip() {
        for v in 0..=99u8 {
            assert_eq!(bcd_byte(to_bcd(v)).unwrap(), v);
        }
        assert!(bcd_byte(0x0A).is_err());
        assert!(bcd_byte(0xA0).is_err());
    }

    #[test]
    fn test_freq_bcd_roundtrip() {
        for hz in [0i64, 7_074_000, 14_250_000, 145_500_000, 9_999_999_990] {
            assert_eq!(bcd_to_freq(&freq_to_bcd(hz)).unwrap(), hz);
        }
    }

    #[test]
    fn test_freq_bcd_is_lsb_first() {
        // 14.250000 MHz = 14,250,000 Hz -> 00 00 25 14 00 (LSB first).
        assert_eq!(freq_to_bcd(14_250_000), [0x00, 0x00, 0x25, 0x14, 0x00]);
    }

    #[test]
    fn test_percent_scaling_roundtrip_at_extremes() {
        assert_eq!(percent_to_255(0), 0);
        assert_eq!(percent_to_255(100), 255);
        assert_eq!(from_255_to_percent(0), 0);
        assert_eq!(from_255_to_percent(255), 100);
        for p in [25, 50, 75] {
            let rt = from_255_to_percent(percent_to_255(p));
            assert!((rt - p).abs() <= 1);
        }
    }
}
