// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Direct PCM output with the interrupt contract.
//!
//! One playback device, opened once: 16 kHz, mono, s16le, interleaved,
//! ~100 ms buffer split into four ~25 ms periods. Rate negotiation picks
//! the nearest supported rate; mono and 16-bit are hard requirements.
//!
//! `interrupt()` may be called from any thread: it raises the atomic flag
//! and issues the ALSA drop-buffer call so the current sound stops within
//! one period. `clear_interrupt()` re-prepares the device if and only if a
//! drop actually happened - preparing unconditionally would flush
//! legitimately queued audio.
//!
//! Every ALSA call takes the device lock for just that call. In particular
//! the beep drain is a poll-until-played loop, not a blocking
//! `snd_pcm_drain`, so `interrupt()` is never starved waiting for a drain
//! to finish.

use crate::Result;
use alsa::pcm::{Access, Format, HwParams, State, PCM};
use alsa::{Direction, ValueOr};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Nominal sample rate of the pipeline.
pub const NOMINAL_RATE: u32 = 16_000;
/// Samples per write chunk (50 ms at 16 kHz).
pub const CHUNK_SAMPLES: usize = 800;
/// Target buffer length in frames (~100 ms).
const BUFFER_FRAMES: i64 = 1600;
/// Target period length in frames (~25 ms, four periods per buffer).
const PERIOD_FRAMES: i64 = 400;
/// Poll interval while waiting for a beep to play out.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Upper bound on a drain wait; past this something is wedged.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

/// The single playback device shared by the audio worker (writes) and the
/// request loop (interrupts).
pub struct PcmDevice {
    pcm: Mutex<PCM>,
    /// Raised by `interrupt()`, consumed by `clear_interrupt()`.
    interrupted: AtomicBool,
    /// Negotiated hardware rate (nearest to [`NOMINAL_RATE`]).
    rate: u32,
    /// ALSA card number of the opened device, for the info query.
    card: i32,
    device_name: String,
}

impl PcmDevice {
    /// Open and configure the device. Called once at firmware init.
    pub fn open(device: &str) -> Result<Self> {
        let pcm = PCM::new(device, Direction::Playback, false)?;
        let rate;
        {
            let hwp = HwParams::any(&pcm)?;
            hwp.set_channels(1)?;
            hwp.set_format(Format::s16())?;
            hwp.set_access(Access::RWInterleaved)?;
            hwp.set_rate(NOMINAL_RATE, ValueOr::Nearest)?;
            hwp.set_buffer_size_near(BUFFER_FRAMES)?;
            hwp.set_period_size_near(PERIOD_FRAMES, ValueOr::Nearest)?;
            pcm.hw_params(&hwp)?;
            rate = hwp.get_rate()?;
        }
        let card = pcm.info()?.get_card();
        if rate != NOMINAL_RATE {
            log::warn!(
                "[AUDIO] device '{}' negotiated {} Hz (nominal {})",
                device,
                rate,
                NOMINAL_RATE
            );
        }
        log::info!("[AUDIO] opened '{}' card={} rate={} Hz", device, card, rate);
        Ok(Self {
            pcm: Mutex::new(pcm),
            interrupted: AtomicBool::new(false),
            rate,
            card,
            device_name: device.to_string(),
        })
    }

    #[inline]
    #[must_use]
    pub fn rate(&self) -> u32 {
        self.rate
    }

    #[inline]
    #[must_use]
    pub fn card(&self) -> i32 {
        self.card
    }

    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    #[inline]
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Stop the current sound: raise the flag and flush the hardware
    /// buffer. Safe from any thread.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        let pcm = self.pcm.lock();
        if let Err(e) = PCM::drop(&pcm) {
            // Dropping an idle device reports an error; harmless.
            log::debug!("[AUDIO] pcm drop: {}", e);
        }
    }

    /// Called at the start of every new audio operation. Re-prepares the
    /// device only when an interrupt actually occurred.
    pub fn clear_interrupt(&self) -> Result<()> {
        if self.interrupted.swap(false, Ordering::AcqRel) {
            let pcm = self.pcm.lock();
            pcm.prepare()?;
        }
        Ok(())
    }

    /// Write one chunk of samples. Returns `false` (chunk silently
    /// discarded) when an interrupt is pending. Underruns are recovered
    /// in place.
    pub fn write_chunk(&self, samples: &[i16]) -> Result<bool> {
        if self.is_interrupted() {
            return Ok(false);
        }
        let pcm = self.pcm.lock();
        let io = pcm.io_i16()?;
        let mut written = 0;
        while written < samples.len() {
            match io.writei(&samples[written..]) {
                Ok(frames) => written += frames,
                Err(e) => {
                    // Underrun or suspend: try ALSA's own recovery, then
                    // re-attempt the write once.
                    pcm.try_recover(e, true)?;
                    match io.writei(&samples[written..]) {
                        Ok(frames) => written += frames,
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            if self.is_interrupted() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Block until everything written has been played out, then re-prepare.
    ///
    /// Polls `delay()` with the lock released between probes. Used after a
    /// beep so the next utterance cannot truncate it. Returns early when an
    /// interrupt arrives.
    pub fn drain_and_prepare(&self) -> Result<()> {
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        loop {
            if self.is_interrupted() {
                return Ok(());
            }
            {
                let pcm = self.pcm.lock();
                let state = pcm.state();
                if state != State::Running || pcm.delay().map(|d| d <= 0).unwrap_or(true) {
                    pcm.prepare()?;
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                log::warn!("[AUDIO] drain timed out; forcing prepare");
                let pcm = self.pcm.lock();
                let _ = PCM::drop(&pcm);
                pcm.prepare()?;
                return Ok(());
            }
            std::thread::sleep(DRAIN_POLL_INTERVAL);
        }
    }
}
