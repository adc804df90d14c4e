// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Persistent text-to-speech bridge.
//!
//! Synth startup dominates end-to-end latency, so the engine binary is
//! forked once and kept alive: one line of text in on stdin, raw s16le PCM
//! out on stdout per utterance. The child's stderr goes to a discard sink
//! so engine chatter stays out of our log stream.
//!
//! Synths that buffer give no end-of-utterance marker. The bridge treats
//! ~100 ms of stdout silence - after at least one byte has arrived - as
//! the utterance boundary. Heuristic, not guaranteed: a synth that stalls
//! mid-utterance on pathological input can end early.
//!
//! If the child exits between utterances the next utterance restarts it
//! transparently; a death mid-utterance drops that utterance with an
//! error log.

use crate::audio::{AudioEngine, CHUNK_SAMPLES};
use crate::{FirmwareError, Result};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

/// Idle interval on stdout that marks end-of-utterance.
const UTTERANCE_IDLE: Duration = Duration::from_millis(100);
/// How long to wait for the first byte before declaring the synth wedged.
const UTTERANCE_START_TIMEOUT: Duration = Duration::from_secs(5);
/// Gap inserted between spelled-out characters.
const SPELL_GAP: Duration = Duration::from_millis(120);

/// Speech-speed bounds, percent of nominal (1.0x = 100).
pub const SPEED_MIN: u16 = 50;
pub const SPEED_MAX: u16 = 200;

const STDOUT_TOKEN: Token = Token(0);

/// How to launch the synth engine.
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Engine binary (expects text lines on stdin, raw s16le on stdout).
    pub command: String,
    /// Arguments, typically the model path and a raw-output switch.
    pub args: Vec<String>,
}

struct TtsChild {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    poll: Poll,
}

impl TtsChild {
    fn spawn(config: &TtsConfig) -> Result<Self> {
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| FirmwareError::Tts(format!("spawn {}: {}", config.command, e)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FirmwareError::Tts("no stdin handle".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FirmwareError::Tts("no stdout handle".into()))?;

        set_nonblocking(stdout.as_raw_fd())?;
        let poll = Poll::new()?;
        poll.registry().register(
            &mut SourceFd(&stdout.as_raw_fd()),
            STDOUT_TOKEN,
            Interest::READABLE,
        )?;

        log::info!("[TTS] engine started (pid {})", child.id());
        Ok(Self {
            child,
            stdin,
            stdout,
            poll,
        })
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl Drop for TtsChild {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// The persistent bridge. One per firmware process, used only by the
/// audio worker thread.
pub struct TtsBridge {
    config: TtsConfig,
    child: Option<TtsChild>,
    /// Speech speed, percent of nominal.
    speed: AtomicU16,
}

impl TtsBridge {
    pub fn new(config: TtsConfig) -> Self {
        Self {
            config,
            child: None,
            speed: AtomicU16::new(100),
        }
    }

    /// Start the child eagerly so the first utterance does not pay the
    /// startup cost.
    pub fn warm_up(&mut self) -> Result<()> {
        self.ensure_child().map(|_| ())
    }

    pub fn set_speed(&self, percent: u16) {
        let clamped = percent.clamp(SPEED_MIN, SPEED_MAX);
        self.speed.store(clamped, Ordering::Relaxed);
        log::info!("[TTS] speech speed set to {}%", clamped);
    }

    #[must_use]
    pub fn speed(&self) -> u16 {
        self.speed.load(Ordering::Relaxed)
    }

    /// Synthesize `text` and stream it through the engine.
    pub fn speak(&mut self, text: &str, engine: &AudioEngine) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        engine.begin()?;
        self.send_line(text)?;
        self.stream_utterance(engine)
    }

    /// Spell characters one at a time with a short gap between them.
    pub fn spell(&mut self, chars: &str, engine: &AudioEngine) -> Result<()> {
        engine.begin()?;
        let gap_samples =
            vec![0i16; (engine.sink().rate() as u64 * SPELL_GAP.as_millis() as u64 / 1000) as usize];
        for (i, c) in chars.chars().enumerate() {
            if engine.sink().is_interrupted() {
                return Ok(());
            }
            if i > 0 {
                engine.play_samples(&gap_samples)?;
            }
            self.send_line(&spoken_char(c))?;
            self.stream_utterance(engine)?;
        }
        Ok(())
    }

    /// Write one line of text, restarting a dead child once.
    fn send_line(&mut self, text: &str) -> Result<()> {
        let line = sanitize_line(text);
        for attempt in 0..2 {
            let child = self.ensure_child()?;
            match child
                .stdin
                .write_all(line.as_bytes())
                .and_then(|()| child.stdin.flush())
            {
                Ok(()) => return Ok(()),
                Err(e) => {
                    log::warn!("[TTS] write failed (attempt {}): {}; restarting engine", attempt, e);
                    self.child = None;
                }
            }
        }
        Err(FirmwareError::Tts("engine rejected text twice".into()))
    }

    /// Read PCM until the idle boundary, feeding chunks into the engine.
    fn stream_utterance(&mut self, engine: &AudioEngine) -> Result<()> {
        let speed = self.speed.load(Ordering::Relaxed);
        // Take the child out so a mid-utterance death can drop (and reap)
        // it; it is put back on the success path.
        let mut child = self
            .child
            .take()
            .ok_or_else(|| FirmwareError::Tts("no engine process".into()))?;

        let started = Instant::now();
        let mut events = Events::with_capacity(4);
        let mut pending: Vec<u8> = Vec::with_capacity(CHUNK_SAMPLES * 2);
        let mut got_data = false;
        // Once interrupted we keep reading to the utterance boundary so
        // leftover PCM cannot bleed into the next utterance, but discard it.
        let mut discard = false;
        let mut read_buf = [0u8; 4096];

        loop {
            child.poll.poll(&mut events, Some(UTTERANCE_IDLE))?;
            if events.is_empty() {
                if got_data {
                    break; // idle after data: end of utterance
                }
                if started.elapsed() >= UTTERANCE_START_TIMEOUT {
                    if child.is_alive() {
                        self.child = Some(child);
                        return Err(FirmwareError::Tts("no audio within start timeout".into()));
                    }
                    log::error!("[TTS] engine died mid-utterance; dropping it");
                    return Err(FirmwareError::Tts("engine died mid-utterance".into()));
                }
                continue;
            }

            loop {
                match child.stdout.read(&mut read_buf) {
                    Ok(0) => {
                        // EOF: the child exited.
                        log::error!("[TTS] engine closed stdout mid-utterance");
                        return Err(FirmwareError::Tts("engine died mid-utterance".into()));
                    }
                    Ok(n) => {
                        got_data = true;
                        if !discard {
                            pending.extend_from_slice(&read_buf[..n]);
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                }
            }

            while pending.len() >= CHUNK_SAMPLES * 2 {
                let chunk = take_samples(&mut pending, CHUNK_SAMPLES);
                let resampled = apply_speed(&chunk, speed);
                if !engine.write_chunk(&resampled)? {
                    discard = true;
                    pending.clear();
                    break;
                }
            }
        }

        self.child = Some(child);
        if !discard && !pending.is_empty() {
            let half = pending.len() / 2;
            let chunk = take_samples(&mut pending, half);
            let resampled = apply_speed(&chunk, speed);
            engine.write_chunk(&resampled)?;
        }
        engine.finish();
        Ok(())
    }

    fn ensure_child(&mut self) -> Result<&mut TtsChild> {
        let dead = match self.child.as_mut() {
            Some(c) => !c.is_alive(),
            None => true,
        };
        if dead {
            if self.child.take().is_some() {
                log::warn!("[TTS] engine exited; restarting");
            }
            self.child = Some(TtsChild::spawn(&self.config)?);
        }
        match self.child.as_mut() {
            Some(child) => Ok(child),
            None => Err(FirmwareError::Tts("engine unavailable".into())),
        }
    }
}

/// Strip newlines so one request is exactly one synth line.
fn sanitize_line(text: &str) -> String {
    let mut line: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    line.push('\n');
    line
}

/// Pull `count` i16 samples off the front of a little-endian byte buffer.
fn take_samples(pending: &mut Vec<u8>, count: usize) -> Vec<i16> {
    let byte_count = count * 2;
    let samples = pending[..byte_count]
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    pending.drain(..byte_count);
    samples
}

/// Time-scale by skipping or repeating samples. 100 = unchanged; 200 plays
/// twice as fast. Nearest-sample stepping is audible but fine for speech.
fn apply_speed(samples: &[i16], percent: u16) -> Vec<i16> {
    if percent == 100 || samples.is_empty() {
        return samples.to_vec();
    }
    let step = f64::from(percent) / 100.0;
    let out_len = (samples.len() as f64 / step) as usize;
    (0..out_len)
        .map(|i| {
            let src = ((i as f64) * step) as usize;
            samples[src.min(samples.len() - 1)]
        })
        .collect()
}

/// Spoken name for a spelled-out character.
fn spoken_char(c: char) -> String {
    match c {
        '0' => "zero".into(),
        '1' => "one".into(),
        '2' => "two".into(),
        '3' => "three".into(),
        '4' => "four".into(),
        '5' => "five".into(),
        '6' => "six".into(),
        '7' => "seven".into(),
        '8' => "eight".into(),
        '9' => "nine".into(),
        '*' => "star".into(),
        '#' => "pound".into(),
        '.' => "point".into(),
        '-' => "dash".into(),
        ' ' => "space".into(),
        other => other.to_string(),
    }
}

fn set_nonblocking(fd: i32) -> Result<()> {
    // SAFETY: fd is a valid descriptor owned by the child handle.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
    }
    Ok(())
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_speed_identity() {
        let samples = vec![1, 2, 3, 4];
        assert_eq!(apply_speed(&samples, 100), samples);
    }

    #[test]
    fn test_apply_speed_scales_length() {
        let samples: Vec<i16> = (0..1000).map(|i| i as i16).collect();
        assert_eq!(apply_speed(&samples, 200).len(), 500);
        assert_eq!(apply_speed(&samples, 50).len(), 2000);
    }

    #[test]
    fn test_take_samples_little_endian() {
        let mut pending = vec![0x34, 0x12, 0x78, 0x56, 0xFF];
        let samples = take_samples(&mut pending, 2);
        assert_eq!(samples, vec![0x1234, 0x5678]);
        assert_eq!(pending, vec![0xFF]);
    }

    #[test]
    fn test_sanitize_line_single_line() {
        assert_eq!(sanitize_line("a\nb\rc"), "a b c\n");
    }

    #[test]
    fn test_spoken_char_names() {
        assert_eq!(spoken_char('7'), "seven");
        assert_eq!(spoken_char('*'), "star");
        assert_eq!(spoken_char('#'), "pound");
        assert_eq!(spoken_char('A'), "A");
    }

    #[test]
    fn test_speed_clamped() {
        let bridge = TtsBridge::new(TtsConfig {
            command: "true".into(),
            args: vec![],
        });
        bridge.set_speed(10);
        assert_eq!(bridge.speed(), SPEED_MIN);
        bridge.set_speed(1000);
        assert_eq!(bridge.speed(), SPEED_MAX);
    }
}
