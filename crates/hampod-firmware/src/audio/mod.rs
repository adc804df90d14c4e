// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Interruptible audio engine.
//!
//! Produces every sound the firmware makes: RAM-cached beeps, synthesized
//! speech streamed from the TTS bridge, and WAV files from disk. All paths
//! share one PCM sink and one interrupt flag; a new audio request cancels
//! whatever is currently audible within one PCM period.
//!
//! State machine: *idle* -> *playing* on the first chunk of a new
//! operation, *playing* -> *drained* at source EOF, *playing* ->
//! *interrupted* on an external `interrupt()`, *interrupted* -> *idle* at
//! the next `begin()`.

/// RAM-cached beep buffers.
pub mod beep;
/// PCM device with the interrupt contract.
pub mod pcm;
/// WAV file playback and the degraded fallback path.
pub mod wav;

pub use beep::BeepCache;
pub use pcm::{PcmDevice, CHUNK_SAMPLES, NOMINAL_RATE};

use crate::Result;
use hampod_proto::BeepKind;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Observable engine state, mirrored for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Playing,
    Drained,
    Interrupted,
}

/// Narrow contract over the PCM output so the engine logic is testable
/// without an audio card.
pub trait PcmSink: Send + Sync {
    /// Write one chunk; `Ok(false)` means the chunk was discarded because
    /// an interrupt is pending.
    fn write_chunk(&self, samples: &[i16]) -> Result<bool>;
    /// Flag + hardware drop-buffer.
    fn interrupt(&self);
    /// Consume the flag; re-prepare only if a drop happened.
    fn clear_interrupt(&self) -> Result<()>;
    /// Wait until written audio has played out, then re-prepare.
    fn drain_and_prepare(&self) -> Result<()>;
    fn is_interrupted(&self) -> bool;
    fn rate(&self) -> u32;
    /// ALSA card number behind the sink; -1 when there is no hardware.
    fn card(&self) -> i32 {
        -1
    }
    /// Device name the sink was opened with.
    fn name(&self) -> String {
        String::from("none")
    }
}

impl PcmSink for PcmDevice {
    fn write_chunk(&self, samples: &[i16]) -> Result<bool> {
        PcmDevice::write_chunk(self, samples)
    }
    fn interrupt(&self) {
        PcmDevice::interrupt(self);
    }
    fn clear_interrupt(&self) -> Result<()> {
        PcmDevice::clear_interrupt(self)
    }
    fn drain_and_prepare(&self) -> Result<()> {
        PcmDevice::drain_and_prepare(self)
    }
    fn is_interrupted(&self) -> bool {
        PcmDevice::is_interrupted(self)
    }
    fn rate(&self) -> u32 {
        PcmDevice::rate(self)
    }
    fn card(&self) -> i32 {
        PcmDevice::card(self)
    }
    fn name(&self) -> String {
        self.device_name().to_string()
    }
}

/// The audio engine: gain, state tracking, and the three playback paths.
pub struct AudioEngine {
    sink: Arc<dyn PcmSink>,
    beeps: BeepCache,
    /// Output volume 0..=100, linear gain.
    volume: AtomicU8,
    state: Mutex<EngineState>,
}

impl AudioEngine {
    pub fn new(sink: Arc<dyn PcmSink>, beeps: BeepCache, volume: u8) -> Self {
        Self {
            sink,
            beeps,
            volume: AtomicU8::new(volume.min(100)),
            state: Mutex::new(EngineState::Idle),
        }
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    #[must_use]
    pub fn sink(&self) -> &Arc<dyn PcmSink> {
        &self.sink
    }

    pub fn set_volume(&self, volume: u8) {
        let v = volume.min(100);
        self.volume.store(v, Ordering::Relaxed);
        log::info!("[AUDIO] volume set to {}", v);
    }

    #[must_use]
    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Relaxed)
    }

    /// Cut whatever is playing. Callable from the request loop while the
    /// audio worker is mid-write.
    pub fn interrupt(&self) {
        self.sink.interrupt();
        *self.state.lock() = EngineState::Interrupted;
    }

    /// Start of a new audio operation: consume any pending interrupt.
    pub fn begin(&self) -> Result<()> {
        self.sink.clear_interrupt()?;
        let mut state = self.state.lock();
        if *state == EngineState::Interrupted || *state == EngineState::Drained {
            *state = EngineState::Idle;
        }
        Ok(())
    }

    /// Write samples with gain applied, in pipeline-sized chunks.
    /// Returns `false` if playback was interrupted part-way.
    pub fn play_samples(&self, samples: &[i16]) -> Result<bool> {
        for chunk in samples.chunks(CHUNK_SAMPLES) {
            if !self.write_chunk(chunk)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Write one chunk with gain applied.
    pub fn write_chunk(&self, chunk: &[i16]) -> Result<bool> {
        let scaled = self.apply_gain(chunk);
        let wrote = self.sink.write_chunk(&scaled)?;
        if wrote {
            let mut state = self.state.lock();
            if *state == EngineState::Idle {
                *state = EngineState::Playing;
            }
        }
        Ok(wrote)
    }

    /// Mark end-of-source for a streamed utterance.
    pub fn finish(&self) {
        let mut state = self.state.lock();
        if *state == EngineState::Playing {
            *state = EngineState::Drained;
        }
    }

    /// Play a cached beep and wait for it to finish so the next utterance
    /// cannot truncate it.
    pub fn play_beep(&self, kind: BeepKind) -> Result<()> {
        self.begin()?;
        let samples = self.beeps.get(kind).to_vec();
        let completed = self.play_samples(&samples)?;
        if completed {
            self.sink.drain_and_prepare()?;
        }
        let mut state = self.state.lock();
        if *state == EngineState::Playing || *state == EngineState::Drained {
            *state = EngineState::Idle;
        }
        Ok(())
    }

    fn apply_gain(&self, samples: &[i16]) -> Vec<i16> {
        let vol = i32::from(self.volume.load(Ordering::Relaxed));
        samples
            .iter()
            .map(|&s| (i32::from(s) * vol / 100) as i16)
            .collect()
    }
}

// ===== Tests =====

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    /// In-memory sink capturing written samples.
    pub(crate) struct MemorySink {
        pub written: Mutex<Vec<i16>>,
        pub interrupted: AtomicBool,
        pub prepares: AtomicU8,
        pub drains: AtomicU8,
    }

    impl MemorySink {
        pub(crate) fn new() -> Self {
            Self {
                written: Mutex::new(Vec::new()),
                interrupted: AtomicBool::new(false),
                prepares: AtomicU8::new(0),
                drains: AtomicU8::new(0),
            }
        }
    }

    impl PcmSink for MemorySink {
        fn write_chunk(&self, samples: &[i16]) -> Result<bool> {
            if self.interrupted.load(Ordering::Acquire) {
                return Ok(false);
            }
            self.written.lock().extend_from_slice(samples);
            Ok(true)
        }
        fn interrupt(&self) {
            self.interrupted.store(true, Ordering::Release);
        }
        fn clear_interrupt(&self) -> Result<()> {
            if self.interrupted.swap(false, Ordering::AcqRel) {
                self.prepares.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        }
        fn drain_and_prepare(&self) -> Result<()> {
            self.drains.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
        fn is_interrupted(&self) -> bool {
            self.interrupted.load(Ordering::Acquire)
        }
        fn rate(&self) -> u32 {
            NOMINAL_RATE
        }
    }

    pub(crate) fn test_cache() -> BeepCache {
        use hound::{SampleFormat, WavSpec, WavWriter};
        let dir = tempfile::tempdir().unwrap();
        for name in ["keypress.wav", "hold.wav", "error.wav"] {
            let spec = WavSpec {
                channels: 1,
                sample_rate: NOMINAL_RATE,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            };
            let mut w = WavWriter::create(dir.path().join(name), spec).unwrap();
            for _ in 0..160 {
                w.write_sample(1000i16).unwrap();
            }
            w.finalize().unwrap();
        }
        BeepCache::load(dir.path()).unwrap()
    }

    #[test]
    fn test_gain_is_linear() {
        let sink = Arc::new(MemorySink::new());
        let engine = AudioEngine::new(sink.clone(), test_cache(), 50);
        engine.play_samples(&[1000, -1000]).unwrap();
        assert_eq!(*sink.written.lock(), vec![500, -500]);
    }

    #[test]
    fn test_volume_clamped_to_100() {
        let sink = Arc::new(MemorySink::new());
        let engine = AudioEngine::new(sink, test_cache(), 0);
        engine.set_volume(255);
        assert_eq!(engine.volume(), 100);
    }

    #[test]
    fn test_state_machine_transitions() {
        let sink = Arc::new(MemorySink::new());
        let engine = AudioEngine::new(sink.clone(), test_cache(), 100);
        assert_eq!(engine.state(), EngineState::Idle);

        engine.begin().unwrap();
        engine.write_chunk(&[1, 2, 3]).unwrap();
        assert_eq!(engine.state(), EngineState::Playing);

        engine.finish();
        assert_eq!(engine.state(), EngineState::Drained);

        // drained -> idle implicitly at next begin; no prepare happened
        // because no interrupt occurred.
        engine.begin().unwrap();
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(sink.prepares.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_interrupt_discards_chunks_and_reprepares_once() {
        let sink = Arc::new(MemorySink::new());
        let engine = AudioEngine::new(sink.clone(), test_cache(), 100);
        engine.begin().unwrap();
        engine.write_chunk(&[1; 10]).unwrap();

        engine.interrupt();
        assert_eq!(engine.state(), EngineState::Interrupted);
        // Mid-utterance chunks after the interrupt are silently discarded.
        assert!(!engine.write_chunk(&[2; 10]).unwrap());
        assert_eq!(sink.written.lock().len(), 10);

        // Next operation consumes the flag exactly once.
        engine.begin().unwrap();
        assert_eq!(sink.prepares.load(Ordering::Relaxed), 1);
        engine.begin().unwrap();
        assert_eq!(sink.prepares.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_beep_drains_device() {
        let sink = Arc::new(MemorySink::new());
        let engine = AudioEngine::new(sink.clone(), test_cache(), 100);
        engine.play_beep(BeepKind::Keypress).unwrap();
        assert_eq!(sink.drains.load(Ordering::Relaxed), 1);
        assert_eq!(sink.written.lock().len(), 160);
        assert_eq!(engine.state(), EngineState::Idle);
    }
}
