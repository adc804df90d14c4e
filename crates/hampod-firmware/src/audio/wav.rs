// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WAV file playback.
//!
//! Files matching the pipeline contract (mono, 16-bit int, device rate)
//! are streamed through the engine in chunks with interrupt checks between
//! them. Anything else goes to the degraded fallback: an external player
//! process, blocking and non-interruptible.

use crate::audio::{AudioEngine, CHUNK_SAMPLES};
use crate::{FirmwareError, Result};
use std::path::Path;
use std::process::Command;

/// External player used for out-of-contract files.
const FALLBACK_PLAYER: &str = "aplay";

/// Play `path`, preferring the interruptible in-engine path.
pub fn play_wav(engine: &AudioEngine, path: &Path) -> Result<()> {
    let reader = match hound::WavReader::open(path) {
        Ok(r) => r,
        Err(hound::Error::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("[AUDIO] no such file {}", path.display());
            return Err(FirmwareError::NotFound(path.display().to_string()));
        }
        Err(e) => {
            log::warn!("[AUDIO] cannot open {}: {}", path.display(), e);
            return Err(e.into());
        }
    };
    let spec = reader.spec();
    let in_contract = spec.channels == 1
        && spec.bits_per_sample == 16
        && spec.sample_format == hound::SampleFormat::Int
        && spec.sample_rate == engine.sink().rate();

    if in_contract {
        stream_through_engine(engine, reader)
    } else {
        log::info!(
            "[AUDIO] {} is {} Hz/{} ch/{} bit; using fallback player",
            path.display(),
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample
        );
        play_with_fallback(path)
    }
}

fn stream_through_engine(
    engine: &AudioEngine,
    mut reader: hound::WavReader<std::io::BufReader<std::fs::File>>,
) -> Result<()> {
    engine.begin()?;
    let mut chunk = Vec::with_capacity(CHUNK_SAMPLES);
    for sample in reader.samples::<i16>() {
        chunk.push(sample?);
        if chunk.len() == CHUNK_SAMPLES {
            if !engine.write_chunk(&chunk)? {
                log::debug!("[AUDIO] wav playback interrupted");
                return Ok(());
            }
            chunk.clear();
        }
    }
    if !chunk.is_empty() {
        engine.write_chunk(&chunk)?;
    }
    engine.finish();
    Ok(())
}

fn play_with_fallback(path: &Path) -> Result<()> {
    let status = Command::new(FALLBACK_PLAYER)
        .arg(path)
        .status()
        .map_err(|e| FirmwareError::Tts(format!("{} unavailable: {}", FALLBACK_PLAYER, e)))?;
    if !status.success() {
        log::warn!("[AUDIO] fallback player exited with {}", status);
    }
    Ok(())
}
