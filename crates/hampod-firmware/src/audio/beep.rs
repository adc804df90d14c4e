// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RAM-cached beeps.
//!
//! The three feedback beeps (keypress, hold, error) are loaded once at
//! init into heap buffers so a beep request never touches the disk. The
//! files must already match the pipeline contract (16 kHz mono s16); a
//! mismatched file is a deployment error, not something to resample at
//! runtime.

use crate::audio::pcm::NOMINAL_RATE;
use crate::{FirmwareError, Result};
use hampod_proto::BeepKind;
use std::path::Path;

/// File names expected under the beep directory.
const BEEP_FILES: [(&str, BeepKind); 3] = [
    ("keypress.wav", BeepKind::Keypress),
    ("hold.wav", BeepKind::Hold),
    ("error.wav", BeepKind::Error),
];

/// Preloaded beep samples.
pub struct BeepCache {
    keypress: Vec<i16>,
    hold: Vec<i16>,
    error: Vec<i16>,
}

impl BeepCache {
    /// Load all three beeps from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut cache = Self {
            keypress: Vec::new(),
            hold: Vec::new(),
            error: Vec::new(),
        };
        for (name, kind) in BEEP_FILES {
            let path = dir.join(name);
            let samples = load_contract_wav(&path)?;
            log::debug!(
                "[AUDIO] cached beep {} ({} samples)",
                path.display(),
                samples.len()
            );
            *cache.slot_mut(kind) = samples;
        }
        Ok(cache)
    }

    #[must_use]
    pub fn get(&self, kind: BeepKind) -> &[i16] {
        match kind {
            BeepKind::Keypress => &self.keypress,
            BeepKind::Hold => &self.hold,
            BeepKind::Error => &self.error,
        }
    }

    fn slot_mut(&mut self, kind: BeepKind) -> &mut Vec<i16> {
        match kind {
            BeepKind::Keypress => &mut self.keypress,
            BeepKind::Hold => &mut self.hold,
            BeepKind::Error => &mut self.error,
        }
    }
}

/// Read a WAV that must match the pipeline contract exactly.
fn load_contract_wav(path: &Path) -> Result<Vec<i16>> {
    let mut reader = match hound::WavReader::open(path) {
        Ok(r) => r,
        Err(hound::Error::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FirmwareError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    let spec = reader.spec();
    if spec.channels != 1
        || spec.bits_per_sample != 16
        || spec.sample_format != hound::SampleFormat::Int
        || spec.sample_rate != NOMINAL_RATE
    {
        return Err(FirmwareError::BeepFormat(path.display().to_string()));
    }
    let samples: std::result::Result<Vec<i16>, _> = reader.samples::<i16>().collect();
    Ok(samples?)
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn write_wav(path: &Path, rate: u32, channels: u16) {
        let spec = WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut w = WavWriter::create(path, spec).unwrap();
        for i in 0..800i32 {
            for _ in 0..channels {
                w.write_sample((i % 128) as i16).unwrap();
            }
        }
        w.finalize().unwrap();
    }

    #[test]
    fn test_load_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        for (name, _) in BEEP_FILES {
            write_wav(&dir.path().join(name), NOMINAL_RATE, 1);
        }
        let cache = BeepCache::load(dir.path()).unwrap();
        assert_eq!(cache.get(BeepKind::Keypress).len(), 800);
        assert_eq!(cache.get(BeepKind::Hold).len(), 800);
        assert_eq!(cache.get(BeepKind::Error).len(), 800);
    }

    #[test]
    fn test_rejects_wrong_rate() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("keypress.wav"), 44_100, 1);
        write_wav(&dir.path().join("hold.wav"), NOMINAL_RATE, 1);
        write_wav(&dir.path().join("error.wav"), NOMINAL_RATE, 1);
        assert!(matches!(
            BeepCache::load(dir.path()),
            Err(FirmwareError::BeepFormat(_))
        ));
    }

    #[test]
    fn test_missing_beep_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        // Only two of the three beeps exist.
        write_wav(&dir.path().join("keypress.wav"), NOMINAL_RATE, 1);
        write_wav(&dir.path().join("hold.wav"), NOMINAL_RATE, 1);
        assert!(matches!(
            BeepCache::load(dir.path()),
            Err(FirmwareError::NotFound(_))
        ));
    }

    #[test]
    fn test_rejects_stereo() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("keypress.wav"), NOMINAL_RATE, 2);
        write_wav(&dir.path().join("hold.wav"), NOMINAL_RATE, 1);
        write_wav(&dir.path().join("error.wav"), NOMINAL_RATE, 1);
        assert!(BeepCache::load(dir.path()).is_err());
    }
}
