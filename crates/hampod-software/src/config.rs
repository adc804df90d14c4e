// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Configuration store.
//!
//! INI-style file with `[radio]`, `[audio]` and `[keypad]` sections.
//! Values live in RAM behind an `ArcSwap` snapshot so every thread reads
//! without locking; writers serialize through a mutex, write through to
//! the file immediately and push the previous full struct onto a 10-deep
//! ring for undo. A missing file is not an error - built-in defaults
//! apply.
//!
//! Out-of-range writes are clamped, never rejected: volume to [0,100],
//! speech speed to [0.5, 2.0].

use crate::{Result, SoftwareError};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Snapshots kept for undo.
const UNDO_DEPTH: usize = 10;

/// Keypad symbol layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeypadLayout {
    /// Calculator order: 789 on the top row (the symbols arrive as-is).
    #[default]
    Calculator,
    /// Phone order: 123 on the top row; the digit rows are swapped.
    Phone,
}

impl KeypadLayout {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "calculator" => Some(KeypadLayout::Calculator),
            "phone" => Some(KeypadLayout::Phone),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            KeypadLayout::Calculator => "calculator",
            KeypadLayout::Phone => "phone",
        }
    }

    /// Translate a raw HAL symbol to the logical symbol for this layout.
    #[must_use]
    pub fn translate(self, symbol: char) -> char {
        match self {
            KeypadLayout::Calculator => symbol,
            KeypadLayout::Phone => match symbol {
                '1' => '7',
                '2' => '8',
                '3' => '9',
                '7' => '1',
                '8' => '2',
                '9' => '3',
                other => other,
            },
        }
    }
}

/// The full configuration struct. Cheap to clone; snapshots are whole
/// structs.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Backend selector: 0 dummy rig, 1 Kenwood CAT, 2 Icom CI-V.
    pub radio_model: i32,
    pub radio_device: String,
    pub radio_baud: u32,
    pub volume: i32,
    pub speech_speed: f32,
    pub key_beep: bool,
    pub keypad_layout: KeypadLayout,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            radio_model: 0,
            radio_device: String::from("/dev/ttyUSB0"),
            radio_baud: 57_600,
            volume: 80,
            speech_speed: 1.0,
            key_beep: true,
            keypad_layout: KeypadLayout::Calculator,
        }
    }
}

impl Config {
    /// Clamp every bounded field into its domain.
    pub fn clamp(&mut self) {
        self.volume = self.volume.clamp(0, 100);
        self.speech_speed = self.speech_speed.clamp(0.5, 2.0);
    }

    /// Parse INI text. Unknown keys are logged and skipped; missing keys
    /// keep their defaults.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut config = Self::default();
        let mut section = String::new();
        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                section = name.trim().to_ascii_lowercase();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                log::warn!("[CONFIG] ignoring malformed line {:?}", line);
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            match (section.as_str(), key.as_str()) {
                ("radio", "model") => parse_into(value, &mut config.radio_model),
                ("radio", "device") => config.radio_device = value.to_string(),
                ("radio", "baud") => parse_into(value, &mut config.radio_baud),
                ("audio", "volume") => parse_into(value, &mut config.volume),
                ("audio", "speech_speed") => parse_into(value, &mut config.speech_speed),
                ("audio", "key_beep") => config.key_beep = value != "0",
                ("keypad", "layout") => match KeypadLayout::parse(value) {
                    Some(layout) => config.keypad_layout = layout,
                    None => log::warn!("[CONFIG] unknown keypad layout {:?}", value),
                },
                _ => log::warn!("[CONFIG] unknown key [{}] {}", section, key),
            }
        }
        config.clamp();
        config
    }

    /// Render back to INI text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[radio]");
        let _ = writeln!(out, "model = {}", self.radio_model);
        let _ = writeln!(out, "device = {}", self.radio_device);
        let _ = writeln!(out, "baud = {}", self.radio_baud);
        let _ = writeln!(out);
        let _ = writeln!(out, "[audio]");
        let _ = writeln!(out, "volume = {}", self.volume);
        let _ = writeln!(out, "speech_speed = {}", self.speech_speed);
        let _ = writeln!(out, "key_beep = {}", i32::from(self.key_beep));
        let _ = writeln!(out);
        let _ = writeln!(out, "[keypad]");
        let _ = writeln!(out, "layout = {}", self.keypad_layout.as_str());
        out
    }
}

fn parse_into<T: std::str::FromStr>(value: &str, target: &mut T) {
    match value.parse() {
        Ok(v) => *target = v,
        Err(_) => log::warn!("[CONFIG] cannot parse {:?}", value),
    }
}

/// Write path state: the undo ring, guarded together with file writes.
struct WriteState {
    undo: VecDeque<Config>,
}

/// The store: lock-free snapshot reads, serialized write-through updates.
pub struct ConfigStore {
    path: PathBuf,
    current: ArcSwap<Config>,
    write_state: Mutex<WriteState>,
}

impl ConfigStore {
    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let config = match std::fs::read_to_string(path) {
            Ok(text) => Config::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("[CONFIG] {} absent; using defaults", path.display());
                Config::default()
            }
            Err(e) => return Err(SoftwareError::Io(e)),
        };
        log::debug!("[CONFIG] loaded {:?}", config);
        Ok(Self {
            path: path.to_path_buf(),
            current: ArcSwap::from_pointee(config),
            write_state: Mutex::new(WriteState {
                undo: VecDeque::with_capacity(UNDO_DEPTH),
            }),
        })
    }

    /// Current snapshot; cheap, lock-free.
    #[must_use]
    pub fn get(&self) -> Arc<Config> {
        self.current.load_full()
    }

    /// Apply `mutate` to a copy of the current config, clamp it, persist
    /// it, and push the previous value onto the undo ring.
    pub fn update<F: FnOnce(&mut Config)>(&self, mutate: F) -> Result<Arc<Config>> {
        let mut state = self.write_state.lock();
        let previous = self.current.load_full();
        let mut next = (*previous).clone();
        mutate(&mut next);
        next.clamp();

        self.persist(&next)?;

        if state.undo.len() >= UNDO_DEPTH {
            state.undo.pop_front();
        }
        state.undo.push_back((*previous).clone());

        let next = Arc::new(next);
        self.current.store(Arc::clone(&next));
        Ok(next)
    }

    /// Restore the latest snapshot. `Ok(None)` when the ring is empty.
    pub fn undo(&self) -> Result<Option<Arc<Config>>> {
        let mut state = self.write_state.lock();
        let Some(restored) = state.undo.pop_back() else {
            return Ok(None);
        };
        self.persist(&restored)?;
        let restored = Arc::new(restored);
        self.current.store(Arc::clone(&restored));
        Ok(Some(restored))
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.write_state.lock().undo.len()
    }

    fn persist(&self, config: &Config) -> Result<()> {
        std::fs::write(&self.path, config.render())?;
        Ok(())
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(&dir.path().join("absent.conf")).unwrap();
        assert_eq!(*store.get(), Config::default());
    }

    #[test]
    fn test_load_save_load_field_equal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hampod.conf");
        let store = ConfigStore::load(&path).unwrap();
        store
            .update(|c| {
                c.radio_model = 2;
                c.volume = 55;
                c.speech_speed = 1.5;
                c.key_beep = false;
                c.keypad_layout = KeypadLayout::Phone;
            })
            .unwrap();

        let reloaded = ConfigStore::load(&path).unwrap();
        assert_eq!(*reloaded.get(), *store.get());
    }

    #[test]
    fn test_clamping_on_update() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(&dir.path().join("c.conf")).unwrap();
        store.update(|c| c.volume = -5).unwrap();
        assert_eq!(store.get().volume, 0);
        store.update(|c| c.volume = 150).unwrap();
        assert_eq!(store.get().volume, 100);
        store.update(|c| c.speech_speed = 9.0).unwrap();
        assert!((store.get().speech_speed - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_tolerates_comments_and_whitespace() {
        let text = "\n# comment\n; also comment\n  [audio]\n  volume = 33\n";
        let config = Config::parse(text);
        assert_eq!(config.volume, 33);
    }

    #[test]
    fn test_undo_restores_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(&dir.path().join("c.conf")).unwrap();
        store.update(|c| c.volume = 10).unwrap();
        store.update(|c| c.volume = 20).unwrap();
        let restored = store.undo().unwrap().unwrap();
        assert_eq!(restored.volume, 10);
        assert_eq!(store.get().volume, 10);
    }

    #[test]
    fn test_undo_depth_capped_at_ten() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(&dir.path().join("c.conf")).unwrap();
        for v in 0..25 {
            store.update(|c| c.volume = v).unwrap();
        }
        assert_eq!(store.undo_depth(), UNDO_DEPTH);
        // Oldest snapshots were discarded; the deepest undo lands on the
        // state just before the last ten updates.
        for _ in 0..UNDO_DEPTH {
            store.undo().unwrap().unwrap();
        }
        assert_eq!(store.get().volume, 14);
        assert!(store.undo().unwrap().is_none());
    }

    #[test]
    fn test_phone_layout_swaps_rows() {
        let layout = KeypadLayout::Phone;
        assert_eq!(layout.translate('1'), '7');
        assert_eq!(layout.translate('9'), '3');
        assert_eq!(layout.translate('5'), '5');
        assert_eq!(layout.translate('#'), '#');
        assert_eq!(KeypadLayout::Calculator.translate('1'), '1');
    }
}
