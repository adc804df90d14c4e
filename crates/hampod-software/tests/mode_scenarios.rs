// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end mode scenarios: scripted key events through the real
//! dispatcher against the dummy rig, with announcements captured.

use hampod_proto::BeepKind;
use hampod_software::config::ConfigStore;
use hampod_software::keypad::KeyEvent;
use hampod_software::modes::{ModeManager, SharedModeState};
use hampod_software::radio::{DummyTransceiver, Level, Radio, RadioCallbacks, Transceiver, Vfo};
use hampod_software::speech::Speaker;
use parking_lot::Mutex;
use std::sync::Arc;

/// Captures everything the modes would have spoken.
#[derive(Default)]
struct CapturedSpeech {
    utterances: Mutex<Vec<String>>,
    beeps: Mutex<Vec<BeepKind>>,
}

impl CapturedSpeech {
    fn spoken(&self) -> Vec<String> {
        self.utterances.lock().clone()
    }

    fn last(&self) -> String {
        self.utterances.lock().last().cloned().unwrap_or_default()
    }
}

impl Speaker for CapturedSpeech {
    fn say(&self, text: &str) {
        self.utterances.lock().push(text.to_string());
    }
    fn spell(&self, text: &str) {
        self.utterances.lock().push(format!("spell:{}", text));
    }
    fn play_file(&self, path: &str) {
        self.utterances.lock().push(format!("play:{}", path));
    }
    fn beep(&self, kind: BeepKind) {
        self.beeps.lock().push(kind);
    }
    fn interrupt(&self) {}
    fn clear_pending(&self) {}
}

struct Harness {
    modes: ModeManager,
    speech: Arc<CapturedSpeech>,
    radio: Arc<Radio>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(ConfigStore::load(&dir.path().join("hampod.conf")).unwrap());
    let speech = Arc::new(CapturedSpeech::default());
    let radio = Arc::new(Radio::new(
        Box::new(|| Ok(Box::new(DummyTransceiver::new()) as Box<dyn Transceiver>)),
        None,
        RadioCallbacks::default(),
    ));
    radio.init().unwrap();
    let shared = Arc::new(SharedModeState::new());
    let modes = ModeManager::new(
        shared,
        Arc::clone(&speech) as Arc<dyn Speaker>,
        Arc::clone(&radio),
        config,
        Arc::new(|| {}),
    );
    Harness {
        modes,
        speech,
        radio,
        _dir: dir,
    }
}

fn press(modes: &mut ModeManager, key: char) {
    modes.handle_key(KeyEvent {
        key,
        is_hold: false,
    });
}

fn hold(modes: &mut ModeManager, key: char) {
    modes.handle_key(KeyEvent { key, is_hold: true });
}

#[test]
fn scenario_frequency_set_with_point() {
    let mut h = harness();
    press(&mut h.modes, '#');
    assert_eq!(h.speech.last(), "Frequency Mode");

    for key in ['1', '4', '*', '2', '5', '0'] {
        press(&mut h.modes, key);
    }
    // Digits and the point were each announced.
    let spoken = h.speech.spoken();
    assert!(spoken.contains(&"1".to_string()));
    assert!(spoken.contains(&"point".to_string()));

    press(&mut h.modes, '#');
    assert_eq!(h.radio.get_frequency(Vfo::Current).unwrap(), 14_250_000);
    assert_eq!(h.speech.last(), "14 point 2 5 0 0 0 megahertz");

    // A poll callback landing inside the debounce window is suppressed;
    // no duplicate announcement.
    let count_before = h.speech.spoken().len();
    h.modes.on_poll_frequency(14_250_000);
    assert_eq!(h.speech.spoken().len(), count_before);

    // The suppression was one-shot: a later poll announces normally.
    h.modes.on_poll_frequency(7_074_000);
    assert_eq!(h.speech.last(), "7 point 0 7 4 0 0 megahertz");

    h.radio.cleanup();
}

#[test]
fn scenario_shorthand_frequency_entry() {
    let mut h = harness();
    press(&mut h.modes, '#');
    for key in ['1', '4', '0', '2', '5'] {
        press(&mut h.modes, key);
    }
    press(&mut h.modes, '#');
    assert_eq!(h.radio.get_frequency(Vfo::Current).unwrap(), 14_025_000);
    h.radio.cleanup();
}

#[test]
fn scenario_invalid_frequency_rejected() {
    let mut h = harness();
    press(&mut h.modes, '#');
    for key in ['6', '0', '0', '0', '0', '0'] {
        press(&mut h.modes, key);
    }
    let freq_before = h.radio.get_frequency(Vfo::Current).unwrap();
    press(&mut h.modes, '#');

    assert_eq!(h.speech.last(), "Invalid frequency");
    assert!(h.speech.beeps.lock().contains(&BeepKind::Error));
    assert_eq!(h.radio.get_frequency(Vfo::Current).unwrap(), freq_before);
    assert!(!h.modes.is_frequency_active());

    // Accumulator was cleared: the mode is re-enterable from scratch.
    press(&mut h.modes, '#');
    assert_eq!(h.speech.last(), "Frequency Mode");
    h.radio.cleanup();
}

#[test]
fn scenario_hold_queries_mic_gain() {
    let mut h = harness();
    hold(&mut h.modes, '8');
    assert_eq!(h.speech.last(), "Mic gain 50");
    h.radio.cleanup();
}

#[test]
fn scenario_set_mode_power_change() {
    let mut h = harness();
    press(&mut h.modes, 'B');
    assert_eq!(h.speech.last(), "Set");

    hold(&mut h.modes, '9');
    assert_eq!(h.speech.last(), "Power 45 percent");

    press(&mut h.modes, '5');
    press(&mut h.modes, '5');
    press(&mut h.modes, '#');
    assert_eq!(h.speech.last(), "Power set to 55");
    assert_eq!(h.radio.get_level(Level::Power).unwrap(), 55);

    // Back out to Idle and re-select: the new value reads back.
    press(&mut h.modes, 'D');
    hold(&mut h.modes, '9');
    assert_eq!(h.speech.last(), "Power 55 percent");

    // D in Idle exits the mode.
    press(&mut h.modes, 'D');
    press(&mut h.modes, 'D');
    assert!(!h.modes.is_set_active());
    h.radio.cleanup();
}

#[test]
fn scenario_set_mode_commit_clamps() {
    let mut h = harness();
    press(&mut h.modes, 'B');
    hold(&mut h.modes, '9');
    for key in ['9', '9', '9'] {
        press(&mut h.modes, key);
    }
    press(&mut h.modes, '#');
    assert_eq!(h.speech.last(), "Power set to 100");
    assert_eq!(h.radio.get_level(Level::Power).unwrap(), 100);
    h.radio.cleanup();
}

#[test]
fn scenario_set_mode_toggle_does_not_exit() {
    let mut h = harness();
    press(&mut h.modes, 'B');
    press(&mut h.modes, '7'); // noise blanker
    press(&mut h.modes, 'A');
    assert_eq!(h.speech.last(), "Noise blanker on");
    // 'B' in Editing disables the toggle instead of exiting Set.
    press(&mut h.modes, 'B');
    assert_eq!(h.speech.last(), "Noise blanker off");
    assert!(h.modes.is_set_active());
    h.radio.cleanup();
}

#[test]
fn scenario_shift_applies_to_next_key_only() {
    let mut h = harness();
    press(&mut h.modes, 'A');
    assert_eq!(h.speech.last(), "Shift");

    press(&mut h.modes, '4');
    assert_eq!(h.speech.last(), "Attenuation 0 d B");

    // Shift was consumed; the same key now runs the unshifted query.
    press(&mut h.modes, '4');
    assert_eq!(h.speech.last(), "Preamp 0");
    h.radio.cleanup();
}

#[test]
fn scenario_verbosity_gates_poll_announcements() {
    let mut h = harness();
    press(&mut h.modes, 'C');
    assert_eq!(h.speech.last(), "Verbose off");

    let count_before = h.speech.spoken().len();
    h.modes.on_poll_frequency(14_250_000);
    assert_eq!(h.speech.spoken().len(), count_before);

    // Explicit queries still work, as a spell-out in quiet mode.
    press(&mut h.modes, '2');
    assert!(h.speech.last().starts_with("spell:"));

    press(&mut h.modes, 'C');
    assert_eq!(h.speech.last(), "Verbose on");
    h.modes.on_poll_frequency(14_250_000);
    assert_eq!(h.speech.last(), "14 point 2 5 0 0 0 megahertz");
    h.radio.cleanup();
}

#[test]
fn scenario_mode_cycles_on_zero_in_set() {
    let mut h = harness();
    press(&mut h.modes, 'B');
    press(&mut h.modes, '0');
    assert_eq!(h.speech.last(), "Mode upper sideband");
    press(&mut h.modes, '0');
    assert_eq!(h.speech.last(), "Mode C W");
    h.radio.cleanup();
}

#[test]
fn scenario_no_radio_announces_not_connected() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(ConfigStore::load(&dir.path().join("hampod.conf")).unwrap());
    let speech = Arc::new(CapturedSpeech::default());
    let radio = Arc::new(Radio::new(
        Box::new(|| Ok(Box::new(DummyTransceiver::new()) as Box<dyn Transceiver>)),
        None,
        RadioCallbacks::default(),
    ));
    // Radio never initialized: every query fails fast.
    let mut modes = ModeManager::new(
        Arc::new(SharedModeState::new()),
        Arc::clone(&speech) as Arc<dyn Speaker>,
        radio,
        config,
        Arc::new(|| {}),
    );
    press(&mut modes, '2');
    assert_eq!(speech.last(), "Radio not connected");
}
