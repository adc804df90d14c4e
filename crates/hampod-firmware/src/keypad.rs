// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Keypad HAL.
//!
//! A background thread tracks the symbol currently held on the USB keypad
//! and publishes it through an atomic. The request loop answers `'r'`
//! KEYPAD requests from that atomic; it never blocks on the device.
//!
//! The keycode-to-symbol mapping is the narrow contract with the input
//! layer: [`KeySource`] yields press/release transitions already mapped to
//! keypad symbols, and the evdev implementation below is the only place
//! Linux keycodes appear.

use crate::{FirmwareError, Result};
use std::fs::File;
use std::io::Read;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Symbol meaning "no key is pressed".
pub const NO_KEY: char = '-';

/// Poll cadence of the HAL thread.
const HAL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A key went down or up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransition {
    Down(char),
    Up(char),
}

/// Source of mapped key transitions. Implementations must not block in
/// `poll_event`.
pub trait KeySource: Send {
    /// Return the next pending transition, or `None` when quiescent.
    fn poll_event(&mut self) -> Result<Option<KeyTransition>>;
}

/// Size of a Linux `input_event` on 64-bit targets: two 8-byte timeval
/// words, type u16, code u16, value i32.
const INPUT_EVENT_SIZE: usize = 24;
const EV_KEY: u16 = 1;

/// Numeric-keypad keycodes mapped to HAMPOD symbols. The 4x4 matrix is
/// wired as a standard USB numeric pad; the fourth column arrives as the
/// operator keys.
const KEYMAP: &[(u16, char)] = &[
    (82, '0'), // KEY_KP0
    (79, '1'),
    (80, '2'),
    (81, '3'),
    (75, '4'),
    (76, '5'),
    (77, '6'),
    (71, '7'),
    (72, '8'),
    (73, '9'),
    (98, 'A'),  // KEY_KPSLASH
    (55, 'B'),  // KEY_KPASTERISK
    (74, 'C'),  // KEY_KPMINUS
    (78, 'D'),  // KEY_KPPLUS
    (83, '*'),  // KEY_KPDOT
    (96, '#'),  // KEY_KPENTER
    (69, 'X'),  // KEY_NUMLOCK (reserved)
    (14, 'Y'),  // KEY_BACKSPACE (reserved)
];

fn map_keycode(code: u16) -> Option<char> {
    KEYMAP.iter().find(|(c, _)| *c == code).map(|(_, s)| *s)
}

/// Reads raw `input_event` records from a `/dev/input/event*` node.
pub struct EvdevKeySource {
    file: File,
    buf: Vec<u8>,
}

impl EvdevKeySource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| FirmwareError::Keypad(format!("{}: {}", path.display(), e)))?;
        log::info!("[KEYPAD] opened input device {}", path.display());
        Ok(Self {
            file,
            buf: Vec::new(),
        })
    }
}

impl KeySource for EvdevKeySource {
    fn poll_event(&mut self) -> Result<Option<KeyTransition>> {
        let mut raw = [0u8; INPUT_EVENT_SIZE * 8];
        loop {
            // Consume any buffered complete event first.
            while self.buf.len() >= INPUT_EVENT_SIZE {
                let event: Vec<u8> = self.buf.drain(..INPUT_EVENT_SIZE).collect();
                let ev_type = u16::from_ne_bytes([event[16], event[17]]);
                let code = u16::from_ne_bytes([event[18], event[19]]);
                let value = i32::from_ne_bytes([event[20], event[21], event[22], event[23]]);
                if ev_type != EV_KEY {
                    continue;
                }
                let Some(symbol) = map_keycode(code) else {
                    continue;
                };
                match value {
                    1 => return Ok(Some(KeyTransition::Down(symbol))),
                    0 => return Ok(Some(KeyTransition::Up(symbol))),
                    _ => {} // autorepeat; the held symbol is already current
                }
            }
            match self.file.read(&mut raw) {
                Ok(0) => {
                    return Err(FirmwareError::Keypad("input device closed".into()));
                }
                Ok(n) => self.buf.extend_from_slice(&raw[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FirmwareError::Keypad(e.to_string())),
            }
        }
    }
}

/// A source with no hardware behind it; always reports no key. Used when
/// the firmware runs without a keypad attached.
pub struct NullKeySource;

impl KeySource for NullKeySource {
    fn poll_event(&mut self) -> Result<Option<KeyTransition>> {
        Ok(None)
    }
}

/// The HAL thread and its published state.
pub struct KeypadHal {
    current: Arc<AtomicU8>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl KeypadHal {
    /// Spawn the HAL thread over `source`.
    pub fn start(mut source: Box<dyn KeySource>) -> Self {
        let current = Arc::new(AtomicU8::new(NO_KEY as u8));
        let stop = Arc::new(AtomicBool::new(false));

        let current_clone = Arc::clone(&current);
        let stop_clone = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            while !stop_clone.load(Ordering::Relaxed) {
                loop {
                    match source.poll_event() {
                        Ok(Some(KeyTransition::Down(symbol))) => {
                            current_clone.store(symbol as u8, Ordering::Release);
                        }
                        Ok(Some(KeyTransition::Up(symbol))) => {
                            // Only clear if the released key is the one we
                            // consider held; an overlapping press wins.
                            let _ = current_clone.compare_exchange(
                                symbol as u8,
                                NO_KEY as u8,
                                Ordering::AcqRel,
                                Ordering::Relaxed,
                            );
                        }
                        Ok(None) => break,
                        Err(e) => {
                            log::error!("[KEYPAD] HAL thread exiting: {}", e);
                            return;
                        }
                    }
                }
                std::thread::sleep(HAL_POLL_INTERVAL);
            }
        });

        Self {
            current,
            stop,
            handle: Some(handle),
        }
    }

    /// Latest held symbol, [`NO_KEY`] when nothing is pressed.
    #[must_use]
    pub fn current_symbol(&self) -> char {
        self.current.load(Ordering::Acquire) as char
    }
}

impl Drop for KeypadHal {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted source for HAL tests.
    struct ScriptSource {
        events: std::vec::IntoIter<KeyTransition>,
    }

    impl KeySource for ScriptSource {
        fn poll_event(&mut self) -> Result<Option<KeyTransition>> {
            Ok(self.events.next())
        }
    }

    fn wait_for(hal: &KeypadHal, expect: char) {
        for _ in 0..100 {
            if hal.current_symbol() == expect {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("HAL never published '{}'", expect);
    }

    #[test]
    fn test_hal_tracks_latest_symbol() {
        let source = ScriptSource {
            events: vec![KeyTransition::Down('5')].into_iter(),
        };
        let hal = KeypadHal::start(Box::new(source));
        wait_for(&hal, '5');
    }

    #[test]
    fn test_release_of_other_key_is_ignored() {
        let source = ScriptSource {
            events: vec![
                KeyTransition::Down('5'),
                KeyTransition::Down('7'),
                KeyTransition::Up('5'), // stale release; '7' still held
            ]
            .into_iter(),
        };
        let hal = KeypadHal::start(Box::new(source));
        wait_for(&hal, '7');
    }

    #[test]
    fn test_release_clears_to_no_key() {
        let source = ScriptSource {
            events: vec![KeyTransition::Down('3'), KeyTransition::Up('3')].into_iter(),
        };
        let hal = KeypadHal::start(Box::new(source));
        wait_for(&hal, NO_KEY);
    }

    #[test]
    fn test_keymap_covers_all_symbols() {
        let mut symbols: Vec<char> = KEYMAP.iter().map(|(_, s)| *s).collect();
        symbols.sort_unstable();
        symbols.dedup();
        assert_eq!(symbols.len(), KEYMAP.len(), "duplicate symbol in keymap");
        for s in "0123456789ABCD*#".chars() {
            assert!(symbols.contains(&s), "symbol {} unmapped", s);
        }
    }
}
