// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Radio abstraction layer.
//!
//! Wraps one CAT backend behind a single mutex. All operations fail
//! immediately with [`SoftwareError::NotConnected`] when no handle is
//! live. Two background threads keep the connection honest:
//!
//! - the *poller* reads the frequency every 100 ms and fires the
//!   frequency-change callback only after the value has been stable for a
//!   debounce window, so a dial spin announces the settled value once;
//!   three consecutive read failures declare the radio gone
//! - the *watchdog* probes the device path every ~5 s, forces a
//!   disconnect when the node vanishes under a live handle (the serial
//!   layer can hang on a dead descriptor), and reconnects when the node
//!   returns - issuing a USB bus reset when the first reopen fails
//!
//! Callbacks run on those threads, never on the main thread.

/// CAT backend trait, shared rig types, and the built-in dummy rig.
pub mod cat;
/// Icom CI-V serial driver.
pub mod icom;
/// Kenwood ASCII-CAT serial driver.
pub mod kenwood;
/// USBDEVFS_RESET against a stalled adapter.
pub mod usb_reset;

pub use cat::{AgcSpeed, DummyTransceiver, Func, Level, RadioMode, Transceiver, Vfo};
pub use icom::IcomCiv;
pub use kenwood::KenwoodCat;

use crate::{Result, SoftwareError};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Frequency poll cadence.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Stable polls required before a frequency change is announced (~1 s).
const DEBOUNCE_TICKS: u32 = 10;
/// Consecutive poll failures that declare the radio disconnected.
const MAX_READ_FAILURES: u32 = 3;
/// Watchdog probe cadence.
const RECONNECT_PROBE: Duration = Duration::from_secs(5);
/// Settle time after a USB reset before the reopen attempt.
const USB_RESET_SETTLE: Duration = Duration::from_secs(2);

/// Callbacks fired from the radio's background threads.
pub struct RadioCallbacks {
    pub on_connect: Box<dyn Fn() + Send + Sync>,
    pub on_disconnect: Box<dyn Fn() + Send + Sync>,
    pub on_freq_change: Box<dyn Fn(i64) + Send + Sync>,
}

impl Default for RadioCallbacks {
    fn default() -> Self {
        Self {
            on_connect: Box::new(|| {}),
            on_disconnect: Box::new(|| {}),
            on_freq_change: Box::new(|_| {}),
        }
    }
}

/// Produces a fresh backend; invoked at init and on every reconnect.
pub type BackendFactory = Box<dyn Fn() -> Result<Box<dyn Transceiver>> + Send + Sync>;

struct Shared {
    handle: Mutex<Option<Box<dyn Transceiver>>>,
    connected: AtomicBool,
    factory: BackendFactory,
    /// Serial node to watch; `None` disables path probing (dummy rig).
    device_path: Option<PathBuf>,
    callbacks: RadioCallbacks,
    stop: AtomicBool,
    poller: Mutex<Option<JoinHandle<()>>>,
}

/// The application-facing radio object.
pub struct Radio {
    shared: Arc<Shared>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

impl Radio {
    /// Build without connecting. `device_path` enables the watchdog's
    /// hot-plug handling.
    pub fn new(
        factory: BackendFactory,
        device_path: Option<PathBuf>,
        callbacks: RadioCallbacks,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                handle: Mutex::new(None),
                connected: AtomicBool::new(false),
                factory,
                device_path,
                callbacks,
                stop: AtomicBool::new(false),
                poller: Mutex::new(None),
            }),
            watchdog: Mutex::new(None),
        }
    }

    /// Open the backend and start polling. Fires `on_connect`.
    pub fn init(&self) -> Result<()> {
        Shared::connect(&self.shared)
    }

    /// Start the reconnect watchdog.
    pub fn start_watchdog(&self) {
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::spawn(move || watchdog_loop(&shared));
        *self.watchdog.lock() = Some(handle);
    }

    /// Tear everything down. Fires no callbacks.
    pub fn cleanup(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.connected.store(false, Ordering::Release);
        *self.shared.handle.lock() = None;
        if let Some(h) = self.watchdog.lock().take() {
            let _ = h.join();
        }
        if let Some(h) = self.shared.poller.lock().take() {
            let _ = h.join();
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    pub fn get_frequency(&self, vfo: Vfo) -> Result<i64> {
        self.with_handle(|rig| rig.get_frequency(vfo))
    }

    pub fn set_frequency(&self, vfo: Vfo, hz: i64) -> Result<()> {
        self.with_handle(|rig| rig.set_frequency(vfo, hz))
    }

    pub fn get_mode(&self) -> Result<RadioMode> {
        self.with_handle(|rig| rig.get_mode())
    }

    pub fn set_mode(&self, mode: RadioMode) -> Result<()> {
        self.with_handle(|rig| rig.set_mode(mode))
    }

    pub fn select_vfo(&self, vfo: Vfo) -> Result<()> {
        self.with_handle(|rig| rig.select_vfo(vfo))
    }

    pub fn get_level(&self, level: Level) -> Result<i32> {
        self.with_handle(|rig| rig.get_level(level))
    }

    pub fn set_level(&self, level: Level, value: i32) -> Result<()> {
        self.with_handle(|rig| rig.set_level(level, value))
    }

    pub fn get_func(&self, func: Func) -> Result<bool> {
        self.with_handle(|rig| rig.get_func(func))
    }

    pub fn set_func(&self, func: Func, on: bool) -> Result<()> {
        self.with_handle(|rig| rig.set_func(func, on))
    }

    fn with_handle<T>(
        &self,
        op: impl FnOnce(&mut Box<dyn Transceiver>) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.shared.handle.lock();
        match guard.as_mut() {
            Some(rig) => op(rig),
            None => Err(SoftwareError::NotConnected),
        }
    }
}

impl Drop for Radio {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl Shared {
    /// Open a backend, publish it, fire `on_connect`, spawn the poller.
    fn connect(shared: &Arc<Shared>) -> Result<()> {
        // Join the previous poller first, while connected is still false;
        // raising the flag before the join would let a stale poller keep
        // running next to the new one.
        if let Some(old) = shared.poller.lock().take() {
            let _ = old.join();
        }

        let rig = (shared.factory)()?;
        {
            let mut handle = shared.handle.lock();
            *handle = Some(rig);
        }
        shared.connected.store(true, Ordering::Release);
        (shared.callbacks.on_connect)();

        let poll_shared = Arc::clone(shared);
        let handle = std::thread::spawn(move || poller_loop(&poll_shared));
        *shared.poller.lock() = Some(handle);
        Ok(())
    }

    /// Drop the handle and fire `on_disconnect`.
    fn disconnect(&self) {
        *self.handle.lock() = None;
        if self.connected.swap(false, Ordering::AcqRel) {
            log::warn!("[RADIO] disconnected");
            (self.callbacks.on_disconnect)();
        }
    }
}

fn poller_loop(shared: &Arc<Shared>) {
    let mut last_raw: i64 = -1;
    let mut announced: i64 = -1;
    let mut stable_ticks: u32 = 0;
    let mut failures: u32 = 0;
    log::debug!("[RADIO] poller started");

    while !shared.stop.load(Ordering::Acquire) && shared.connected.load(Ordering::Acquire) {
        std::thread::sleep(POLL_INTERVAL);
        let reading = {
            let mut guard = shared.handle.lock();
            match guard.as_mut() {
                Some(rig) => rig.get_frequency(Vfo::Current),
                None => break,
            }
        };
        match reading {
            Ok(freq) => {
                failures = 0;
                if freq == last_raw {
                    stable_ticks = stable_ticks.saturating_add(1);
                    // Fire only on the transition past the debounce window.
                    if stable_ticks == DEBOUNCE_TICKS && freq != announced {
                        announced = freq;
                        (shared.callbacks.on_freq_change)(freq);
                    }
                } else {
                    last_raw = freq;
                    stable_ticks = 0;
                }
            }
            Err(e) => {
                failures += 1;
                log::warn!(
                    "[RADIO] poll failure {}/{}: {}",
                    failures,
                    MAX_READ_FAILURES,
                    e
                );
                if failures >= MAX_READ_FAILURES {
                    shared.disconnect();
                    break;
                }
            }
        }
    }
    log::debug!("[RADIO] poller exiting");
}

fn watchdog_loop(shared: &Arc<Shared>) {
    log::debug!("[RADIO] watchdog started");
    while !shared.stop.load(Ordering::Acquire) {
        // Sleep in slices so shutdown stays prompt.
        let mut slept = Duration::ZERO;
        while slept < RECONNECT_PROBE && !shared.stop.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(200));
            slept += Duration::from_millis(200);
        }
        if shared.stop.load(Ordering::Acquire) {
            break;
        }

        let path_present = shared
            .device_path
            .as_ref()
            .map(|p| p.exists());

        if shared.connected.load(Ordering::Acquire) {
            // A vanished node under a live handle means the serial layer
            // may be hung on a dead descriptor; force the teardown.
            if path_present == Some(false) {
                log::warn!("[RADIO] device node vanished; forcing disconnect");
                shared.disconnect();
            }
            continue;
        }

        // Disconnected: reconnect when the node is back (or unconditionally
        // for path-less rigs).
        if path_present == Some(false) {
            continue;
        }
        log::info!("[RADIO] attempting reconnect");
        if Shared::connect(shared).is_ok() {
            continue;
        }
        // Open failed with the node present: stale enumeration. Reset the
        // bus, wait for re-enumeration, retry once.
        if let Some(path) = &shared.device_path {
            if let Err(e) = usb_reset::reset_usb_device(path) {
                log::warn!("[RADIO] USB reset failed: {}", e);
                continue;
            }
            std::thread::sleep(USB_RESET_SETTLE);
            match Shared::connect(shared) {
                Ok(()) => log::info!("[RADIO] reconnected after USB reset"),
                Err(e) => log::warn!("[RADIO] reconnect after reset failed: {}", e),
            }
        }
    }
    log::debug!("[RADIO] watchdog exiting");
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;
    use std::sync::atomic::AtomicU32;

    fn dummy_radio(callbacks: RadioCallbacks) -> Radio {
        Radio::new(
            Box::new(|| Ok(Box::new(DummyTransceiver::new()) as Box<dyn Transceiver>)),
            None,
            callbacks,
        )
    }

    #[test]
    fn test_ops_fail_when_not_connected() {
        let radio = dummy_radio(RadioCallbacks::default());
        assert!(matches!(
            radio.get_frequency(Vfo::Current),
            Err(SoftwareError::NotConnected)
        ));
        assert!(!radio.is_connected());
    }

    #[test]
    fn test_init_fires_on_connect_and_enables_ops() {
        let connects = Arc::new(AtomicU32::new(0));
        let connects_clone = Arc::clone(&connects);
        let radio = dummy_radio(RadioCallbacks {
            on_connect: Box::new(move || {
                connects_clone.fetch_add(1, Ordering::Relaxed);
            }),
            ..RadioCallbacks::default()
        });
        radio.init().unwrap();
        assert!(radio.is_connected());
        assert_eq!(connects.load(Ordering::Relaxed), 1);
        assert_eq!(radio.get_frequency(Vfo::A).unwrap(), 14_250_000);
        radio.cleanup();
    }

    /// Backend whose reads start failing after a set point, like a rig
    /// whose USB cable was pulled.
    struct FlakyTransceiver {
        inner: DummyTransceiver,
        reads_left: u32,
    }

    impl Transceiver for FlakyTransceiver {
        fn get_frequency(&mut self, vfo: Vfo) -> crate::Result<i64> {
            if self.reads_left == 0 {
                return Err(SoftwareError::Timeout);
            }
            self.reads_left -= 1;
            self.inner.get_frequency(vfo)
        }
        fn set_frequency(&mut self, vfo: Vfo, hz: i64) -> crate::Result<()> {
            self.inner.set_frequency(vfo, hz)
        }
        fn get_mode(&mut self) -> crate::Result<RadioMode> {
            self.inner.get_mode()
        }
        fn set_mode(&mut self, mode: RadioMode) -> crate::Result<()> {
            self.inner.set_mode(mode)
        }
        fn select_vfo(&mut self, vfo: Vfo) -> crate::Result<()> {
            self.inner.select_vfo(vfo)
        }
        fn get_level(&mut self, level: Level) -> crate::Result<i32> {
            self.inner.get_level(level)
        }
        fn set_level(&mut self, level: Level, value: i32) -> crate::Result<()> {
            self.inner.set_level(level, value)
        }
        fn get_func(&mut self, func: Func) -> crate::Result<bool> {
            self.inner.get_func(func)
        }
        fn set_func(&mut self, func: Func, on: bool) -> crate::Result<()> {
            self.inner.set_func(func, on)
        }
    }

    #[test]
    fn test_three_poll_failures_declare_disconnect() {
        let disconnects = Arc::new(AtomicU32::new(0));
        let disconnects_clone = Arc::clone(&disconnects);
        let radio = Radio::new(
            Box::new(|| {
                Ok(Box::new(FlakyTransceiver {
                    inner: DummyTransceiver::new(),
                    reads_left: 2,
                }) as Box<dyn Transceiver>)
            }),
            None,
            RadioCallbacks {
                on_disconnect: Box::new(move || {
                    disconnects_clone.fetch_add(1, Ordering::Relaxed);
                }),
                ..RadioCallbacks::default()
            },
        );
        radio.init().unwrap();
        // Two good reads, then failures; the third consecutive failure
        // tears the handle down and fires on_disconnect once.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while radio.is_connected() {
            assert!(std::time::Instant::now() < deadline, "never disconnected");
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(disconnects.load(Ordering::Relaxed), 1);
        assert!(matches!(
            radio.get_frequency(Vfo::Current),
            Err(SoftwareError::NotConnected)
        ));
        radio.cleanup();
    }

    #[test]
    fn test_poller_debounces_before_announcing() {
        let announced = Arc::new(AtomicI64::new(0));
        let announced_clone = Arc::clone(&announced);
        let radio = dummy_radio(RadioCallbacks {
            on_freq_change: Box::new(move |hz| {
                announced_clone.store(hz, Ordering::Release);
            }),
            ..RadioCallbacks::default()
        });
        radio.init().unwrap();
        // The dummy rig's frequency is stable, so the debounce window
        // elapses and exactly one announcement lands.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while announced.load(Ordering::Acquire) == 0 {
            assert!(std::time::Instant::now() < deadline, "no announcement");
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(announced.load(Ordering::Acquire), 14_250_000);
        radio.cleanup();
    }
}
