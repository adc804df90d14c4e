// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Application wiring.
//!
//! Construct-once object graph: config store, firmware link (handshake
//! first, router second), speech queue, radio, modes, keypad poller. The
//! main loop drains a single event channel fed by the poller and the
//! radio callbacks, so all mode logic runs on one thread.

use crate::comm::{Comm, RESPONSE_TIMEOUT};
use crate::config::ConfigStore;
use crate::keypad::{KeyEvent, KeypadPoller};
use crate::modes::{ModeManager, SharedModeState};
use crate::radio::{DummyTransceiver, IcomCiv, KenwoodCat, Radio, RadioCallbacks, Transceiver};
use crate::speech::{Speaker, SpeechQueue};
use crate::Result;
use crossbeam::channel;
use hampod_proto::{AudioRequest, PacketType};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Tick cadence of the main loop (drives the frequency-entry timeout).
const TICK_INTERVAL: Duration = Duration::from_millis(200);

/// Launch options from the CLI.
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub pipe_dir: PathBuf,
    pub config_path: PathBuf,
    pub no_radio: bool,
}

/// Events funneled into the main dispatch loop.
enum AppEvent {
    Key(KeyEvent),
    FreqChange(i64),
}

/// Run the software process until `shutdown` is raised or the firmware
/// link dies.
pub fn run(options: &AppOptions, shutdown: &Arc<AtomicBool>) -> Result<()> {
    let config = Arc::new(ConfigStore::load(&options.config_path)?);
    let comm = Arc::new(Comm::connect(&options.pipe_dir)?);
    let speech = Arc::new(SpeechQueue::new(Arc::clone(&comm)));

    // Push config-derived firmware state (volume, speech speed); reused
    // after every config change and undo.
    let apply_config = {
        let comm = Arc::clone(&comm);
        let config = Arc::clone(&config);
        Arc::new(move || {
            let snapshot = config.get();
            if let Err(e) = comm.send(
                PacketType::Config,
                format!("v{}", snapshot.volume).into_bytes(),
            ) {
                log::warn!("[APP] volume push failed: {}", e);
            }
            let speed = (snapshot.speech_speed * 100.0).round() as u16;
            match AudioRequest::SetSpeed(speed).encode(comm.allocate_tag()) {
                Ok(packet) => {
                    if let Err(e) = comm.send_packet(&packet) {
                        log::warn!("[APP] speed push failed: {}", e);
                    }
                }
                Err(e) => log::warn!("[APP] speed encode failed: {}", e),
            }
        }) as Arc<dyn Fn() + Send + Sync>
    };
    apply_config();

    // Startup diagnostic: which audio device the firmware actually opened.
    match comm.request(PacketType::Audio, vec![b'i'], RESPONSE_TIMEOUT) {
        Ok(reply) => log::info!("[APP] firmware audio: {}", reply.data_as_str()),
        Err(e) => log::warn!("[APP] audio info query failed: {}", e),
    }

    let (events_tx, events_rx) = channel::unbounded::<AppEvent>();

    let radio = Arc::new(build_radio(
        &config,
        options.no_radio,
        Arc::clone(&speech),
        events_tx.clone(),
    ));
    if options.no_radio {
        log::info!("[APP] radio init skipped (--no-radio)");
    } else {
        if let Err(e) = radio.init() {
            log::warn!("[APP] radio init failed ({}); watchdog will retry", e);
        }
        radio.start_watchdog();
    }

    let shared = Arc::new(SharedModeState::new());
    let mut modes = ModeManager::new(
        Arc::clone(&shared),
        Arc::clone(&speech) as Arc<dyn Speaker>,
        Arc::clone(&radio),
        Arc::clone(&config),
        apply_config,
    );

    // Key events: beep first (fire-and-forget, so the firmware interrupts
    // current speech), then hand the event to the dispatcher.
    let poller = {
        let speech = Arc::clone(&speech);
        let config = Arc::clone(&config);
        let events_tx = events_tx.clone();
        let layout = config.get().keypad_layout;
        KeypadPoller::start(Arc::clone(&comm), layout, move |event| {
            if config.get().key_beep {
                speech.beep(if event.is_hold {
                    hampod_proto::BeepKind::Hold
                } else {
                    hampod_proto::BeepKind::Keypress
                });
            }
            if events_tx.send(AppEvent::Key(event)).is_err() {
                log::debug!("[KEYPAD] event channel closed");
            }
        })
    };

    speech.say("HAMPOD ready");
    log::info!("[APP] entering main loop");

    while !shutdown.load(Ordering::Relaxed) && comm.is_running() {
        match events_rx.recv_timeout(TICK_INTERVAL) {
            Ok(AppEvent::Key(event)) => modes.handle_key(event),
            Ok(AppEvent::FreqChange(hz)) => modes.on_poll_frequency(hz),
            Err(channel::RecvTimeoutError::Timeout) => {}
            Err(channel::RecvTimeoutError::Disconnected) => break,
        }
        modes.tick(Instant::now());
    }

    log::info!("[APP] shutting down");
    poller.stop();
    radio.cleanup();
    speech.shutdown();
    comm.shutdown();
    Ok(())
}

/// Assemble the radio from config. `radio.model` selects the backend:
/// 0 is the built-in dummy rig, 1 a Kenwood ASCII-CAT rig, 2 an Icom
/// CI-V rig, both on the configured serial device.
fn build_radio(
    config: &Arc<ConfigStore>,
    no_radio: bool,
    speech: Arc<SpeechQueue>,
    events_tx: channel::Sender<AppEvent>,
) -> Radio {
    let snapshot = config.get();
    let device_path = if snapshot.radio_model == 0 || no_radio {
        None
    } else {
        Some(PathBuf::from(&snapshot.radio_device))
    };

    let device = snapshot.radio_device.clone();
    let baud = snapshot.radio_baud;
    let factory: Box<dyn Fn() -> Result<Box<dyn Transceiver>> + Send + Sync> =
        match snapshot.radio_model {
            0 => Box::new(|| Ok(Box::new(DummyTransceiver::new()) as Box<dyn Transceiver>)),
            2 => Box::new(move || {
                Ok(Box::new(IcomCiv::open(&device, baud)?) as Box<dyn Transceiver>)
            }),
            model => {
                if model != 1 {
                    log::warn!("[APP] unknown radio model {}; assuming Kenwood CAT", model);
                }
                Box::new(move || {
                    Ok(Box::new(KenwoodCat::open(&device, baud)?) as Box<dyn Transceiver>)
                })
            }
        };

    let connect_speech = Arc::clone(&speech);
    let disconnect_speech = speech;
    Radio::new(
        factory,
        device_path,
        RadioCallbacks {
            on_connect: Box::new(move || connect_speech.say("Radio connected")),
            on_disconnect: Box::new(move || disconnect_speech.say("Radio disconnected")),
            on_freq_change: Box::new(move |hz| {
                if events_tx.send(AppEvent::FreqChange(hz)).is_err() {
                    log::debug!("[RADIO] event channel closed");
                }
            }),
        },
    )
}
