// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HAMPOD firmware binary.
//!
//! Owns the keypad, the PCM output and the TTS engine, serving the
//! software process over the named pipes.
//!
//! ```bash
//! hampod-firmware --beep-dir /usr/share/hampod/beeps \
//!                 --tts-model /usr/share/hampod/voice.onnx
//! ```

use clap::Parser;
use hampod_firmware::server::{FirmwareServer, ServerOptions};
use hampod_firmware::tts::TtsConfig;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// HAMPOD firmware - hardware owner for keypad, audio and speech
#[derive(Parser, Debug)]
#[command(name = "hampod-firmware")]
#[command(about = "HAMPOD firmware process - keypad, PCM audio and TTS")]
#[command(version)]
struct Args {
    /// Directory holding the named pipes
    #[arg(long, default_value = "/tmp/hampod")]
    pipe_dir: PathBuf,

    /// Directory with keypress.wav, hold.wav, error.wav
    #[arg(long, default_value = "/usr/share/hampod/beeps")]
    beep_dir: PathBuf,

    /// ALSA playback device
    #[arg(long, default_value = "default")]
    audio_device: String,

    /// TTS engine binary (text lines on stdin, raw s16le on stdout)
    #[arg(long, default_value = "piper")]
    tts_cmd: String,

    /// TTS voice model path
    #[arg(long, default_value = "/usr/share/hampod/voice.onnx")]
    tts_model: PathBuf,

    /// Keypad input device node; omit to run keypad-less
    #[arg(long)]
    input_device: Option<PathBuf>,

    /// Initial output volume (0-100)
    #[arg(long, default_value = "80")]
    volume: u8,

    /// Log filter (trace, debug, info, warn, error); RUST_LOG overrides
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(args.log_level.as_str()),
    )
    .init();

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        // First signal raises the flag; a second one terminates outright.
        if let Err(e) =
            signal_hook::flag::register_conditional_shutdown(signal, 1, Arc::clone(&shutdown))
        {
            log::warn!("[FIRMWARE] signal setup failed: {}", e);
        }
        let _ = signal_hook::flag::register(signal, Arc::clone(&shutdown));
    }

    let options = ServerOptions {
        pipe_dir: args.pipe_dir,
        beep_dir: args.beep_dir,
        audio_device: args.audio_device,
        tts: TtsConfig {
            command: args.tts_cmd,
            args: vec![
                "--model".to_string(),
                args.tts_model.display().to_string(),
                "--output-raw".to_string(),
            ],
        },
        input_device: args.input_device,
        volume: args.volume.min(100),
    };

    let mut server = match FirmwareServer::start(&options) {
        Ok(s) => s,
        Err(e) => {
            log::error!("[FIRMWARE] init failed: {}", e);
            std::process::exit(1);
        }
    };

    match server.run(&shutdown) {
        Ok(()) => log::info!("[FIRMWARE] clean shutdown"),
        Err(e) => {
            log::error!("[FIRMWARE] terminated: {}", e);
            std::process::exit(1);
        }
    }
}
