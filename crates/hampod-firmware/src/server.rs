// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Firmware request loop.
//!
//! Single reader on `fw_in`, demultiplexing requests to the keypad HAL,
//! the audio worker and the TTS bridge. The ready-signal CONFIG packet is
//! written exactly once, after every subsystem is up and before the first
//! request is read.
//!
//! Audio requests are two-phase: the request loop interrupts whatever is
//! currently audible, then hands the job to the audio worker thread. The
//! worker is the single serializer for the PCM device, so playback order
//! equals request order.

use crate::audio::{wav, AudioEngine, BeepCache, PcmDevice};
use crate::keypad::{EvdevKeySource, KeySource, KeypadHal, NullKeySource};
use crate::tts::{TtsBridge, TtsConfig};
use crate::Result;
use crossbeam::channel::{self, Receiver, Sender};
use hampod_proto::{AudioRequest, BeepKind, FifoTransport, Packet, PacketType};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Everything the firmware needs to come up.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub pipe_dir: PathBuf,
    pub beep_dir: PathBuf,
    pub audio_device: String,
    pub tts: TtsConfig,
    /// Input event node for the keypad; `None` runs keypad-less.
    pub input_device: Option<PathBuf>,
    /// Initial output volume (0..=100).
    pub volume: u8,
}

/// One unit of work for the audio worker.
enum AudioJob {
    Speak(String),
    Spell(String),
    PlayFile(String),
    Beep(BeepKind),
    SetSpeed(u16),
    Shutdown,
}

/// The firmware process core.
pub struct FirmwareServer {
    engine: Arc<AudioEngine>,
    keypad: KeypadHal,
    jobs: Sender<AudioJob>,
    worker: Option<JoinHandle<()>>,
    transport: FifoTransport,
}

impl FirmwareServer {
    /// Bring up all subsystems and connect the pipes. Blocks until the
    /// software process opens its end.
    pub fn start(options: &ServerOptions) -> Result<Self> {
        let pcm = Arc::new(PcmDevice::open(&options.audio_device)?);
        let beeps = BeepCache::load(&options.beep_dir)?;
        let engine = Arc::new(AudioEngine::new(pcm, beeps, options.volume));

        let mut tts = TtsBridge::new(options.tts.clone());
        tts.warm_up()?;

        let source: Box<dyn KeySource> = match &options.input_device {
            Some(path) => Box::new(EvdevKeySource::open(path)?),
            None => {
                log::warn!("[KEYPAD] no input device configured; keypad disabled");
                Box::new(NullKeySource)
            }
        };
        let keypad = KeypadHal::start(source);

        Self::with_parts(engine, tts, keypad, &options.pipe_dir)
    }

    /// Assemble a server from prebuilt subsystems and connect the pipes.
    pub fn with_parts(
        engine: Arc<AudioEngine>,
        tts: TtsBridge,
        keypad: KeypadHal,
        pipe_dir: &std::path::Path,
    ) -> Result<Self> {
        let (jobs, job_rx) = channel::unbounded();
        let worker = spawn_audio_worker(job_rx, Arc::clone(&engine), tts);

        FifoTransport::create_fifos(pipe_dir)?;
        let mut transport = FifoTransport::open_firmware(pipe_dir)?;

        // Ready signal: exactly one CONFIG "R", before any request traffic.
        transport.write_packet(&Packet::ready())?;
        log::info!("[FIRMWARE] initialized; ready signal sent");

        Ok(Self {
            engine,
            keypad,
            jobs,
            worker: Some(worker),
            transport,
        })
    }

    /// Serve requests until the peer disconnects, a protocol violation
    /// occurs, or `shutdown` is raised.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        while !shutdown.load(Ordering::Relaxed) {
            let request = match self.transport.read_packet() {
                Ok(p) => p,
                Err(hampod_proto::Error::UnexpectedEof) => {
                    log::info!("[FIRMWARE] software closed the pipe; shutting down");
                    break;
                }
                Err(e) => {
                    // Framing is unrecoverable on a byte stream.
                    log::error!("[FIRMWARE] fatal transport error: {}", e);
                    return Err(e.into());
                }
            };
            self.dispatch(request)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, request: Packet) -> Result<()> {
        match request.packet_type {
            PacketType::Keypad => self.handle_keypad(&request),
            PacketType::Audio => self.handle_audio(&request),
            PacketType::Config => {
                self.handle_config(&request);
                Ok(())
            }
            PacketType::Serial => {
                log::warn!("[FIRMWARE] SERIAL passthrough not supported; dropping");
                Ok(())
            }
        }
    }

    fn handle_keypad(&mut self, request: &Packet) -> Result<()> {
        if request.data.first() != Some(&b'r') {
            log::warn!("[FIRMWARE] unknown KEYPAD request {:?}", request.data.first());
            return Ok(());
        }
        let symbol = self.keypad.current_symbol();
        let reply = Packet::new(PacketType::Keypad, request.tag, vec![symbol as u8])?;
        self.transport.write_packet(&reply)?;
        Ok(())
    }

    fn handle_audio(&mut self, request: &Packet) -> Result<()> {
        let parsed = match AudioRequest::decode(&request.data) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("[FIRMWARE] bad AUDIO payload: {}", e);
                return Ok(());
            }
        };
        match parsed {
            AudioRequest::Info => {
                // Synchronous reply; nothing audible happens.
                let info = format!(
                    "card={} device={}",
                    self.engine.sink().card(),
                    self.engine.sink().name()
                );
                let reply = Packet::new(PacketType::Audio, request.tag, info.into_bytes())?;
                self.transport.write_packet(&reply)?;
            }
            AudioRequest::SetSpeed(speed) => {
                self.enqueue(AudioJob::SetSpeed(speed));
            }
            AudioRequest::Speak(text) => {
                self.engine.interrupt();
                self.enqueue(AudioJob::Speak(text));
            }
            AudioRequest::Spell(chars) => {
                self.engine.interrupt();
                self.enqueue(AudioJob::Spell(chars));
            }
            AudioRequest::PlayFile(path) => {
                self.engine.interrupt();
                self.enqueue(AudioJob::PlayFile(path));
            }
            AudioRequest::Beep(kind) => {
                self.engine.interrupt();
                self.enqueue(AudioJob::Beep(kind));
            }
        }
        Ok(())
    }

    fn handle_config(&mut self, request: &Packet) {
        match request.data.split_first() {
            Some((b'v', rest)) => {
                let arg = String::from_utf8_lossy(rest);
                match arg.trim_end_matches('\0').parse::<u8>() {
                    Ok(volume) => self.engine.set_volume(volume),
                    Err(_) => log::warn!("[FIRMWARE] bad volume payload {:?}", arg),
                }
            }
            other => {
                log::warn!("[FIRMWARE] unknown CONFIG request {:?}", other.map(|(b, _)| b));
            }
        }
    }

    fn enqueue(&self, job: AudioJob) {
        if self.jobs.send(job).is_err() {
            log::error!("[FIRMWARE] audio worker gone; job dropped");
        }
    }
}

impl Drop for FirmwareServer {
    fn drop(&mut self) {
        let _ = self.jobs.send(AudioJob::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        // Dropping the transport closes fw_out, which EOFs the software
        // router and lets it terminate cleanly.
    }
}

fn spawn_audio_worker(
    jobs: Receiver<AudioJob>,
    engine: Arc<AudioEngine>,
    mut tts: TtsBridge,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        log::debug!("[AUDIO] worker started");
        while let Ok(job) = jobs.recv() {
            let outcome = match job {
                AudioJob::Shutdown => break,
                AudioJob::Speak(text) => tts.speak(&text, &engine),
                AudioJob::Spell(chars) => tts.spell(&chars, &engine),
                AudioJob::Beep(kind) => engine.play_beep(kind),
                AudioJob::PlayFile(path) => wav::play_wav(&engine, std::path::Path::new(&path)),
                AudioJob::SetSpeed(speed) => {
                    tts.set_speed(speed);
                    Ok(())
                }
            };
            if let Err(e) = outcome {
                // A failed utterance must not take the worker down.
                log::error!("[AUDIO] job failed: {}", e);
            }
        }
        log::debug!("[AUDIO] worker exiting");
    })
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tests::{test_cache, MemorySink};
    use std::time::Duration;

    /// Full request-loop pass over real FIFOs: ready signal, keypad read,
    /// volume change, a spoken utterance (with `cat` standing in for the
    /// synth, echoing text bytes back as PCM), and the info query.
    #[test]
    fn test_request_loop_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let pipe_dir = dir.path().to_path_buf();
        FifoTransport::create_fifos(&pipe_dir).unwrap();

        let sink = Arc::new(MemorySink::new());
        let engine = Arc::new(AudioEngine::new(
            Arc::clone(&sink) as Arc<dyn crate::audio::PcmSink>,
            test_cache(),
            80,
        ));
        let tts = TtsBridge::new(TtsConfig {
            command: "/bin/cat".into(),
            args: vec![],
        });
        let keypad = KeypadHal::start(Box::new(NullKeySource));

        let software = std::thread::spawn({
            let pipe_dir = pipe_dir.clone();
            move || {
                let mut t = FifoTransport::open_software(&pipe_dir).unwrap();
                let ready = t.read_packet().unwrap();
                assert!(ready.is_ready_signal());

                t.write_packet(&Packet::new(PacketType::Keypad, 1, vec![b'r']).unwrap())
                    .unwrap();
                let reply = t.read_packet().unwrap();
                assert_eq!(reply.tag, 1);
                assert_eq!(reply.data, vec![b'-']);

                t.write_packet(&Packet::new(PacketType::Config, 2, b"v55".to_vec()).unwrap())
                    .unwrap();
                t.write_packet(&AudioRequest::Speak("hello".into()).encode(3).unwrap())
                    .unwrap();

                t.write_packet(&AudioRequest::Info.encode(4).unwrap()).unwrap();
                let info = t.read_packet().unwrap();
                assert_eq!(info.tag, 4);
                assert!(info.data.starts_with(b"card="));
                // Dropping the transport EOFs the server and ends its run loop.
            }
        });

        let mut server =
            FirmwareServer::with_parts(Arc::clone(&engine), tts, keypad, &pipe_dir).unwrap();
        let shutdown = AtomicBool::new(false);
        server.run(&shutdown).unwrap();
        software.join().unwrap();

        // The audio worker is asynchronous; give the speak job time to land.
        for _ in 0..200 {
            if !sink.written.lock().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(!sink.written.lock().is_empty(), "utterance never reached the sink");
        assert_eq!(engine.volume(), 55);
        drop(server); // joins the worker
    }
}
