// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Firmware link: transport handshake, request sending, response routing.
//!
//! [`Comm::connect`] performs the startup sequence in the one order that
//! has no race: open the pipes, consume the ready-signal CONFIG packet
//! with a *direct blocking read*, and only then start the router thread.
//! Starting the router first would let it route the ready packet to a
//! thread already waiting on the CONFIG queue.

/// Per-type bounded response queues.
pub mod queues;
/// The single reader thread.
pub mod router;

pub use queues::ResponseQueues;
pub use router::Router;

use crate::{Result, SoftwareError};
use hampod_proto::{FifoTransport, Packet, PacketType, PipeWriter};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Timeout on keypad poll responses.
pub const KEYPAD_TIMEOUT: Duration = Duration::from_millis(200);
/// Timeout on slow-path responses (audio info, config echoes).
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// The software side's connection to the firmware.
pub struct Comm {
    writer: Mutex<Option<PipeWriter>>,
    queues: Arc<ResponseQueues>,
    router: Mutex<Option<Router>>,
    next_tag: AtomicU16,
}

impl Comm {
    /// Connect to the firmware and complete the handshake.
    pub fn connect(pipe_dir: &Path) -> Result<Self> {
        let mut transport = FifoTransport::open_software(pipe_dir)?;

        // Startup ordering invariant: the ready signal is consumed here,
        // before the router exists.
        let ready = transport.read_packet()?;
        if !ready.is_ready_signal() {
            return Err(SoftwareError::Proto(hampod_proto::Error::InvalidPayload(
                "first packet was not the ready signal",
            )));
        }
        log::info!("[COMM] firmware ready");

        let (reader, writer) = transport.split();
        let queues = Arc::new(ResponseQueues::new());
        let router = Router::start(reader, Arc::clone(&queues));

        Ok(Self {
            writer: Mutex::new(Some(writer)),
            queues,
            router: Mutex::new(Some(router)),
            next_tag: AtomicU16::new(1),
        })
    }

    /// Send a request without waiting for any response.
    pub fn send(&self, packet_type: PacketType, data: Vec<u8>) -> Result<u16> {
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
        let packet = Packet::new(packet_type, tag, data)?;
        self.write(&packet)?;
        Ok(tag)
    }

    /// Send a pre-built packet (used for payloads built by constructors).
    pub fn send_packet(&self, packet: &Packet) -> Result<()> {
        self.write(packet)
    }

    /// Allocate a correlation tag.
    pub fn allocate_tag(&self) -> u16 {
        self.next_tag.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a request and wait for the next response of the same type.
    ///
    /// Safe only under the one-in-flight-per-type discipline.
    pub fn request(
        &self,
        packet_type: PacketType,
        data: Vec<u8>,
        timeout: Duration,
    ) -> Result<Packet> {
        self.send(packet_type, data)?;
        self.queues.pop(packet_type, timeout)
    }

    #[must_use]
    pub fn queues(&self) -> &Arc<ResponseQueues> {
        &self.queues
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.queues.is_running()
    }

    /// Tear the link down: close our write end (EOFs the firmware, which
    /// in turn closes `fw_out` and unblocks the router), broadcast the
    /// queues, join the router.
    pub fn shutdown(&self) {
        self.queues.shutdown();
        *self.writer.lock() = None;
        if let Some(router) = self.router.lock().take() {
            router.stop();
        }
    }

    fn write(&self, packet: &Packet) -> Result<()> {
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or(SoftwareError::Shutdown)?;
        writer.write_packet(packet)?;
        Ok(())
    }
}

impl Drop for Comm {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal firmware stand-in: sends the ready signal, then echoes
    /// every request with a fixed payload per type.
    fn spawn_fake_firmware(dir: std::path::PathBuf) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            FifoTransport::create_fifos(&dir).unwrap();
            let mut t = FifoTransport::open_firmware(&dir).unwrap();
            t.write_packet(&Packet::ready()).unwrap();
            while let Ok(req) = t.read_packet() {
                let payload = match req.packet_type {
                    PacketType::Keypad => vec![b'-'],
                    PacketType::Audio => b"card=0 device=default".to_vec(),
                    _ => continue,
                };
                let reply = Packet::new(req.packet_type, req.tag, payload).unwrap();
                t.write_packet(&reply).unwrap();
            }
        })
    }

    #[test]
    fn test_handshake_consumes_ready_before_router() {
        let dir = tempfile::tempdir().unwrap();
        let fw_dir = dir.path().to_path_buf();
        // Pre-create so the software's open does not race the fixture.
        FifoTransport::create_fifos(&fw_dir).unwrap();
        let firmware = spawn_fake_firmware(fw_dir.clone());

        let comm = Comm::connect(&fw_dir).unwrap();
        // The ready packet was consumed by the handshake; the CONFIG
        // queue must be empty.
        assert!(matches!(
            comm.queues().pop(PacketType::Config, Duration::from_millis(100)),
            Err(crate::SoftwareError::Timeout)
        ));

        // Request/response round-trips through the router.
        let reply = comm
            .request(PacketType::Keypad, vec![b'r'], Duration::from_secs(2))
            .unwrap();
        assert_eq!(reply.data, vec![b'-']);

        let reply = comm
            .request(PacketType::Audio, vec![b'i'], Duration::from_secs(2))
            .unwrap();
        assert_eq!(reply.data, b"card=0 device=default");

        comm.shutdown();
        firmware.join().unwrap();
    }
}
