// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Named-FIFO transport between the firmware and software processes.
//!
//! The firmware owns the two FIFOs:
//!
//! - `fw_in`  - software -> firmware (requests)
//! - `fw_out` - firmware -> software (responses, key events, ready signal)
//!
//! Open order matters. FIFO opens block until the opposite end exists, so
//! the handshake is fixed: the software opens `fw_out` for reading first
//! (unblocking the firmware's write-end open), then opens `fw_in` for
//! writing with a non-blocking retry loop since the firmware may not have
//! reached its read-end open yet. Once the write end is connected the
//! descriptor is reverted to blocking mode.
//!
//! Reads and writes are always one full header followed by `data_len`
//! payload bytes; a short read means the peer died and tears the
//! connection down.

use crate::packet::{Packet, HEADER_LEN};
use crate::{Error, Result};
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// FIFO carrying software -> firmware requests.
pub const FIFO_FW_IN: &str = "fw_in";
/// FIFO carrying firmware -> software responses.
pub const FIFO_FW_OUT: &str = "fw_out";

/// How long the software retries the `fw_in` write-end open before giving up.
const WRITE_OPEN_RETRY_INTERVAL: Duration = Duration::from_millis(50);
const WRITE_OPEN_RETRY_LIMIT: u32 = 100;

/// Which process this end of the transport belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeEnd {
    Firmware,
    Software,
}

/// Reading half of a connected transport. Sequential framed reads only;
/// exactly one thread (the router, or the firmware request loop) owns it.
#[derive(Debug)]
pub struct PipeReader {
    file: File,
}

/// Writing half of a connected transport. Callers serialize access
/// themselves (the software wraps it in a mutex).
#[derive(Debug)]
pub struct PipeWriter {
    file: File,
}

/// A connected bidirectional transport over the two FIFOs.
#[derive(Debug)]
pub struct FifoTransport {
    reader: PipeReader,
    writer: PipeWriter,
    end: PipeEnd,
}

impl FifoTransport {
    /// Create both FIFOs under `dir` (firmware side, before opening).
    ///
    /// Existing FIFOs are reused; a regular file squatting on the path is
    /// an error rather than something to silently delete.
    pub fn create_fifos(dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(Error::Io)?;
        for name in [FIFO_FW_IN, FIFO_FW_OUT] {
            let path = dir.join(name);
            match mkfifo(&path) {
                Ok(()) => log::debug!("[PIPE] created fifo {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let meta = std::fs::metadata(&path).map_err(Error::Io)?;
                    if !is_fifo(&meta) {
                        return Err(Error::Io(std::io::Error::other(format!(
                            "{} exists and is not a FIFO",
                            path.display()
                        ))));
                    }
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(())
    }

    /// Firmware-side connect: write end of `fw_out` first (blocks until the
    /// software has opened its read end), then read end of `fw_in`.
    pub fn open_firmware(dir: &Path) -> Result<Self> {
        let out_path = dir.join(FIFO_FW_OUT);
        let in_path = dir.join(FIFO_FW_IN);

        log::info!("[PIPE] waiting for software on {}", out_path.display());
        let writer = OpenOptions::new()
            .write(true)
            .open(&out_path)
            .map_err(Error::Io)?;
        let reader = OpenOptions::new()
            .read(true)
            .open(&in_path)
            .map_err(Error::Io)?;
        log::info!("[PIPE] firmware transport connected");

        Ok(Self {
            reader: PipeReader { file: reader },
            writer: PipeWriter { file: writer },
            end: PipeEnd::Firmware,
        })
    }

    /// Software-side connect: read end of `fw_out` first, then the write
    /// end of `fw_in` with the non-blocking retry loop.
    pub fn open_software(dir: &Path) -> Result<Self> {
        let out_path = dir.join(FIFO_FW_OUT);
        let in_path = dir.join(FIFO_FW_IN);

        log::info!("[PIPE] waiting for firmware on {}", out_path.display());
        let reader = OpenOptions::new()
            .read(true)
            .open(&out_path)
            .map_err(Error::Io)?;

        let writer = open_write_with_retry(&in_path)?;
        log::info!("[PIPE] software transport connected");

        Ok(Self {
            reader: PipeReader { file: reader },
            writer: PipeWriter { file: writer },
            end: PipeEnd::Software,
        })
    }

    #[must_use]
    pub fn end(&self) -> PipeEnd {
        self.end
    }

    /// Split into independently-owned halves (router thread takes the
    /// reader, request senders share the writer).
    #[must_use]
    pub fn split(self) -> (PipeReader, PipeWriter) {
        (self.reader, self.writer)
    }

    pub fn read_packet(&mut self) -> Result<Packet> {
        self.reader.read_packet()
    }

    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.writer.write_packet(packet)
    }
}

impl PipeReader {
    /// Read one full packet. Blocks until the header arrives; EOF before a
    /// complete frame is fatal for the stream.
    pub fn read_packet(&mut self) -> Result<Packet> {
        let mut header = [0u8; HEADER_LEN];
        self.file.read_exact(&mut header)?;
        let (packet_type, data_len, tag) = Packet::decode_header(&header)?;
        let mut data = vec![0u8; data_len];
        self.file.read_exact(&mut data)?;
        Packet::new(packet_type, tag, data)
    }
}

impl PipeWriter {
    /// Write one full packet (header + payload) in a single buffer so the
    /// frame is not interleaved with another writer's bytes at the pipe
    /// level for frames under PIPE_BUF.
    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let bytes = packet.encode();
        self.file.write_all(&bytes)?;
        self.file.flush()?;
        Ok(())
    }
}

/// Open `path` for writing, retrying while no reader exists (ENXIO), then
/// revert the descriptor to blocking mode.
fn open_write_with_retry(path: &Path) -> Result<File> {
    for attempt in 0..WRITE_OPEN_RETRY_LIMIT {
        match OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
        {
            Ok(file) => {
                set_blocking(&file)?;
                if attempt > 0 {
                    log::debug!(
                        "[PIPE] write end of {} connected after {} retries",
                        path.display(),
                        attempt
                    );
                }
                return Ok(file);
            }
            Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                // No reader yet; firmware is still initializing.
                std::thread::sleep(WRITE_OPEN_RETRY_INTERVAL);
            }
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Err(Error::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!("no reader appeared on {}", path.display()),
    )))
}

/// Clear O_NONBLOCK on an open descriptor.
fn set_blocking(file: &File) -> Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: fd is a valid open descriptor owned by `file`.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        if libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) < 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
    }
    Ok(())
}

fn mkfifo(path: &Path) -> std::io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|_| std::io::Error::other("path contains NUL"))?;
    // SAFETY: c_path is a valid NUL-terminated string.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

fn is_fifo(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::FileTypeExt;
    meta.file_type().is_fifo()
}

/// Resolve the default pipe directory (`HAMPOD_PIPE_DIR` or `/tmp/hampod`).
#[must_use]
pub fn default_pipe_dir() -> PathBuf {
    std::env::var_os("HAMPOD_PIPE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp/hampod"))
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;
    use std::thread;

    #[test]
    fn test_handshake_and_framed_exchange() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_path_buf();
        FifoTransport::create_fifos(&dir_path).unwrap();

        let fw_dir = dir_path.clone();
        let firmware = thread::spawn(move || {
            let mut t = FifoTransport::open_firmware(&fw_dir).unwrap();
            // Ready signal first, then echo one request back.
            t.write_packet(&Packet::ready()).unwrap();
            let req = t.read_packet().unwrap();
            let reply = Packet::new(req.packet_type, req.tag, req.data.clone()).unwrap();
            t.write_packet(&reply).unwrap();
        });

        let mut t = FifoTransport::open_software(&dir_path).unwrap();
        let ready = t.read_packet().unwrap();
        assert!(ready.is_ready_signal());

        let req = Packet::new(PacketType::Keypad, 42, b"r".to_vec()).unwrap();
        t.write_packet(&req).unwrap();
        let reply = t.read_packet().unwrap();
        assert_eq!(reply.tag, 42);
        assert_eq!(reply.data, b"r");

        firmware.join().unwrap();
    }

    #[test]
    fn test_create_fifos_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        FifoTransport::create_fifos(dir.path()).unwrap();
        FifoTransport::create_fifos(dir.path()).unwrap();
    }

    #[test]
    fn test_create_fifos_rejects_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FIFO_FW_IN), b"not a fifo").unwrap();
        assert!(FifoTransport::create_fifos(dir.path()).is_err());
    }

    #[test]
    fn test_eof_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().to_path_buf();
        FifoTransport::create_fifos(&dir_path).unwrap();

        let fw_dir = dir_path.clone();
        let firmware = thread::spawn(move || {
            let t = FifoTransport::open_firmware(&fw_dir).unwrap();
            drop(t); // close both ends immediately
        });

        let mut t = FifoTransport::open_software(&dir_path).unwrap();
        firmware.join().unwrap();
        assert!(matches!(t.read_packet(), Err(Error::UnexpectedEof)));
    }
}
