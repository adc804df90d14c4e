// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! USB bus reset for a stalled serial adapter.
//!
//! When the radio powers on after its cable was plugged in, the adapter
//! can be left in a stale enumeration where opening the port fails even
//! though the device node exists. A `USBDEVFS_RESET` ioctl against the
//! bus/device node recovers it.
//!
//! The bus/device pair is resolved through sysfs: the tty's `device`
//! symlink is walked upward until a directory carrying `busnum` and
//! `devnum` appears.

use crate::{Result, SoftwareError};
use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// `_IO('U', 20)` from linux/usbdevice_fs.h.
const USBDEVFS_RESET: libc::c_ulong = 0x5514;

/// Reset the USB device behind a serial node like `/dev/ttyUSB0`.
pub fn reset_usb_device(serial_device: &Path) -> Result<()> {
    let (bus, dev) = resolve_bus_device(serial_device)?;
    let node = PathBuf::from(format!("/dev/bus/usb/{:03}/{:03}", bus, dev));
    log::info!(
        "[RADIO] issuing USB reset for {} via {}",
        serial_device.display(),
        node.display()
    );

    let file = OpenOptions::new().write(true).open(&node)?;
    // SAFETY: fd is valid and USBDEVFS_RESET takes no argument.
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), USBDEVFS_RESET, 0) };
    if rc < 0 {
        return Err(SoftwareError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

/// Walk sysfs from the tty node to the owning USB device's bus/device
/// numbers.
fn resolve_bus_device(serial_device: &Path) -> Result<(u32, u32)> {
    let name = serial_device
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SoftwareError::Config("bad serial device path".into()))?;
    let sys_link = PathBuf::from(format!("/sys/class/tty/{}/device", name));
    let mut dir = match std::fs::canonicalize(&sys_link) {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SoftwareError::NotFound(sys_link.display().to_string()));
        }
        Err(e) => return Err(SoftwareError::Io(e)),
    };

    // The usb-serial interface dir sits below the USB device dir; walk up
    // until busnum/devnum exist.
    for _ in 0..6 {
        let busnum = dir.join("busnum");
        let devnum = dir.join("devnum");
        if busnum.exists() && devnum.exists() {
            let bus = read_sysfs_u32(&busnum)?;
            let dev = read_sysfs_u32(&devnum)?;
            return Ok((bus, dev));
        }
        if !dir.pop() {
            break;
        }
    }
    Err(SoftwareError::Config(format!(
        "no USB ancestor for {}",
        serial_device.display()
    )))
}

fn read_sysfs_u32(path: &Path) -> Result<u32> {
    let text = std::fs::read_to_string(path)?;
    text.trim()
        .parse()
        .map_err(|_| SoftwareError::Config(format!("unparsable sysfs value in {}", path.display())))
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_rejects_nonexistent_tty() {
        assert!(matches!(
            resolve_bus_device(Path::new("/dev/ttyUSB-none")),
            Err(SoftwareError::NotFound(_))
        ));
    }
}
