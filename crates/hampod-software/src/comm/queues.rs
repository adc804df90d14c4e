// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-type response queues.
//!
//! Three bounded FIFOs (KEYPAD, AUDIO, CONFIG) fed by the router thread
//! and drained by whichever component issued the matching request. Wire
//! order is preserved within a type. On overflow the *oldest* entry is
//! dropped so fresh data keeps flowing; the starved waiter sees a timeout
//! and takes its own retry path.

use crate::{Result, SoftwareError};
use hampod_proto::{Packet, PacketType};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Bound on each response queue.
const QUEUE_CAPACITY: usize = 16;

struct Slot {
    packets: Mutex<VecDeque<Packet>>,
    available: Condvar,
}

impl Slot {
    fn new() -> Self {
        Self {
            packets: Mutex::new(VecDeque::with_capacity(QUEUE_CAPACITY)),
            available: Condvar::new(),
        }
    }
}

/// The queue set shared by the router (producer) and all request issuers
/// (consumers).
pub struct ResponseQueues {
    keypad: Slot,
    audio: Slot,
    config: Slot,
    running: AtomicBool,
}

impl ResponseQueues {
    #[must_use]
    pub fn new() -> Self {
        Self {
            keypad: Slot::new(),
            audio: Slot::new(),
            config: Slot::new(),
            running: AtomicBool::new(true),
        }
    }

    fn slot(&self, packet_type: PacketType) -> Option<&Slot> {
        match packet_type {
            PacketType::Keypad => Some(&self.keypad),
            PacketType::Audio => Some(&self.audio),
            PacketType::Config => Some(&self.config),
            PacketType::Serial => None,
        }
    }

    /// Router-side: enqueue a received packet onto its type's queue,
    /// dropping the oldest entry when full.
    pub fn push(&self, packet: Packet) {
        let Some(slot) = self.slot(packet.packet_type) else {
            log::warn!("[ROUTER] no queue for {} packets; dropped", packet.packet_type);
            return;
        };
        {
            let mut packets = slot.packets.lock();
            if packets.len() >= QUEUE_CAPACITY {
                let dropped = packets.pop_front();
                log::warn!(
                    "[ROUTER] {} queue full; dropped oldest (tag {})",
                    packet.packet_type,
                    dropped.map_or(0, |p| p.tag)
                );
            }
            packets.push_back(packet);
        }
        slot.available.notify_one();
    }

    /// Consumer-side: wait up to `timeout` for the next packet of `packet_type`.
    pub fn pop(&self, packet_type: PacketType, timeout: Duration) -> Result<Packet> {
        let slot = self
            .slot(packet_type)
            .ok_or(SoftwareError::BadReply("SERIAL has no queue".into()))?;
        let mut packets = slot.packets.lock();
        loop {
            if let Some(packet) = packets.pop_front() {
                return Ok(packet);
            }
            if !self.running.load(Ordering::Acquire) {
                return Err(SoftwareError::Shutdown);
            }
            if slot.available.wait_for(&mut packets, timeout).timed_out() {
                // One more drain attempt in case the notify raced the wait.
                return match packets.pop_front() {
                    Some(packet) => Ok(packet),
                    None => {
                        if self.running.load(Ordering::Acquire) {
                            Err(SoftwareError::Timeout)
                        } else {
                            Err(SoftwareError::Shutdown)
                        }
                    }
                };
            }
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Wake every waiter with a shutdown error and stop accepting traffic.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        for slot in [&self.keypad, &self.audio, &self.config] {
            slot.available.notify_all();
        }
    }
}

impl Default for ResponseQueues {
    fn default() -> Self {
        Self::new()
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn packet(packet_type: PacketType, tag: u16) -> Packet {
        Packet::new(packet_type, tag, vec![]).unwrap()
    }

    #[test]
    fn test_fifo_order_within_type() {
        let queues = ResponseQueues::new();
        for tag in 0..5 {
            queues.push(packet(PacketType::Keypad, tag));
        }
        for tag in 0..5 {
            let p = queues.pop(PacketType::Keypad, Duration::from_millis(10)).unwrap();
            assert_eq!(p.tag, tag);
        }
    }

    #[test]
    fn test_types_do_not_cross() {
        let queues = ResponseQueues::new();
        queues.push(packet(PacketType::Audio, 1));
        assert!(matches!(
            queues.pop(PacketType::Keypad, Duration::from_millis(10)),
            Err(SoftwareError::Timeout)
        ));
        let p = queues.pop(PacketType::Audio, Duration::from_millis(10)).unwrap();
        assert_eq!(p.packet_type, PacketType::Audio);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let queues = ResponseQueues::new();
        for tag in 0..(QUEUE_CAPACITY as u16 + 3) {
            queues.push(packet(PacketType::Config, tag));
        }
        // Tags 0..3 were dropped; the queue starts at 3.
        let p = queues.pop(PacketType::Config, Duration::from_millis(10)).unwrap();
        assert_eq!(p.tag, 3);
    }

    #[test]
    fn test_shutdown_wakes_waiters() {
        let queues = Arc::new(ResponseQueues::new());
        let q = Arc::clone(&queues);
        let waiter = std::thread::spawn(move || q.pop(PacketType::Keypad, Duration::from_secs(10)));
        std::thread::sleep(Duration::from_millis(50));
        queues.shutdown();
        assert!(matches!(waiter.join().unwrap(), Err(SoftwareError::Shutdown)));
    }

    #[test]
    fn test_blocked_pop_sees_late_push() {
        let queues = Arc::new(ResponseQueues::new());
        let q = Arc::clone(&queues);
        let waiter = std::thread::spawn(move || q.pop(PacketType::Audio, Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(50));
        queues.push(packet(PacketType::Audio, 9));
        assert_eq!(waiter.join().unwrap().unwrap().tag, 9);
    }
}
