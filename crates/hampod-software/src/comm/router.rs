// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Firmware response router.
//!
//! Exactly one background thread reads `fw_out` and fans each packet into
//! the queue matching its type. Responses carry no correlation beyond the
//! type, so correctness rests on the callers' discipline: at most one
//! in-flight request per type at any time.
//!
//! The thread exits when the read fails (EOF when the firmware closes its
//! end) or the stop flag is observed after a read returns. Shutdown always
//! broadcasts the queues so no waiter is left sleeping.

use crate::comm::queues::ResponseQueues;
use hampod_proto::PipeReader;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Counters for router observability.
#[derive(Debug, Default)]
pub struct RouterMetrics {
    pub packets_routed: AtomicU64,
    pub protocol_errors: AtomicU64,
}

/// Owns the reader thread's lifecycle.
pub struct Router {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    pub metrics: Arc<RouterMetrics>,
}

impl Router {
    /// Spawn the reader thread. The ready signal must already have been
    /// consumed by a direct read before this is called; otherwise the
    /// router may hand it to whichever thread is waiting on the CONFIG
    /// queue instead of the main thread.
    pub fn start(mut reader: PipeReader, queues: Arc<ResponseQueues>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let metrics = Arc::new(RouterMetrics::default());

        let stop_clone = Arc::clone(&stop);
        let metrics_clone = Arc::clone(&metrics);
        let handle = std::thread::spawn(move || {
            loop {
                let packet = match reader.read_packet() {
                    Ok(p) => p,
                    Err(hampod_proto::Error::UnexpectedEof) => {
                        log::info!("[ROUTER] firmware closed the pipe");
                        break;
                    }
                    Err(e) => {
                        // Framing errors are unrecoverable on a byte stream.
                        log::error!("[ROUTER] fatal read error: {}", e);
                        metrics_clone.protocol_errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                };
                if stop_clone.load(Ordering::Relaxed) {
                    break;
                }
                log::debug!(
                    "[ROUTER] {} packet tag={} len={}",
                    packet.packet_type,
                    packet.tag,
                    packet.data.len()
                );
                metrics_clone.packets_routed.fetch_add(1, Ordering::Relaxed);
                queues.push(packet);
            }
            // Wake every waiter regardless of why we stopped.
            queues.shutdown();
            log::debug!("[ROUTER] thread exiting");
        });

        Self {
            stop,
            handle: Some(handle),
            metrics,
        }
    }

    /// Request the thread to stop and join it. The blocking read is broken
    /// by the firmware closing its write end; callers tear the transport
    /// down first.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
