// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Speech queue.
//!
//! Producers (the modes, the radio callbacks) enqueue announcements; a
//! worker thread drains the queue and issues fire-and-forget AUDIO
//! requests. The firmware audio worker is the single serializer, so no
//! acknowledgement is awaited here.
//!
//! Interrupt semantics are split on purpose: [`Speaker::interrupt`] cuts
//! the *currently playing* utterance (every audio request interrupts
//! firmware-side; an empty speak is a pure interrupt), while
//! [`Speaker::clear_pending`] drops queued-but-unsent items without
//! touching the current one. Key beeps use the former so speech yields
//! instantly, without discarding the announcement the application is
//! about to queue.

use crate::comm::Comm;
use crate::Result;
use hampod_proto::{AudioRequest, BeepKind, Packet};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Default queue capacity.
const SPEECH_QUEUE_CAPACITY: usize = 32;
/// Pushback interval while the queue is full.
const PUSHBACK_WAIT: Duration = Duration::from_millis(100);

/// What the modes need from the announcement path. Implemented by
/// [`SpeechQueue`] in production and by captured fakes in tests.
pub trait Speaker: Send + Sync {
    /// Queue text for synthesis.
    fn say(&self, text: &str);
    /// Queue characters for spell-out.
    fn spell(&self, text: &str);
    /// Queue a WAV file for playback.
    fn play_file(&self, path: &str);
    /// Fire-and-forget beep; bypasses the queue.
    fn beep(&self, kind: BeepKind);
    /// Cut the currently playing utterance; queued items still follow.
    fn interrupt(&self);
    /// Drop queued items; the current utterance keeps playing.
    fn clear_pending(&self);
}

enum SpeechItem {
    Say(String),
    Spell(String),
    Play(String),
}

struct Queue {
    items: Mutex<VecDeque<SpeechItem>>,
    space: Condvar,
    available: Condvar,
    running: AtomicBool,
}

type SendFn = dyn Fn(Packet) + Send + Sync;

/// The production speaker: bounded queue + worker thread.
pub struct SpeechQueue {
    queue: Arc<Queue>,
    send: Arc<SendFn>,
    allocate_tag: Arc<dyn Fn() -> u16 + Send + Sync>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SpeechQueue {
    /// Wire the queue to a live firmware link.
    pub fn new(comm: Arc<Comm>) -> Self {
        let send_comm = Arc::clone(&comm);
        let send: Arc<SendFn> = Arc::new(move |packet| {
            if let Err(e) = send_comm.send_packet(&packet) {
                log::error!("[SPEECH] send failed: {}", e);
            }
        });
        let tag_comm = comm;
        Self::with_sender(send, Arc::new(move || tag_comm.allocate_tag()))
    }

    /// Construct over an arbitrary packet sink (the seam the tests use).
    pub fn with_sender(
        send: Arc<SendFn>,
        allocate_tag: Arc<dyn Fn() -> u16 + Send + Sync>,
    ) -> Self {
        let queue = Arc::new(Queue {
            items: Mutex::new(VecDeque::with_capacity(SPEECH_QUEUE_CAPACITY)),
            space: Condvar::new(),
            available: Condvar::new(),
            running: AtomicBool::new(true),
        });

        let worker_queue = Arc::clone(&queue);
        let worker_send = Arc::clone(&send);
        let worker_tag = Arc::clone(&allocate_tag);
        let worker = std::thread::spawn(move || {
            log::debug!("[SPEECH] worker started");
            loop {
                let item = {
                    let mut items = worker_queue.items.lock();
                    loop {
                        if let Some(item) = items.pop_front() {
                            worker_queue.space.notify_one();
                            break item;
                        }
                        if !worker_queue.running.load(Ordering::Acquire) {
                            log::debug!("[SPEECH] worker exiting");
                            return;
                        }
                        let _ = worker_queue.available.wait_for(&mut items, PUSHBACK_WAIT);
                    }
                };
                let request = match item {
                    SpeechItem::Say(text) => AudioRequest::Speak(text),
                    SpeechItem::Spell(text) => AudioRequest::Spell(text),
                    SpeechItem::Play(path) => AudioRequest::PlayFile(path),
                };
                match request.encode(worker_tag()) {
                    Ok(packet) => worker_send(packet),
                    Err(e) => log::warn!("[SPEECH] unencodable item: {}", e),
                }
            }
        });

        Self {
            queue,
            send,
            allocate_tag,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Stop the worker after draining nothing further.
    pub fn shutdown(&self) {
        self.queue.running.store(false, Ordering::Release);
        self.queue.available.notify_all();
        self.queue.space.notify_all();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    /// Number of queued (unsent) items.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.items.lock().len()
    }

    /// Blocking enqueue with the 100 ms pushback re-check.
    fn enqueue(&self, item: SpeechItem) -> Result<()> {
        let mut items = self.queue.items.lock();
        loop {
            if !self.queue.running.load(Ordering::Acquire) {
                return Err(crate::SoftwareError::Shutdown);
            }
            if items.len() < SPEECH_QUEUE_CAPACITY {
                items.push_back(item);
                self.queue.available.notify_one();
                return Ok(());
            }
            let _ = self.queue.space.wait_for(&mut items, PUSHBACK_WAIT);
        }
    }

    fn send_now(&self, request: &AudioRequest) {
        match request.encode((self.allocate_tag)()) {
            Ok(packet) => (self.send)(packet),
            Err(e) => log::warn!("[SPEECH] unencodable request: {}", e),
        }
    }
}

impl Speaker for SpeechQueue {
    fn say(&self, text: &str) {
        if let Err(e) = self.enqueue(SpeechItem::Say(text.to_string())) {
            log::warn!("[SPEECH] say dropped: {}", e);
        }
    }

    fn spell(&self, text: &str) {
        if let Err(e) = self.enqueue(SpeechItem::Spell(text.to_string())) {
            log::warn!("[SPEECH] spell dropped: {}", e);
        }
    }

    fn play_file(&self, path: &str) {
        if let Err(e) = self.enqueue(SpeechItem::Play(path.to_string())) {
            log::warn!("[SPEECH] play dropped: {}", e);
        }
    }

    fn beep(&self, kind: BeepKind) {
        // Straight to the wire; the firmware interrupts current playback
        // and plays the beep before anything queued after it.
        self.send_now(&AudioRequest::Beep(kind));
    }

    fn interrupt(&self) {
        // An empty utterance reaches the firmware's interrupt path and
        // produces no sound of its own.
        self.send_now(&AudioRequest::Speak(String::new()));
    }

    fn clear_pending(&self) {
        let dropped = {
            let mut items = self.queue.items.lock();
            let n = items.len();
            items.clear();
            n
        };
        self.queue.space.notify_all();
        if dropped > 0 {
            log::debug!("[SPEECH] cleared {} pending items", dropped);
        }
    }
}

impl Drop for SpeechQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ===== Tests =====

#[cfg(test)]
mod tests {
    use super::*;
    use hampod_proto::PacketType;
    use std::sync::atomic::AtomicU16;

    fn capturing_queue() -> (SpeechQueue, Arc<Mutex<Vec<Packet>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sent_clone = Arc::clone(&sent);
        let tag = Arc::new(AtomicU16::new(1));
        let queue = SpeechQueue::with_sender(
            Arc::new(move |p| sent_clone.lock().push(p)),
            Arc::new(move || tag.fetch_add(1, Ordering::Relaxed)),
        );
        (queue, sent)
    }

    fn wait_until(sent: &Mutex<Vec<Packet>>, count: usize) {
        for _ in 0..200 {
            if sent.lock().len() >= count {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("worker never sent {} packets", count);
    }

    #[test]
    fn test_say_reaches_wire_in_order() {
        let (queue, sent) = capturing_queue();
        queue.say("one");
        queue.say("two");
        wait_until(&sent, 2);
        let sent = sent.lock();
        assert_eq!(sent[0].packet_type, PacketType::Audio);
        assert_eq!(sent[0].data, b"done\0");
        assert_eq!(sent[1].data, b"dtwo\0");
    }

    #[test]
    fn test_beep_bypasses_queue() {
        let (queue, sent) = capturing_queue();
        queue.beep(BeepKind::Hold);
        // No worker involvement; the packet is already there.
        let sent = sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data, vec![b'b', b'h']);
    }

    #[test]
    fn test_interrupt_is_empty_speak() {
        let (queue, sent) = capturing_queue();
        queue.interrupt();
        let sent = sent.lock();
        assert_eq!(sent[0].data, vec![b'd', 0]);
    }

    #[test]
    fn test_clear_pending_drops_unsent() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sent_clone = Arc::clone(&sent);
        let gate = Arc::new(AtomicBool::new(false));
        let gate_clone = Arc::clone(&gate);
        let tag = Arc::new(AtomicU16::new(1));
        let queue = SpeechQueue::with_sender(
            Arc::new(move |p| {
                // Stall the worker on the first item so later items stay queued.
                while !gate_clone.load(Ordering::Acquire) {
                    std::thread::sleep(Duration::from_millis(1));
                }
                sent_clone.lock().push(p);
            }),
            Arc::new(move || tag.fetch_add(1, Ordering::Relaxed)),
        );
        queue.say("current");
        std::thread::sleep(Duration::from_millis(30)); // worker picks it up
        queue.say("stale-1");
        queue.say("stale-2");
        queue.clear_pending();
        assert_eq!(queue.pending(), 0);
        gate.store(true, Ordering::Release);
        wait_until(&sent, 1);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(sent.lock().len(), 1); // only the in-flight item went out
    }

    #[test]
    fn test_shutdown_fails_enqueue() {
        let (queue, _sent) = capturing_queue();
        queue.shutdown();
        assert!(queue.enqueue(SpeechItem::Say("late".into())).is_err());
    }
}
