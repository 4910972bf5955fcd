//! Single-slot transmit discipline. One rendered frame may be in flight
//! at a time: foreground sends fail `Busy` while the slot is taken,
//! background frames wait in a small queue that the control thread pumps.

use std::collections::VecDeque;
use tracing::{debug, trace};

use super::audio::LinkShared;
use crate::error::{LinkError, Result};
use crate::utils::consts::TX_QUEUE_CAP;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Chat,
    /// Heartbeats, adverts, membership and key frames.
    Control,
}

struct Pending {
    samples: Vec<f32>,
    kind: FrameKind,
}

pub struct TxScheduler {
    shared: LinkShared,
    queue: VecDeque<Pending>,
}

impl TxScheduler {
    pub fn new(shared: LinkShared) -> Self {
        Self {
            shared,
            queue: VecDeque::new(),
        }
    }

    /// Foreground path: play immediately or report the busy slot.
    pub fn send_now(&mut self, samples: Vec<f32>) -> Result<()> {
        if self.shared.is_playing() {
            return Err(LinkError::Busy);
        }
        self.shared.begin_playback(samples);
        Ok(())
    }

    /// Background path: queue for the next idle slot. Overflow drops the
    /// oldest non-chat frame first, then the oldest chat frame.
    pub fn enqueue(&mut self, samples: Vec<f32>, kind: FrameKind) {
        if self.queue.len() >= TX_QUEUE_CAP {
            let victim = self
                .queue
                .iter()
                .position(|pending| pending.kind == FrameKind::Control)
                .unwrap_or(0);
            self.queue.remove(victim);
            debug!("transmit queue full, dropped a queued frame");
        }
        self.queue.push_back(Pending { samples, kind });
    }

    /// Start the next queued frame when the slot is idle. A busy channel
    /// defers control frames one tick; queued chat is not held back.
    pub fn pump(&mut self, channel_busy: bool) {
        if self.shared.is_playing() {
            return;
        }
        let Some(next) = self.queue.front() else {
            return;
        };
        if channel_busy && next.kind == FrameKind::Control {
            trace!("channel busy, deferring background frame");
            return;
        }

        let pending = self.queue.pop_front().unwrap();
        self.shared.begin_playback(pending.samples);
    }

    /// Drop everything still queued; an in-flight frame completes on its
    /// own.
    pub fn drain(&mut self) {
        if !self.queue.is_empty() {
            debug!("dropping {} queued frames", self.queue.len());
            self.queue.clear();
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> (TxScheduler, LinkShared) {
        let shared = LinkShared::new();
        (TxScheduler::new(shared.clone()), shared)
    }

    #[test]
    fn test_send_now_busy_while_playing() {
        let (mut tx, shared) = scheduler();

        tx.send_now(vec![0.0; 16]).unwrap();
        assert!(shared.is_playing());
        assert!(matches!(tx.send_now(vec![0.0; 16]), Err(LinkError::Busy)));
    }

    #[test]
    fn test_pump_starts_queued_frame_when_idle() {
        let (mut tx, shared) = scheduler();

        tx.enqueue(vec![0.0; 16], FrameKind::Control);
        assert!(!shared.is_playing());

        tx.pump(false);
        assert!(shared.is_playing());
        assert_eq!(tx.queued(), 0);
    }

    #[test]
    fn test_pump_defers_control_on_busy_channel() {
        let (mut tx, shared) = scheduler();

        tx.enqueue(vec![0.0; 16], FrameKind::Control);
        tx.pump(true);
        assert!(!shared.is_playing());
        assert_eq!(tx.queued(), 1);

        // Chat at the head is not deferred.
        let (mut tx, shared) = scheduler();
        tx.enqueue(vec![0.0; 16], FrameKind::Chat);
        tx.pump(true);
        assert!(shared.is_playing());
    }

    #[test]
    fn test_overflow_drops_oldest_control_first() {
        let (mut tx, _shared) = scheduler();

        tx.enqueue(vec![0.0; 1], FrameKind::Chat);
        tx.enqueue(vec![0.0; 2], FrameKind::Control);
        for i in 0..TX_QUEUE_CAP - 2 {
            tx.enqueue(vec![0.0; 3 + i], FrameKind::Chat);
        }
        assert_eq!(tx.queued(), TX_QUEUE_CAP);

        // The lone control frame is the overflow victim; chat survives.
        tx.enqueue(vec![0.0; 99], FrameKind::Chat);
        assert_eq!(tx.queued(), TX_QUEUE_CAP);
        assert!(tx
            .queue
            .iter()
            .all(|pending| pending.kind == FrameKind::Chat));
    }

    #[test]
    fn test_overflow_falls_back_to_oldest_chat() {
        let (mut tx, _shared) = scheduler();

        for i in 0..TX_QUEUE_CAP {
            tx.enqueue(vec![0.1; i + 1], FrameKind::Chat);
        }
        tx.enqueue(vec![0.2; 1], FrameKind::Chat);
        assert_eq!(tx.queued(), TX_QUEUE_CAP);

        // The oldest chat frame (length 1 of value 0.1) is gone.
        assert_eq!(tx.queue.front().unwrap().samples.len(), 2);
    }

    #[test]
    fn test_drain_clears_queue() {
        let (mut tx, shared) = scheduler();

        tx.enqueue(vec![0.0; 16], FrameKind::Control);
        tx.enqueue(vec![0.0; 16], FrameKind::Chat);
        tx.drain();
        assert_eq!(tx.queued(), 0);
        assert!(!shared.is_playing());
    }
}
