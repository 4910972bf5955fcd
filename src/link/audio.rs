//! State shared with the audio process callback. The callback only moves
//! samples: captured chunks go out over a bounded channel for the decoder
//! thread, playback drains from a queue filled by the transmit path. All
//! DSP happens off the audio thread.

use crossbeam_channel::{Sender, TrySendError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::trace;

use crate::utils::consts::SENSE_THRESHOLD;

/// Thread-safe shared state between the audio callback, the transmit
/// path, and the control thread.
#[derive(Clone)]
pub struct LinkShared {
    pub playback: Arc<Mutex<VecDeque<f32>>>,
    /// True while a rendered frame is draining to the speaker.
    pub playing: Arc<AtomicBool>,
    /// Gates capture; clearing it halts sample consumption within one
    /// device buffer.
    pub capturing: Arc<AtomicBool>,
    /// Peak amplitude of the most recent capture buffer (f32 bits).
    recent_peak: Arc<AtomicU32>,
}

impl Default for LinkShared {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkShared {
    pub fn new() -> Self {
        Self {
            playback: Arc::new(Mutex::new(VecDeque::new())),
            playing: Arc::new(AtomicBool::new(false)),
            capturing: Arc::new(AtomicBool::new(false)),
            recent_peak: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Queue a rendered buffer and mark a frame in flight.
    pub fn begin_playback(&self, samples: Vec<f32>) {
        {
            let mut playback = self.playback.lock().unwrap();
            playback.extend(samples);
        }
        self.playing.store(true, Ordering::SeqCst);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Whether the band currently carries enough energy to defer a
    /// background transmit one tick.
    pub fn channel_busy(&self) -> bool {
        f32::from_bits(self.recent_peak.load(Ordering::Relaxed)) > SENSE_THRESHOLD
    }

    pub fn note_captured_peak(&self, peak: f32) {
        self.recent_peak.store(peak.to_bits(), Ordering::Relaxed);
    }
}

/// Build the JACK process closure. Captured buffers are forwarded with
/// `try_send`; when the decoder falls behind, chunks are dropped rather
/// than blocking the audio thread.
pub fn build_process_closure(
    in_port: jack::Port<jack::AudioIn>,
    mut out_port: jack::Port<jack::AudioOut>,
    shared: LinkShared,
    capture_tx: Sender<Vec<f32>>,
) -> impl FnMut(&jack::Client, &jack::ProcessScope) -> jack::Control + Send + 'static {
    move |_: &jack::Client, ps: &jack::ProcessScope| -> jack::Control {
        let in_buffer = in_port.as_slice(ps);
        let out_buffer = out_port.as_mut_slice(ps);

        for sample in out_buffer.iter_mut() {
            *sample = 0.0;
        }

        if shared.capturing.load(Ordering::SeqCst) {
            let peak = in_buffer.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            shared.note_captured_peak(peak);

            match capture_tx.try_send(in_buffer.to_vec()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    trace!("capture channel full, dropping buffer");
                }
                Err(TrySendError::Disconnected(_)) => {}
            }
        }

        if shared.playing.load(Ordering::SeqCst) {
            let mut playback = shared.playback.lock().unwrap();
            for out_sample in out_buffer.iter_mut() {
                if let Some(sample) = playback.pop_front() {
                    *out_sample = sample;
                } else {
                    shared.playing.store(false, Ordering::SeqCst);
                    break;
                }
            }
            if playback.is_empty() {
                shared.playing.store(false, Ordering::SeqCst);
            }
        }

        jack::Control::Continue
    }
}
