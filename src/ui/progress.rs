//! Transmit-airtime progress. A frame at tens of bits per second takes
//! whole seconds to play out; the bar shows the drain of the playback
//! queue so the operator knows the speaker is still busy.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::link::LinkShared;
use crate::utils::consts::PROGRESS_UPDATE_INTERVAL_MS;

pub const TX_TEMPLATE: &str = "TX [{bar:30.cyan}] {percent}% ({pos}/{len} samples) {msg}";

/// Block until the in-flight frame finishes draining, updating a
/// progress bar along the way.
pub fn watch_transmit(shared: &LinkShared, total_samples: u64, message: &str) {
    let bar = ProgressBar::new(total_samples);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(TX_TEMPLATE)
            .unwrap()
            .progress_chars("█▉▊▋▌▍▎▏ "),
    );
    bar.set_message(message.to_string());

    while shared.is_playing() {
        let remaining = shared.playback.lock().unwrap().len() as u64;
        bar.set_position(total_samples.saturating_sub(remaining));
        std::thread::sleep(Duration::from_millis(PROGRESS_UPDATE_INTERVAL_MS));
    }
    bar.finish_and_clear();
}
