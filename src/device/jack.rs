//! JACK client plumbing for the acoustic link: one mono capture port,
//! one mono playback port, wired to the first physical pair.

use jack;
use tracing::{debug, info, warn};

use crate::utils::consts::{INPUT_PORT_NAME, OUTPUT_PORT_NAME, SAMPLE_RATE};

/// Log the server's operating point and return its sample rate. The
/// modem derives its per-bit sample counts from whatever rate the
/// server runs at, so a mismatch with the nominal rate is only worth a
/// warning.
pub fn server_sample_rate(client: &jack::Client) -> f32 {
    let sample_rate = client.sample_rate();
    let buffer_size = client.buffer_size();
    info!(
        "JACK: {} Hz, {}-sample buffers ({:.2} ms)",
        sample_rate,
        buffer_size,
        buffer_size as f64 * 1000.0 / sample_rate as f64
    );
    if sample_rate as u32 != SAMPLE_RATE {
        warn!(
            "server runs at {} Hz, not the nominal {}; modem timing adapts",
            sample_rate, SAMPLE_RATE
        );
    }
    sample_rate as f32
}

/// Register the link's capture and playback ports under their fixed
/// names.
pub fn register_link_ports(
    client: &jack::Client,
) -> Result<(jack::Port<jack::AudioIn>, jack::Port<jack::AudioOut>), jack::Error> {
    let input = client.register_port(INPUT_PORT_NAME, jack::AudioIn::default())?;
    let output = client.register_port(OUTPUT_PORT_NAME, jack::AudioOut::default())?;
    Ok((input, output))
}

/// Wire the link to the first physical microphone and speaker. The
/// 17-20 kHz band does not survive echo cancellation, noise
/// suppression, or automatic gain control; run the backend with those
/// disabled on this device.
pub fn connect_physical_ports(client: &jack::Client, in_port_name: &str, out_port_name: &str) {
    // Physical capture ports are flagged IS_OUTPUT: they emit into the
    // graph. Playback sinks are the IS_INPUT ones.
    let microphones = client.ports(
        None,
        None,
        jack::PortFlags::IS_OUTPUT | jack::PortFlags::IS_PHYSICAL,
    );
    let speakers = client.ports(
        None,
        None,
        jack::PortFlags::IS_INPUT | jack::PortFlags::IS_PHYSICAL,
    );
    debug!(
        "{} physical capture / {} physical playback ports",
        microphones.len(),
        speakers.len()
    );

    match microphones.first() {
        Some(source) => match client.connect_ports_by_name(source, in_port_name) {
            Ok(()) => info!("listening on {}", source),
            Err(e) => warn!("could not wire {} -> {}: {}", source, in_port_name, e),
        },
        None => warn!("no physical capture port; discovery will hear nothing"),
    }

    match speakers.first() {
        Some(sink) => match client.connect_ports_by_name(out_port_name, sink) {
            Ok(()) => info!("playing through {}", sink),
            Err(e) => warn!("could not wire {} -> {}: {}", out_port_name, sink, e),
        },
        None => warn!("no physical playback port; transmit will be silent"),
    }
}
