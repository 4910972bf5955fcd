//! 2-FSK tone synthesis: one sine burst per bit, mark or space frequency.

use std::f32::consts::PI;

use super::profile::FskProfile;

/// Renders a bit sequence as mono PCM. Phase is derived from the absolute
/// sample index rather than reset per bit, so bit boundaries stay
/// continuous-phase and do not splatter audible energy below 17 kHz.
#[derive(Clone)]
pub struct ToneGenerator {
    sample_rate: f32,
}

impl ToneGenerator {
    pub fn new(sample_rate: f32) -> Self {
        Self { sample_rate }
    }

    /// Render `bits` at `volume` in [0, 1]. The buffer holds
    /// `ceil(bits.len() * sample_rate / bit_rate)` samples; played back
    /// unaltered it decodes to `bits` under a matched detector.
    pub fn render(&self, bits: &[u8], profile: &FskProfile, volume: f32) -> Vec<f32> {
        if bits.is_empty() {
            return Vec::new();
        }

        let step = self.sample_rate as f64 / profile.bit_rate as f64;
        let total = (bits.len() as f64 * step).ceil() as usize;
        let volume = volume.clamp(0.0, 1.0);

        let mut samples = Vec::with_capacity(total);
        for n in 0..total {
            let bit_index = ((n as f64 / step) as usize).min(bits.len() - 1);
            let freq = if bits[bit_index] == 1 {
                profile.freq1
            } else {
                profile.freq0
            };
            let t = n as f32 / self.sample_rate;
            samples.push(volume * (2.0 * PI * freq * t).sin());
        }

        samples
    }

    /// Airtime of a rendered bit sequence, in seconds.
    pub fn duration_secs(&self, bit_count: usize, profile: &FskProfile) -> f32 {
        bit_count as f32 / profile.bit_rate
    }
}
