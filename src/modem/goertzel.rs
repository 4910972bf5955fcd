//! Single-bin DFT magnitude estimation. Two bins per window beat a full
//! FFT when only the mark and space frequencies matter.

use std::f32::consts::PI;

/// Precomputed Goertzel recurrence for one target frequency at a fixed
/// window length.
#[derive(Debug, Clone, Copy)]
pub struct GoertzelBin {
    cos_omega: f32,
}

impl GoertzelBin {
    pub fn new(freq: f32, sample_rate: f32, window_len: usize) -> Self {
        let k = (window_len as f32 * freq / sample_rate).round();
        let omega = 2.0 * PI * k / window_len as f32;
        Self {
            cos_omega: omega.cos(),
        }
    }

    /// Normalised magnitude of the target bin over `window`. Input in
    /// [-1, 1] yields magnitudes on roughly [0, 0.5].
    pub fn magnitude(&self, window: &[f32]) -> f32 {
        let coeff = 2.0 * self.cos_omega;
        let mut s1 = 0.0f32;
        let mut s2 = 0.0f32;

        for &x in window {
            let y = x + coeff * s1 - s2;
            s2 = s1;
            s1 = y;
        }

        let power = s1 * s1 + s2 * s2 - coeff * s1 * s2;
        power.max(0.0).sqrt() / window.len() as f32
    }
}
