//! Tone detection: turns the microphone PCM stream into timestamped bit
//! events by comparing band energy at the profile's two carriers.

use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;
use tracing::trace;

use super::goertzel::GoertzelBin;
use super::profile::FskProfile;
use crate::utils::consts::*;

/// One demodulated bit with its detection strength and stream time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitEvent {
    pub value: u8,
    pub strength: f32,
    /// Seconds since the start of the capture stream.
    pub t: f64,
}

/// Which spectral estimator drives the bit decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Estimator {
    /// Two Goertzel bins per window; the normal real-time path.
    Goertzel,
    /// Full FFT magnitude spectrum, reading the bins nearest f0/f1.
    /// Fallback for hosts without a per-window DSP callback.
    FftFallback,
}

/// Detector tuning. The two thresholds are deliberately independent: the
/// Goertzel path compares linear magnitudes, the FFT path dBFS, and the
/// scales are not equivalents.
#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    pub window: usize,
    pub threshold_linear: f32,
    pub threshold_db: f32,
    pub estimator: Estimator,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window: GOERTZEL_WINDOW,
            threshold_linear: DETECT_THRESHOLD_LINEAR,
            threshold_db: DETECT_THRESHOLD_DB,
            estimator: Estimator::Goertzel,
        }
    }
}

pub struct ToneDetector {
    profile: FskProfile,
    sample_rate: f32,
    config: DetectorConfig,
    bin0: GoertzelBin,
    bin1: GoertzelBin,
    fft: Option<Arc<dyn Fft<f32>>>,
    pending: Vec<f32>,
    samples_seen: u64,
    last_emit_t: Option<f64>,
}

impl ToneDetector {
    pub fn new(profile: FskProfile, sample_rate: f32, config: DetectorConfig) -> Self {
        let bin0 = GoertzelBin::new(profile.freq0, sample_rate, config.window);
        let bin1 = GoertzelBin::new(profile.freq1, sample_rate, config.window);

        let fft = match config.estimator {
            Estimator::Goertzel => None,
            Estimator::FftFallback => {
                Some(FftPlanner::new().plan_fft_forward(config.window))
            }
        };

        Self {
            profile,
            sample_rate,
            config,
            bin0,
            bin1,
            fft,
            pending: Vec::with_capacity(config.window),
            samples_seen: 0,
            last_emit_t: None,
        }
    }

    /// Detector whose window spans exactly one bit period, so windows and
    /// bits align from the start of the stream. This is the configuration
    /// under which a rendered buffer decodes back to its bit sequence;
    /// the offline loopback path uses it.
    pub fn matched(profile: FskProfile, sample_rate: f32) -> Self {
        let config = DetectorConfig {
            window: profile.samples_per_bit(sample_rate),
            ..DetectorConfig::default()
        };
        Self::new(profile, sample_rate, config)
    }

    pub fn profile(&self) -> &FskProfile {
        &self.profile
    }

    /// Feed captured PCM; returns the bits decided by every window that
    /// filled during this call.
    pub fn process(&mut self, samples: &[f32]) -> Vec<BitEvent> {
        let mut events = Vec::new();
        self.pending.extend_from_slice(samples);

        while self.pending.len() >= self.config.window {
            let window: Vec<f32> = self.pending.drain(..self.config.window).collect();
            self.samples_seen += self.config.window as u64;
            let t = self.samples_seen as f64 / self.sample_rate as f64;

            if let Some(event) = self.evaluate(&window, t) {
                events.push(event);
            }
        }

        events
    }

    fn evaluate(&mut self, window: &[f32], t: f64) -> Option<BitEvent> {
        let (e0, e1, passes) = match self.config.estimator {
            Estimator::Goertzel => {
                let e0 = self.bin0.magnitude(window);
                let e1 = self.bin1.magnitude(window);
                (e0, e1, e0.max(e1) > self.config.threshold_linear)
            }
            Estimator::FftFallback => {
                let (e0, e1) = self.fft_magnitudes(window);
                let db = 20.0 * e0.max(e1).max(f32::MIN_POSITIVE).log10();
                (e0, e1, db > self.config.threshold_db)
            }
        };

        trace!("window t={:.3}s e0={:.5} e1={:.5}", t, e0, e1);

        if !passes {
            return None;
        }
        // Equal energy carries no decision; treat as noise.
        if e0 == e1 {
            return None;
        }

        // The same tone registers again when the window stride is shorter
        // than one bit; drop events inside 0.8 bit periods of the last.
        let min_gap = (BIT_DUP_SUPPRESSION * self.profile.bit_period()) as f64;
        if let Some(last) = self.last_emit_t {
            if t - last < min_gap {
                return None;
            }
        }

        self.last_emit_t = Some(t);
        Some(BitEvent {
            value: (e1 > e0) as u8,
            strength: e0.max(e1),
            t,
        })
    }

    /// Normalised magnitudes at the FFT bins nearest f0 and f1; a
    /// full-scale sine at a bin centre reads close to 1.0.
    fn fft_magnitudes(&self, window: &[f32]) -> (f32, f32) {
        let fft = self.fft.as_ref().expect("fft estimator not planned");
        let n = window.len();

        let mut buffer: Vec<Complex32> =
            window.iter().map(|&x| Complex32::new(x, 0.0)).collect();
        fft.process(&mut buffer);

        let bin_of = |freq: f32| -> usize {
            ((n as f32 * freq / self.sample_rate).round() as usize).min(n / 2)
        };
        let magnitude = |k: usize| -> f32 { buffer[k].norm() * 2.0 / n as f32 };

        (
            magnitude(bin_of(self.profile.freq0)),
            magnitude(bin_of(self.profile.freq1)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::profile::ModemMode;
    use crate::modem::tone::ToneGenerator;
    use std::f32::consts::PI;

    fn tone(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_pure_space_tone_emits_only_zeros() {
        let profile = ModemMode::High.profile();
        let mut detector =
            ToneDetector::new(profile, 48_000.0, DetectorConfig::default());

        let samples = tone(profile.freq0, 48_000.0, GOERTZEL_WINDOW * 8);
        let events = detector.process(&samples);

        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.value == 0));
    }

    #[test]
    fn test_pure_mark_tone_emits_only_ones() {
        let profile = ModemMode::High.profile();
        let mut detector =
            ToneDetector::new(profile, 48_000.0, DetectorConfig::default());

        let samples = tone(profile.freq1, 48_000.0, GOERTZEL_WINDOW * 8);
        let events = detector.process(&samples);

        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.value == 1));
    }

    #[test]
    fn test_silence_emits_nothing() {
        let profile = ModemMode::Low.profile();
        let mut detector =
            ToneDetector::new(profile, 48_000.0, DetectorConfig::default());

        let events = detector.process(&vec![0.0; GOERTZEL_WINDOW * 4]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_sub_threshold_tone_is_ignored() {
        let profile = ModemMode::High.profile();
        let mut detector =
            ToneDetector::new(profile, 48_000.0, DetectorConfig::default());

        let samples: Vec<f32> = tone(profile.freq1, 48_000.0, GOERTZEL_WINDOW * 4)
            .iter()
            .map(|s| s * 0.001)
            .collect();
        assert!(detector.process(&samples).is_empty());
    }

    #[test]
    fn test_matched_window_recovers_rendered_bits() {
        let profile = ModemMode::High.profile();
        let generator = ToneGenerator::new(48_000.0);
        let mut detector = ToneDetector::matched(profile, 48_000.0);

        let bits = [1u8, 0, 1, 1, 0, 1, 0, 0, 1, 1, 1, 0];
        let samples = generator.render(&bits, &profile, 0.8);
        let decoded: Vec<u8> = detector
            .process(&samples)
            .iter()
            .map(|e| e.value)
            .collect();

        assert_eq!(decoded, bits);
    }

    #[test]
    fn test_fft_fallback_recovers_rendered_bits() {
        let profile = ModemMode::High.profile();
        let sample_rate = 48_000.0;
        let generator = ToneGenerator::new(sample_rate);
        let config = DetectorConfig {
            window: profile.samples_per_bit(sample_rate),
            estimator: Estimator::FftFallback,
            ..DetectorConfig::default()
        };
        let mut detector = ToneDetector::new(profile, sample_rate, config);

        let bits = [0u8, 1, 1, 0, 1, 0];
        let samples = generator.render(&bits, &profile, 0.8);
        let decoded: Vec<u8> = detector
            .process(&samples)
            .iter()
            .map(|e| e.value)
            .collect();

        assert_eq!(decoded, bits);
    }

    #[test]
    fn test_duplicate_suppression_on_low_profile() {
        // Low profile: 100 ms bits. With a 2048-sample window the stride
        // (~43 ms) is well under a bit, so the same tone fills several
        // consecutive windows; only one event may come out of any 80 ms
        // span.
        let profile = ModemMode::Low.profile();
        let config = DetectorConfig {
            window: 2048,
            ..DetectorConfig::default()
        };
        let mut detector = ToneDetector::new(profile, 48_000.0, config);

        let samples = tone(profile.freq1, 48_000.0, 2048 * 24);
        let events = detector.process(&samples);

        assert!(!events.is_empty());
        assert!(
            events.len() < 24,
            "expected suppression to drop re-detections, got {} events",
            events.len()
        );

        let min_gap = (BIT_DUP_SUPPRESSION * profile.bit_period()) as f64;
        for pair in events.windows(2) {
            assert!(
                pair[1].t - pair[0].t >= min_gap,
                "events {:.3}s and {:.3}s violate the suppression gap",
                pair[0].t,
                pair[1].t
            );
        }
    }

    #[test]
    fn test_chunked_delivery_matches_single_shot() {
        let profile = ModemMode::High.profile();
        let generator = ToneGenerator::new(48_000.0);
        let bits = [1u8, 0, 0, 1, 0, 1, 1, 0];
        let samples = generator.render(&bits, &profile, 0.8);

        let mut whole = ToneDetector::matched(profile, 48_000.0);
        let expected = whole.process(&samples);

        // Deliver in uneven chunks, as a capture callback would.
        let mut chunked = ToneDetector::matched(profile, 48_000.0);
        let mut collected = Vec::new();
        for chunk in samples.chunks(777) {
            collected.extend(chunked.process(chunk));
        }

        assert_eq!(collected, expected);
    }
}
