use crate::utils::consts::*;

/// Which FSK profile the link runs on. `High` trades robustness for rate;
/// `Low` sits further from the hearing threshold and survives worse rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemMode {
    High,
    Low,
}

impl ModemMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "high" => Some(ModemMode::High),
            "low" => Some(ModemMode::Low),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModemMode::High => "high",
            ModemMode::Low => "low",
        }
    }

    pub fn profile(&self) -> FskProfile {
        match self {
            ModemMode::High => FskProfile {
                freq0: HIGH_FREQ_0,
                freq1: HIGH_FREQ_1,
                bit_rate: HIGH_BIT_RATE,
            },
            ModemMode::Low => FskProfile {
                freq0: LOW_FREQ_0,
                freq1: LOW_FREQ_1,
                bit_rate: LOW_BIT_RATE,
            },
        }
    }
}

/// One 2-FSK operating point: a space tone for `0`, a mark tone for `1`,
/// and the signalling rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FskProfile {
    pub freq0: f32,
    pub freq1: f32,
    pub bit_rate: f32,
}

impl FskProfile {
    /// Samples spanned by one bit at the given device rate.
    pub fn samples_per_bit(&self, sample_rate: f32) -> usize {
        (sample_rate / self.bit_rate).round() as usize
    }

    /// Seconds spanned by one bit.
    pub fn bit_period(&self) -> f32 {
        1.0 / self.bit_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!(ModemMode::from_name("high"), Some(ModemMode::High));
        assert_eq!(ModemMode::from_name("LOW"), Some(ModemMode::Low));
        assert_eq!(ModemMode::from_name("turbo"), None);
    }

    #[test]
    fn test_profile_constants() {
        let high = ModemMode::High.profile();
        assert_eq!(high.freq0, 18_700.0);
        assert_eq!(high.freq1, 19_300.0);
        assert_eq!(high.samples_per_bit(48_000.0), 1200);

        let low = ModemMode::Low.profile();
        assert_eq!(low.bit_rate, 10.0);
        assert_eq!(low.samples_per_bit(48_000.0), 4800);
    }
}
