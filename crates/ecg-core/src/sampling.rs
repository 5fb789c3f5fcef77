//! Analog acquisition and voltage conversion

use core::fmt::Write;

use heapless::String;

use crate::config::SamplingConfig;

/// Digits after the decimal point in a broadcast reading.
pub const VOLTS_DECIMALS: usize = 4;

/// Capacity of a formatted reading.
pub const READING_TEXT_LEN: usize = 24;

/// Text form of one reading, e.g. `"1.6483"`.
pub type ReadingText = String<READING_TEXT_LEN>;

/// Source of raw analog-to-digital conversion codes.
///
/// Conversions are assumed to always succeed; whatever code the hardware
/// returns is treated as a valid sample.
pub trait AnalogSource {
    /// Take one conversion on the designated channel.
    fn read_raw(&mut self) -> u16;
}

impl<F> AnalogSource for F
where
    F: FnMut() -> u16,
{
    fn read_raw(&mut self) -> u16 {
        self()
    }
}

/// One converted sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub raw: u16,
    pub volts: f64,
}

impl Reading {
    pub fn from_raw(raw: u16, config: &SamplingConfig) -> Self {
        Self {
            raw,
            volts: raw_to_volts(raw, config),
        }
    }

    /// Fixed-point text of the voltage, as sent to peers.
    pub fn to_text(&self) -> ReadingText {
        format_volts(self.volts)
    }
}

/// Scale a converter code to volts: `raw / full_scale * reference_volts`.
///
/// Codes above `full_scale` are clamped so the result never leaves
/// `[0, reference_volts]`.
pub fn raw_to_volts(raw: u16, config: &SamplingConfig) -> f64 {
    if config.full_scale == 0 {
        return 0.0;
    }
    let code = raw.min(config.full_scale);
    (f64::from(code) / f64::from(config.full_scale)) * config.reference_volts
}

/// Format volts with exactly [`VOLTS_DECIMALS`] fractional digits.
///
/// Returns an empty string if the value does not fit in [`READING_TEXT_LEN`],
/// which only happens with a nonsensical reference voltage.
pub fn format_volts(volts: f64) -> ReadingText {
    let mut text = ReadingText::new();
    if write!(text, "{:.*}", VOLTS_DECIMALS, volts).is_err() {
        text.clear();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fractional_digits(text: &str) -> usize {
        text.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0)
    }

    #[test]
    fn test_reference_points() {
        let config = SamplingConfig::default();

        assert_eq!(Reading::from_raw(0, &config).to_text().as_str(), "0.0000");
        assert_eq!(Reading::from_raw(4095, &config).to_text().as_str(), "3.3000");
        assert_eq!(Reading::from_raw(2048, &config).to_text().as_str(), "1.6504");
    }

    #[test]
    fn test_every_code_stays_in_range_with_four_decimals() {
        let config = SamplingConfig::default();

        for raw in 0..=4095u16 {
            let reading = Reading::from_raw(raw, &config);
            assert!(
                (0.0..=3.3).contains(&reading.volts),
                "code {} gave {} V",
                raw,
                reading.volts
            );

            let text = reading.to_text();
            assert_eq!(fractional_digits(&text), 4, "code {} gave {}", raw, text);
        }
    }

    #[test]
    fn test_out_of_range_code_is_clamped() {
        let config = SamplingConfig::default();

        assert_eq!(raw_to_volts(u16::MAX, &config), raw_to_volts(4095, &config));
    }

    #[test]
    fn test_formatting_is_deterministic() {
        let volts = raw_to_volts(1234, &SamplingConfig::default());

        assert_eq!(format_volts(volts), format_volts(volts));
        assert_eq!(format_volts(volts).as_str(), "0.9944");
    }

    #[test]
    fn test_closure_as_analog_source() {
        let mut next = 0u16;
        let mut source = || {
            next += 100;
            next
        };

        assert_eq!(source.read_raw(), 100);
        assert_eq!(source.read_raw(), 200);
    }
}
