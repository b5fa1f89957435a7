//! Raw-signal conversions shared by the device drivers and the host
//! simulation.

/// Sound travels roughly 29.1 µs per centimeter of round trip.
const US_PER_CM_ROUND_TRIP: f32 = 29.1;

/// Sentinel distance for a failed or timed-out echo measurement.
pub const DISTANCE_INVALID: f32 = -1.0;

/// Full-scale raw reading of the 12-bit ADC at 11 dB attenuation.
pub const ADC_FULL_SCALE: u16 = 4095;

/// Converts an echo round-trip duration to centimeters, rounded to two
/// decimal places. Non-positive durations mean no echo was observed
/// and map to [`DISTANCE_INVALID`].
pub fn distance_from_pulse(duration_us: i64) -> f32 {
    if duration_us <= 0 {
        return DISTANCE_INVALID;
    }
    let cm = (duration_us as f32 / 2.0) / US_PER_CM_ROUND_TRIP;
    (cm * 100.0).round() / 100.0
}

/// Maps a raw ADC sample linearly onto 0..=100 percent brightness.
pub fn light_percent_from_raw(raw: u16) -> u8 {
    let raw = raw.min(ADC_FULL_SCALE);
    ((raw as f32 / ADC_FULL_SCALE as f32) * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn no_echo_maps_to_sentinel() {
        assert_eq!(distance_from_pulse(0), DISTANCE_INVALID);
        assert_eq!(distance_from_pulse(-1), DISTANCE_INVALID);
        assert_eq!(distance_from_pulse(i64::MIN), DISTANCE_INVALID);
    }

    #[test]
    fn round_trip_duration_converts_to_centimeters() {
        // 5820 µs round trip: 2910 µs one way, 29.1 µs/cm -> 100 cm.
        assert_eq!(distance_from_pulse(5820), 100.0);
        assert_eq!(distance_from_pulse(583), 10.02);
        assert_eq!(distance_from_pulse(1), 0.02);
    }

    #[test]
    fn valid_distances_are_never_negative() {
        for duration_us in [1, 10, 291, 5820, 30_000] {
            assert!(distance_from_pulse(duration_us) >= 0.0);
        }
    }

    #[test]
    fn light_percent_spans_full_adc_range() {
        assert_eq!(light_percent_from_raw(0), 0);
        assert_eq!(light_percent_from_raw(ADC_FULL_SCALE), 100);
        assert_eq!(light_percent_from_raw(2048), 50);
    }

    #[test]
    fn light_percent_clamps_out_of_range_samples() {
        assert_eq!(light_percent_from_raw(u16::MAX), 100);
    }

    #[test]
    fn light_percent_stays_in_bounds() {
        for raw in (0..=ADC_FULL_SCALE).step_by(7) {
            assert!(light_percent_from_raw(raw) <= 100);
        }
    }
}
