use crate::config::Thresholds;

/// Commands derived from one cycle's readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub fan_on: bool,
    /// `None` when no light actuator is configured.
    pub light_on: Option<bool>,
    pub presence: bool,
}

/// Pure threshold comparison, no retained state. The comparisons are
/// deliberately one-sided with no hysteresis; oscillation right at a
/// boundary matches the deployed behavior.
pub fn decide(
    temperature: f32,
    light_percent: u8,
    distance_cm: f32,
    thresholds: &Thresholds,
) -> Decision {
    Decision {
        fan_on: temperature >= thresholds.temp_threshold_c,
        light_on: thresholds
            .light_threshold_pct
            .map(|limit| light_percent < limit),
        presence: distance_cm > 0.0 && distance_cm < thresholds.presence_threshold_cm,
    }
}
