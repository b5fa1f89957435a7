use serde::{Deserialize, Serialize};

/// Decision thresholds, fixed for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// Fan turns on at or above this temperature (°C).
    pub temp_threshold_c: f32,
    /// Presence is a valid distance strictly below this bound (cm).
    pub presence_threshold_cm: f32,
    /// Indicator light turns on below this brightness (%). `None` when
    /// no light actuator is wired.
    pub light_threshold_pct: Option<u8>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temp_threshold_c: 27.0,
            presence_threshold_cm: 100.0,
            light_threshold_pct: Some(30),
        }
    }
}

impl Thresholds {
    pub fn sanitize(&mut self) {
        if !self.presence_threshold_cm.is_finite() || self.presence_threshold_cm <= 0.0 {
            self.presence_threshold_cm = 100.0;
        }
        if let Some(limit) = self.light_threshold_pct.as_mut() {
            *limit = (*limit).min(100);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    /// Collector ingestion endpoint for sensor snapshots.
    pub collector_url: String,
    pub upload_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            collector_url: "http://192.168.137.1:5000/update_sensors".to_string(),
            upload_timeout_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub thresholds: Thresholds,
    pub network: NetworkConfig,
    /// Sleep between steady-state cycles.
    pub cycle_interval_ms: u64,
    /// Upper bound on waiting for the ultrasonic echo pulse.
    pub echo_timeout_us: u64,
    /// Bounded wifi association polling: attempts x poll delay.
    pub connect_attempts: u32,
    pub connect_poll_delay_ms: u64,
    /// Read the DHT11 when true; otherwise report the placeholder.
    pub use_dht11: bool,
    pub placeholder_temp_c: f32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            network: NetworkConfig::default(),
            cycle_interval_ms: 5_000,
            echo_timeout_us: 30_000,
            connect_attempts: 10,
            connect_poll_delay_ms: 1_000,
            use_dht11: false,
            placeholder_temp_c: 25.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sanitize_repairs_bad_thresholds() {
        let mut thresholds = Thresholds {
            temp_threshold_c: 27.0,
            presence_threshold_cm: -5.0,
            light_threshold_pct: Some(250),
        };

        thresholds.sanitize();

        assert_eq!(thresholds.presence_threshold_cm, 100.0);
        assert_eq!(thresholds.light_threshold_pct, Some(100));
    }

    #[test]
    fn sanitize_keeps_valid_thresholds() {
        let mut thresholds = Thresholds::default();
        thresholds.sanitize();

        assert_eq!(thresholds.temp_threshold_c, 27.0);
        assert_eq!(thresholds.presence_threshold_cm, 100.0);
        assert_eq!(thresholds.light_threshold_pct, Some(30));
    }
}
