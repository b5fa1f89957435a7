use serde::Serialize;

/// One cycle's readings, built after actuation and shipped to the
/// collector verbatim. The serialized field names are the collector's
/// ingestion schema.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorSnapshot {
    pub temperature: f32,
    #[serde(rename = "light_level")]
    pub light_percent: u8,
    pub presence: bool,
    /// Centimeters; `-1` means the measurement timed out or failed.
    pub distance_cm: f32,
}

/// State read back from the output latches after the last write, not
/// the state that was requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActuatorState {
    pub fan_on: bool,
    pub light_on: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectivityState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
        }
    }
}
