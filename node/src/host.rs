use std::time::Duration;

use tracing::{info, warn};

use intelliroom_common::{
    convert, ActuatorBank, ActuatorState, Connectivity, ConnectivityError, ConnectivityState,
    ControlLoop, CycleOutcome, Decision, DistanceRanger, FatalStartupError, LightSensor,
    NodeConfig, SensorReadError, SensorSnapshot, TelemetrySink, TemperatureSource, UploadError,
};

/// Always-available stand-in for the station wifi link.
struct SimulatedLink {
    connected: bool,
}

impl Connectivity for SimulatedLink {
    fn is_connected(&mut self) -> bool {
        self.connected
    }

    fn connect(&mut self) -> Result<ConnectivityState, ConnectivityError> {
        info!("simulated link associated");
        self.connected = true;
        Ok(ConnectivityState::Connected)
    }
}

// Hardware integration point:
// replace these simulated readings with the HC-SR04, LDR, and DHT11
// drivers on the ESP target.
struct SimulatedRanger {
    tick: u64,
}

impl DistanceRanger for SimulatedRanger {
    fn measure_distance(&mut self) -> f32 {
        self.tick = self.tick.wrapping_add(1);
        if self.tick % 9 == 0 {
            // Periodic echo timeout, as an uncovered sensor produces.
            return convert::DISTANCE_INVALID;
        }
        let duration_us = 1_200 + (self.tick % 16) as i64 * 500;
        convert::distance_from_pulse(duration_us)
    }
}

struct SimulatedLight {
    tick: u64,
}

impl LightSensor for SimulatedLight {
    fn read_light_percent(&mut self) -> u8 {
        self.tick = self.tick.wrapping_add(1);
        let raw = 768 + (self.tick % 6) as u16 * 512;
        convert::light_percent_from_raw(raw)
    }
}

struct SimulatedTemperature {
    tick: u64,
}

impl TemperatureSource for SimulatedTemperature {
    fn read_temperature(&mut self) -> Result<f32, SensorReadError> {
        self.tick = self.tick.wrapping_add(1);
        Ok(24.0 + (self.tick % 8) as f32 * 0.5)
    }
}

/// Latches the last applied command the way the GPIO outputs do.
struct SimulatedActuators {
    state: ActuatorState,
}

impl ActuatorBank for SimulatedActuators {
    fn apply(&mut self, decision: &Decision) -> ActuatorState {
        let next = ActuatorState {
            fan_on: decision.fan_on,
            light_on: decision.light_on.unwrap_or(false),
        };
        if next != self.state {
            info!(
                "actuators: fan {} | led {}",
                if next.fan_on { "ON" } else { "OFF" },
                if next.light_on { "ON" } else { "OFF" },
            );
        }
        self.state = next;
        self.state
    }
}

/// Logs the exact wire payload the ESP target would POST.
struct LoggingTelemetry {
    collector_url: String,
}

impl TelemetrySink for LoggingTelemetry {
    fn upload(&mut self, snapshot: &SensorSnapshot) -> Result<String, UploadError> {
        let payload = serde_json::to_string(snapshot)
            .map_err(|err| UploadError::new(format!("payload serialization failed: {err}")))?;
        info!("POST {} <- {payload}", self.collector_url);
        Ok("simulated collector accepted payload".to_string())
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = NodeConfig::default();
    if let Ok(url) = std::env::var("COLLECTOR_URL") {
        config.network.collector_url = url;
    }
    if let Some(interval) = std::env::var("CYCLE_INTERVAL_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
    {
        config.cycle_interval_ms = interval;
    }
    config.thresholds.sanitize();

    let mut control = ControlLoop::new(
        SimulatedLink { connected: false },
        SimulatedRanger { tick: 0 },
        SimulatedLight { tick: 0 },
        SimulatedTemperature { tick: 0 },
        SimulatedActuators {
            state: ActuatorState::default(),
        },
        LoggingTelemetry {
            collector_url: config.network.collector_url.clone(),
        },
        config.thresholds.clone(),
    );

    control.start().map_err(FatalStartupError::from)?;
    info!("intelliroom node simulation started");

    let mut interval = tokio::time::interval(Duration::from_millis(config.cycle_interval_ms));

    loop {
        interval.tick().await;

        match control.run_cycle() {
            CycleOutcome::Completed {
                snapshot, upload, ..
            } => {
                info!(
                    "temp {:.1}C | light {}% | distance {} cm | presence {}",
                    snapshot.temperature,
                    snapshot.light_percent,
                    snapshot.distance_cm,
                    if snapshot.presence { "yes" } else { "no" },
                );
                match upload {
                    Ok(reply) => info!("collector response: {reply}"),
                    Err(err) => warn!("telemetry dropped: {err}"),
                }
            }
            CycleOutcome::Skipped(err) => warn!("cycle skipped: {err}"),
        }
    }
}
