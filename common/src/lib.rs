pub mod config;
pub mod convert;
pub mod cycle;
pub mod decision;
pub mod error;
pub mod types;

pub use config::{NetworkConfig, NodeConfig, Thresholds};
pub use cycle::{
    ActuatorBank, Connectivity, ControlLoop, CycleOutcome, DistanceRanger, FixedTemperature,
    LightSensor, TelemetrySink, TemperatureSource,
};
pub use decision::{decide, Decision};
pub use error::{ConnectivityError, CycleError, FatalStartupError, SensorReadError, UploadError};
pub use types::{ActuatorState, ConnectivityState, SensorSnapshot};
