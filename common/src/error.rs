use thiserror::Error;

/// Network association failed within the attempt budget. Fatal at
/// startup, retried next cycle in steady state.
#[derive(Debug, Clone, Error)]
#[error("failed to connect: {reason}")]
pub struct ConnectivityError {
    reason: String,
}

impl ConnectivityError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A sensor driver fault (checksum, line timing). Skips the cycle.
#[derive(Debug, Clone, Error)]
#[error("sensor read failed: {reason}")]
pub struct SensorReadError {
    reason: String,
}

impl SensorReadError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Telemetry delivery failed. Logged and dropped, never retried.
#[derive(Debug, Clone, Error)]
#[error("telemetry upload failed: {reason}")]
pub struct UploadError {
    reason: String,
}

impl UploadError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// An error that aborts one steady-state cycle at its boundary.
#[derive(Debug, Clone, Error)]
pub enum CycleError {
    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),
    #[error(transparent)]
    SensorRead(#[from] SensorReadError),
}

/// Any failure before the steady-state loop begins terminates the
/// process after logging.
#[derive(Debug, Clone, Error)]
#[error("startup failed: {0}")]
pub struct FatalStartupError(#[from] pub ConnectivityError);
