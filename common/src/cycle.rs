//! The steady-state control loop and the capability contracts its
//! collaborators implement. The loop itself performs no I/O; the device
//! and host binaries supply real or simulated components and handle
//! logging and sleeping between cycles.

use crate::{
    config::Thresholds,
    decision::decide,
    error::{ConnectivityError, CycleError, SensorReadError, UploadError},
    types::{ActuatorState, ConnectivityState, SensorSnapshot},
};

pub trait Connectivity {
    fn is_connected(&mut self) -> bool;

    /// Blocking, bounded association attempt. Tears down a stale link
    /// first, then polls up to the configured attempt budget.
    fn connect(&mut self) -> Result<ConnectivityState, ConnectivityError>;
}

pub trait DistanceRanger {
    /// Returns centimeters, or the `-1` sentinel when no echo was
    /// observed within the ceiling. Driver faults degrade to the
    /// sentinel internally; this call never fails.
    fn measure_distance(&mut self) -> f32;
}

pub trait LightSensor {
    fn read_light_percent(&mut self) -> u8;
}

pub trait TemperatureSource {
    fn read_temperature(&mut self) -> Result<f32, SensorReadError>;
}

impl<T: TemperatureSource + ?Sized> TemperatureSource for Box<T> {
    fn read_temperature(&mut self) -> Result<f32, SensorReadError> {
        (**self).read_temperature()
    }
}

/// Placeholder source used when no physical temperature sensor is
/// wired. Never fails.
pub struct FixedTemperature(pub f32);

impl TemperatureSource for FixedTemperature {
    fn read_temperature(&mut self) -> Result<f32, SensorReadError> {
        Ok(self.0)
    }
}

pub trait ActuatorBank {
    /// Writes every output unconditionally, then reports the state read
    /// back from the output latches rather than echoing the command.
    fn apply(&mut self, decision: &crate::decision::Decision) -> ActuatorState;
}

pub trait TelemetrySink {
    /// Single best-effort delivery; the collector's response body is
    /// returned for logging, never parsed.
    fn upload(&mut self, snapshot: &SensorSnapshot) -> Result<String, UploadError>;
}

/// What one steady-state cycle produced.
#[derive(Debug)]
pub enum CycleOutcome {
    Completed {
        snapshot: SensorSnapshot,
        actuators: ActuatorState,
        /// Upload failures are isolated here so a telemetry fault never
        /// discards an otherwise-successful cycle.
        upload: Result<String, UploadError>,
    },
    /// Sensing or connectivity failed; nothing was actuated or
    /// uploaded this cycle.
    Skipped(CycleError),
}

pub struct ControlLoop<C, R, L, T, A, U> {
    connectivity: C,
    ranger: R,
    light: L,
    temperature: T,
    actuators: A,
    telemetry: U,
    thresholds: Thresholds,
}

impl<C, R, L, T, A, U> ControlLoop<C, R, L, T, A, U>
where
    C: Connectivity,
    R: DistanceRanger,
    L: LightSensor,
    T: TemperatureSource,
    A: ActuatorBank,
    U: TelemetrySink,
{
    pub fn new(
        connectivity: C,
        ranger: R,
        light: L,
        temperature: T,
        actuators: A,
        telemetry: U,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            connectivity,
            ranger,
            light,
            temperature,
            actuators,
            telemetry,
            thresholds,
        }
    }

    /// Startup association. The caller treats a failure here as fatal;
    /// in steady state the same budget is retried every cycle instead.
    pub fn start(&mut self) -> Result<ConnectivityState, ConnectivityError> {
        self.connectivity.connect()
    }

    pub fn run_cycle(&mut self) -> CycleOutcome {
        if !self.connectivity.is_connected() {
            if let Err(err) = self.connectivity.connect() {
                return CycleOutcome::Skipped(err.into());
            }
        }

        let temperature = match self.temperature.read_temperature() {
            Ok(value) => value,
            Err(err) => return CycleOutcome::Skipped(err.into()),
        };
        let light_percent = self.light.read_light_percent();
        let distance_cm = self.ranger.measure_distance();

        let decision = decide(temperature, light_percent, distance_cm, &self.thresholds);
        let actuators = self.actuators.apply(&decision);

        let snapshot = SensorSnapshot {
            temperature,
            light_percent,
            presence: decision.presence,
            distance_cm,
        };

        let upload = self.telemetry.upload(&snapshot);
        CycleOutcome::Completed {
            snapshot,
            actuators,
            upload,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{convert, error::FatalStartupError};

    struct StubLink {
        connected: bool,
        fail_connect: bool,
        connect_calls: Rc<RefCell<u32>>,
    }

    impl StubLink {
        fn up() -> Self {
            Self {
                connected: true,
                fail_connect: false,
                connect_calls: Rc::new(RefCell::new(0)),
            }
        }

        fn down(fail_connect: bool) -> Self {
            Self {
                connected: false,
                fail_connect,
                connect_calls: Rc::new(RefCell::new(0)),
            }
        }
    }

    impl Connectivity for StubLink {
        fn is_connected(&mut self) -> bool {
            self.connected
        }

        fn connect(&mut self) -> Result<ConnectivityState, ConnectivityError> {
            *self.connect_calls.borrow_mut() += 1;
            if self.fail_connect {
                Err(ConnectivityError::new("association budget exhausted"))
            } else {
                self.connected = true;
                Ok(ConnectivityState::Connected)
            }
        }
    }

    struct FixedRanger(f32);

    impl DistanceRanger for FixedRanger {
        fn measure_distance(&mut self) -> f32 {
            self.0
        }
    }

    struct FixedLight(u16);

    impl LightSensor for FixedLight {
        fn read_light_percent(&mut self) -> u8 {
            convert::light_percent_from_raw(self.0)
        }
    }

    struct ScriptedTemperature {
        value: f32,
        fail_on_call: Option<u32>,
        calls: Rc<RefCell<u32>>,
    }

    impl ScriptedTemperature {
        fn new(value: f32, fail_on_call: Option<u32>) -> Self {
            Self {
                value,
                fail_on_call,
                calls: Rc::new(RefCell::new(0)),
            }
        }
    }

    impl TemperatureSource for ScriptedTemperature {
        fn read_temperature(&mut self) -> Result<f32, SensorReadError> {
            *self.calls.borrow_mut() += 1;
            if self.fail_on_call == Some(*self.calls.borrow()) {
                Err(SensorReadError::new("dht11 checksum mismatch"))
            } else {
                Ok(self.value)
            }
        }
    }

    struct LatchedActuators {
        applied: Rc<RefCell<u32>>,
    }

    impl ActuatorBank for LatchedActuators {
        fn apply(&mut self, decision: &crate::decision::Decision) -> ActuatorState {
            *self.applied.borrow_mut() += 1;
            ActuatorState {
                fan_on: decision.fan_on,
                light_on: decision.light_on.unwrap_or(false),
            }
        }
    }

    struct RecordingSink {
        fail: bool,
        uploads: Rc<RefCell<Vec<SensorSnapshot>>>,
    }

    impl TelemetrySink for RecordingSink {
        fn upload(&mut self, snapshot: &SensorSnapshot) -> Result<String, UploadError> {
            self.uploads.borrow_mut().push(*snapshot);
            if self.fail {
                Err(UploadError::new("connection refused"))
            } else {
                Ok("Sensor data received successfully".to_string())
            }
        }
    }

    fn control_loop(
        link: StubLink,
        temperature: ScriptedTemperature,
        distance_cm: f32,
        light_raw: u16,
        sink_fails: bool,
    ) -> (
        ControlLoop<StubLink, FixedRanger, FixedLight, ScriptedTemperature, LatchedActuators, RecordingSink>,
        Rc<RefCell<u32>>,
        Rc<RefCell<Vec<SensorSnapshot>>>,
        Rc<RefCell<u32>>,
    ) {
        let temp_calls = temperature.calls.clone();
        let uploads = Rc::new(RefCell::new(Vec::new()));
        let applied = Rc::new(RefCell::new(0));
        let control = ControlLoop::new(
            link,
            FixedRanger(distance_cm),
            FixedLight(light_raw),
            temperature,
            LatchedActuators {
                applied: applied.clone(),
            },
            RecordingSink {
                fail: sink_fails,
                uploads: uploads.clone(),
            },
            Thresholds::default(),
        );
        (control, temp_calls, uploads, applied)
    }

    #[test]
    fn failed_uploads_never_block_sensing() {
        let temperature = ScriptedTemperature::new(25.0, None);
        let (mut control, temp_calls, uploads, _) =
            control_loop(StubLink::up(), temperature, 50.0, 2048, true);

        for _ in 0..3 {
            match control.run_cycle() {
                CycleOutcome::Completed { upload, .. } => assert!(upload.is_err()),
                CycleOutcome::Skipped(err) => panic!("cycle skipped: {err}"),
            }
        }

        assert_eq!(*temp_calls.borrow(), 3);
        assert_eq!(uploads.borrow().len(), 3);
    }

    #[test]
    fn sensor_fault_skips_exactly_one_cycle() {
        let temperature = ScriptedTemperature::new(25.0, Some(2));
        let (mut control, _, uploads, applied) =
            control_loop(StubLink::up(), temperature, 50.0, 2048, false);

        assert!(matches!(control.run_cycle(), CycleOutcome::Completed { .. }));
        assert!(matches!(
            control.run_cycle(),
            CycleOutcome::Skipped(CycleError::SensorRead(_))
        ));
        assert!(matches!(control.run_cycle(), CycleOutcome::Completed { .. }));

        // The skipped cycle produced no telemetry and no actuation.
        assert_eq!(uploads.borrow().len(), 2);
        assert_eq!(*applied.borrow(), 2);
    }

    #[test]
    fn dropped_link_reconnects_before_sensing() {
        let temperature = ScriptedTemperature::new(25.0, None);
        let (mut control, _, uploads, _) =
            control_loop(StubLink::down(false), temperature, 50.0, 2048, false);
        let connects = control.connectivity.connect_calls.clone();

        assert!(matches!(control.run_cycle(), CycleOutcome::Completed { .. }));
        assert!(matches!(control.run_cycle(), CycleOutcome::Completed { .. }));

        // Reconnected once, then the link stayed up.
        assert_eq!(*connects.borrow(), 1);
        assert_eq!(uploads.borrow().len(), 2);
    }

    #[test]
    fn reconnect_failure_skips_the_cycle() {
        let temperature = ScriptedTemperature::new(25.0, None);
        let (mut control, temp_calls, uploads, _) =
            control_loop(StubLink::down(true), temperature, 50.0, 2048, false);

        assert!(matches!(
            control.run_cycle(),
            CycleOutcome::Skipped(CycleError::Connectivity(_))
        ));

        assert_eq!(*temp_calls.borrow(), 0);
        assert!(uploads.borrow().is_empty());
    }

    #[test]
    fn startup_connect_failure_is_fatal() {
        let temperature = ScriptedTemperature::new(25.0, None);
        let (mut control, _, _, _) =
            control_loop(StubLink::down(true), temperature, 50.0, 2048, false);

        let err = control.start().map_err(FatalStartupError::from).unwrap_err();
        assert_eq!(
            err.to_string(),
            "startup failed: failed to connect: association budget exhausted"
        );
    }

    #[test]
    fn presence_boundary_echo_is_not_presence() {
        // 5820 µs round trip converts to exactly the 100 cm boundary.
        let distance_cm = convert::distance_from_pulse(5820);
        let temperature = ScriptedTemperature::new(27.0, None);
        let (mut control, _, _, _) =
            control_loop(StubLink::up(), temperature, distance_cm, 4095, false);

        match control.run_cycle() {
            CycleOutcome::Completed {
                snapshot,
                actuators,
                upload,
            } => {
                assert_eq!(snapshot.distance_cm, 100.0);
                assert!(!snapshot.presence);
                assert_eq!(snapshot.light_percent, 100);
                assert_eq!(snapshot.temperature, 27.0);
                // Fan threshold comparison is inclusive.
                assert!(actuators.fan_on);
                assert!(!actuators.light_on);
                assert!(upload.is_ok());
            }
            CycleOutcome::Skipped(err) => panic!("cycle skipped: {err}"),
        }
    }

    #[test]
    fn timed_out_echo_reports_sentinel_without_presence() {
        let distance_cm = convert::distance_from_pulse(0);
        let temperature = ScriptedTemperature::new(25.0, None);
        let (mut control, _, uploads, _) =
            control_loop(StubLink::up(), temperature, distance_cm, 2048, false);

        match control.run_cycle() {
            CycleOutcome::Completed { snapshot, .. } => {
                assert_eq!(snapshot.distance_cm, -1.0);
                assert!(!snapshot.presence);
            }
            CycleOutcome::Skipped(err) => panic!("cycle skipped: {err}"),
        }

        // The sentinel still ships to the collector.
        assert_eq!(uploads.borrow()[0].distance_cm, -1.0);
    }

    #[test]
    fn fixed_temperature_source_never_fails() {
        let mut source = FixedTemperature(25.0);
        for _ in 0..5 {
            assert_eq!(source.read_temperature().unwrap(), 25.0);
        }
    }
}
