use std::{
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use dht_sensor::dht11;
use embedded_svc::{
    http::{client::Client as HttpClient, Status},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    adc::{
        attenuation::DB_11,
        oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
        ADC1,
    },
    delay::Ets,
    gpio::{AnyIOPin, Gpio34, IOPin, Input, InputOutput, Output, PinDriver, Pull},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};

use intelliroom_common::{
    convert, ActuatorBank, ActuatorState, Connectivity, ConnectivityError, ConnectivityState,
    ControlLoop, CycleOutcome, Decision, DistanceRanger, FatalStartupError, FixedTemperature,
    LightSensor, NetworkConfig, NodeConfig, SensorReadError, SensorSnapshot, TelemetrySink,
    TemperatureSource, UploadError,
};

const LDR_ADC_GPIO: i32 = 34;
const TRIG_GPIO: i32 = 13;
const ECHO_GPIO: i32 = 12;
const FAN_GPIO: i32 = 14;
const LED_GPIO: i32 = 27;
const DHT11_GPIO: i32 = 15;

const TRIG_SETTLE_US: u32 = 2;
const TRIG_PULSE_US: u32 = 10;
const WIFI_TEARDOWN_DELAY_MS: u64 = 1_000;
const MAX_RESPONSE_BODY: usize = 256;

struct WifiLink {
    wifi: BlockingWifi<EspWifi<'static>>,
    ssid: String,
    attempts: u32,
    poll_delay: Duration,
    state: ConnectivityState,
}

impl WifiLink {
    fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs_partition: EspDefaultNvsPartition,
        network: &NetworkConfig,
        attempts: u32,
        poll_delay_ms: u64,
    ) -> anyhow::Result<Self> {
        let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;

        let auth_method = if network.wifi_pass.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };

        esp_wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: network
                .wifi_ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("wifi ssid too long"))?,
            password: network
                .wifi_pass
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("wifi password too long"))?,
            auth_method,
            ..Default::default()
        }))?;

        let wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;

        Ok(Self {
            wifi,
            ssid: network.wifi_ssid.clone(),
            attempts,
            poll_delay: Duration::from_millis(poll_delay_ms),
            state: ConnectivityState::Disconnected,
        })
    }
}

impl Connectivity for WifiLink {
    fn is_connected(&mut self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    fn connect(&mut self) -> Result<ConnectivityState, ConnectivityError> {
        // Tear down any half-open association first; reconnecting on
        // top of one wedges the station interface.
        if self.is_connected() {
            if let Err(err) = self.wifi.disconnect() {
                warn!("wifi disconnect before reconnect failed: {err}");
            }
            thread::sleep(Duration::from_millis(WIFI_TEARDOWN_DELAY_MS));
        }

        self.state = ConnectivityState::Connecting;

        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi
                .start()
                .map_err(|err| ConnectivityError::new(format!("wifi start failed: {err}")))?;
        }

        info!("wifi associating with `{}`", self.ssid);
        self.wifi
            .wifi_mut()
            .connect()
            .map_err(|err| ConnectivityError::new(format!("wifi connect request failed: {err}")))?;

        for attempt in 1..=self.attempts {
            if self.wifi.is_connected().unwrap_or(false) {
                self.wifi.wait_netif_up().map_err(|err| {
                    ConnectivityError::new(format!("wifi netif up failed: {err}"))
                })?;

                match self.wifi.wifi().sta_netif().get_ip_info() {
                    Ok(ip_info) => info!(
                        "wifi connected on attempt {attempt} (ip: {})",
                        ip_info.ip
                    ),
                    Err(_) => info!("wifi connected on attempt {attempt}"),
                }
                self.state = ConnectivityState::Connected;
                return Ok(self.state);
            }

            info!("waiting for wifi ({attempt}/{})", self.attempts);
            thread::sleep(self.poll_delay);
        }

        self.state = ConnectivityState::Disconnected;
        let _ = self.wifi.disconnect();
        Err(ConnectivityError::new(format!(
            "no association after {} attempts",
            self.attempts
        )))
    }
}

struct UltrasonicRanger {
    trigger: PinDriver<'static, AnyIOPin, Output>,
    echo: PinDriver<'static, AnyIOPin, Input>,
    ceiling: Duration,
}

impl UltrasonicRanger {
    fn new(trigger_pin: AnyIOPin, echo_pin: AnyIOPin, echo_timeout_us: u64) -> anyhow::Result<Self> {
        let mut trigger = PinDriver::output(trigger_pin)?;
        trigger.set_low()?;
        let echo = PinDriver::input(echo_pin)?;

        Ok(Self {
            trigger,
            echo,
            ceiling: Duration::from_micros(echo_timeout_us),
        })
    }

    /// Fires the trigger pulse and times the echo line's high pulse.
    /// Returns 0 when no echo is observed within the ceiling.
    fn time_echo_pulse(&mut self) -> Result<i64, esp_idf_sys::EspError> {
        self.trigger.set_low()?;
        Ets::delay_us(TRIG_SETTLE_US);
        self.trigger.set_high()?;
        Ets::delay_us(TRIG_PULSE_US);
        self.trigger.set_low()?;

        let armed = Instant::now();
        while self.echo.is_low() {
            if armed.elapsed() >= self.ceiling {
                return Ok(0);
            }
        }

        let rising = Instant::now();
        while self.echo.is_high() {
            if rising.elapsed() >= self.ceiling {
                return Ok(0);
            }
        }

        Ok(rising.elapsed().as_micros() as i64)
    }
}

impl DistanceRanger for UltrasonicRanger {
    fn measure_distance(&mut self) -> f32 {
        match self.time_echo_pulse() {
            Ok(duration_us) => convert::distance_from_pulse(duration_us),
            Err(err) => {
                warn!("ultrasonic read failed on GPIO{ECHO_GPIO}: {err}");
                convert::DISTANCE_INVALID
            }
        }
    }
}

struct LdrReader {
    channel: AdcChannelDriver<'static, Gpio34, AdcDriver<'static, ADC1>>,
}

impl LdrReader {
    fn new(adc: ADC1, pin: Gpio34) -> anyhow::Result<Self> {
        let adc = AdcDriver::new(adc)?;
        let config = AdcChannelConfig {
            attenuation: DB_11,
            ..Default::default()
        };
        let channel = AdcChannelDriver::new(adc, pin, &config)?;
        Ok(Self { channel })
    }
}

impl LightSensor for LdrReader {
    fn read_light_percent(&mut self) -> u8 {
        match self.channel.read_raw() {
            Ok(raw) => convert::light_percent_from_raw(raw),
            Err(err) => {
                warn!("ldr read failed on GPIO{LDR_ADC_GPIO}: {err}");
                0
            }
        }
    }
}

struct Dht11Temperature {
    pin: PinDriver<'static, AnyIOPin, InputOutput>,
    delay: Ets,
}

impl Dht11Temperature {
    fn new(pin: AnyIOPin) -> anyhow::Result<Self> {
        let mut pin = PinDriver::input_output_od(pin)?;
        pin.set_pull(Pull::Up)?;
        pin.set_high()?;
        Ok(Self { pin, delay: Ets })
    }
}

impl TemperatureSource for Dht11Temperature {
    fn read_temperature(&mut self) -> Result<f32, SensorReadError> {
        self.pin.set_high().map_err(|err| {
            SensorReadError::new(format!("dht11 line reset failed: {err}"))
        })?;

        match dht11::blocking::read(&mut self.delay, &mut self.pin) {
            Ok(reading) => Ok(reading.temperature as f32),
            Err(err) => Err(SensorReadError::new(format!(
                "dht11 read failed on GPIO{DHT11_GPIO}: {err:?}"
            ))),
        }
    }
}

struct GpioActuators {
    fan: PinDriver<'static, AnyIOPin, Output>,
    light: Option<PinDriver<'static, AnyIOPin, Output>>,
}

impl GpioActuators {
    fn new(fan_pin: AnyIOPin, light_pin: Option<AnyIOPin>) -> anyhow::Result<Self> {
        let mut fan = PinDriver::output(fan_pin)?;
        fan.set_low()?;

        let light = match light_pin {
            Some(pin) => {
                let mut light = PinDriver::output(pin)?;
                light.set_low()?;
                Some(light)
            }
            None => None,
        };

        Ok(Self { fan, light })
    }
}

impl ActuatorBank for GpioActuators {
    fn apply(&mut self, decision: &Decision) -> ActuatorState {
        if let Err(err) = self.fan.set_level(decision.fan_on.into()) {
            warn!("fan write failed on GPIO{FAN_GPIO}: {err}");
        }

        if let (Some(light), Some(light_on)) = (self.light.as_mut(), decision.light_on) {
            if let Err(err) = light.set_level(light_on.into()) {
                warn!("led write failed on GPIO{LED_GPIO}: {err}");
            }
        }

        // Report the output latches, not the requested command.
        ActuatorState {
            fan_on: self.fan.is_set_high(),
            light_on: self
                .light
                .as_ref()
                .map(|light| light.is_set_high())
                .unwrap_or(false),
        }
    }
}

struct HttpTelemetry {
    url: String,
    timeout: Duration,
}

impl TelemetrySink for HttpTelemetry {
    fn upload(&mut self, snapshot: &SensorSnapshot) -> Result<String, UploadError> {
        let body = serde_json::to_vec(snapshot)
            .map_err(|err| UploadError::new(format!("payload serialization failed: {err}")))?;

        let http_conf = HttpClientConfiguration {
            timeout: Some(self.timeout),
            ..Default::default()
        };
        let connection = EspHttpConnection::new(&http_conf)
            .map_err(|err| UploadError::new(format!("http connection failed: {err}")))?;
        let mut client = HttpClient::wrap(connection);

        let content_length = body.len().to_string();
        let headers = [
            ("Content-Type", "application/json"),
            ("Content-Length", content_length.as_str()),
        ];

        let mut request = client
            .post(&self.url, &headers)
            .map_err(|err| UploadError::new(format!("http request failed: {err:?}")))?;
        request
            .write_all(&body)
            .map_err(|err| UploadError::new(format!("http write failed: {err:?}")))?;
        let mut response = request
            .submit()
            .map_err(|err| UploadError::new(format!("http submit failed: {err:?}")))?;

        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(UploadError::new(format!("collector returned HTTP {status}")));
        }

        // The collector's reply is logged verbatim, never parsed.
        let mut buffer = [0_u8; MAX_RESPONSE_BODY];
        let read = response.read(&mut buffer).unwrap_or(0);
        Ok(String::from_utf8_lossy(&buffer[..read]).into_owned())
    }
}

fn build_config() -> NodeConfig {
    let mut config = NodeConfig::default();

    if let Some(ssid) = option_env!("WIFI_SSID") {
        config.network.wifi_ssid = ssid.to_string();
    }
    if let Some(pass) = option_env!("WIFI_PASS") {
        config.network.wifi_pass = pass.to_string();
    }
    if let Some(url) = option_env!("COLLECTOR_URL") {
        config.network.collector_url = url.to_string();
    }
    if option_env!("USE_DHT11").is_some() {
        config.use_dht11 = true;
    }

    config.thresholds.sanitize();
    config
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let config = build_config();
    info!(
        "starting intelliroom node (collector: {})",
        config.network.collector_url
    );

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let Peripherals {
        modem, pins, adc1, ..
    } = Peripherals::take()?;

    let link = WifiLink::new(
        modem,
        sys_loop,
        nvs_partition,
        &config.network,
        config.connect_attempts,
        config.connect_poll_delay_ms,
    )
    .context("failed to initialize wifi")?;

    let ranger = UltrasonicRanger::new(
        pins.gpio13.downgrade(),
        pins.gpio12.downgrade(),
        config.echo_timeout_us,
    )
    .context("failed to initialize ultrasonic ranger")?;

    let light = LdrReader::new(adc1, pins.gpio34).context("failed to initialize ldr")?;

    let temperature: Box<dyn TemperatureSource> = if config.use_dht11 {
        Box::new(
            Dht11Temperature::new(pins.gpio15.downgrade())
                .context("failed to initialize dht11")?,
        )
    } else {
        info!(
            "no temperature sensor configured; reporting fixed {:.1}C",
            config.placeholder_temp_c
        );
        Box::new(FixedTemperature(config.placeholder_temp_c))
    };

    let actuators = GpioActuators::new(
        pins.gpio14.downgrade(),
        config
            .thresholds
            .light_threshold_pct
            .map(|_| pins.gpio27.downgrade()),
    )
    .context("failed to initialize actuators")?;

    let telemetry = HttpTelemetry {
        url: config.network.collector_url.clone(),
        timeout: Duration::from_millis(config.network.upload_timeout_ms),
    };

    let mut control = ControlLoop::new(
        link,
        ranger,
        light,
        temperature,
        actuators,
        telemetry,
        config.thresholds.clone(),
    );

    control
        .start()
        .map_err(FatalStartupError::from)
        .context("wifi association failed at startup")?;

    let cycle_sleep = Duration::from_millis(config.cycle_interval_ms);

    loop {
        match control.run_cycle() {
            CycleOutcome::Completed {
                snapshot,
                actuators,
                upload,
            } => {
                info!(
                    "temp {:.1}C | light {}% | distance {} cm | presence {} | fan {} | led {}",
                    snapshot.temperature,
                    snapshot.light_percent,
                    snapshot.distance_cm,
                    if snapshot.presence { "yes" } else { "no" },
                    if actuators.fan_on { "ON" } else { "OFF" },
                    if actuators.light_on { "ON" } else { "OFF" },
                );
                match upload {
                    Ok(reply) => info!("collector response: {reply}"),
                    Err(err) => warn!("telemetry dropped: {err}"),
                }
            }
            CycleOutcome::Skipped(err) => warn!("cycle skipped: {err}"),
        }

        thread::sleep(cycle_sleep);
    }
}
