use serde::{Deserialize, Serialize};

/// Port the WebSocket server listens on.
pub const DEFAULT_WS_PORT: u16 = 81;

/// Interval between link status polls while joining the network.
pub const DEFAULT_JOIN_POLL_MS: u32 = 500;

/// Pause between two iterations of the sampling loop (~10 Hz).
pub const DEFAULT_SAMPLE_INTERVAL_MS: u32 = 100;

/// Highest code a 12-bit converter returns.
pub const ADC_FULL_SCALE: u16 = 4095;

/// Voltage that corresponds to [`ADC_FULL_SCALE`].
pub const ADC_REFERENCE_VOLTS: f64 = 3.3;

/// Device configuration, built once at startup and handed to each component
/// by reference.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct Config<'a> {
    pub internet: InternetConfig<'a>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
}

impl<'a> Config<'a> {
    /// Default configuration for the given network credentials.
    pub fn new(ssid: &'a str, password: &'a str) -> Self {
        Self {
            internet: InternetConfig::new(ssid, password),
            ..Self::default()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternetConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
    /// How often the link status is polled while joining.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u32,
}

impl<'a> InternetConfig<'a> {
    pub fn new(ssid: &'a str, password: &'a str) -> Self {
        Self {
            ssid,
            password,
            poll_interval_ms: DEFAULT_JOIN_POLL_MS,
        }
    }
}

impl Default for InternetConfig<'_> {
    fn default() -> Self {
        Self::new("", "")
    }
}

fn default_poll_interval() -> u32 {
    DEFAULT_JOIN_POLL_MS
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_WS_PORT,
        }
    }
}

/// Sampling cadence and the scale used to turn converter codes into volts.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Fixed sleep after each loop iteration.
    pub interval_ms: u32,
    /// Converter code that maps to `reference_volts`.
    pub full_scale: u16,
    pub reference_volts: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            full_scale: ADC_FULL_SCALE,
            reference_volts: ADC_REFERENCE_VOLTS,
        }
    }
}
