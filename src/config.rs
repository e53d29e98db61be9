//! Gateway configuration.
//!
//! One TOML file describes a whole gateway process: the bus, the radios with
//! the directions they relay, routing workers and beacons. Every CLI entry
//! point builds the same [`GatewayConfig`] programmatically.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::GateError;
use crate::predict::{DEFAULT_QTH, ISS_TLE, PassSpec, Qth, Tle};
use crate::radio::{aprsis, kiss};
use crate::types::{CHANNEL_DELIMITER, ChannelName, Direction, Frame};
use crate::worker::{BEACON_INTERVAL, SAT_BEACON_INTERVAL};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for GateError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Io(io) => GateError::Io(io),
            other => GateError::Config(other.to_string()),
        }
    }
}

/// Whole-process configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway callsign; the identity segment of its channel names.
    pub callsign: String,

    /// Default channel tag for the radios.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub radios: Vec<RadioEntry>,

    #[serde(default)]
    pub workers: Vec<WorkerConfig>,

    #[serde(default)]
    pub beacons: Vec<BeaconConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Bus connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// `redis://host:port`, bare `host:port`, or `memory://`
    #[serde(default = "default_bus_address")]
    pub address: String,
}

fn default_bus_address() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { address: default_bus_address() }
    }
}

/// A radio and the directions relayed for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioEntry {
    /// Relay heard frames onto `GateIn_<callsign>_<tag>`.
    #[serde(default = "default_true")]
    pub ingress: bool,

    /// Transmit frames from `GateOut_<callsign>_<tag>`.
    #[serde(default = "default_true")]
    pub egress: bool,

    /// Channel tag; falls back to the gateway tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(flatten)]
    pub transport: RadioConfig,
}

/// Radio transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RadioConfig {
    /// APRS-IS server over TCP
    AprsIs {
        #[serde(default = "default_aprsis_host")]
        host: String,
        #[serde(default = "default_aprsis_port")]
        port: u16,
        passcode: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<String>,
    },
    /// KISS TNC reachable over TCP
    KissTcp {
        host: String,
        #[serde(default = "default_kiss_port")]
        port: u16,
    },
    /// KISS TNC on a serial port, 8N1 at `speed` baud
    KissSerial { device: String, speed: u32 },
}

fn default_aprsis_host() -> String {
    aprsis::DEFAULT_HOST.to_string()
}

fn default_aprsis_port() -> u16 {
    aprsis::DEFAULT_PORT
}

fn default_kiss_port() -> u16 {
    kiss::DEFAULT_TCP_PORT
}

impl RadioConfig {
    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            RadioConfig::AprsIs { host, port, .. } => format!("APRS-IS {}:{}", host, port),
            RadioConfig::KissTcp { host, port } => format!("KISS {}:{}", host, port),
            RadioConfig::KissSerial { device, speed } => format!("KISS {} @ {} baud", device, speed),
        }
    }
}

/// A routing worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub inbound: Vec<String>,
    pub outbound: Vec<String>,
}

/// A beacon, optionally restricted to satellite passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconConfig {
    /// Frame in `SRC>DST,PATH:text` form
    pub frame: String,
    pub channels: Vec<String>,
    /// Seconds between beacons; defaults depend on the beacon kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satellite: Option<SatelliteConfig>,
}

impl BeaconConfig {
    pub fn interval(&self) -> Duration {
        match (self.interval_secs, &self.satellite) {
            (Some(secs), _) => Duration::from_secs(secs),
            (None, Some(_)) => SAT_BEACON_INTERVAL,
            (None, None) => BEACON_INTERVAL,
        }
    }
}

/// Pass gating for a satellite beacon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteConfig {
    #[serde(default = "default_tle")]
    pub tle: String,
    #[serde(default = "default_qth")]
    pub qth: Qth,
    /// Precomputed passes for the satellite over the ground station
    #[serde(default)]
    pub passes: Vec<PassSpec>,
}

fn default_tle() -> String {
    ISS_TLE.to_string()
}

fn default_qth() -> Qth {
    DEFAULT_QTH
}

impl GatewayConfig {
    /// Empty configuration for `callsign` with defaults everywhere else.
    pub fn new(callsign: impl Into<String>) -> Self {
        Self {
            callsign: callsign.into(),
            tag: None,
            log_level: default_log_level(),
            bus: BusConfig::default(),
            radios: Vec::new(),
            workers: Vec::new(),
            beacons: Vec::new(),
        }
    }

    /// Load and validate configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Channel a radio relays on in `direction`.
    pub fn radio_channel(&self, radio: &RadioEntry, direction: Direction) -> String {
        let tag = radio.tag.as_deref().or(self.tag.as_deref());
        ChannelName::new(direction, self.callsign.clone(), tag).to_string()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.callsign.is_empty() {
            return Err(ConfigError::Invalid("callsign is empty".into()));
        }
        if self.callsign.contains(CHANNEL_DELIMITER) {
            return Err(ConfigError::Invalid(format!(
                "callsign '{}' must not contain '{}'",
                self.callsign, CHANNEL_DELIMITER
            )));
        }
        if self.tag.as_deref() == Some("") {
            return Err(ConfigError::Invalid("tag is empty".into()));
        }
        if self.bus.address.is_empty() {
            return Err(ConfigError::Invalid("bus address is empty".into()));
        }
        if self.radios.is_empty() && self.workers.is_empty() && self.beacons.is_empty() {
            return Err(ConfigError::Invalid("no radios, workers or beacons configured".into()));
        }

        for (i, radio) in self.radios.iter().enumerate() {
            if !radio.ingress && !radio.egress {
                return Err(ConfigError::Invalid(format!("radio {} relays in neither direction", i)));
            }
            if radio.tag.as_deref() == Some("") {
                return Err(ConfigError::Invalid(format!("radio {} has an empty tag", i)));
            }
            match &radio.transport {
                RadioConfig::AprsIs { passcode, .. } if passcode.is_empty() => {
                    return Err(ConfigError::Invalid(format!("radio {} needs an APRS-IS passcode", i)));
                }
                RadioConfig::KissSerial { device, .. } if device.is_empty() => {
                    return Err(ConfigError::Invalid(format!("radio {} has an empty device", i)));
                }
                RadioConfig::KissSerial { speed: 0, .. } => {
                    return Err(ConfigError::Invalid(format!("radio {} has a zero line speed", i)));
                }
                _ => {}
            }
        }

        for (i, worker) in self.workers.iter().enumerate() {
            if worker.inbound.is_empty() {
                return Err(ConfigError::Invalid(format!("worker {} has no inbound channels", i)));
            }
            for channel in worker.inbound.iter().chain(&worker.outbound) {
                check_channel(channel)?;
            }
        }

        for (i, beacon) in self.beacons.iter().enumerate() {
            beacon
                .frame
                .parse::<Frame>()
                .map_err(|e| ConfigError::Invalid(format!("beacon {}: {}", i, e)))?;
            if beacon.channels.is_empty() {
                return Err(ConfigError::Invalid(format!("beacon {} has no channels", i)));
            }
            for channel in &beacon.channels {
                check_channel(channel)?;
            }
            if beacon.interval_secs == Some(0) {
                return Err(ConfigError::Invalid(format!("beacon {} has a zero interval", i)));
            }
            if let Some(satellite) = &beacon.satellite {
                satellite
                    .tle
                    .parse::<Tle>()
                    .map_err(|e| ConfigError::Invalid(format!("beacon {}: {}", i, e)))?;
            }
        }

        Ok(())
    }

    /// A complete example used by `gen-config`.
    pub fn example() -> Self {
        let mut config = Self::new("W2GMD");
        config.tag = Some("IGATE".into());
        config.radios = vec![
            RadioEntry {
                ingress: false,
                egress: true,
                tag: None,
                transport: RadioConfig::AprsIs {
                    host: default_aprsis_host(),
                    port: default_aprsis_port(),
                    passcode: "-1".into(),
                    filter: None,
                },
            },
            RadioEntry {
                ingress: true,
                egress: true,
                tag: Some("RF".into()),
                transport: RadioConfig::KissSerial { device: "/dev/ttyUSB0".into(), speed: 9600 },
            },
        ];
        config.workers = vec![WorkerConfig {
            inbound: vec!["GateIn_W2GMD_RF".into()],
            outbound: vec!["GateOut_W2GMD_IGATE".into()],
        }];
        config.beacons = vec![
            BeaconConfig {
                frame: "W2GMD>BEACON:>Experimental APRS Gateway".into(),
                channels: vec!["GateOut_W2GMD_IGATE".into()],
                interval_secs: None,
                satellite: None,
            },
            BeaconConfig {
                frame: "W2GMD>CQ,ARISS:!3745.60N/12229.85W`Experimental APRS Gateway CM87ss".into(),
                channels: vec!["GateOut_W2GMD_RF".into()],
                interval_secs: None,
                satellite: Some(SatelliteConfig {
                    tle: default_tle(),
                    qth: DEFAULT_QTH,
                    passes: vec![PassSpec { start: 1_700_000_000, duration_secs: 600 }],
                }),
            },
        ];
        config
    }
}

fn check_channel(channel: &str) -> Result<(), ConfigError> {
    channel
        .parse::<ChannelName>()
        .map(|_| ())
        .map_err(|e| ConfigError::Invalid(e.to_string()))
}
