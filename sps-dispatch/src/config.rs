use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::bail;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// IANA time zone for reading timestamps. Defaults to the system zone.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub sampling: SamplingConfig,
    pub sensors: SensorsConfig,
    pub storage: StorageConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Minimum seconds between two complete read cycles of one sensor
    pub interval_secs: u64,
    /// Pause between polls of one sensor, and between wait-for-bytes checks
    pub tick_ms: u64,
    /// Give up waiting for a response after this many seconds. Unset waits forever.
    pub response_timeout_secs: Option<u64>,
}

impl SamplingConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_secs.map(Duration::from_secs)
    }

    /// A zero tick would turn any response timeout into a single check.
    pub fn validate(&self) -> color_eyre::Result<()> {
        if self.tick_ms == 0 {
            bail!("sampling.tick_ms must be greater than zero");
        }
        Ok(())
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            tick_ms: 1000,
            response_timeout_secs: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SensorsConfig {
    Serial {
        /// Device path prefix used when enumerating ports
        #[serde(default = "default_port_prefix")]
        port_prefix: String,
        /// Explicit device paths. Enumeration is skipped when non-empty.
        #[serde(default)]
        ports: Vec<String>,
    },
    Mock {
        /// Number of simulated sensors
        count: usize,
    },
}

fn default_port_prefix() -> String {
    "/dev/ttyUSB".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    Disabled,
    Memory,
    Csv { dir: PathBuf },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TelemetryConfig {
    Disabled,
    Mqtt(MqttConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    pub topic: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "sps-dispatch".to_string()
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> color_eyre::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.sampling.validate()?;
        Ok(config)
    }

    pub fn time_zone(&self) -> color_eyre::Result<jiff::tz::TimeZone> {
        match &self.timezone {
            Some(name) => Ok(jiff::tz::TimeZone::get(name)?),
            None => Ok(jiff::tz::TimeZone::system()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: None,
            sampling: SamplingConfig::default(),
            sensors: SensorsConfig::Serial {
                port_prefix: default_port_prefix(),
                ports: Vec::new(),
            },
            storage: StorageConfig::Csv {
                dir: PathBuf::from("."),
            },
            telemetry: TelemetryConfig::Disabled,
        }
    }
}
