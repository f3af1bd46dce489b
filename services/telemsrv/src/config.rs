//! Agent configuration
//!
//! Layered loading: built-in defaults, then the TOML file, then
//! `TELEMSRV_`-prefixed environment variables (e.g.
//! `TELEMSRV_COLLECTOR__URL` overrides `collector.url`).

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

/// Complete agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub wifi: WifiConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device identity reported in every payload
    #[serde(default = "default_device_id")]
    pub id: String,

    /// Modbus station id of the meter
    #[serde(default = "default_station_id")]
    pub station_id: u8,

    /// Offset applied to UTC when formatting payload timestamps
    #[serde(default = "default_tz_offset")]
    pub timezone_offset_hours: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    #[serde(default = "default_serial_device")]
    pub device: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Per-transaction response deadline
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Quiet interval between register transactions (device turnaround)
    #[serde(default = "default_pacing")]
    pub pacing_ms: u64,

    /// BCM pin driving DE/RE; `None` for auto-direction adapters
    #[serde(default)]
    pub direction_pin: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "default_collector_url")]
    pub url: String,

    #[serde(default = "default_upload_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between cycle starts
    #[serde(default = "default_cycle_interval")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiConfig {
    /// Well-known provisioning access point
    #[serde(default = "default_ap_ssid")]
    pub ap_ssid: String,

    #[serde(default = "default_ap_password")]
    pub ap_password: String,

    /// Station association attempt budget before falling back to the AP
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_attempt_delay")]
    pub attempt_delay_secs: u64,

    /// Wireless interface to pin nmcli commands to; `None` lets it pick
    #[serde(default)]
    pub interface: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_bind")]
    pub bind_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Daily-rolling log files are written here when set
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_device_id() -> String {
    "multimedidor_ufrj_001".to_string()
}
fn default_station_id() -> u8 {
    1
}
fn default_tz_offset() -> i32 {
    -3
}
fn default_serial_device() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud_rate() -> u32 {
    9600
}
fn default_read_timeout() -> u64 {
    1000
}
fn default_pacing() -> u64 {
    50
}
fn default_collector_url() -> String {
    "http://192.168.1.183:8080/api/data".to_string()
}
fn default_upload_timeout() -> u64 {
    20
}
fn default_cycle_interval() -> u64 {
    15
}
fn default_ap_ssid() -> String {
    "Multimedidor_ESP32".to_string()
}
fn default_ap_password() -> String {
    "12345678".to_string()
}
fn default_max_attempts() -> u32 {
    20
}
fn default_attempt_delay() -> u64 {
    1
}
fn default_api_bind() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_store_path() -> String {
    "credentials.json".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: default_device_id(),
            station_id: default_station_id(),
            timezone_offset_hours: default_tz_offset(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: default_serial_device(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout(),
            pacing_ms: default_pacing(),
            direction_pin: None,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            url: default_collector_url(),
            timeout_secs: default_upload_timeout(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cycle_interval(),
        }
    }
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ap_ssid: default_ap_ssid(),
            ap_password: default_ap_password(),
            max_attempts: default_max_attempts(),
            attempt_delay_secs: default_attempt_delay(),
            interface: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_api_bind(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            serial: SerialConfig::default(),
            collector: CollectorConfig::default(),
            scheduler: SchedulerConfig::default(),
            wifi: WifiConfig::default(),
            api: ApiConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration: defaults <- TOML file <- environment
    pub fn load(config_path: &Path) -> Result<Self> {
        let config: AgentConfig = Figment::from(Serialized::defaults(AgentConfig::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("TELEMSRV_").split("__"))
            .extract()
            .map_err(|e| AgentError::ConfigError(format!("Failed to load configuration: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.device.id.is_empty() {
            return Err(AgentError::config("device.id must not be empty"));
        }
        if self.collector.url.is_empty() {
            return Err(AgentError::config("collector.url must not be empty"));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(AgentError::config("scheduler.interval_secs must be > 0"));
        }
        if self.wifi.max_attempts == 0 {
            return Err(AgentError::config("wifi.max_attempts must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AgentConfig::default();
        config.validate().expect("defaults should validate");
        assert_eq!(config.scheduler.interval_secs, 15);
        assert_eq!(config.collector.timeout_secs, 20);
        assert_eq!(config.serial.pacing_ms, 50);
        assert_eq!(config.device.station_id, 1);
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[collector]\nurl = \"http://collector.local/api/data\"\n\n[scheduler]\ninterval_secs = 60"
        )
        .expect("write config");

        let config = AgentConfig::load(file.path()).expect("config should load");
        assert_eq!(config.collector.url, "http://collector.local/api/data");
        assert_eq!(config.scheduler.interval_secs, 60);
        // Untouched sections keep their defaults
        assert_eq!(config.serial.baud_rate, 9600);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config =
            AgentConfig::load(Path::new("/nonexistent/telemsrv.toml")).expect("defaults apply");
        assert_eq!(config.device.id, "multimedidor_ufrj_001");
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = AgentConfig::default();
        config.scheduler.interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
