use chrono::NaiveTime;
use chrono_tz::Tz;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::domain::{ForecastStation, InstallationProfile, ModeLabels, ThresholdConfig};
use crate::error::ConfigError;
use crate::forecast::{DEFAULT_BASE_URL, RAD1H};
use crate::telemetry::LoggingConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub station: StationConfig,
    pub installation: InstallationProfile,
    pub domains: Vec<DomainConfig>,
    pub mqtt: MqttConfig,
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
    pub code: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_element")]
    pub element: String,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
}

impl StationConfig {
    pub fn station(&self) -> Result<ForecastStation, ConfigError> {
        ForecastStation::new(self.code.clone())
            .ok_or_else(|| ConfigError::invalid("station.code", "must not be empty"))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }
}

/// One threshold domain, e.g. the EV charger or the washing machine
#[derive(Debug, Clone, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    #[serde(flatten)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub labels: ModeLabels,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    #[serde(default = "default_true")]
    pub retain: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Local trigger time, `HH:MM`
    pub run_at: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub run_on_startup: bool,
}

impl ScheduleConfig {
    pub fn run_at_time(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(self.run_at.trim(), "%H:%M")
            .map_err(|e| ConfigError::invalid("schedule.run_at", format!("{e} (expected HH:MM)")))
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::invalid("schedule.timezone", e.to_string()))
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_element() -> String {
    RAD1H.to_string()
}
fn default_http_timeout() -> u64 {
    30
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_client_id() -> String {
    "pv-mode-advisor".to_string()
}
fn default_topic_prefix() -> String {
    "pvforecast".to_string()
}
fn default_timezone() -> String {
    "Europe/Berlin".to_string()
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Load from `$PVMODE_CONFIG` (default `config/default.toml`) plus `PVMODE__*` overrides
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("PVMODE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from(path)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("PVMODE__").split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let cfg: Config = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check every setting before any run is scheduled
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.station.station()?;
        if self.station.element.trim().is_empty() {
            return Err(ConfigError::invalid("station.element", "must not be empty"));
        }
        if self.station.http_timeout_seconds == 0 {
            return Err(ConfigError::invalid("station.http_timeout_seconds", "must be positive"));
        }

        let inst = &self.installation;
        if !(inst.peak_power_kw.is_finite() && inst.peak_power_kw > 0.0) {
            return Err(ConfigError::invalid("installation.peak_power_kw", "must be positive"));
        }
        if !(inst.efficiency > 0.0 && inst.efficiency <= 1.0) {
            return Err(ConfigError::invalid("installation.efficiency", "must be in (0, 1]"));
        }

        if self.domains.is_empty() {
            return Err(ConfigError::invalid("domains", "at least one domain is required"));
        }
        let mut seen = HashSet::new();
        for domain in &self.domains {
            let field = format!("domains.{}", domain.name);
            if domain.name.trim().is_empty() {
                return Err(ConfigError::invalid("domains.name", "must not be empty"));
            }
            if domain.name.contains(['/', '+', '#']) {
                return Err(ConfigError::invalid(field, "name must not contain '/', '+' or '#'"));
            }
            if !seen.insert(domain.name.as_str()) {
                return Err(ConfigError::invalid(field, "duplicate domain name"));
            }
            let t = &domain.thresholds;
            if !(t.pv_threshold.is_finite() && t.pv_threshold >= 0.0) {
                return Err(ConfigError::invalid(field, "pv_threshold must be a non-negative number"));
            }
            if !(t.base_load.is_finite() && t.base_load >= 0.0) {
                return Err(ConfigError::invalid(field, "base_load must be a non-negative number"));
            }
        }

        if self.mqtt.host.trim().is_empty() {
            return Err(ConfigError::invalid("mqtt.host", "must not be empty"));
        }
        if self.mqtt.topic_prefix.trim_matches('/').is_empty() {
            return Err(ConfigError::invalid("mqtt.topic_prefix", "must not be empty"));
        }

        self.schedule.run_at_time()?;
        self.schedule.tz()?;
        Ok(())
    }
}
