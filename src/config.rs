use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::monitor::MonitorConfig;

/// `key=value` pairs given on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandLineSource {
    values: BTreeMap<String, String>,
}

impl CommandLineSource {
    /// Splits each argument on its first `=`. Later keys win.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let mut values = BTreeMap::new();
        for arg in args {
            let arg = arg.as_ref();
            let (key, value) = arg
                .split_once('=')
                .ok_or_else(|| Error::InvalidArgument(arg.to_string()))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(Error::InvalidArgument(arg.to_string()));
            }
            values.insert(key.to_string(), value.trim().to_string());
        }
        Ok(Self { values })
    }

    pub fn get_value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Msgpack,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OsConfig {
    /// Seconds between reports.
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default = "default_snapshot_ttl_ms")]
    pub snapshot_ttl_ms: u64,
    #[serde(default)]
    pub include_loopback: bool,
    #[serde(default)]
    pub format: ReportFormat,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Endpoint {
    pub name: String,
    pub server: String,
    pub secret: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Falls back to the top-level `[connection]` table.
    #[serde(default)]
    pub connection: Option<ConnectionConfig>,
}

/// Reconnect policy; delays are in seconds.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Copy)]
#[serde(default)]
pub struct ConnectionConfig {
    pub base_delay: u64,
    pub max_delay: u64,
    /// Negative means retry forever.
    pub max_retries: i32,
}

fn default_interval() -> u64 {
    10
}

fn default_snapshot_ttl_ms() -> u64 {
    1000
}

fn default_enabled() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_delay: 1,
            max_delay: 60,
            max_retries: -1,
        }
    }
}

impl Default for OsConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            snapshot_ttl_ms: default_snapshot_ttl_ms(),
            include_loopback: false,
            format: ReportFormat::default(),
            connection: ConnectionConfig::default(),
            endpoints: Vec::new(),
        }
    }
}

impl Endpoint {
    pub fn connection_or(&self, fallback: &ConnectionConfig) -> ConnectionConfig {
        self.connection.unwrap_or(*fallback)
    }
}

impl OsConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        Self::load(Some(path), &[] as &[&str])
    }

    /// Reads the optional TOML file, then applies `key=value` overrides.
    pub fn load<S: AsRef<str>>(path: Option<&str>, overrides: &[S]) -> Result<Self> {
        let overrides = CommandLineSource::parse(overrides)?;

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        for (key, value) in overrides.iter() {
            builder = builder.set_override(key, override_value(value))?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.monitor().validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let toml = toml::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to serialize config: {}", e),
            )
        })?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    pub fn monitor(&self) -> MonitorConfig {
        MonitorConfig {
            snapshot_ttl: Duration::from_millis(self.snapshot_ttl_ms),
            include_loopback: self.include_loopback,
        }
    }
}

fn override_value(raw: &str) -> config::Value {
    if let Ok(v) = raw.parse::<i64>() {
        return v.into();
    }
    if let Ok(v) = raw.parse::<bool>() {
        return v.into();
    }
    raw.into()
}
