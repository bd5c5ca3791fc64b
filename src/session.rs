use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Identifies the process reporting gauges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementSession {
    pub application_name: String,
    pub host_name: String,
    pub instance_name: String,
    pub os: String,
    pub version: String,
    pub start_timestamp: u64,
}

impl MeasurementSession {
    pub fn new(application_name: &str, host_name: &str, instance_name: &str) -> Self {
        Self {
            application_name: application_name.to_string(),
            host_name: host_name.to_string(),
            instance_name: instance_name.to_string(),
            os: os_info::get().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_timestamp: now_millis(),
        }
    }

    /// Session for the standalone OS monitor: application `os`, instance `host`.
    pub fn for_host() -> Self {
        let host_name = System::host_name().unwrap_or_else(|| "localhost".to_string());
        Self::new("os", &host_name, "host")
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
