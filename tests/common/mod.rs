#![allow(dead_code)]

use std::mem;
use std::path::PathBuf;
use std::time::Duration;

use osmon::metric_name::MetricName;
use osmon::monitor::{MonitorConfig, OsMonitor};
use osmon::registry::{GaugeRegistry, GaugeValue};
use tempfile::TempDir;

pub struct TestConfig {
    pub temp_dir: TempDir,
    pub config_path: PathBuf,
}

impl TestConfig {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("test_config.toml");
        Self {
            temp_dir,
            config_path,
        }
    }

    pub fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }
}

impl Drop for TestConfig {
    fn drop(&mut self) {
        // Clean up temp directory by replacing it with a dummy value
        let _ = mem::replace(&mut self.temp_dir, tempfile::tempdir().unwrap()).close();
    }
}

/// Fresh registry with the OS gauges registered. The long snapshot TTL
/// keeps related gauges on one snapshot while a test reads them.
pub fn set_up() -> (GaugeRegistry, OsMonitor) {
    let config = MonitorConfig {
        snapshot_ttl: Duration::from_secs(60),
        include_loopback: true,
    };
    let registry = GaugeRegistry::new();
    let monitor = OsMonitor::new(&config).unwrap();
    monitor.initialize(&registry).unwrap();
    (registry, monitor)
}

pub fn gauge(registry: &GaugeRegistry, name: &MetricName) -> GaugeValue {
    let names: Vec<String> = registry.names().iter().map(|n| n.to_string()).collect();
    registry
        .value(name)
        .unwrap_or_else(|| panic!("{} not found in {:?}", name, names))
}

pub fn double_gauge(registry: &GaugeRegistry, name: &MetricName) -> f64 {
    match gauge(registry, name) {
        GaugeValue::Double(v) => v,
        other => panic!("{} is not a double: {:?}", name, other),
    }
}

pub fn long_gauge(registry: &GaugeRegistry, name: &MetricName) -> i64 {
    match gauge(registry, name) {
        GaugeValue::Long(v) => v,
        other => panic!("{} is not a long: {:?}", name, other),
    }
}

pub fn int_gauge(registry: &GaugeRegistry, name: &MetricName) -> i32 {
    match gauge(registry, name) {
        GaugeValue::Int(v) => v,
        other => panic!("{} is not an int: {:?}", name, other),
    }
}
