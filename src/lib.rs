//! Operating system gauges (CPU, memory, swap, network, disk) exposed
//! through a registry keyed by composite metric names.
//!
//! ```no_run
//! use osmon::metric_name::name;
//! use osmon::monitor::{MonitorConfig, OsMonitor};
//! use osmon::registry::GaugeRegistry;
//!
//! let registry = GaugeRegistry::new();
//! OsMonitor::new(&MonitorConfig::default())?.initialize(&registry)?;
//! let used = registry.value(&name("mem_usage").r#type("used").build());
//! # Ok::<(), osmon::Error>(())
//! ```

pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod metric_name;
pub mod metrics;
pub mod monitor;
pub mod procfs;
pub mod registry;
pub mod session;

pub use error::{Error, Result};
