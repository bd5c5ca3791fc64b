//! Counters `sysinfo` does not expose, read from `/proc` and `/sys`.
//!
//! Parsers take file contents so they can be tested anywhere; the readers
//! return `None` off Linux or when the file is missing.

use std::collections::HashMap;

/// Aggregate CPU time in jiffies since boot, from the `cpu ` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

/// CPU utilization split, each component in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuUsage {
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub idle: f64,
    pub wait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub stolen: f64,
}

impl CpuUsage {
    pub const NAN: CpuUsage = CpuUsage {
        user: f64::NAN,
        nice: f64::NAN,
        system: f64::NAN,
        idle: f64::NAN,
        wait: f64::NAN,
        irq: f64::NAN,
        softirq: f64::NAN,
        stolen: f64::NAN,
    };

    /// Everything but idle.
    pub fn combined(&self) -> f64 {
        100.0 - self.idle
    }

    pub fn is_nan(&self) -> bool {
        self.idle.is_nan()
    }
}

impl CpuTimes {
    pub fn parse(content: &str) -> Option<Self> {
        let line = content.lines().find(|l| l.starts_with("cpu "))?;
        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .map(|f| f.parse().unwrap_or(0))
            .collect();
        if fields.len() < 4 {
            return None;
        }
        let field = |idx: usize| fields.get(idx).copied().unwrap_or(0);
        Some(Self {
            user: field(0),
            nice: field(1),
            system: field(2),
            idle: field(3),
            iowait: field(4),
            irq: field(5),
            softirq: field(6),
            steal: field(7),
        })
    }

    pub fn read() -> Option<Self> {
        read_proc("/proc/stat").and_then(|content| Self::parse(&content))
    }

    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Utilization between `prev` and `self`; all NaN when no time elapsed.
    ///
    /// A counter that went backwards (iowait may) counts as zero, and the
    /// total is the sum of the clamped deltas.
    pub fn usage_since(&self, prev: &CpuTimes) -> CpuUsage {
        let delta = CpuTimes {
            user: self.user.saturating_sub(prev.user),
            nice: self.nice.saturating_sub(prev.nice),
            system: self.system.saturating_sub(prev.system),
            idle: self.idle.saturating_sub(prev.idle),
            iowait: self.iowait.saturating_sub(prev.iowait),
            irq: self.irq.saturating_sub(prev.irq),
            softirq: self.softirq.saturating_sub(prev.softirq),
            steal: self.steal.saturating_sub(prev.steal),
        };
        let total = delta.total();
        if total == 0 {
            return CpuUsage::NAN;
        }
        let pct = |ticks: u64| ticks as f64 / total as f64 * 100.0;
        CpuUsage {
            user: pct(delta.user),
            nice: pct(delta.nice),
            system: pct(delta.system),
            idle: pct(delta.idle),
            wait: pct(delta.iowait),
            irq: pct(delta.irq),
            softirq: pct(delta.softirq),
            stolen: pct(delta.steal),
        }
    }
}

/// Pages swapped in and out since boot, from `/proc/vmstat`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapPages {
    pub page_in: u64,
    pub page_out: u64,
}

impl SwapPages {
    pub fn parse(content: &str) -> Self {
        let mut pages = Self::default();
        for line in content.lines() {
            let mut parts = line.split_whitespace();
            let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };
            match key {
                "pswpin" => pages.page_in = value.parse().unwrap_or(0),
                "pswpout" => pages.page_out = value.parse().unwrap_or(0),
                _ => {}
            }
        }
        pages
    }

    pub fn read() -> Option<Self> {
        read_proc("/proc/vmstat").map(|content| Self::parse(&content))
    }
}

/// I/Os currently in flight per block device, from `/proc/diskstats`.
pub fn parse_disk_queues(content: &str) -> HashMap<String, u64> {
    content
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 12 {
                return None;
            }
            let in_flight = parts[11].parse().ok()?;
            Some((parts[2].to_string(), in_flight))
        })
        .collect()
}

pub fn read_disk_queues() -> Option<HashMap<String, u64>> {
    read_proc("/proc/diskstats").map(|content| parse_disk_queues(&content))
}

/// Interfaces carrying routes, in routing-table order without duplicates.
pub fn parse_routed_interfaces(content: &str) -> Vec<String> {
    let mut interfaces: Vec<String> = Vec::new();
    for line in content.lines().skip(1) {
        if let Some(iface) = line.split_whitespace().next() {
            if !interfaces.iter().any(|i| i == iface) {
                interfaces.push(iface.to_string());
            }
        }
    }
    interfaces
}

pub fn read_routed_interfaces() -> Vec<String> {
    read_proc("/proc/net/route")
        .map(|content| parse_routed_interfaces(&content))
        .unwrap_or_default()
}

/// Dropped packet counters `(rx, tx)` of an interface.
pub fn read_dropped(ifname: &str) -> Option<(u64, u64)> {
    let read = |counter: &str| {
        read_proc(&format!("/sys/class/net/{}/statistics/{}", ifname, counter))
            .and_then(|content| content.trim().parse::<u64>().ok())
    };
    Some((read("rx_dropped")?, read("tx_dropped")?))
}

#[cfg(target_os = "linux")]
fn read_proc(path: &str) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

#[cfg(not(target_os = "linux"))]
fn read_proc(_path: &str) -> Option<String> {
    None
}
