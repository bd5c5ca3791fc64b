use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use netstat2::{get_sockets_info, AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo};
use parking_lot::Mutex;
use sysinfo::{Disks, LoadAvg, Networks, System};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::metrics::{
    CpuMetricSet, FileSystemMetricSet, MemoryMetricSet, NetworkMetricSet, SocketMetricSet,
    SwapMetricSet,
};
use crate::procfs::{self, CpuTimes, CpuUsage, SwapPages};
use crate::registry::{GaugeRegistry, SnapshotScope};

/// File systems never reported as local disks.
const NON_LOCAL_FILE_SYSTEMS: &[&str] = &[
    "nfs", "nfs4", "cifs", "smb", "smbfs", "smb3", "sshfs", "fuse.sshfs", "afs", "ceph",
    "glusterfs", "9p", "tmpfs", "ramfs", "devtmpfs", "proc", "sysfs", "autofs",
];

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// How long a sampled value is reused before the OS is read again.
    pub snapshot_ttl: Duration,
    pub include_loopback: bool,
}

impl MonitorConfig {
    /// A zero TTL would resample between two gauges of the same group.
    pub fn validate(&self) -> Result<()> {
        if self.snapshot_ttl.is_zero() {
            return Err(Error::InvalidArgument(
                "snapshot_ttl must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl: Duration::from_secs(1),
            include_loopback: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

impl MemoryUsage {
    fn new(total: u64, used: u64) -> Self {
        let used = used.min(total);
        Self {
            total,
            used,
            free: total - used,
        }
    }

    /// NaN when `total` is zero.
    pub fn percent(&self) -> f64 {
        self.used as f64 / self.total as f64 * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    /// `(rx, tx)`, absent where the platform has no counter.
    pub dropped: Option<(u64, u64)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileSystemUsage {
    pub space: MemoryUsage,
    pub read_bytes: u64,
    pub written_bytes: u64,
    /// I/Os in flight on the backing device, -1 when unknown.
    pub queue: f64,
}

#[derive(Default)]
struct Freshness(Option<Instant>);

impl Freshness {
    /// Inside a snapshot pass started at `pass`, the decision is taken once:
    /// values fresh at the start are kept, and so are refreshes made during
    /// the pass.
    fn is_due(&self, ttl: Duration, pass: Option<Instant>) -> bool {
        match (self.0, pass) {
            (None, _) => true,
            (Some(at), None) => at.elapsed() >= ttl,
            (Some(at), Some(start)) => at < start && start.duration_since(at) >= ttl,
        }
    }

    fn mark(&mut self) {
        self.0 = Some(Instant::now());
    }
}

/// OS handles plus the cached snapshots gauges read from.
pub struct Sampler {
    ttl: Duration,
    system: System,
    networks: Networks,
    disks: Disks,
    cpu_mhz: i32,
    cpu_cores: i32,
    cpu_baseline: Option<CpuTimes>,
    cpu_usage: Option<(Instant, CpuUsage)>,
    memory_at: Freshness,
    networks_at: Freshness,
    dropped: HashMap<String, (u64, u64)>,
    disks_at: Freshness,
    swap_pages: Option<SwapPages>,
    swap_pages_at: Freshness,
    disk_queues: HashMap<String, u64>,
    disk_queues_at: Freshness,
    sockets: Option<(u32, u32)>,
    sockets_at: Freshness,
    pass: Option<Instant>,
    passes: usize,
}

impl Sampler {
    fn new(ttl: Duration) -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        system.refresh_memory();

        let cpu_mhz = system
            .cpus()
            .first()
            .map(|cpu| cpu.frequency() as i32)
            .unwrap_or(0);
        let cpu_cores = system.cpus().len() as i32;
        let networks = Networks::new_with_refreshed_list();

        let mut sampler = Self {
            ttl,
            system,
            dropped: dropped_counters(&networks),
            networks,
            disks: Disks::new_with_refreshed_list(),
            cpu_mhz,
            cpu_cores,
            cpu_baseline: CpuTimes::read(),
            cpu_usage: None,
            memory_at: Freshness::default(),
            networks_at: Freshness::default(),
            disks_at: Freshness::default(),
            swap_pages: None,
            swap_pages_at: Freshness::default(),
            disk_queues: HashMap::new(),
            disk_queues_at: Freshness::default(),
            sockets: None,
            sockets_at: Freshness::default(),
            pass: None,
            passes: 0,
        };
        sampler.memory_at.mark();
        sampler.networks_at.mark();
        sampler.disks_at.mark();
        sampler
    }

    fn begin_pass(&mut self) {
        if self.passes == 0 {
            self.pass = Some(Instant::now());
        }
        self.passes += 1;
    }

    fn end_pass(&mut self) {
        self.passes = self.passes.saturating_sub(1);
        if self.passes == 0 {
            self.pass = None;
        }
    }

    fn is_due(&self, freshness: &Freshness) -> bool {
        freshness.is_due(self.ttl, self.pass)
    }

    pub fn cpu_usage(&mut self) -> CpuUsage {
        if let Some((at, usage)) = self.cpu_usage {
            // NaN only means no time elapsed since the baseline. It is kept
            // for the rest of a pass and retried outside one.
            let keep = if usage.is_nan() {
                self.pass.is_some_and(|start| at >= start)
            } else {
                !self.is_due(&Freshness(Some(at)))
            };
            if keep {
                return usage;
            }
        }

        let usage = match CpuTimes::read() {
            Some(current) => {
                let usage = self
                    .cpu_baseline
                    .map_or(CpuUsage::NAN, |prev| current.usage_since(&prev));
                self.cpu_baseline = Some(current);
                usage
            }
            None => self.global_cpu_usage(),
        };

        if usage.is_nan() {
            debug!("CPU sample too close to baseline");
        }
        self.cpu_usage = Some((Instant::now(), usage));
        usage
    }

    fn global_cpu_usage(&mut self) -> CpuUsage {
        self.system.refresh_cpu_usage();
        let busy = (self.system.global_cpu_usage() as f64).clamp(0.0, 100.0);
        CpuUsage {
            user: busy,
            idle: 100.0 - busy,
            nice: 0.0,
            system: 0.0,
            wait: 0.0,
            irq: 0.0,
            softirq: 0.0,
            stolen: 0.0,
        }
    }

    pub fn cpu_mhz(&self) -> i32 {
        self.cpu_mhz
    }

    pub fn cpu_cores(&self) -> i32 {
        self.cpu_cores
    }

    pub fn load_average(&self) -> LoadAvg {
        System::load_average()
    }

    fn refresh_memory(&mut self) {
        if self.is_due(&self.memory_at) {
            self.system.refresh_memory();
            self.memory_at.mark();
        }
    }

    pub fn memory(&mut self) -> MemoryUsage {
        self.refresh_memory();
        MemoryUsage::new(self.system.total_memory(), self.system.used_memory())
    }

    pub fn swap(&mut self) -> MemoryUsage {
        self.refresh_memory();
        MemoryUsage::new(self.system.total_swap(), self.system.used_swap())
    }

    pub fn swap_pages(&mut self) -> Option<SwapPages> {
        if self.is_due(&self.swap_pages_at) {
            self.swap_pages = SwapPages::read();
            self.swap_pages_at.mark();
        }
        self.swap_pages
    }

    pub fn interface(&mut self, ifname: &str) -> Option<InterfaceCounters> {
        if self.is_due(&self.networks_at) {
            self.networks.refresh(true);
            self.dropped = dropped_counters(&self.networks);
            self.networks_at.mark();
        }
        let data = self.networks.list().get(ifname)?;
        Some(InterfaceCounters {
            rx_bytes: data.total_received(),
            rx_packets: data.total_packets_received(),
            rx_errors: data.total_errors_on_received(),
            tx_bytes: data.total_transmitted(),
            tx_packets: data.total_packets_transmitted(),
            tx_errors: data.total_errors_on_transmitted(),
            dropped: self.dropped.get(ifname).copied(),
        })
    }

    pub fn file_system(&mut self, mount_point: &str) -> Option<FileSystemUsage> {
        if self.is_due(&self.disks_at) {
            self.disks.refresh(true);
            self.disks_at.mark();
        }
        if self.is_due(&self.disk_queues_at) {
            self.disk_queues = procfs::read_disk_queues().unwrap_or_default();
            self.disk_queues_at.mark();
        }

        let disk = self
            .disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new(mount_point))?;
        let total = disk.total_space();
        let device = disk.name().to_string_lossy();
        let queue = device
            .strip_prefix("/dev/")
            .and_then(|dev| self.disk_queues.get(dev))
            .map_or(-1.0, |&in_flight| in_flight as f64);
        let usage = disk.usage();

        Some(FileSystemUsage {
            space: MemoryUsage::new(total, total.saturating_sub(disk.available_space())),
            read_bytes: usage.total_read_bytes,
            written_bytes: usage.total_written_bytes,
            queue,
        })
    }

    /// Open `(tcp, udp)` sockets.
    pub fn sockets(&mut self) -> Option<(u32, u32)> {
        if self.is_due(&self.sockets_at) {
            self.sockets = count_sockets();
            self.sockets_at.mark();
        }
        self.sockets
    }

    fn interface_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.networks.list().keys().cloned().collect();
        names.sort();
        names
    }

    fn local_mount_points(&self) -> Vec<String> {
        let mut mount_points: Vec<String> = Vec::new();
        for disk in self.disks.list() {
            let fs = disk.file_system().to_string_lossy();
            if NON_LOCAL_FILE_SYSTEMS.contains(&fs.as_ref()) || disk.total_space() == 0 {
                continue;
            }
            let mount_point = disk.mount_point().to_string_lossy().into_owned();
            if !mount_points.contains(&mount_point) {
                mount_points.push(mount_point);
            }
        }
        mount_points
    }
}

/// Dropped `(rx, tx)` packets per interface, read with the other counters.
fn dropped_counters(networks: &Networks) -> HashMap<String, (u64, u64)> {
    networks
        .list()
        .keys()
        .filter_map(|ifname| Some((ifname.clone(), procfs::read_dropped(ifname)?)))
        .collect()
}

fn count_sockets() -> Option<(u32, u32)> {
    let af_flags = AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6;
    let proto_flags = ProtocolFlags::TCP | ProtocolFlags::UDP;

    let sockets = match get_sockets_info(af_flags, proto_flags) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Failed to get socket info");
            return None;
        }
    };

    let mut tcp_count = 0;
    let mut udp_count = 0;
    for socket in sockets {
        match socket.protocol_socket_info {
            ProtocolSocketInfo::Tcp(_) => tcp_count += 1,
            ProtocolSocketInfo::Udp(_) => udp_count += 1,
        }
    }
    Some((tcp_count, udp_count))
}

pub type SharedSampler = Arc<Mutex<Sampler>>;

impl SnapshotScope for Mutex<Sampler> {
    fn begin(&self) {
        self.lock().begin_pass();
    }

    fn end(&self) {
        self.lock().end_pass();
    }
}

/// The OS plugin: registers CPU, memory, swap, network and file system
/// gauges into a registry.
pub struct OsMonitor {
    sampler: SharedSampler,
    include_loopback: bool,
}

impl OsMonitor {
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sampler: Arc::new(Mutex::new(Sampler::new(config.snapshot_ttl))),
            include_loopback: config.include_loopback,
        })
    }

    pub fn sampler(&self) -> SharedSampler {
        Arc::clone(&self.sampler)
    }

    pub fn initialize(&self, registry: &GaugeRegistry) -> Result<()> {
        registry.register_all(&CpuMetricSet::new(self.sampler()))?;
        registry.register_all(&MemoryMetricSet::new(self.sampler()))?;
        registry.register_all(&SwapMetricSet::new(self.sampler()))?;
        registry.register_all(&SocketMetricSet::new(self.sampler()))?;

        let interfaces = self.interfaces();
        for ifname in &interfaces {
            registry.register_all(&NetworkMetricSet::new(self.sampler(), ifname))?;
        }

        let mount_points = self.local_mount_points();
        for mount_point in &mount_points {
            registry.register_all(&FileSystemMetricSet::new(self.sampler(), mount_point))?;
        }
        registry.add_scope(self.sampler());

        info!(
            gauges = registry.len(),
            interfaces = ?interfaces,
            mount_points = ?mount_points,
            "OS metrics registered"
        );
        Ok(())
    }

    /// Routed interfaces known to the OS, or every interface when the
    /// routing table is unavailable.
    pub fn interfaces(&self) -> Vec<String> {
        let known = self.sampler.lock().interface_names();
        let routed: Vec<String> = procfs::read_routed_interfaces()
            .into_iter()
            .filter(|ifname| known.contains(ifname))
            .collect();
        let candidates = if routed.is_empty() { known } else { routed };
        candidates
            .into_iter()
            .filter(|ifname| self.include_loopback || !is_loopback(ifname))
            .collect()
    }

    pub fn local_mount_points(&self) -> Vec<String> {
        self.sampler.lock().local_mount_points()
    }

    pub fn first_local_mount_point(&self) -> Result<String> {
        self.local_mount_points()
            .into_iter()
            .next()
            .ok_or(Error::NoMountPoint)
    }
}

fn is_loopback(ifname: &str) -> bool {
    ifname == "lo" || ifname.starts_with("lo0") || ifname.eq_ignore_ascii_case("loopback")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_judges_freshness_once() {
        let ttl = Duration::from_millis(10);
        let start = Instant::now();
        let before = Freshness(Some(start - Duration::from_millis(5)));
        let stale = Freshness(Some(start - Duration::from_millis(50)));
        let refreshed = Freshness(Some(start + Duration::from_millis(1)));

        // Fresh at the start of the pass stays fresh however long it runs.
        assert!(!before.is_due(ttl, Some(start)));
        assert!(stale.is_due(ttl, Some(start)));
        assert!(!refreshed.is_due(Duration::ZERO, Some(start)));
        assert!(Freshness::default().is_due(ttl, Some(start)));
        assert!(stale.is_due(ttl, None));
    }

    #[test]
    fn passes_nest() {
        let mut sampler = Sampler::new(Duration::from_secs(60));
        sampler.begin_pass();
        let start = sampler.pass;
        sampler.begin_pass();
        assert_eq!(sampler.pass, start);
        sampler.end_pass();
        assert!(sampler.pass.is_some());
        sampler.end_pass();
        assert!(sampler.pass.is_none());
    }

    #[test]
    fn dropped_counters_come_from_network_snapshot() {
        let mut sampler = Sampler::new(Duration::from_secs(60));
        for ifname in sampler.interface_names() {
            let cached = sampler.dropped.get(&ifname).copied();
            let counters = sampler.interface(&ifname).unwrap();
            assert_eq!(counters.dropped, cached, "{}", ifname);
        }
    }
}
