use std::sync::Arc;

use crate::metric_name::{name, MetricName};
use crate::monitor::{FileSystemUsage, InterfaceCounters, Sampler, SharedSampler};
use crate::procfs::CpuUsage;
use crate::registry::{Gauge, GaugeValue, MetricSet};

fn gauge<F>(sampler: &SharedSampler, read: F) -> Gauge
where
    F: Fn(&mut Sampler) -> GaugeValue + Send + Sync + 'static,
{
    let sampler = Arc::clone(sampler);
    Gauge::new(move || read(&mut sampler.lock()))
}

pub struct CpuMetricSet {
    sampler: SharedSampler,
}

impl CpuMetricSet {
    pub fn new(sampler: SharedSampler) -> Self {
        Self { sampler }
    }
}

impl MetricSet for CpuMetricSet {
    fn gauges(&self) -> Vec<(MetricName, Gauge)> {
        let components: [(&str, fn(&CpuUsage) -> f64); 8] = [
            ("sys", |u| u.system),
            ("user", |u| u.user),
            ("idle", |u| u.idle),
            ("nice", |u| u.nice),
            ("wait", |u| u.wait),
            ("interrupt", |u| u.irq),
            ("soft-interrupt", |u| u.softirq),
            ("stolen", |u| u.stolen),
        ];

        let mut gauges: Vec<(MetricName, Gauge)> = components
            .into_iter()
            .map(|(kind, component)| {
                (
                    name("cpu_usage").r#type(kind).build(),
                    gauge(&self.sampler, move |s| {
                        GaugeValue::Double(component(&s.cpu_usage()))
                    }),
                )
            })
            .collect();

        gauges.push((
            name("cpu_usage_percent").build(),
            gauge(&self.sampler, |s| GaugeValue::Double(s.cpu_usage().combined())),
        ));
        gauges.push((
            name("cpu_info_mhz").build(),
            gauge(&self.sampler, |s| GaugeValue::Int(s.cpu_mhz())),
        ));
        gauges.push((
            name("cpu_info_cores").build(),
            gauge(&self.sampler, |s| GaugeValue::Int(s.cpu_cores())),
        ));

        let loads: [(&str, fn(&sysinfo::LoadAvg) -> f64); 3] = [
            ("1m", |l| l.one),
            ("5m", |l| l.five),
            ("15m", |l| l.fifteen),
        ];
        for (window, load) in loads {
            gauges.push((
                name("cpu_load").r#type(window).build(),
                gauge(&self.sampler, move |s| GaugeValue::Double(load(&s.load_average()))),
            ));
        }
        gauges
    }
}

pub struct MemoryMetricSet {
    sampler: SharedSampler,
}

impl MemoryMetricSet {
    pub fn new(sampler: SharedSampler) -> Self {
        Self { sampler }
    }
}

impl MetricSet for MemoryMetricSet {
    fn gauges(&self) -> Vec<(MetricName, Gauge)> {
        vec![
            (
                name("mem_usage").r#type("total").build(),
                gauge(&self.sampler, |s| GaugeValue::Long(s.memory().total as i64)),
            ),
            (
                name("mem_usage").r#type("used").build(),
                gauge(&self.sampler, |s| GaugeValue::Long(s.memory().used as i64)),
            ),
            (
                name("mem_usage").r#type("free").build(),
                gauge(&self.sampler, |s| GaugeValue::Long(s.memory().free as i64)),
            ),
            (
                name("mem_usage_percent").build(),
                gauge(&self.sampler, |s| GaugeValue::Double(s.memory().percent())),
            ),
        ]
    }
}

pub struct SwapMetricSet {
    sampler: SharedSampler,
}

impl SwapMetricSet {
    pub fn new(sampler: SharedSampler) -> Self {
        Self { sampler }
    }
}

impl MetricSet for SwapMetricSet {
    fn gauges(&self) -> Vec<(MetricName, Gauge)> {
        vec![
            (
                name("swap_usage").r#type("total").build(),
                gauge(&self.sampler, |s| GaugeValue::Long(s.swap().total as i64)),
            ),
            (
                name("swap_usage").r#type("used").build(),
                gauge(&self.sampler, |s| GaugeValue::Long(s.swap().used as i64)),
            ),
            (
                name("swap_usage").r#type("free").build(),
                gauge(&self.sampler, |s| GaugeValue::Long(s.swap().free as i64)),
            ),
            (
                name("swap_usage_percent").build(),
                gauge(&self.sampler, |s| GaugeValue::Double(s.swap().percent())),
            ),
            (
                name("swap_pages").r#type("in").build(),
                gauge(&self.sampler, |s| {
                    GaugeValue::Long(s.swap_pages().map_or(0, |p| p.page_in as i64))
                }),
            ),
            (
                name("swap_pages").r#type("out").build(),
                gauge(&self.sampler, |s| {
                    GaugeValue::Long(s.swap_pages().map_or(0, |p| p.page_out as i64))
                }),
            ),
        ]
    }
}

pub struct SocketMetricSet {
    sampler: SharedSampler,
}

impl SocketMetricSet {
    pub fn new(sampler: SharedSampler) -> Self {
        Self { sampler }
    }
}

impl MetricSet for SocketMetricSet {
    fn gauges(&self) -> Vec<(MetricName, Gauge)> {
        vec![
            (
                name("network_connections").r#type("tcp").build(),
                gauge(&self.sampler, |s| {
                    GaugeValue::Long(s.sockets().map_or(-1, |(tcp, _)| tcp as i64))
                }),
            ),
            (
                name("network_connections").r#type("udp").build(),
                gauge(&self.sampler, |s| {
                    GaugeValue::Long(s.sockets().map_or(-1, |(_, udp)| udp as i64))
                }),
            ),
        ]
    }
}

/// Counters of one network interface, tagged with `ifname`.
pub struct NetworkMetricSet {
    sampler: SharedSampler,
    ifname: String,
}

impl NetworkMetricSet {
    pub fn new(sampler: SharedSampler, ifname: &str) -> Self {
        Self {
            sampler,
            ifname: ifname.to_string(),
        }
    }
}

impl MetricSet for NetworkMetricSet {
    fn gauges(&self) -> Vec<(MetricName, Gauge)> {
        type Counter = fn(&InterfaceCounters) -> i64;
        let counters: [(&str, &str, Counter); 8] = [
            ("read", "bytes", |c| c.rx_bytes as i64),
            ("read", "packets", |c| c.rx_packets as i64),
            ("read", "errors", |c| c.rx_errors as i64),
            ("read", "dropped", |c| c.dropped.map_or(-1, |(rx, _)| rx as i64)),
            ("write", "bytes", |c| c.tx_bytes as i64),
            ("write", "packets", |c| c.tx_packets as i64),
            ("write", "errors", |c| c.tx_errors as i64),
            ("write", "dropped", |c| c.dropped.map_or(-1, |(_, tx)| tx as i64)),
        ];

        counters
            .into_iter()
            .map(|(direction, unit, counter)| {
                let ifname = self.ifname.clone();
                (
                    name("network_io")
                        .r#type(direction)
                        .unit(unit)
                        .tag("ifname", self.ifname.as_str())
                        .build(),
                    gauge(&self.sampler, move |s| {
                        GaugeValue::Long(s.interface(&ifname).map_or(-1, |c| counter(&c)))
                    }),
                )
            })
            .collect()
    }
}

const MISSING_LONG: GaugeValue = GaugeValue::Long(-1);
const MISSING_DOUBLE: GaugeValue = GaugeValue::Double(-1.0);

/// Space, I/O and queue of one mount point, tagged with `mountpoint`.
pub struct FileSystemMetricSet {
    sampler: SharedSampler,
    mount_point: String,
}

impl FileSystemMetricSet {
    pub fn new(sampler: SharedSampler, mount_point: &str) -> Self {
        Self {
            sampler,
            mount_point: mount_point.to_string(),
        }
    }

    /// `missing` is reported once the mount point is gone; it keeps the
    /// gauge's value type.
    fn usage_gauge<F>(&self, missing: GaugeValue, read: F) -> Gauge
    where
        F: Fn(&FileSystemUsage) -> GaugeValue + Send + Sync + 'static,
    {
        let mount_point = self.mount_point.clone();
        gauge(&self.sampler, move |s| {
            s.file_system(&mount_point).map_or(missing, |usage| read(&usage))
        })
    }
}

impl MetricSet for FileSystemMetricSet {
    fn gauges(&self) -> Vec<(MetricName, Gauge)> {
        let named = |metric: &str, kind: Option<&str>| {
            let builder = name(metric);
            let builder = match kind {
                Some(kind) => builder.r#type(kind),
                None => builder,
            };
            builder.tag("mountpoint", self.mount_point.as_str()).build()
        };
        vec![
            (
                named("disk_usage", Some("total")),
                self.usage_gauge(MISSING_LONG, |u| GaugeValue::Long(u.space.total as i64)),
            ),
            (
                named("disk_usage", Some("used")),
                self.usage_gauge(MISSING_LONG, |u| GaugeValue::Long(u.space.used as i64)),
            ),
            (
                named("disk_usage", Some("free")),
                self.usage_gauge(MISSING_LONG, |u| GaugeValue::Long(u.space.free as i64)),
            ),
            (
                named("disk_usage_percent", None),
                self.usage_gauge(MISSING_DOUBLE, |u| GaugeValue::Double(u.space.percent())),
            ),
            (
                named("disk_io", Some("read")),
                self.usage_gauge(MISSING_LONG, |u| GaugeValue::Long(u.read_bytes as i64)),
            ),
            (
                named("disk_io", Some("write")),
                self.usage_gauge(MISSING_LONG, |u| GaugeValue::Long(u.written_bytes as i64)),
            ),
            (
                named("disk_queue", None),
                self.usage_gauge(MISSING_DOUBLE, |u| GaugeValue::Double(u.queue)),
            ),
        ]
    }
}
