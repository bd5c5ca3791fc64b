use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use osmon::metric_name::{name, MetricName};
use osmon::registry::{Gauge, GaugeRegistry, GaugeValue, MetricSet, SnapshotScope};
use osmon::Error;

#[test]
fn test_metric_name_display() {
    assert_eq!(name("mem_usage_percent").build().to_string(), "mem_usage_percent");
    assert_eq!(name("cpu_usage").r#type("sys").build().to_string(), "cpu_usage{type=sys}");
    assert_eq!(
        name("network_io")
            .r#type("read")
            .unit("bytes")
            .tag("ifname", "eth0")
            .build()
            .to_string(),
        "network_io{type=read,unit=bytes,ifname=eth0}"
    );
}

#[test]
fn test_metric_name_ignores_tag_order() {
    let a = name("disk_usage").r#type("total").tag("mountpoint", "/").build();
    let b = name("disk_usage").tag("mountpoint", "/").r#type("total").build();
    assert_eq!(a, b);

    let mut set = HashSet::new();
    set.insert(a);
    assert!(set.contains(&b));
    assert_ne!(b, name("disk_usage").r#type("free").tag("mountpoint", "/").build());
    assert_ne!(name("disk_usage").build(), name("disk_io").build());
}

#[test]
fn test_metric_name_replaces_existing_tag() {
    let metric = name("cpu_usage").r#type("sys").r#type("user").build();
    assert_eq!(metric.tag("type"), Some("user"));
    assert_eq!(metric.tags().len(), 1);
}

#[test]
fn test_metric_name_parsing() {
    let parsed: MetricName = "network_io{type=write,unit=packets,ifname=eth0}".parse().unwrap();
    assert_eq!(
        parsed,
        name("network_io")
            .r#type("write")
            .unit("packets")
            .tag("ifname", "eth0")
            .build()
    );
    assert_eq!(parsed.name(), "network_io");

    let plain: MetricName = "mem_usage_percent".parse().unwrap();
    assert!(plain.tags().is_empty());

    let mount: MetricName = "disk_usage{type=total,mountpoint=/}".parse().unwrap();
    assert_eq!(mount.tag("mountpoint"), Some("/"));
}

#[test]
fn test_metric_name_parsing_rejects_malformed() {
    for bad in ["", "{type=sys}", "cpu_usage{type=sys", "cpu_usage{type}", "cpu_usage{=sys}"] {
        assert!(
            matches!(bad.parse::<MetricName>(), Err(Error::InvalidMetricName(_))),
            "{:?} should not parse",
            bad
        );
    }
}

#[test]
fn test_metric_name_escapes_delimiters() {
    let metric = name("disk_usage").r#type("total").tag("mountpoint", "/mnt/a,b").build();
    assert_eq!(metric.to_string(), r"disk_usage{type=total,mountpoint=/mnt/a\,b}");

    for value in ["/mnt/a,b", "x=y", "{odd}", r"C:\data", "/"] {
        let metric = name("disk_usage").r#type("used").tag("mountpoint", value).build();
        let parsed: MetricName = metric.to_string().parse().unwrap();
        assert_eq!(parsed, metric);
        assert_eq!(parsed.tag("mountpoint"), Some(value));
    }
}

#[test]
fn test_metric_name_parsing_rejects_stray_delimiters() {
    for bad in ["a{{x=1}", "a{x={}", "a{x=1}b", "a{x=1=2}", r"a{x=1\}", "a}b"] {
        assert!(
            matches!(bad.parse::<MetricName>(), Err(Error::InvalidMetricName(_))),
            "{:?} should not parse",
            bad
        );
    }
}

#[test]
fn test_register_and_read() {
    let registry = GaugeRegistry::new();
    assert!(registry.is_empty());

    let counter = Arc::new(AtomicI64::new(7));
    let source = Arc::clone(&counter);
    registry
        .register(
            name("disk_io").r#type("read").build(),
            Gauge::new(move || GaugeValue::Long(source.load(Ordering::SeqCst))),
        )
        .unwrap();

    let metric = name("disk_io").r#type("read").build();
    assert_eq!(registry.value(&metric), Some(GaugeValue::Long(7)));
    counter.store(9, Ordering::SeqCst);
    assert_eq!(registry.value(&metric), Some(GaugeValue::Long(9)));
    assert_eq!(registry.value(&name("disk_io").r#type("write").build()), None);
}

#[test]
fn test_duplicate_registration_fails() {
    let registry = GaugeRegistry::new();
    let metric = name("cpu_info_cores").build();
    registry
        .register(metric.clone(), Gauge::new(|| GaugeValue::Int(4)))
        .unwrap();

    let err = registry
        .register(metric.clone(), Gauge::new(|| GaugeValue::Int(8)))
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyRegistered(ref n) if n == "cpu_info_cores"));
    assert_eq!(registry.value(&metric), Some(GaugeValue::Int(4)));

    assert!(registry.remove(&metric).is_some());
    assert!(registry.is_empty());
}

struct FixedSet;

impl MetricSet for FixedSet {
    fn gauges(&self) -> Vec<(MetricName, Gauge)> {
        vec![
            (name("swap_usage").r#type("total").build(), Gauge::new(|| GaugeValue::Long(100))),
            (name("swap_usage").r#type("used").build(), Gauge::new(|| GaugeValue::Long(40))),
            (name("swap_usage_percent").build(), Gauge::new(|| GaugeValue::Double(f64::NAN))),
        ]
    }
}

#[test]
fn test_register_all_and_snapshot() {
    let registry = GaugeRegistry::new();
    registry.register_all(&FixedSet).unwrap();
    assert_eq!(registry.len(), 3);

    let names: Vec<String> = registry.names().iter().map(|n| n.to_string()).collect();
    assert_eq!(
        names,
        vec!["swap_usage{type=total}", "swap_usage{type=used}", "swap_usage_percent"]
    );

    let snapshot = registry.snapshot();
    assert_eq!(snapshot[&name("swap_usage").r#type("used").build()], GaugeValue::Long(40));
    assert!(snapshot[&name("swap_usage_percent").build()].as_f64().is_nan());

    assert!(matches!(registry.register_all(&FixedSet), Err(Error::AlreadyRegistered(_))));
}

#[test]
fn test_gauge_value_serialization() {
    assert_eq!(serde_json::to_string(&GaugeValue::Int(3)).unwrap(), "3");
    assert_eq!(serde_json::to_string(&GaugeValue::Long(-1)).unwrap(), "-1");
    assert_eq!(serde_json::to_string(&GaugeValue::Double(f64::NAN)).unwrap(), "null");
    assert_eq!(GaugeValue::Double(12.9).as_i64(), 12);
}

#[derive(Default)]
struct CountingScope {
    open: AtomicI64,
    passes: AtomicI64,
}

impl SnapshotScope for CountingScope {
    fn begin(&self) {
        self.open.fetch_add(1, Ordering::SeqCst);
        self.passes.fetch_add(1, Ordering::SeqCst);
    }

    fn end(&self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[test]
fn test_snapshot_runs_inside_scope() {
    let registry = GaugeRegistry::new();
    let scope = Arc::new(CountingScope::default());
    registry.add_scope(scope.clone());

    let observed = Arc::clone(&scope);
    let metric = name("cpu_info_cores").build();
    registry
        .register(
            metric.clone(),
            Gauge::new(move || GaugeValue::Long(observed.open.load(Ordering::SeqCst))),
        )
        .unwrap();

    assert_eq!(registry.snapshot()[&metric], GaugeValue::Long(1));
    assert_eq!(scope.open.load(Ordering::SeqCst), 0);
    assert_eq!(scope.passes.load(Ordering::SeqCst), 1);
    assert_eq!(registry.value(&metric), Some(GaugeValue::Long(0)));
}
