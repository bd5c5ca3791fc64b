use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::metric_name::MetricName;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GaugeValue {
    Int(i32),
    Long(i64),
    Double(f64),
}

impl GaugeValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            GaugeValue::Int(v) => v as f64,
            GaugeValue::Long(v) => v as f64,
            GaugeValue::Double(v) => v,
        }
    }

    /// Doubles are truncated; NaN maps to 0.
    pub fn as_i64(&self) -> i64 {
        match *self {
            GaugeValue::Int(v) => v as i64,
            GaugeValue::Long(v) => v,
            GaugeValue::Double(v) => v as i64,
        }
    }
}

impl fmt::Display for GaugeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GaugeValue::Int(v) => write!(f, "{}", v),
            GaugeValue::Long(v) => write!(f, "{}", v),
            GaugeValue::Double(v) => write!(f, "{:.2}", v),
        }
    }
}

/// A polled value producer.
#[derive(Clone)]
pub struct Gauge(Arc<dyn Fn() -> GaugeValue + Send + Sync>);

impl Gauge {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> GaugeValue + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn value(&self) -> GaugeValue {
        (self.0)()
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Gauge")
    }
}

/// A group of gauges registered together.
pub trait MetricSet {
    fn gauges(&self) -> Vec<(MetricName, Gauge)>;
}

/// Told when a registry snapshot starts and ends, so the gauges it reads
/// can share one sample of their source.
pub trait SnapshotScope: Send + Sync {
    fn begin(&self);
    fn end(&self);
}

struct ScopeGuard<'a>(&'a [Arc<dyn SnapshotScope>]);

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        for scope in self.0 {
            scope.end();
        }
    }
}

#[derive(Default)]
pub struct GaugeRegistry {
    gauges: RwLock<BTreeMap<MetricName, Gauge>>,
    scopes: RwLock<Vec<Arc<dyn SnapshotScope>>>,
}

impl GaugeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: MetricName, gauge: Gauge) -> Result<()> {
        let mut gauges = self.gauges.write();
        if gauges.contains_key(&name) {
            return Err(Error::AlreadyRegistered(name.to_string()));
        }
        debug!(metric = %name, "Registered gauge");
        gauges.insert(name, gauge);
        Ok(())
    }

    /// Registers every gauge of the set, stopping at the first duplicate.
    pub fn register_all(&self, set: &dyn MetricSet) -> Result<()> {
        for (name, gauge) in set.gauges() {
            self.register(name, gauge)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &MetricName) -> Option<Gauge> {
        self.gauges.read().get(name).cloned()
    }

    pub fn value(&self, name: &MetricName) -> Option<GaugeValue> {
        // Clone out of the lock so producers never run while it is held.
        self.get(name).map(|gauge| gauge.value())
    }

    pub fn remove(&self, name: &MetricName) -> Option<Gauge> {
        self.gauges.write().remove(name)
    }

    pub fn names(&self) -> Vec<MetricName> {
        self.gauges.read().keys().cloned().collect()
    }

    pub fn add_scope(&self, scope: Arc<dyn SnapshotScope>) {
        self.scopes.write().push(scope);
    }

    /// Reads every gauge inside one pass of the registered scopes.
    pub fn snapshot(&self) -> BTreeMap<MetricName, GaugeValue> {
        let gauges: Vec<(MetricName, Gauge)> = self
            .gauges
            .read()
            .iter()
            .map(|(name, gauge)| (name.clone(), gauge.clone()))
            .collect();
        let scopes: Vec<Arc<dyn SnapshotScope>> = self.scopes.read().clone();

        for scope in &scopes {
            scope.begin();
        }
        let _pass = ScopeGuard(&scopes);
        gauges
            .into_iter()
            .map(|(name, gauge)| (name, gauge.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.gauges.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.gauges.read().is_empty()
    }
}
