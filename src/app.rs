use std::future::Future;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::RwLock;
use tokio::time::{interval, sleep, Duration};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::api::{self, Report};
use crate::config::{ConnectionConfig, Endpoint, OsConfig, ReportFormat};
use crate::registry::GaugeRegistry;
use crate::session::MeasurementSession;

pub struct App {
    config: Arc<RwLock<OsConfig>>,
    config_path: Option<String>,
    overrides: Vec<String>,
    registry: Arc<GaugeRegistry>,
    session: MeasurementSession,
    endpoint_tasks: Arc<RwLock<Vec<tokio::task::JoinHandle<()>>>>,
}

impl App {
    pub fn new(config: OsConfig, registry: Arc<GaugeRegistry>, session: MeasurementSession) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            config_path: None,
            overrides: Vec::new(),
            registry,
            session,
            endpoint_tasks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Reloads the configuration from `path` (plus overrides) when it changes.
    pub fn with_config_source(mut self, path: Option<String>, overrides: Vec<String>) -> Self {
        self.config_path = path;
        self.overrides = overrides;
        self
    }

    pub async fn endpoint_count(&self) -> usize {
        self.endpoint_tasks.read().await.len()
    }

    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        self.setup_endpoints().await;

        tokio::select! {
            _ = shutdown => {
                info!("Shutting down...");
            }
            _ = self.log_snapshots() => {
                warn!("Snapshot logging exited");
            }
            _ = self.monitor_config_changes() => {
                warn!("Config monitoring completed");
            }
        }

        let mut tasks = self.endpoint_tasks.write().await;
        for task in tasks.iter_mut() {
            task.abort();
        }
        tasks.clear();
    }

    async fn setup_endpoints(&self) {
        let config = self.config.read().await;
        let mut tasks = self.endpoint_tasks.write().await;

        for task in tasks.iter_mut() {
            task.abort();
        }
        tasks.clear();

        for endpoint in config.endpoints.iter().filter(|e| e.enabled) {
            let reporter = Reporter {
                connection: endpoint.connection_or(&config.connection),
                endpoint: endpoint.clone(),
                interval: config.interval,
                format: config.format,
                registry: Arc::clone(&self.registry),
                session: self.session.clone(),
            };
            tasks.push(tokio::spawn(reporter.run()));
        }
        info!(endpoints = tasks.len(), "Endpoints configured");
    }

    async fn log_snapshots(&self) {
        loop {
            let period = self.config.read().await.interval.max(1);
            sleep(Duration::from_secs(period)).await;

            match collect(&self.registry).await {
                Some(report) => info!(
                    gauges = report.gauges.len(),
                    cpu = ?report.gauges.get("cpu_usage_percent"),
                    mem = ?report.gauges.get("mem_usage_percent"),
                    "Collected OS metrics"
                ),
                None => warn!("Failed to collect OS metrics"),
            }
        }
    }

    async fn monitor_config_changes(&self) {
        let Some(path) = self.config_path.as_deref() else {
            return std::future::pending().await;
        };

        let mut ticker = interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            match OsConfig::load(Some(path), self.overrides.as_slice()) {
                Ok(new_config) => {
                    if new_config != *self.config.read().await {
                        info!("Configuration changed, reloading endpoints...");
                        *self.config.write().await = new_config;
                        self.setup_endpoints().await;
                    }
                }
                Err(e) => debug!(error = %e, "Ignoring unreadable config"),
            }
        }
    }
}

async fn collect(registry: &Arc<GaugeRegistry>) -> Option<Report> {
    let registry = Arc::clone(registry);
    tokio::task::spawn_blocking(move || Report::from_registry(&registry))
        .await
        .ok()
}

/// Pushes snapshots to one endpoint, reconnecting when the socket drops.
struct Reporter {
    endpoint: Endpoint,
    connection: ConnectionConfig,
    interval: u64,
    format: ReportFormat,
    registry: Arc<GaugeRegistry>,
    session: MeasurementSession,
}

impl Reporter {
    async fn run(self) {
        loop {
            let Some(socket) = api::connect_websocket(
                &self.endpoint.server,
                &self.endpoint.secret,
                &self.connection,
            )
            .await
            else {
                error!(endpoint = %self.endpoint.name, "Failed to connect to WebSocket");
                return;
            };

            let (mut write, mut read) = socket.split();

            match api::encode("session", &self.session, self.format) {
                Ok(msg) => {
                    if let Err(e) = write.send(msg).await {
                        warn!(error = %e, endpoint = %self.endpoint.name, "Failed to send session");
                        self.pause().await;
                        continue;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to encode session");
                    return;
                }
            }

            let mut ticker = interval(Duration::from_secs(self.interval.max(1)));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(report) = collect(&self.registry).await else {
                            continue;
                        };
                        let msg = match api::encode("metrics", &report, self.format) {
                            Ok(msg) => msg,
                            Err(e) => {
                                error!(error = %e, "Failed to encode report");
                                continue;
                            }
                        };
                        if let Err(e) = write.send(msg).await {
                            warn!(error = %e, endpoint = %self.endpoint.name, "Failed to report metrics");
                            break;
                        }
                    }
                    msg = read.next() => {
                        match msg {
                            Some(Ok(WsMessage::Text(text))) => {
                                debug!(message = %text.as_str(), "Received WebSocket message");
                            }
                            Some(Ok(WsMessage::Close(_))) | None => {
                                info!(endpoint = %self.endpoint.name, "WebSocket closed");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                error!(error = %e, "WebSocket read error");
                                break;
                            }
                        }
                    }
                }
            }
            self.pause().await;
        }
    }

    async fn pause(&self) {
        sleep(Duration::from_secs(self.connection.base_delay.max(1))).await;
    }
}
