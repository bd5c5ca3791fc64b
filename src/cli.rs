use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use crate::app::App;
use crate::config::OsConfig;
use crate::metric_name::MetricName;
use crate::monitor::OsMonitor;
use crate::registry::GaugeRegistry;
use crate::session::MeasurementSession;

#[derive(Parser, Debug)]
#[command(name = "osmon", version, about = "Operating system gauges for a monitoring registry")]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "OSMON_CONFIG_PATH")]
    pub config: Option<String>,

    /// Configuration override, repeatable
    #[arg(short, long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version information
    Version,

    /// List all registered gauges with their current value
    Gauges,

    /// Print the value of one gauge, e.g. 'cpu_usage{type=sys}'
    Get {
        /// Composite metric name
        name: String,
    },

    /// Show the measurement session of this host
    Session,

    /// List all configured endpoints
    Endpoints,

    /// Report gauges to the configured endpoints until interrupted
    Run,
}

fn load_config(cli: &Cli) -> Option<OsConfig> {
    match OsConfig::load(cli.config.as_deref(), cli.set.as_slice()) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(error = %e, "Failed to load config");
            None
        }
    }
}

fn build_registry(config: &OsConfig) -> Option<Arc<GaugeRegistry>> {
    let registry = Arc::new(GaugeRegistry::new());
    let initialized =
        OsMonitor::new(&config.monitor()).and_then(|monitor| monitor.initialize(&registry));
    match initialized {
        Ok(()) => Some(registry),
        Err(e) => {
            error!(error = %e, "Failed to register OS metrics");
            None
        }
    }
}

pub async fn handle_command(mut cli: Cli) -> ExitCode {
    let command = cli.command.take().unwrap_or(Commands::Run);
    match command {
        Commands::Version => {
            println!("osmon {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Session => {
            let session = MeasurementSession::for_host();
            match serde_json::to_string_pretty(&session) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    error!(error = %e, "Failed to serialize session");
                    return ExitCode::FAILURE;
                }
            }
        }
        Commands::Endpoints => {
            let Some(config) = load_config(&cli) else {
                return ExitCode::FAILURE;
            };
            println!("Configured endpoints:");
            for endpoint in &config.endpoints {
                println!(
                    "  - {} {} ({})",
                    endpoint.name,
                    endpoint.server,
                    if endpoint.enabled {
                        "enabled"
                    } else {
                        "disabled"
                    }
                );
            }
        }
        Commands::Gauges => {
            let Some(config) = load_config(&cli) else {
                return ExitCode::FAILURE;
            };
            let Some(registry) = build_registry(&config) else {
                return ExitCode::FAILURE;
            };
            for (name, value) in registry.snapshot() {
                println!("{} = {}", name, value);
            }
        }
        Commands::Get { name } => {
            let Some(config) = load_config(&cli) else {
                return ExitCode::FAILURE;
            };
            let metric: MetricName = match name.parse() {
                Ok(metric) => metric,
                Err(e) => {
                    error!(error = %e, "Invalid metric name");
                    return ExitCode::FAILURE;
                }
            };
            let Some(registry) = build_registry(&config) else {
                return ExitCode::FAILURE;
            };
            match registry.value(&metric) {
                Some(value) => println!("{}", value),
                None => {
                    error!(metric = %metric, "Gauge not found");
                    return ExitCode::FAILURE;
                }
            }
        }
        Commands::Run => {
            let Some(config) = load_config(&cli) else {
                return ExitCode::FAILURE;
            };
            let Some(registry) = build_registry(&config) else {
                return ExitCode::FAILURE;
            };
            let session = MeasurementSession::for_host();
            info!(
                host = %session.host_name,
                instance = %session.instance_name,
                gauges = registry.len(),
                "Starting OS monitor"
            );
            let app = App::new(config, registry, session)
                .with_config_source(cli.config.clone(), cli.set.clone());
            app.run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for shutdown signal");
                }
                info!("Received shutdown signal");
            })
            .await;
        }
    }
    ExitCode::SUCCESS
}
