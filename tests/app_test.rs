use std::sync::Arc;

use osmon::app::App;
use osmon::config::{ConnectionConfig, Endpoint, OsConfig};
use osmon::metric_name::name;
use osmon::registry::{Gauge, GaugeRegistry, GaugeValue};
use osmon::session::MeasurementSession;
use tokio::time::{sleep, timeout, Duration};

fn registry() -> Arc<GaugeRegistry> {
    let registry = GaugeRegistry::new();
    registry
        .register(name("cpu_usage_percent").build(), Gauge::new(|| GaugeValue::Double(12.5)))
        .unwrap();
    Arc::new(registry)
}

fn endpoint(name: &str, enabled: bool) -> Endpoint {
    Endpoint {
        name: name.to_string(),
        // Nothing listens on the discard port; connecting fails fast.
        server: "ws://127.0.0.1:9/ws".to_string(),
        secret: "test-secret".to_string(),
        enabled,
        connection: Some(ConnectionConfig {
            base_delay: 1,
            max_delay: 1,
            max_retries: 0,
        }),
    }
}

#[tokio::test]
async fn test_app_startup_shutdown() {
    let config = OsConfig {
        interval: 1,
        endpoints: vec![endpoint("test", true)],
        ..OsConfig::default()
    };
    let app = App::new(config, registry(), MeasurementSession::for_host());

    timeout(Duration::from_secs(5), app.run(sleep(Duration::from_millis(1500))))
        .await
        .expect("App failed to shutdown");
    assert_eq!(app.endpoint_count().await, 0);
}

#[tokio::test]
async fn test_app_with_disabled_endpoints() {
    let config = OsConfig {
        interval: 1,
        endpoints: vec![endpoint("disabled", false)],
        ..OsConfig::default()
    };
    let app = Arc::new(App::new(config, registry(), MeasurementSession::for_host()));

    let running = Arc::clone(&app);
    let handle = tokio::spawn(async move {
        running.run(sleep(Duration::from_millis(500))).await;
    });

    sleep(Duration::from_millis(100)).await;
    assert_eq!(app.endpoint_count().await, 0);

    timeout(Duration::from_secs(5), handle)
        .await
        .expect("App failed to shutdown")
        .expect("App panicked");
}

#[tokio::test]
async fn test_app_reloads_changed_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("test_config.toml");
    let path = config_path.to_str().unwrap().to_string();

    let initial = OsConfig {
        interval: 1,
        ..OsConfig::default()
    };
    initial.save_to_file(&path).unwrap();

    let app = Arc::new(
        App::new(initial.clone(), registry(), MeasurementSession::for_host())
            .with_config_source(Some(path.clone()), Vec::new()),
    );
    let running = Arc::clone(&app);
    let handle = tokio::spawn(async move {
        running.run(sleep(Duration::from_secs(4))).await;
    });

    sleep(Duration::from_millis(200)).await;
    assert_eq!(app.endpoint_count().await, 0);

    let mut updated = initial;
    updated.endpoints.push(endpoint("added", true));
    updated.save_to_file(&path).unwrap();

    sleep(Duration::from_millis(2000)).await;
    assert_eq!(app.endpoint_count().await, 1);

    timeout(Duration::from_secs(5), handle)
        .await
        .expect("App failed to shutdown")
        .expect("App panicked");
}
