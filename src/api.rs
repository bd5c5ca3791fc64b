use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::Duration;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        http::{uri, Uri},
        Message as WsMessage,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::config::{ConnectionConfig, ReportFormat};
use crate::error::{Error, Result};
use crate::registry::{GaugeRegistry, GaugeValue};
use crate::session::now_millis;

const DEFAULT_PATH: &str = "/wss/probe";

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Serialize, Deserialize, Debug)]
pub struct Message<T> {
    pub r#type: String,
    pub data: T,
}

/// One registry snapshot, keyed by the display form of each metric name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Report {
    pub timestamp: u64,
    pub gauges: BTreeMap<String, GaugeValue>,
}

impl Report {
    pub fn from_registry(registry: &GaugeRegistry) -> Self {
        Self {
            timestamp: now_millis(),
            gauges: registry
                .snapshot()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }
}

/// Wraps `data` in a typed envelope; JSON goes out as text, MessagePack as binary.
pub fn encode<T: Serialize>(kind: &str, data: T, format: ReportFormat) -> Result<WsMessage> {
    let message = Message {
        r#type: kind.to_string(),
        data,
    };
    Ok(match format {
        ReportFormat::Json => WsMessage::Text(serde_json::to_string(&message)?.into()),
        ReportFormat::Msgpack => WsMessage::Binary(rmp_serde::to_vec_named(&message)?.into()),
    })
}

/// Adds the probe path when the server URL has none, then the secret as query.
pub fn endpoint_uri(server: &str, secret: &str) -> Result<Uri> {
    let invalid = || Error::InvalidEndpoint(server.to_string());
    let mut uri_parts = Uri::from_str(server).map_err(|_| invalid())?.into_parts();

    let path_and_query = match uri_parts.path_and_query.as_ref() {
        Some(pq) if pq.path() != "/" => pq.as_str().to_string(),
        _ => DEFAULT_PATH.to_string(),
    };
    let separator = if path_and_query.contains('?') { '&' } else { '?' };

    uri_parts.path_and_query = Some(
        uri::PathAndQuery::from_str(&format!("{}{}secret={}", path_and_query, separator, secret))
            .map_err(|_| invalid())?,
    );
    Uri::from_parts(uri_parts).map_err(|_| invalid())
}

/// Seconds to wait before retry number `retry` (1-based), doubling up to `max_delay`.
pub fn backoff_delay(config: &ConnectionConfig, retry: i32) -> u64 {
    let exponent = retry.clamp(1, 16) as u32 - 1;
    config
        .base_delay
        .saturating_mul(2u64.pow(exponent))
        .min(config.max_delay)
}

// Connects to the endpoint, retrying with exponential backoff.
// Returns None when authentication is rejected or retries are exhausted.
pub async fn connect_websocket(
    server: &str,
    secret: &str,
    config: &ConnectionConfig,
) -> Option<WsStream> {
    let uri = match endpoint_uri(server, secret) {
        Ok(uri) => uri,
        Err(e) => {
            error!(error = %e, "Invalid endpoint URL");
            return None;
        }
    };

    let mut retry_count = 0;
    loop {
        debug!(url = %server, "Connecting");
        match connect_async(uri.clone()).await {
            Ok((socket, _)) => {
                info!(url = %server, "WebSocket connection established");
                return Some(socket);
            }
            Err(e) => {
                error!(error = %e, url = %server, "WebSocket connection failed");
                if let tokio_tungstenite::tungstenite::Error::Http(response) = &e {
                    if response.status() == 401 {
                        error!("Authentication failed - invalid or missing secret");
                        return None;
                    }
                }
            }
        }

        if config.max_retries >= 0 && retry_count >= config.max_retries {
            error!(
                attempts = retry_count + 1,
                url = %server,
                "Giving up on WebSocket endpoint"
            );
            return None;
        }

        retry_count += 1;
        let delay = backoff_delay(config, retry_count);
        warn!(
            retry = retry_count,
            next_attempt_in = delay,
            "WebSocket connection failed, retrying..."
        );
        tokio::time::sleep(Duration::from_secs(delay)).await;
    }
}
