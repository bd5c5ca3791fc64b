use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument '{0}': expected key=value")]
    InvalidArgument(String),

    #[error("invalid metric name '{0}'")]
    InvalidMetricName(String),

    #[error("metric {0} is already registered")]
    AlreadyRegistered(String),

    #[error("no local mount point found")]
    NoMountPoint,

    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    MessagePack(#[from] rmp_serde::encode::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
