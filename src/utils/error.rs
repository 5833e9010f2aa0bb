use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("incomplete request payload")]
    IncompleteRequest,

    #[error("invalid {0} value")]
    InvalidField(&'static str),

    #[error("mismatch between REGISTER_COUNT and DATA length")]
    CountMismatch,

    #[error("unsupported function code: {0}")]
    UnsupportedOperation(u8),

    #[error("{0}")]
    BackendFailure(String),

    #[error("topic {topic:?} does not match format {format:?}")]
    TopicMismatch { topic: String, format: String },

    #[error("missing value for placeholder {0:?}")]
    MissingPlaceholder(String),

    #[error("failed to publish response: {0}")]
    PublishFailure(String),

    #[error("gateway queue full")]
    QueueFull,

    #[error("timeout occurred")]
    Timeout,

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("TLS error: {0}")]
    TlsError(String),
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::BackendFailure(format!("IO error: {}", err))
    }
}

impl From<toml::de::Error> for GatewayError {
    fn from(err: toml::de::Error) -> Self {
        GatewayError::ConfigError(format!("TOML error: {}", err))
    }
}

impl From<rumqttc::ClientError> for GatewayError {
    fn from(err: rumqttc::ClientError) -> Self {
        GatewayError::PublishFailure(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for GatewayError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        GatewayError::Timeout
    }
}
