use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Non-2xx response. `code` is the exchange's numeric error code when the body
    /// carried one, `message` is the raw body text.
    #[error("API error: {status} - {message}")]
    ApiError {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),

    #[error("Other error: {0}")]
    Other(String),
}

/// Coarse failure classes used for routing decisions by connection drivers and callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Socket or HTTP connection failure.
    Transport,
    /// Well-formed rejection from the exchange.
    Exchange,
    /// Malformed inbound payload.
    Protocol,
    /// Detected locally before any I/O happened.
    Local,
}

impl ExchangeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::HttpError(_)
            | Self::NetworkError(_)
            | Self::ConnectionTimeout(_)
            | Self::NotConnected(_) => ErrorClass::Transport,
            Self::ApiError { .. } => ErrorClass::Exchange,
            Self::JsonError(_) | Self::ProtocolError(_) | Self::DeserializationError(_) => {
                ErrorClass::Protocol
            }
            Self::AuthError(_)
            | Self::InvalidParameters(_)
            | Self::SerializationError(_)
            | Self::ConfigurationError(_)
            | Self::ConfigError(_)
            | Self::Other(_) => ErrorClass::Local,
        }
    }

    /// HTTP status of an exchange rejection, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. } => Some(*status),
            Self::HttpError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Build an `ApiError` from a response status and body, lifting the exchange's
    /// `{"code": .., "msg": ..}` code when present.
    pub fn from_response(status: u16, body: String) -> Self {
        let code = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("code").and_then(serde_json::Value::as_i64));
        Self::ApiError {
            status,
            code,
            message: body,
        }
    }
}
