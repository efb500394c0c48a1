use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum RideRelayError {
    // Session errors
    SessionNotFound(String),
    ConnectionClosed,

    // Event errors
    MessageParseError(String),
    ValidationError(String),

    // Authorization errors
    PermissionDenied(String),

    // Configuration errors
    ConfigError(String),
}

impl fmt::Display for RideRelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound(id) => write!(f, "Session not found: {}", id),
            Self::ConnectionClosed => write!(f, "Connection closed unexpectedly"),
            Self::MessageParseError(msg) => write!(f, "Message parse error: {}", msg),
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Self::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for RideRelayError {}

impl RideRelayError {
    /// Message sent to the origin connection inside an `error` envelope.
    /// Keeps internal detail out of the wire payload.
    pub fn client_message(&self) -> String {
        match self {
            Self::PermissionDenied(_) => "Permission denied".to_string(),
            Self::ValidationError(msg) => msg.clone(),
            Self::MessageParseError(_) => "Malformed event".to_string(),
            other => other.to_string(),
        }
    }
}

// Generic result type for RideRelay
pub type Result<T> = std::result::Result<T, RideRelayError>;
