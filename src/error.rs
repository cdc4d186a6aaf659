//! Error types and handling for SolarPoll
//!
//! This module defines the error types used throughout the application.
//! Fetch failures have their own enum so the reconciler can tell transport,
//! protocol and body problems apart; everything else funnels into
//! [`SolarPollError`].

use thiserror::Error;

/// Result type alias for SolarPoll operations
pub type Result<T> = std::result::Result<T, SolarPollError>;

/// Failure of a single logical fetch against the monitoring API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection reset, timeout or DNS failure, after the single retry
    #[error("Monitoring API unreachable: {message}")]
    Unreachable { message: String },

    /// Non-2xx HTTP status
    #[error("Monitoring API returned status {code}")]
    BadStatus { code: u16 },

    /// Body could not be parsed or lacks the expected top-level key
    #[error("Malformed response body: {message}")]
    MalformedBody { message: String },
}

impl FetchError {
    /// Create a new unreachable error
    pub fn unreachable<S: Into<String>>(message: S) -> Self {
        FetchError::Unreachable {
            message: message.into(),
        }
    }

    /// Create a new malformed body error
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        FetchError::MalformedBody {
            message: message.into(),
        }
    }

    /// Short label used in logs and tick reports
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Unreachable { .. } => "transport",
            FetchError::BadStatus { .. } => "protocol",
            FetchError::MalformedBody { .. } => "malformed",
        }
    }
}

/// Main error type for SolarPoll
#[derive(Debug, Error)]
pub enum SolarPollError {
    /// Configuration-related errors (bad timezone, missing API key)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Remote fetch failures
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Inverter payload without a single-phase data block
    #[error("Unsupported device {serial}: no single-phase data block")]
    UnsupportedDevice { serial: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Telemetry sink errors
    #[error("Sink error: {message}")]
    Sink { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl SolarPollError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        SolarPollError::Config {
            message: message.into(),
        }
    }

    /// Create a new unsupported device error
    pub fn unsupported_device<S: Into<String>>(serial: S) -> Self {
        SolarPollError::UnsupportedDevice {
            serial: serial.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        SolarPollError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        SolarPollError::Io {
            message: message.into(),
        }
    }

    /// Create a new sink error
    pub fn sink<S: Into<String>>(message: S) -> Self {
        SolarPollError::Sink {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        SolarPollError::Generic {
            message: message.into(),
        }
    }

    /// Only configuration problems stop the process; everything else is
    /// contained within a single entity's refresh.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SolarPollError::Config { .. } | SolarPollError::Validation { .. }
        )
    }
}

impl From<std::io::Error> for SolarPollError {
    fn from(err: std::io::Error) -> Self {
        SolarPollError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for SolarPollError {
    fn from(err: serde_yaml::Error) -> Self {
        SolarPollError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for SolarPollError {
    fn from(err: serde_json::Error) -> Self {
        SolarPollError::Serialization {
            message: err.to_string(),
        }
    }
}
