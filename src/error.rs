//! Error types for the gateway.
//!
//! Every fallible operation in the crate returns [`GateError`]. The variants are
//! grouped by the collaborator that produced them so that workers can decide
//! whether a failure is worth retrying or should end the worker.
//!
//! ## Error Categories
//!
//! - **I/O Errors**: Radio or bus socket failures
//! - **Connection Errors**: Could not reach a TNC, APRS-IS server or bus
//! - **Decode Errors**: A frame or bus payload could not be parsed
//! - **Protocol Errors**: The peer spoke something unexpected (RESP, KISS)
//! - **Config Errors**: Invalid channel names, TLEs or configuration values
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use aprsgate::GateError;
//!
//! let error = GateError::connection_failed("rotate.aprs2.net:14580 refused");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use thiserror::Error;

/// Result type alias for gateway operations.
pub type Result<T, E = GateError> = std::result::Result<T, E>;

/// Main error type for gateway operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to connect to {endpoint}: {reason}")]
    Connection {
        endpoint: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Cannot decode {what}: {details}")]
    Decode { what: &'static str, details: String },

    #[error("Bus error on {channel}: {reason}")]
    Bus { channel: String, reason: String },

    #[error("Protocol error: {details}")]
    Protocol { details: String },

    #[error("Invalid channel name '{name}': {reason}")]
    InvalidChannel { name: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl GateError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            GateError::Io(_) => true,
            GateError::Connection { .. } => true,
            GateError::Bus { .. } => true,
            GateError::Decode { .. } => false,
            GateError::Protocol { .. } => false,
            GateError::InvalidChannel { .. } => false,
            GateError::Config(_) => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            GateError::Io(_) => vec![
                "Check the radio link or serial device is still attached",
                "Restart the gateway under a process supervisor",
            ],
            GateError::Connection { .. } => vec![
                "Verify the host and port are reachable",
                "Check the TNC or APRS-IS server is running",
                "Check the bus address (redis://host:port)",
            ],
            GateError::Decode { .. } => vec![
                "Check the publisher writes TNC2 formatted frames",
                "Inspect the offending payload in the debug log",
            ],
            GateError::Bus { .. } => {
                vec!["Check the bus server is running", "Verify the channel name"]
            }
            GateError::Protocol { .. } => vec![
                "Verify the peer speaks the expected protocol",
                "Check the configured port belongs to the right service",
            ],
            GateError::InvalidChannel { .. } => vec![
                "Use the <Direction>_<callsign>_<tag> naming convention",
                "Make sure the callsign segment is not empty",
            ],
            GateError::Config(_) => vec![
                "Run `aprsgate gen-config` for a valid example",
                "Check required fields are present",
            ],
        }
    }

    /// Create a connection error.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        GateError::Connection { endpoint: "remote".to_string(), reason: reason.into(), source: None }
    }

    /// Create a connection error for a named endpoint, keeping the cause.
    pub fn connection_to(endpoint: impl Into<String>, source: std::io::Error) -> Self {
        GateError::Connection {
            endpoint: endpoint.into(),
            reason: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a decode error.
    pub fn decode(what: &'static str, details: impl Into<String>) -> Self {
        GateError::Decode { what, details: details.into() }
    }

    /// Create a protocol error.
    pub fn protocol(details: impl Into<String>) -> Self {
        GateError::Protocol { details: details.into() }
    }

    /// Create a bus error.
    pub fn bus(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        GateError::Bus { channel: channel.into(), reason: reason.into() }
    }

    /// Create an invalid channel error.
    pub fn invalid_channel(name: impl Into<String>, reason: impl Into<String>) -> Self {
        GateError::InvalidChannel { name: name.into(), reason: reason.into() }
    }
}
