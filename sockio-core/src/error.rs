//! Error types for SockIO
//!
//! This module defines all error types used throughout the SockIO crates.
//! Fatal kinds leave an engine disconnected; `PayloadTooLarge` and timeouts
//! are reported per call and the caller decides what happens next.

#![allow(missing_docs)]

use std::time::Duration;
use thiserror::Error;

/// Result type alias for SockIO operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for SockIO operations
#[derive(Error, Debug)]
pub enum Error {
    /// The server URL could not be parsed
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),

    /// Low-level socket failure, carrying the OS errno when one is known
    #[error("Socket error ({errno}): {message}")]
    Socket { errno: i32, message: String },

    /// The server does not offer the configured transport as an upgrade
    #[error("Unsupported transport: server does not offer {transport}")]
    UnsupportedTransport { transport: String },

    /// Unexpected HTTP status at one of the connection steps
    #[error("Server connection failure during {step}: HTTP {status}")]
    ServerConnectionFailure { step: String, status: u16 },

    /// The encoded message would need more than one WebSocket frame
    #[error("Payload too large: {size} bytes needs {fragments} frames (max {max} per frame)")]
    PayloadTooLarge {
        size: usize,
        max: usize,
        fragments: usize,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame errors
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Packet decoding errors
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(#[from] TimeoutError),

    /// Operation requires a live connection
    #[error("Not connected")]
    NotConnected,

    /// Generic errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Build a socket error from an I/O failure
    pub fn socket(err: &std::io::Error) -> Self {
        Error::Socket {
            errno: err.raw_os_error().unwrap_or(0),
            message: err.to_string(),
        }
    }

    /// Build a server connection failure for the given step
    pub fn server_failure(step: impl Into<String>, status: u16) -> Self {
        Error::ServerConnectionFailure {
            step: step.into(),
            status,
        }
    }

    /// Whether the engine survives this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::PayloadTooLarge { .. } | Error::Timeout(_))
    }
}

/// Frame parsing and processing errors
#[derive(Error, Debug, Clone)]
pub enum FrameError {
    /// Insufficient data to parse frame
    #[error("Insufficient data: need {needed} bytes, have {have}")]
    InsufficientData { needed: usize, have: usize },

    /// Frame too large
    #[error("Frame too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    /// Invalid opcode
    #[error("Invalid opcode: {0}")]
    InvalidOpcode(u8),

    /// Reserved bits set
    #[error("Reserved bits set in frame")]
    ReservedBitsSet,

    /// Control frames cannot be fragmented
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Continuation frame without a started message, or a new message mid-fragment
    #[error("Unexpected continuation: {0}")]
    UnexpectedContinuation(String),
}

/// Packet and payload decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Fewer units remain than requested
    #[error("End of data: wanted {wanted}, {remaining} remaining")]
    EndOfData { wanted: usize, remaining: usize },

    /// Packet is empty
    #[error("Empty packet")]
    Empty,

    /// Unknown transport frame type
    #[error("Unknown frame type: {0}")]
    UnknownFrameType(String),

    /// Unknown Socket.IO packet type
    #[error("Unknown packet type: {0}")]
    UnknownPacketType(String),

    /// Payload length prefix is not a number
    #[error("Invalid length prefix: {0}")]
    InvalidLength(String),

    /// Structured payload could not be decoded
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Handshake body did not contain an open record
    #[error("Handshake body carries no open packet")]
    MissingOpen,
}

/// Configuration errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Timeout errors
#[derive(Error, Debug, Clone)]
pub enum TimeoutError {
    /// Connect timeout
    #[error("Connect timeout: {timeout:?}")]
    Connect { timeout: Duration },

    /// Read timeout
    #[error("Read timeout: {timeout:?}")]
    Read { timeout: Duration },

    /// No matching event before the deadline
    #[error("Wait timeout for event {event}: {timeout:?}")]
    Wait { event: String, timeout: Duration },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_error_carries_errno() {
        let io = std::io::Error::from_raw_os_error(111);
        match Error::socket(&io) {
            Error::Socket { errno, message } => {
                assert_eq!(errno, 111);
                assert!(!message.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_recoverable_kinds() {
        let too_large = Error::PayloadTooLarge {
            size: 20,
            max: 10,
            fragments: 2,
        };
        assert!(too_large.is_recoverable());
        assert!(!Error::server_failure("upgrade", 400).is_recoverable());
        assert!(!Error::MalformedUrl("::".into()).is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let msg = Error::server_failure("upgrade", 400).to_string();
        assert!(msg.contains("upgrade"));
        assert!(msg.contains("400"));
    }
}
