// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Unified error hierarchy for fgate.
//!
//! Topic parsing never fails (unparseable addresses become `Unknown`
//! topics), so the hierarchy only covers the fallible subsystems:
//!
//! ```text
//! GatewayError (root)
//! ├── DriverError     - Protocol adapter and driver operations
//! ├── QueueError      - Write-behind queue storage
//! ├── SinkError       - Logger sink writes
//! └── BusError        - Message bus request/reply
//! ```
//!
//! # Examples
//!
//! ```
//! use fgate_core::error::{DriverError, GatewayError};
//!
//! let error = DriverError::connection_failed("broker refused");
//! assert!(error.is_retryable());
//!
//! let gateway_error: GatewayError = error.into();
//! assert_eq!(gateway_error.error_type(), "driver");
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// GatewayError - Root Error Type
// =============================================================================

/// The root error type for fgate.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Protocol driver error.
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Write-behind queue error.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Logger sink error.
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Message bus error.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

impl GatewayError {
    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Driver(e) => e.is_retryable(),
            GatewayError::Queue(e) => e.is_retryable(),
            GatewayError::Sink(e) => e.is_retryable(),
            GatewayError::Bus(e) => e.is_retryable(),
        }
    }

    /// Returns the error type as a string for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            GatewayError::Driver(_) => "driver",
            GatewayError::Queue(_) => "queue",
            GatewayError::Sink(_) => "sink",
            GatewayError::Bus(_) => "bus",
        }
    }
}

// =============================================================================
// DriverError
// =============================================================================

/// Errors raised by protocol adapters and the driver state machine.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The adapter could not reach its server or device.
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The operation requires a live connection.
    #[error("Driver is not connected")]
    NotConnected,

    /// The adapter does not implement this operation.
    #[error("Operation '{operation}' is not supported by this driver")]
    NotSupported {
        /// Operation name.
        operation: String,
    },

    /// The underlying protocol rejected a subscribe or unsubscribe.
    #[error("Subscription failed for '{topic}': {message}")]
    SubscriptionFailed {
        /// Topic name.
        topic: String,
        /// Error message.
        message: String,
    },

    /// Publishing (writing) a value failed.
    #[error("Publish failed for '{topic}': {message}")]
    PublishFailed {
        /// Topic name.
        topic: String,
        /// Error message.
        message: String,
    },

    /// The topic is not valid for this driver.
    #[error("Invalid topic: {topic}")]
    InvalidTopic {
        /// Topic name.
        topic: String,
    },

    /// The request payload could not be decoded.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Error message.
        message: String,
    },

    /// Operation timed out.
    #[error("Operation timed out after {duration:?}")]
    Timeout {
        /// Timeout duration.
        duration: Duration,
    },

    /// Generic protocol failure.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error message.
        message: String,
    },
}

impl DriverError {
    /// Creates a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a connection failed error with a source.
    pub fn connection_failed_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a not supported error.
    pub fn not_supported(operation: impl Into<String>) -> Self {
        Self::NotSupported {
            operation: operation.into(),
        }
    }

    /// Creates a subscription failed error.
    pub fn subscription_failed(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SubscriptionFailed {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Creates a publish failed error.
    pub fn publish_failed(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PublishFailed {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid topic error.
    pub fn invalid_topic(topic: impl Into<String>) -> Self {
        Self::InvalidTopic { topic: topic.into() }
    }

    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns `true` if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriverError::ConnectionFailed { .. }
                | DriverError::NotConnected
                | DriverError::Timeout { .. }
        )
    }

    /// Returns the error type for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            DriverError::ConnectionFailed { .. } => "connection_failed",
            DriverError::NotConnected => "not_connected",
            DriverError::NotSupported { .. } => "not_supported",
            DriverError::SubscriptionFailed { .. } => "subscription_failed",
            DriverError::PublishFailed { .. } => "publish_failed",
            DriverError::InvalidTopic { .. } => "invalid_topic",
            DriverError::InvalidRequest { .. } => "invalid_request",
            DriverError::Timeout { .. } => "timeout",
            DriverError::Protocol { .. } => "protocol",
        }
    }
}

// =============================================================================
// QueueError
// =============================================================================

/// Write-behind queue errors.
///
/// A full queue is not an error: `add` reports it by returning `false`.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Backing file I/O failed.
    #[error("Queue file '{path}': {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The requested capacity cannot hold the header and a single record.
    #[error("Invalid queue capacity {capacity}: {message}")]
    InvalidCapacity {
        /// Requested capacity in bytes.
        capacity: u64,
        /// Error message.
        message: String,
    },

    /// Persisted cursors or frames are inconsistent.
    #[error("Corrupted queue data: {message}")]
    Corrupted {
        /// Error message.
        message: String,
    },

    /// A record could not be encoded or decoded.
    #[error("Codec error: {message}")]
    Codec {
        /// Error message.
        message: String,
    },
}

impl QueueError {
    /// Creates an I/O error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid capacity error.
    pub fn invalid_capacity(capacity: u64, message: impl Into<String>) -> Self {
        Self::InvalidCapacity {
            capacity,
            message: message.into(),
        }
    }

    /// Creates a corrupted data error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::Io { .. })
    }

    /// Returns the error type for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            QueueError::Io { .. } => "io",
            QueueError::InvalidCapacity { .. } => "invalid_capacity",
            QueueError::Corrupted { .. } => "corrupted",
            QueueError::Codec { .. } => "codec",
        }
    }
}

// =============================================================================
// SinkError
// =============================================================================

/// Errors raised by logger sinks.
///
/// The writer loop retries every sink error by replaying the block.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink is not open or its backend is unreachable.
    #[error("Sink '{sink}' unavailable: {message}")]
    Unavailable {
        /// Sink name.
        sink: String,
        /// Error message.
        message: String,
    },

    /// A batch write failed.
    #[error("Write to sink '{sink}' failed: {message}")]
    WriteFailed {
        /// Sink name.
        sink: String,
        /// Error message.
        message: String,
    },

    /// Sink I/O failed.
    #[error("Sink '{sink}' I/O error: {source}")]
    Io {
        /// Sink name.
        sink: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl SinkError {
    /// Creates an unavailable error.
    pub fn unavailable(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Creates a write failure.
    pub fn write_failed(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WriteFailed {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Creates an I/O error.
    pub fn io(sink: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            sink: sink.into(),
            source,
        }
    }

    /// Sink errors are always retried.
    pub fn is_retryable(&self) -> bool {
        true
    }

    /// Returns the error type for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            SinkError::Unavailable { .. } => "unavailable",
            SinkError::WriteFailed { .. } => "write_failed",
            SinkError::Io { .. } => "io",
        }
    }
}

// =============================================================================
// BusError
// =============================================================================

/// Message bus errors.
#[derive(Debug, Error)]
pub enum BusError {
    /// No consumer is registered for the address.
    #[error("No handler registered for '{address}'")]
    NoHandler {
        /// Bus address.
        address: String,
    },

    /// A consumer is already registered for the address.
    #[error("Handler already registered for '{address}'")]
    AlreadyRegistered {
        /// Bus address.
        address: String,
    },

    /// Channel is closed.
    #[error("Channel is closed")]
    Closed,

    /// The handler dropped the reply channel.
    #[error("Reply channel closed")]
    ReplyClosed,

    /// Request timed out.
    #[error("Request timed out after {duration:?}")]
    Timeout {
        /// Timeout duration.
        duration: Duration,
    },

    /// Payload could not be encoded or decoded.
    #[error("Invalid message: {message}")]
    InvalidMessage {
        /// Error message.
        message: String,
    },
}

impl BusError {
    /// Creates a no handler error.
    pub fn no_handler(address: impl Into<String>) -> Self {
        Self::NoHandler {
            address: address.into(),
        }
    }

    /// Creates an invalid message error.
    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::InvalidMessage {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BusError::NoHandler { .. } | BusError::Timeout { .. })
    }
}

impl From<serde_json::Error> for BusError {
    fn from(e: serde_json::Error) -> Self {
        BusError::invalid_message(e.to_string())
    }
}

/// Result alias for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Result alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Result alias for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Result alias for bus operations.
pub type BusResult<T> = Result<T, BusError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_retryable() {
        assert!(DriverError::connection_failed("refused").is_retryable());
        assert!(DriverError::NotConnected.is_retryable());
        assert!(DriverError::timeout(Duration::from_secs(1)).is_retryable());
        assert!(!DriverError::not_supported("browse").is_retryable());
        assert!(!DriverError::subscription_failed("Opc/A/Node/x", "bad node").is_retryable());
    }

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::subscription_failed("Plc/S7/Node/DB1", "rejected");
        assert_eq!(
            err.to_string(),
            "Subscription failed for 'Plc/S7/Node/DB1': rejected"
        );
    }

    #[test]
    fn test_connection_failed_with_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = DriverError::connection_failed_with("connect", io);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_gateway_error_conversion() {
        let err: GatewayError = QueueError::corrupted("cursor past end").into();
        assert_eq!(err.error_type(), "queue");
        assert!(!err.is_retryable());

        let err: GatewayError = SinkError::write_failed("jsonl", "disk full").into();
        assert_eq!(err.error_type(), "sink");
        assert!(err.is_retryable());

        let err: GatewayError = BusError::no_handler("Opc/a/Subscribe").into();
        assert_eq!(err.error_type(), "bus");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_queue_error_types() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(QueueError::io("/tmp/q", io).error_type(), "io");
        assert_eq!(QueueError::codec("eof").error_type(), "codec");
        assert_eq!(
            QueueError::invalid_capacity(4, "too small").error_type(),
            "invalid_capacity"
        );
    }
}
