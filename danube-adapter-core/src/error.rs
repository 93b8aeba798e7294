//! Error types for adapter operations.
//!
//! Two layers:
//! - [`ResourceError`]: raised by the resource-specific callbacks of a concrete adapter
//! - [`AdapterError`]: raised by the framework itself (startup validation, lifecycle, bus)

use crate::message::Envelope;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use thiserror::Error;

/// Result type used across the framework
pub type AdapterResult<T> = Result<T, AdapterError>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the adapter framework
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Missing or invalid configuration, fatal to connect and never retried
    #[error("Startup validation failed: {0}")]
    StartupValidation(String),

    /// The requested mode is not one of the adapter's declared modes
    #[error("Invalid adapter mode '{requested}', declared modes: {}", .declared.join(", "))]
    InvalidMode {
        requested: String,
        declared: Vec<String>,
    },

    /// The lifecycle is not in the state the operation requires
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// The backing resource could not be reached at connect time
    #[error("Resource connect failed: {message}")]
    Connect {
        message: String,
        #[source]
        source: ResourceError,
    },

    /// A resource callback failed; passed through to the host unchanged
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Publishing to the host bus failed
    #[error("Bus error: {0}")]
    Bus(String),

    /// The audit sink could not be built or written
    #[error("Audit error: {0}")]
    Audit(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdapterError {
    /// Create a startup validation error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::StartupValidation(msg.into())
    }

    /// Create a connect error wrapping the resource's failure
    pub fn connect(msg: impl Into<String>, source: ResourceError) -> Self {
        Self::Connect {
            message: msg.into(),
            source,
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Self::InvalidState {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Check if this error leaves the adapter stopped
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StartupValidation(_) | Self::InvalidMode { .. } | Self::Connect { .. }
        )
    }
}

/// Error raised by a resource-specific callback (connect, send, receive, disconnect)
///
/// Carries an optional nested cause, the envelope that was being handled when the
/// failure happened (used for auditing) and a backtrace captured at construction.
/// The backtrace is only populated when `RUST_BACKTRACE` enables capture.
pub struct ResourceError {
    message: String,
    source: Option<BoxError>,
    envelope: Option<Box<Envelope>>,
    party_id: Option<String>,
    trace: Backtrace,
}

impl ResourceError {
    /// Create a new resource error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            envelope: None,
            party_id: None,
            trace: Backtrace::capture(),
        }
    }

    /// Create a resource error with an underlying cause
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut err = Self::new(message);
        err.source = Some(Box::new(source));
        err
    }

    /// Create an error for a callback the adapter does not implement
    pub fn unsupported(operation: &str) -> Self {
        Self::new(format!("Operation '{}' is not supported by this adapter", operation))
    }

    /// Attach the envelope that failed
    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = Some(Box::new(envelope));
        self
    }

    /// Attach the external party or session involved in the failure
    pub fn with_party(mut self, party_id: impl Into<String>) -> Self {
        self.party_id = Some(party_id.into());
        self
    }

    /// Capture a backtrace regardless of `RUST_BACKTRACE`
    #[cfg(test)]
    pub(crate) fn force_trace(mut self) -> Self {
        self.trace = Backtrace::force_capture();
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn envelope(&self) -> Option<&Envelope> {
        self.envelope.as_deref()
    }

    pub fn party_id(&self) -> Option<&str> {
        self.party_id.as_deref()
    }

    /// The captured backtrace, if capture was enabled
    pub fn trace(&self) -> Option<&Backtrace> {
        match self.trace.status() {
            BacktraceStatus::Captured => Some(&self.trace),
            _ => None,
        }
    }

    /// Messages of the nested causes, outermost first
    pub fn causes(&self) -> Vec<String> {
        let mut causes = Vec::new();
        let mut current = std::error::Error::source(self);
        while let Some(cause) = current {
            causes.push(cause.to_string());
            current = cause.source();
        }
        causes
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Debug for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceError")
            .field("message", &self.message)
            .field("source", &self.source)
            .field("envelope", &self.envelope.as_ref().map(|e| e.id.clone()))
            .field("party_id", &self.party_id)
            .finish()
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for ResourceError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source("I/O failure", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("socket closed")]
    struct SocketClosed;

    #[derive(Debug, Error)]
    #[error("read timed out")]
    struct ReadTimeout(#[source] SocketClosed);

    #[test]
    fn test_cause_chain_outermost_first() {
        let err = ResourceError::with_source("poll failed", ReadTimeout(SocketClosed));

        assert_eq!(err.to_string(), "poll failed");
        assert_eq!(err.causes(), vec!["read timed out", "socket closed"]);
    }

    #[test]
    fn test_resource_error_passes_through_unchanged() {
        let err: AdapterError = ResourceError::new("write rejected").with_party("acme").into();

        assert_eq!(err.to_string(), "write rejected");
        match err {
            AdapterError::Resource(inner) => assert_eq!(inner.party_id(), Some("acme")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_fatal_classification() {
        assert!(AdapterError::config("missing name").is_fatal());
        assert!(AdapterError::connect("unreachable", ResourceError::new("refused")).is_fatal());
        assert!(!AdapterError::Bus("closed".to_string()).is_fatal());
    }

    #[test]
    fn test_invalid_mode_lists_declared() {
        let err = AdapterError::InvalidMode {
            requested: "Stream".to_string(),
            declared: vec!["Publish".to_string(), "Subscribe".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Invalid adapter mode 'Stream', declared modes: Publish, Subscribe"
        );
    }
}
