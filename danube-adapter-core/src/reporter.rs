//! Diagnostics forwarded to the host.

use crate::enricher::Severity;
use crate::ResourceError;
use tracing::{error, info, warn};

/// The host's logging/eventing surface
///
/// Fire-and-forget: implementations must not block and cannot fail the caller.
pub trait HostReporter: Send + Sync {
    fn report(&self, severity: Severity, message: &str, error: Option<&ResourceError>);
}

/// Reporter that forwards diagnostics to `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingReporter {
    adapter_name: String,
}

impl TracingReporter {
    pub fn new(adapter_name: impl Into<String>) -> Self {
        Self {
            adapter_name: adapter_name.into(),
        }
    }
}

impl HostReporter for TracingReporter {
    fn report(&self, severity: Severity, message: &str, err: Option<&ResourceError>) {
        let source = err.map(|e| e.message()).unwrap_or_default();
        match severity {
            Severity::Info => info!(adapter = %self.adapter_name, error = %source, "{}", message),
            Severity::Warning => {
                warn!(adapter = %self.adapter_name, error = %source, "{}", message)
            }
            Severity::Error => error!(adapter = %self.adapter_name, error = %source, "{}", message),
        }
    }
}
