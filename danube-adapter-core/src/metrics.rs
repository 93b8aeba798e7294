//! Adapter metrics published through the `metrics` facade.
//!
//! No exporter is installed here; the host process decides where metrics go.

use std::time::Duration;

/// Metrics recorder for a single adapter instance
#[derive(Debug, Clone)]
pub struct AdapterMetrics {
    adapter_name: String,
}

impl AdapterMetrics {
    pub fn new(adapter_name: &str) -> Self {
        Self {
            adapter_name: adapter_name.to_string(),
        }
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Record one receive callback invocation and how long it took
    pub fn record_poll(&self, duration: Duration) {
        ::metrics::counter!("adapter_polls_total", "adapter" => self.adapter_name.clone())
            .increment(1);
        ::metrics::histogram!(
            "adapter_poll_duration_seconds",
            "adapter" => self.adapter_name.clone()
        )
        .record(duration.as_secs_f64());
    }

    pub fn record_poll_failure(&self) {
        ::metrics::counter!("adapter_poll_failures_total", "adapter" => self.adapter_name.clone())
            .increment(1);
    }

    /// Record a failure report, `suppressed` when the policy kept it quiet
    pub fn record_report(&self, suppressed: bool) {
        let outcome = if suppressed { "suppressed" } else { "reported" };
        ::metrics::counter!(
            "adapter_failure_reports_total",
            "adapter" => self.adapter_name.clone(),
            "outcome" => outcome
        )
        .increment(1);
    }

    pub fn record_published(&self, topic: &str) {
        ::metrics::counter!(
            "adapter_envelopes_published_total",
            "adapter" => self.adapter_name.clone(),
            "topic" => topic.to_string()
        )
        .increment(1);
    }

    pub fn record_sent(&self) {
        ::metrics::counter!("adapter_envelopes_sent_total", "adapter" => self.adapter_name.clone())
            .increment(1);
    }

    pub fn record_audit_failure(&self) {
        ::metrics::counter!("adapter_audit_failures_total", "adapter" => self.adapter_name.clone())
            .increment(1);
    }

    pub fn record_forced_termination(&self) {
        ::metrics::counter!(
            "adapter_forced_terminations_total",
            "adapter" => self.adapter_name.clone()
        )
        .increment(1);
    }

    /// Set the connected gauge (1 connected, 0 otherwise)
    pub fn set_connected(&self, connected: bool) {
        ::metrics::gauge!("adapter_connected", "adapter" => self.adapter_name.clone())
            .set(if connected { 1.0 } else { 0.0 });
    }
}
