//! Failure report construction.

use crate::policy::Notice;
use crate::ResourceError;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::str::FromStr;

const UNKNOWN: &str = "Unknown";

/// Verbosity of failure reports, which also sets their severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorReportMode {
    Information,
    #[default]
    Warning,
    Error,
}

impl ErrorReportMode {
    pub fn severity(&self) -> Severity {
        match self {
            ErrorReportMode::Information => Severity::Info,
            ErrorReportMode::Warning => Severity::Warning,
            ErrorReportMode::Error => Severity::Error,
        }
    }

    /// Cause chain and trace are only rendered by the core for the lower severities
    fn includes_detail(&self) -> bool {
        !matches!(self, ErrorReportMode::Error)
    }
}

impl FromStr for ErrorReportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "information" | "info" => Ok(Self::Information),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(format!("Unknown error report mode: {}", other)),
        }
    }
}

/// Severity of a diagnostic forwarded to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Identification rendered in every report summary
#[derive(Debug, Clone, Default)]
pub struct ReportContext {
    pub adapter_name: Option<String>,
    pub party_id: Option<String>,
    pub deployment_id: Option<String>,
}

/// Builds human-readable failure reports
#[derive(Debug, Clone)]
pub struct MessageEnricher {
    context: ReportContext,
    mode: ErrorReportMode,
}

impl MessageEnricher {
    pub fn new(context: ReportContext, mode: ErrorReportMode) -> Self {
        Self { context, mode }
    }

    pub fn severity(&self) -> Severity {
        self.mode.severity()
    }

    /// Party for a given failure: the error's own party wins over the configured one
    pub fn party_for(&self, error: &ResourceError) -> String {
        error
            .party_id()
            .map(str::to_string)
            .or_else(|| self.context.party_id.clone())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    /// Render the report text for a failure
    pub fn enrich(&self, error: &ResourceError, notice: Option<Notice>) -> String {
        let adapter = non_empty(self.context.adapter_name.as_deref());
        let deployment = non_empty(self.context.deployment_id.as_deref());
        let party = self.party_for(error);

        let mut report = format!(
            "Adapter '{}' polling failure (party: {}, deployment: {}): {}",
            adapter, party, deployment, error
        );
        if let Some(notice) = notice {
            report.push(' ');
            report.push_str(&notice.to_string());
        }

        if !self.mode.includes_detail() {
            return report;
        }

        let causes = error.causes();
        if !causes.is_empty() {
            report.push_str("\nCaused by:");
            for (idx, cause) in causes.iter().enumerate() {
                let _ = write!(report, "\n  {}: {}", idx + 1, cause);
            }
        }

        if let Some(trace) = error.trace() {
            let _ = write!(report, "\nTrace:\n{}", trace);
        }

        report
    }
}

fn non_empty(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => UNKNOWN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Debug, Error)]
    #[error("port /dev/ttyS0 busy")]
    struct PortBusy;

    fn context() -> ReportContext {
        ReportContext {
            adapter_name: Some("serial-reader".to_string()),
            party_id: None,
            deployment_id: Some("plant-a".to_string()),
        }
    }

    #[test]
    fn test_summary_defaults_missing_context() {
        let enricher = MessageEnricher::new(ReportContext::default(), ErrorReportMode::Error);
        let report = enricher.enrich(&ResourceError::new("boom"), None);

        assert_eq!(
            report,
            "Adapter 'Unknown' polling failure (party: Unknown, deployment: Unknown): boom"
        );
    }

    #[test]
    fn test_error_mode_omits_causes() {
        let enricher = MessageEnricher::new(context(), ErrorReportMode::Error);
        let err = ResourceError::with_source("read failed", PortBusy);

        let report = enricher.enrich(&err, Some(Notice::Disconnecting));

        assert!(report.starts_with("Adapter 'serial-reader' polling failure"));
        assert!(report.contains("deployment: plant-a"));
        assert!(report.ends_with("The adapter will now be disconnected."));
        assert!(!report.contains("Caused by"));
        assert_eq!(enricher.severity(), Severity::Error);
    }

    #[test]
    fn test_warning_mode_includes_causes() {
        let enricher = MessageEnricher::new(context(), ErrorReportMode::Warning);
        let err = ResourceError::with_source("read failed", PortBusy).with_party("line-3");

        let report = enricher.enrich(&err, Some(Notice::Suppressing));

        assert!(report.contains("party: line-3"));
        assert!(report.contains("Further errors will be suppressed"));
        assert!(report.contains("Caused by:\n  1: port /dev/ttyS0 busy"));
        assert_eq!(enricher.severity(), Severity::Warning);
    }

    #[test]
    fn test_trace_rendered_below_error_mode_only() {
        let err = ResourceError::with_source("read failed", PortBusy).force_trace();
        assert!(err.trace().is_some());

        for mode in [ErrorReportMode::Information, ErrorReportMode::Warning] {
            let report = MessageEnricher::new(context(), mode).enrich(&err, None);
            assert!(report.contains("Caused by:\n  1: port /dev/ttyS0 busy"));
            assert!(report.contains("\nTrace:\n"));
        }

        let report = MessageEnricher::new(context(), ErrorReportMode::Error).enrich(&err, None);
        assert!(!report.contains("Trace:"));
        assert!(!report.contains("Caused by"));
    }

    #[test]
    fn test_configured_party_used_as_fallback() {
        let mut ctx = context();
        ctx.party_id = Some("acme".to_string());
        let enricher = MessageEnricher::new(ctx, ErrorReportMode::Information);

        assert_eq!(enricher.party_for(&ResourceError::new("x")), "acme");
        assert_eq!(
            enricher.party_for(&ResourceError::new("x").with_party("other")),
            "other"
        );
    }

    #[test]
    fn test_report_mode_parse() {
        assert_eq!(
            "info".parse::<ErrorReportMode>().unwrap(),
            ErrorReportMode::Information
        );
        assert_eq!(ErrorReportMode::default(), ErrorReportMode::Warning);
        assert!("verbose".parse::<ErrorReportMode>().is_err());
    }
}
