//! Configuration management for adapters.

use crate::enricher::{ErrorReportMode, ReportContext};
use crate::policy::ErrorHandlingMode;
use crate::{AdapterError, AdapterResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Shortest allowed polling interval in seconds
pub const MIN_POLLING_INTERVAL_SECS: u64 = 1;

/// Main configuration for adapters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Adapter display name
    pub adapter_name: String,

    /// Seconds between polling iterations (values below 1 are raised to 1)
    #[serde(default = "default_polling_interval_secs")]
    pub polling_interval_secs: u64,

    /// Reaction to failed polling iterations
    #[serde(default)]
    pub error_handling: ErrorHandlingMode,

    /// Verbosity and severity of failure reports
    #[serde(default)]
    pub error_report_mode: ErrorReportMode,

    /// Audit failed envelopes while polling
    #[serde(default)]
    pub audit_on_failure: bool,

    /// JSON-lines file used by the built-in audit sink
    #[serde(default)]
    pub audit_path: Option<String>,

    /// Append the adapter's metadata pairs to every published envelope
    #[serde(default)]
    pub include_metadata: bool,

    /// External party or session identifier shown in reports
    #[serde(default)]
    pub party_id: Option<String>,

    /// Deployment or group identifier shown in reports
    #[serde(default)]
    pub deployment_id: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_polling_interval_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AdapterConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `ADAPTER_NAME`: Required, adapter display name
    /// - `POLLING_INTERVAL_SECS`: Polling interval (default: 10, minimum: 1)
    /// - `ERROR_HANDLING`: StopPollingOnError, SuppressConsecutiveErrors or ReportAllErrors
    ///   (default: SuppressConsecutiveErrors)
    /// - `ERROR_REPORT_MODE`: Information, Warning or Error (default: Warning)
    /// - `AUDIT_ON_FAILURE`: Audit failed envelopes (default: false)
    /// - `AUDIT_PATH`: File for the built-in JSON-lines audit sink
    /// - `INCLUDE_METADATA`: Append adapter metadata to envelopes (default: false)
    /// - `PARTY_ID`: External party identifier
    /// - `DEPLOYMENT_ID`: Deployment/group identifier
    /// - `LOG_LEVEL`: Log level (default: info)
    pub fn from_env() -> AdapterResult<Self> {
        let adapter_name = env::var("ADAPTER_NAME")
            .map_err(|_| AdapterError::config("ADAPTER_NAME is required"))?;

        let mut config = Self {
            adapter_name,
            ..Self::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> AdapterResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AdapterError::config(format!("Failed to read config file {}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            AdapterError::config(format!("Failed to parse config file {}: {}", path, e))
        })
    }

    /// Apply environment variable overrides on top of file or default values
    ///
    /// Unparseable `ERROR_HANDLING` and `ERROR_REPORT_MODE` values are rejected. Numeric and
    /// boolean variables that do not parse are ignored and the current value is kept.
    pub fn apply_env_overrides(&mut self) -> AdapterResult<()> {
        if let Ok(val) = env::var("ADAPTER_NAME") {
            self.adapter_name = val;
        }
        if let Ok(val) = env::var("POLLING_INTERVAL_SECS") {
            if let Ok(n) = val.parse() {
                self.polling_interval_secs = n;
            }
        }
        if let Ok(val) = env::var("ERROR_HANDLING") {
            self.error_handling = val.parse().map_err(AdapterError::config)?;
        }
        if let Ok(val) = env::var("ERROR_REPORT_MODE") {
            self.error_report_mode = val.parse().map_err(AdapterError::config)?;
        }
        if let Ok(val) = env::var("AUDIT_ON_FAILURE") {
            if let Ok(b) = val.parse() {
                self.audit_on_failure = b;
            }
        }
        if let Ok(val) = env::var("AUDIT_PATH") {
            self.audit_path = Some(val);
        }
        if let Ok(val) = env::var("INCLUDE_METADATA") {
            if let Ok(b) = val.parse() {
                self.include_metadata = b;
            }
        }
        if let Ok(val) = env::var("PARTY_ID") {
            self.party_id = Some(val);
        }
        if let Ok(val) = env::var("DEPLOYMENT_ID") {
            self.deployment_id = Some(val);
        }
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.log_level = val;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> AdapterResult<()> {
        if self.adapter_name.trim().is_empty() {
            return Err(AdapterError::config("adapter_name cannot be empty"));
        }

        if let Some(path) = &self.audit_path {
            if path.trim().is_empty() {
                return Err(AdapterError::config("audit_path cannot be empty when set"));
            }
        }

        Ok(())
    }

    /// Polling interval, clamped to the minimum
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs.max(MIN_POLLING_INTERVAL_SECS))
    }

    /// Identification used in failure reports
    pub fn report_context(&self) -> ReportContext {
        ReportContext {
            adapter_name: Some(self.adapter_name.clone()),
            party_id: self.party_id.clone(),
            deployment_id: self.deployment_id.clone(),
        }
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            adapter_name: "default-adapter".to_string(),
            polling_interval_secs: default_polling_interval_secs(),
            error_handling: ErrorHandlingMode::default(),
            error_report_mode: ErrorReportMode::default(),
            audit_on_failure: false,
            audit_path: None,
            include_metadata: false,
            party_id: None,
            deployment_id: None,
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = AdapterConfig::default();
        assert_eq!(config.adapter_name, "default-adapter");
        assert_eq!(config.polling_interval_secs, 10);
        assert_eq!(
            config.error_handling,
            ErrorHandlingMode::SuppressConsecutiveErrors
        );
        assert_eq!(config.error_report_mode, ErrorReportMode::Warning);
        assert!(!config.audit_on_failure);
        assert!(!config.include_metadata);
    }

    #[test]
    fn test_config_validation() {
        let mut config = AdapterConfig::default();
        assert!(config.validate().is_ok());

        config.adapter_name = "  ".to_string();
        assert!(config.validate().is_err());

        config.adapter_name = "reader".to_string();
        config.audit_path = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_polling_interval_clamped() {
        let mut config = AdapterConfig::default();
        assert_eq!(config.polling_interval(), Duration::from_secs(10));

        config.polling_interval_secs = 0;
        assert_eq!(config.polling_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_from_file_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
adapter_name = "orders-reader"
polling_interval_secs = 5
error_handling = "ReportAllErrors"
error_report_mode = "Error"
deployment_id = "plant-a"
"#
        )
        .unwrap();

        let config = AdapterConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.adapter_name, "orders-reader");
        assert_eq!(config.polling_interval_secs, 5);
        assert_eq!(config.error_handling, ErrorHandlingMode::ReportAllErrors);
        assert_eq!(config.error_report_mode, ErrorReportMode::Error);
        assert_eq!(config.log_level, "info");
        assert!(!config.audit_on_failure);

        let ctx = config.report_context();
        assert_eq!(ctx.deployment_id.as_deref(), Some("plant-a"));
        assert_eq!(ctx.party_id, None);
    }

    // The only test touching process env vars, so nothing races it
    #[test]
    fn test_env_overrides_reject_only_bad_enums() {
        let mut config = AdapterConfig::default();

        env::set_var("POLLING_INTERVAL_SECS", "soon");
        env::set_var("INCLUDE_METADATA", "yes please");
        env::set_var("ERROR_HANDLING", "report_all");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.polling_interval_secs, 10);
        assert!(!config.include_metadata);
        assert_eq!(config.error_handling, ErrorHandlingMode::ReportAllErrors);

        env::set_var("ERROR_HANDLING", "sometimes");
        assert!(matches!(
            config.apply_env_overrides(),
            Err(AdapterError::StartupValidation(_))
        ));

        for var in ["POLLING_INTERVAL_SECS", "INCLUDE_METADATA", "ERROR_HANDLING"] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_from_file_missing() {
        assert!(matches!(
            AdapterConfig::from_file("/nonexistent/adapter.toml"),
            Err(AdapterError::StartupValidation(_))
        ));
    }
}
