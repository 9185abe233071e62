//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging, tracing and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name for traces and logs
    pub service_name: String,

    /// Node role appended to the service name (collator, keyper-0, ...)
    pub role: Option<String>,

    /// OpenTelemetry OTLP endpoint
    pub otlp_endpoint: String,

    /// Export spans over OTLP
    pub otlp_enabled: bool,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Deployment environment (production, staging, local)
    pub environment: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "rolling-shutter".to_string(),
            role: None,
            otlp_endpoint: "http://localhost:4317".to_string(),
            otlp_enabled: false,
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            environment: "local".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `RS_SERVICE_NAME`: Service name (default: rolling-shutter)
    /// - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: http://localhost:4317)
    /// - `RS_OTLP_ENABLED`: Export spans over OTLP (default: false)
    /// - `RS_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `RS_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `RS_JSON_LOGS`: Enable JSON logs (default: false, true in containers)
    /// - `RS_ENVIRONMENT`: Deployment environment (default: local)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("RS_SERVICE_NAME")
                .unwrap_or_else(|_| "rolling-shutter".to_string()),

            role: None,

            otlp_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),

            otlp_enabled: env::var("RS_OTLP_ENABLED")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),

            log_level: env::var("RS_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("RS_CONSOLE_OUTPUT")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),

            json_logs: env::var("RS_JSON_LOGS")
                .map(|v| parse_flag(&v))
                .unwrap_or(is_container),

            environment: env::var("RS_ENVIRONMENT").unwrap_or_else(|_| "local".to_string()),
        }
    }

    /// Same configuration, tagged with a node role.
    pub fn for_role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    /// Service name including the role, if any.
    pub fn full_service_name(&self) -> String {
        match &self.role {
            Some(role) => format!("{}-{}", self.service_name, role),
            None => self.service_name.clone(),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}
