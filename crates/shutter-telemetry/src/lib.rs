//! # Shutter Telemetry
//!
//! Observability for collator and keyper nodes.
//!
//! ## Components
//!
//! - **Logs**: `tracing-subscriber` with an `EnvFilter`, pretty or JSON output
//! - **Traces**: optional OpenTelemetry OTLP export, trace context carried
//!   in gossip envelopes through an injected [`TracingHandle`]
//! - **Metrics**: Prometheus collectors in a private registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shutter_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).await?;
//!     // ...
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RS_SERVICE_NAME` | `rolling-shutter` | Service name in traces |
//! | `RS_LOG_LEVEL` | `info` | Log level filter |
//! | `RS_JSON_LOGS` | `false` | JSON log lines |
//! | `RS_OTLP_ENABLED` | `false` | Export spans over OTLP |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | `http://localhost:4317` | OTLP endpoint |

#![warn(missing_docs)]

mod config;
mod context;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use context::{PropagatedContext, RemoteContext, TracingHandle};
pub use metrics::{gather, register_metrics, HistogramTimer};
pub use tracing_setup::TracingGuard;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Subscriber or tracer could not be installed
    #[error("Failed to initialize tracing: {0}")]
    TracerInit(String),

    /// Metric registration or encoding failed
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    /// Invalid filter directive or similar
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging, tracing and metrics.
///
/// Returns a guard that must be held for the lifetime of the application.
/// When dropped, it flushes pending spans.
pub async fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    register_metrics()?;
    let tracing_guard = tracing_setup::init_tracing(&config).await?;

    Ok(TelemetryGuard {
        _tracing: tracing_guard,
    })
}

/// Guard that keeps telemetry active. Drop to flush and shutdown.
pub struct TelemetryGuard {
    _tracing: TracingGuard,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}
