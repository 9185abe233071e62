//! Prometheus metrics for Rolling-Shutter nodes.
//!
//! All metrics follow the naming convention: `rs_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};
use std::time::Instant;

use crate::TelemetryError;

lazy_static! {
    /// Process-wide metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // P2P METRICS
    // =========================================================================

    /// Time spent running the validator chain of a topic
    pub static ref P2P_VALIDATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "rs_p2p_message_validation_seconds",
            "Time spent validating gossip messages"
        ).buckets(exponential_buckets(0.0001, 2.0, 14).unwrap_or_default()),
        &["topic"]
    ).expect("metric creation failed");

    /// Time spent running the handler chain of a topic
    pub static ref P2P_HANDLING_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "rs_p2p_message_handling_seconds",
            "Time spent handling gossip messages"
        ).buckets(exponential_buckets(0.0001, 2.0, 14).unwrap_or_default()),
        &["topic"]
    ).expect("metric creation failed");

    /// Messages dropped by a validator
    pub static ref P2P_MESSAGES_REJECTED: CounterVec = CounterVec::new(
        Opts::new("rs_p2p_messages_rejected_total", "Gossip messages rejected by validators"),
        &["topic"]
    ).expect("metric creation failed");

    // =========================================================================
    // COLLATOR METRICS
    // =========================================================================

    /// Submitted transactions by outcome (accepted, rejected)
    pub static ref COLLATOR_TRANSACTIONS: CounterVec = CounterVec::new(
        Opts::new("rs_collator_transactions_total", "Encrypted transactions by outcome"),
        &["outcome"]
    ).expect("metric creation failed");

    /// Batch state transitions by target state
    pub static ref COLLATOR_BATCHES: CounterVec = CounterVec::new(
        Opts::new("rs_collator_batches_total", "Batch state transitions by target state"),
        &["state"]
    ).expect("metric creation failed");

    // =========================================================================
    // KEYPER METRICS
    // =========================================================================

    /// Epoch secret key shares published
    pub static ref KEYPER_SHARES_SENT: Counter = Counter::new(
        "rs_keyper_key_shares_sent_total",
        "Epoch secret key shares published by this keyper"
    ).expect("metric creation failed");

    /// Epoch secret keys reconstructed
    pub static ref KEYPER_KEYS_GENERATED: Counter = Counter::new(
        "rs_keyper_keys_generated_total",
        "Epoch secret keys reconstructed from shares"
    ).expect("metric creation failed");
}

/// Register all metrics with [`REGISTRY`]. Safe to call more than once.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(P2P_VALIDATION_SECONDS.clone()),
        Box::new(P2P_HANDLING_SECONDS.clone()),
        Box::new(P2P_MESSAGES_REJECTED.clone()),
        Box::new(COLLATOR_TRANSACTIONS.clone()),
        Box::new(COLLATOR_BATCHES.clone()),
        Box::new(KEYPER_SHARES_SENT.clone()),
        Box::new(KEYPER_KEYS_GENERATED.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Render all registered metrics in the Prometheus text format.
pub fn gather() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Observes the elapsed time into a labelled histogram on drop.
pub struct HistogramTimer {
    histogram: prometheus::Histogram,
    start: Instant,
}

impl HistogramTimer {
    /// Start a timer for `histogram{label}`.
    pub fn new(histogram: &HistogramVec, label: &str) -> Self {
        Self {
            histogram: histogram.with_label_values(&[label]),
            start: Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}
