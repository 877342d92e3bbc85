//! # Prometheus Metrics
//!
//! Exposes chain metrics at the `/metrics` HTTP endpoint on the configured
//! metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use parking_lot::Mutex;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Blocks appended through this process.
    pub blocks_appended_total: IntCounter,
    /// Highest occupied height (`-1` for an empty chain).
    pub chain_height: IntGauge,
    /// Full-chain and single-block validations run.
    pub validations_total: IntCounter,
    /// Faults reported by validations, one per failed check.
    pub validation_faults_total: IntCounter,
    /// Append latency in seconds, seal plus store write.
    pub append_latency_seconds: Histogram,
    /// Serializes read-compare-set on `chain_height`.
    height_guard: Mutex<()>,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("hashchain".into()), None)
            .expect("failed to create prometheus registry");

        let blocks_appended_total = IntCounter::new(
            "blocks_appended_total",
            "Total number of blocks appended by this node",
        )
        .expect("metric creation");
        registry
            .register(Box::new(blocks_appended_total.clone()))
            .expect("metric registration");

        let chain_height = IntGauge::new("chain_height", "Highest occupied block height")
            .expect("metric creation");
        registry
            .register(Box::new(chain_height.clone()))
            .expect("metric registration");

        let validations_total =
            IntCounter::new("validations_total", "Total number of validations run")
                .expect("metric creation");
        registry
            .register(Box::new(validations_total.clone()))
            .expect("metric registration");

        let validation_faults_total = IntCounter::new(
            "validation_faults_total",
            "Total number of failed block checks reported by validations",
        )
        .expect("metric creation");
        registry
            .register(Box::new(validation_faults_total.clone()))
            .expect("metric registration");

        let append_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "append_latency_seconds",
                "Time to seal and persist one block, in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(append_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            blocks_appended_total,
            chain_height,
            validations_total,
            validation_faults_total,
            append_latency_seconds,
            height_guard: Mutex::new(()),
        }
    }

    /// Record the current tip height; `None` sets the gauge to `-1`.
    pub fn set_height(&self, height: Option<u64>) {
        let _guard = self.height_guard.lock();
        self.chain_height.set(gauge_value(height));
    }

    /// Raise the height gauge to `height`. A lower value than the one already
    /// recorded is ignored, so appends finishing out of order never move the
    /// gauge backwards.
    pub fn observe_height(&self, height: u64) {
        let value = gauge_value(Some(height));
        let _guard = self.height_guard.lock();
        if value > self.chain_height.get() {
            self.chain_height.set(value);
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

fn gauge_value(height: Option<u64>) -> i64 {
    height.map_or(-1, |h| i64::try_from(h).unwrap_or(i64::MAX))
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_encode_with_prefix() {
        let metrics = NodeMetrics::new();
        metrics.blocks_appended_total.inc();
        metrics.set_height(Some(3));

        let text = metrics.encode().expect("encode");
        assert!(text.contains("hashchain_blocks_appended_total 1"));
        assert!(text.contains("hashchain_chain_height 3"));
    }

    #[test]
    fn observed_height_never_decreases() {
        let metrics = NodeMetrics::new();
        metrics.set_height(Some(2));
        metrics.observe_height(5);
        metrics.observe_height(3);
        assert_eq!(metrics.chain_height.get(), 5);

        metrics.observe_height(6);
        assert_eq!(metrics.chain_height.get(), 6);
    }

    #[test]
    fn observed_height_from_many_threads_ends_at_max() {
        let metrics = Arc::new(NodeMetrics::new());
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for h in (0..100u64).rev() {
                        metrics.observe_height(h * 8 + t);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("metrics thread should not panic");
        }
        assert_eq!(metrics.chain_height.get(), 99 * 8 + 7);
    }

    #[test]
    fn empty_chain_height_is_negative_one() {
        let metrics = NodeMetrics::new();
        metrics.set_height(None);
        assert_eq!(metrics.chain_height.get(), -1);
    }
}
