//! Worker metrics collection
//!
//! The pipeline reports through the [`PipelineMetrics`] trait so the stages
//! never depend on a concrete backend. [`PrometheusMetrics`] is the default
//! exporter; [`NoopMetrics`] is used when nothing is injected.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{PipeError, Result};

/// Observation points exposed by a running worker
pub trait PipelineMetrics: Send + Sync + 'static {
    /// Time spent inside the handler for one message
    fn observe_handler_latency(&self, worker: &str, source: &str, is_error: bool, elapsed: Duration);

    /// Time from ingress to routing completion for one message
    fn observe_pipe_latency(&self, worker: &str, source: &str, is_error: bool, elapsed: Duration);

    /// Current concurrency ceiling
    fn set_max_concurrency(&self, worker: &str, ceiling: usize);

    /// Completions observed during the last tuning window
    fn set_batch_size(&self, worker: &str, completed: u64);
}

/// Discards every observation
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl PipelineMetrics for NoopMetrics {
    fn observe_handler_latency(&self, _: &str, _: &str, _: bool, _: Duration) {}
    fn observe_pipe_latency(&self, _: &str, _: &str, _: bool, _: Duration) {}
    fn set_max_concurrency(&self, _: &str, _: usize) {}
    fn set_batch_size(&self, _: &str, _: u64) {}
}

/// Prometheus-backed pipeline metrics
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Arc<Registry>,
    handler_duration: HistogramVec,
    pipe_duration: HistogramVec,
    max_concurrency: IntGaugeVec,
    batch_size: IntGaugeVec,
}

impl std::fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetrics").finish_non_exhaustive()
    }
}

fn error_label(is_error: bool) -> &'static str {
    if is_error {
        "true"
    } else {
        "false"
    }
}

impl PrometheusMetrics {
    /// Create a collector with its own registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Register the pipeline collectors on an existing registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let handler_duration = HistogramVec::new(
            HistogramOpts::new(
                "pipeworker_handler_processing_seconds",
                "Time spent inside the message handler",
            ),
            &["worker", "source", "error"],
        )?;
        let pipe_duration = HistogramVec::new(
            HistogramOpts::new(
                "pipeworker_pipe_processing_seconds",
                "Time from message receipt until routing finished",
            ),
            &["worker", "source", "error"],
        )?;
        let max_concurrency = IntGaugeVec::new(
            Opts::new(
                "pipeworker_max_concurrency",
                "Current concurrency ceiling of the worker",
            ),
            &["worker"],
        )?;
        let batch_size = IntGaugeVec::new(
            Opts::new(
                "pipeworker_batch_size",
                "Messages completed during the last tuning window",
            ),
            &["worker"],
        )?;

        registry.register(Box::new(handler_duration.clone()))?;
        registry.register(Box::new(pipe_duration.clone()))?;
        registry.register(Box::new(max_concurrency.clone()))?;
        registry.register(Box::new(batch_size.clone()))?;

        Ok(Self {
            registry,
            handler_duration,
            pipe_duration,
            max_concurrency,
            batch_size,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Get metrics in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| PipeError::internal(e.to_string()))
    }

    pub fn max_concurrency(&self, worker: &str) -> i64 {
        self.max_concurrency.with_label_values(&[worker]).get()
    }

    pub fn batch_size(&self, worker: &str) -> i64 {
        self.batch_size.with_label_values(&[worker]).get()
    }

    /// Number of handler latency samples recorded for the label set
    pub fn handler_observations(&self, worker: &str, source: &str, is_error: bool) -> u64 {
        self.handler_duration
            .with_label_values(&[worker, source, error_label(is_error)])
            .get_sample_count()
    }

    /// Number of pipe latency samples recorded for the label set
    pub fn pipe_observations(&self, worker: &str, source: &str, is_error: bool) -> u64 {
        self.pipe_duration
            .with_label_values(&[worker, source, error_label(is_error)])
            .get_sample_count()
    }
}

impl PipelineMetrics for PrometheusMetrics {
    fn observe_handler_latency(&self, worker: &str, source: &str, is_error: bool, elapsed: Duration) {
        self.handler_duration
            .with_label_values(&[worker, source, error_label(is_error)])
            .observe(elapsed.as_secs_f64());
    }

    fn observe_pipe_latency(&self, worker: &str, source: &str, is_error: bool, elapsed: Duration) {
        self.pipe_duration
            .with_label_values(&[worker, source, error_label(is_error)])
            .observe(elapsed.as_secs_f64());
    }

    fn set_max_concurrency(&self, worker: &str, ceiling: usize) {
        self.max_concurrency
            .with_label_values(&[worker])
            .set(i64::try_from(ceiling).unwrap_or(i64::MAX));
    }

    fn set_batch_size(&self, worker: &str, completed: u64) {
        self.batch_size
            .with_label_values(&[worker])
            .set(i64::try_from(completed).unwrap_or(i64::MAX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.set_max_concurrency("w", 12);
        metrics.set_batch_size("w", 40);
        assert_eq!(metrics.max_concurrency("w"), 12);
        assert_eq!(metrics.batch_size("w"), 40);
    }

    #[test]
    fn test_latency_split_by_error_label() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.observe_handler_latency("w", "orders", false, Duration::from_millis(3));
        metrics.observe_handler_latency("w", "orders", false, Duration::from_millis(5));
        metrics.observe_handler_latency("w", "orders", true, Duration::from_millis(1));
        metrics.observe_pipe_latency("w", "orders", true, Duration::from_millis(9));

        assert_eq!(metrics.handler_observations("w", "orders", false), 2);
        assert_eq!(metrics.handler_observations("w", "orders", true), 1);
        assert_eq!(metrics.pipe_observations("w", "orders", true), 1);
        assert_eq!(metrics.pipe_observations("w", "orders", false), 0);
    }

    #[test]
    fn test_render_contains_metric_names() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.set_max_concurrency("w", 3);
        metrics.observe_pipe_latency("w", "s", false, Duration::from_millis(2));
        let text = metrics.render().unwrap();
        assert!(text.contains("pipeworker_max_concurrency"));
        assert!(text.contains("pipeworker_pipe_processing_seconds"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Arc::new(Registry::new());
        PrometheusMetrics::with_registry(registry.clone()).unwrap();
        let err = PrometheusMetrics::with_registry(registry).unwrap_err();
        assert!(matches!(err, PipeError::Metrics(_)));
    }
}
