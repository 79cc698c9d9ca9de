//! Evaluation metrics.
//!
//! The core depends on a three-operation sink (counter inc, histogram
//! observe, gauge set) so it can run with a real Prometheus recorder
//! or with nothing at all. Metric names:
//!
//! - `seizeval_evaluations_total{algorithm, pipeline, status}`
//! - `seizeval_evaluation_duration_seconds{algorithm, pipeline}`
//! - `seizeval_parity_failures_total{algorithm}`
//! - `seizeval_active_evaluations`

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const EVALUATIONS_TOTAL: &str = "seizeval_evaluations_total";
pub const EVALUATION_DURATION_SECONDS: &str = "seizeval_evaluation_duration_seconds";
pub const PARITY_FAILURES_TOTAL: &str = "seizeval_parity_failures_total";
pub const ACTIVE_EVALUATIONS: &str = "seizeval_active_evaluations";

/// Minimal metrics interface the core depends on.
pub trait MetricsSink: Send + Sync {
    fn increment_counter(&self, name: &'static str, labels: &[(&'static str, String)]);
    fn observe_histogram(&self, name: &'static str, labels: &[(&'static str, String)], value: f64);
    fn set_gauge(&self, name: &'static str, value: f64);
}

/// Recorder-backed sink. Install the recorder once at process start
/// and serve `handle.render()` from the metrics endpoint.
pub struct PrometheusSink {
    handle: PrometheusHandle,
}

impl PrometheusSink {
    /// Install the global Prometheus recorder.
    ///
    /// Fails if a recorder is already installed (tests that need
    /// metrics should use `NoopSink` instead).
    pub fn install() -> Result<Self, String> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| format!("failed to install Prometheus recorder: {e}"))?;
        Ok(Self { handle })
    }

    /// Render the current metric state in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl MetricsSink for PrometheusSink {
    fn increment_counter(&self, name: &'static str, labels: &[(&'static str, String)]) {
        let labels: Vec<metrics::Label> = labels
            .iter()
            .map(|(k, v)| metrics::Label::new(*k, v.clone()))
            .collect();
        counter!(name, labels).increment(1);
    }

    fn observe_histogram(&self, name: &'static str, labels: &[(&'static str, String)], value: f64) {
        let labels: Vec<metrics::Label> = labels
            .iter()
            .map(|(k, v)| metrics::Label::new(*k, v.clone()))
            .collect();
        histogram!(name, labels).record(value);
    }

    fn set_gauge(&self, name: &'static str, value: f64) {
        gauge!(name).set(value);
    }
}

/// Discards everything. Used in tests and when no recorder is wanted.
#[derive(Debug, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn increment_counter(&self, _name: &'static str, _labels: &[(&'static str, String)]) {}
    fn observe_histogram(
        &self,
        _name: &'static str,
        _labels: &[(&'static str, String)],
        _value: f64,
    ) {
    }
    fn set_gauge(&self, _name: &'static str, _value: f64) {}
}

// The active gauge is tracked here so concurrent evaluations see a
// consistent count regardless of which sink is installed.
static ACTIVE: AtomicI64 = AtomicI64::new(0);

/// Scoped evaluation tracking: increments the active gauge, times the
/// future, and records the outcome counter and duration histogram on
/// every exit path.
pub async fn track_evaluation<F, T, E>(
    sink: &dyn MetricsSink,
    algorithm: &str,
    pipeline: &str,
    fut: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let active = ACTIVE.fetch_add(1, Ordering::SeqCst) + 1;
    sink.set_gauge(ACTIVE_EVALUATIONS, active as f64);
    let start = Instant::now();

    let result = fut.await;

    let status = if result.is_ok() { "success" } else { "error" };
    sink.increment_counter(
        EVALUATIONS_TOTAL,
        &[
            ("algorithm", algorithm.to_string()),
            ("pipeline", pipeline.to_string()),
            ("status", status.to_string()),
        ],
    );
    sink.observe_histogram(
        EVALUATION_DURATION_SECONDS,
        &[
            ("algorithm", algorithm.to_string()),
            ("pipeline", pipeline.to_string()),
        ],
        start.elapsed().as_secs_f64(),
    );
    let active = ACTIVE.fetch_sub(1, Ordering::SeqCst) - 1;
    sink.set_gauge(ACTIVE_EVALUATIONS, active as f64);

    result
}

/// Record a cache hit as a zero-duration successful evaluation.
pub fn record_cache_hit(sink: &dyn MetricsSink, algorithm: &str, pipeline: &str) {
    sink.increment_counter(
        EVALUATIONS_TOTAL,
        &[
            ("algorithm", algorithm.to_string()),
            ("pipeline", pipeline.to_string()),
            ("status", "success".to_string()),
        ],
    );
    sink.observe_histogram(
        EVALUATION_DURATION_SECONDS,
        &[
            ("algorithm", algorithm.to_string()),
            ("pipeline", pipeline.to_string()),
        ],
        0.0,
    );
}

/// Record a parity failure for an algorithm.
pub fn record_parity_failure(sink: &dyn MetricsSink, algorithm: &str) {
    sink.increment_counter(
        PARITY_FAILURES_TOTAL,
        &[("algorithm", algorithm.to_string())],
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Sink that records calls for assertions.
    #[derive(Default)]
    struct RecordingSink {
        counters: Mutex<Vec<(&'static str, Vec<(String, String)>)>>,
        histograms: Mutex<Vec<(&'static str, f64)>>,
        gauges: Mutex<Vec<(&'static str, f64)>>,
    }

    impl MetricsSink for RecordingSink {
        fn increment_counter(&self, name: &'static str, labels: &[(&'static str, String)]) {
            self.counters.lock().push((
                name,
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            ));
        }

        fn observe_histogram(
            &self,
            name: &'static str,
            _labels: &[(&'static str, String)],
            value: f64,
        ) {
            self.histograms.lock().push((name, value));
        }

        fn set_gauge(&self, name: &'static str, value: f64) {
            self.gauges.lock().push((name, value));
        }
    }

    #[tokio::test]
    async fn tracks_success_and_duration() {
        let sink = Arc::new(RecordingSink::default());
        let out: Result<u32, &str> =
            track_evaluation(sink.as_ref(), "taes", "dual", async { Ok(7) }).await;
        assert_eq!(out.unwrap(), 7);

        let counters = sink.counters.lock();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters[0].0, EVALUATIONS_TOTAL);
        assert!(counters[0]
            .1
            .iter()
            .any(|(k, v)| k == "status" && v == "success"));

        assert_eq!(sink.histograms.lock().len(), 1);
        // Gauge touched on entry and exit
        assert_eq!(sink.gauges.lock().len(), 2);
    }

    #[tokio::test]
    async fn tracks_error_outcome() {
        let sink = RecordingSink::default();
        let out: Result<(), String> =
            track_evaluation(&sink, "dp", "dual", async { Err("boom".to_string()) }).await;
        assert!(out.is_err());

        let counters = sink.counters.lock();
        assert!(counters[0]
            .1
            .iter()
            .any(|(k, v)| k == "status" && v == "error"));
        // Duration is still observed on the error path
        assert_eq!(sink.histograms.lock().len(), 1);
    }

    #[test]
    fn parity_failure_counter_labels_algorithm() {
        let sink = RecordingSink::default();
        record_parity_failure(&sink, "epoch");
        let counters = sink.counters.lock();
        assert_eq!(counters[0].0, PARITY_FAILURES_TOTAL);
        assert!(counters[0]
            .1
            .iter()
            .any(|(k, v)| k == "algorithm" && v == "epoch"));
    }
}
