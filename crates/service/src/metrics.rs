//! Prometheus counters for served requests.

use std::time::Duration;

use anyhow::Result;
use ipc::MetricsSnapshot;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};

const LATENCY_BUCKETS_MS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0];

#[derive(Clone)]
pub struct ServiceMetrics {
    registry: Registry,
    requests: IntCounterVec,
    requests_total: IntCounter,
    empty_results: IntCounterVec,
    empty_total: IntCounter,
    latency: HistogramVec,
    latency_all: Histogram,
}

impl std::fmt::Debug for ServiceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceMetrics")
            .field("requests_total", &self.requests_total.get())
            .field("empty_total", &self.empty_total.get())
            .finish()
    }
}

impl ServiceMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("embserve".into()), None)?;

        let requests = IntCounterVec::new(
            Opts::new("requests_total", "Requests served, by operation"),
            &["op"],
        )?;
        let requests_total = IntCounter::new("requests_all_total", "Requests served")?;
        let empty_results = IntCounterVec::new(
            Opts::new(
                "empty_results_total",
                "Requests answered with an empty result, by operation",
            ),
            &["op"],
        )?;
        let empty_total = IntCounter::new("empty_results_all_total", "Empty results served")?;
        let latency = HistogramVec::new(
            HistogramOpts::new("request_latency_ms", "Request latency in milliseconds")
                .buckets(LATENCY_BUCKETS_MS.to_vec()),
            &["op"],
        )?;
        let latency_all = Histogram::with_opts(
            HistogramOpts::new("request_latency_all_ms", "Request latency across operations")
                .buckets(LATENCY_BUCKETS_MS.to_vec()),
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(empty_results.clone()))?;
        registry.register(Box::new(empty_total.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(latency_all.clone()))?;

        Ok(Self {
            registry,
            requests,
            requests_total,
            empty_results,
            empty_total,
            latency,
            latency_all,
        })
    }

    pub fn record(&self, op: &str, elapsed: Duration, empty: bool) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.requests.with_label_values(&[op]).inc();
        self.requests_total.inc();
        self.latency.with_label_values(&[op]).observe(ms);
        self.latency_all.observe(ms);
        if empty {
            self.empty_results.with_label_values(&[op]).inc();
            self.empty_total.inc();
        }
    }

    pub fn requests_for(&self, op: &str) -> u64 {
        self.requests.with_label_values(&[op]).get()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let count = self.latency_all.get_sample_count();
        MetricsSnapshot {
            requests_total: self.requests_total.get(),
            empty_results_total: self.empty_total.get(),
            mean_latency_ms: (count > 0).then(|| self.latency_all.get_sample_sum() / count as f64),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Render every registered metric in the Prometheus text format.
pub fn scrape_metrics(metrics: &ServiceMetrics) -> Result<String> {
    let mut buf = Vec::new();
    TextEncoder::new().encode(&metrics.registry().gather(), &mut buf)?;
    Ok(String::from_utf8(buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_tracks_counts_and_mean() {
        let m = ServiceMetrics::new().unwrap();
        assert_eq!(m.snapshot().mean_latency_ms, None);

        m.record("find_neighbors", Duration::from_millis(2), false);
        m.record("predict_node", Duration::from_millis(4), true);

        let snap = m.snapshot();
        assert_eq!(snap.requests_total, 2);
        assert_eq!(snap.empty_results_total, 1);
        let mean = snap.mean_latency_ms.unwrap();
        assert!((mean - 3.0).abs() < 1e-6, "mean was {mean}");
        assert_eq!(m.requests_for("find_neighbors"), 1);
    }

    #[test]
    fn scrape_renders_prefixed_families() {
        let m = ServiceMetrics::new().unwrap();
        m.record("status", Duration::from_micros(300), false);
        let text = scrape_metrics(&m).unwrap();
        assert!(text.contains("embserve_requests_total{op=\"status\"} 1"));
        assert!(text.contains("embserve_request_latency_ms_bucket"));
    }
}
